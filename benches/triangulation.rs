//! Benchmark bulk Delaunay construction over growing point counts.

use std::sync::atomic::AtomicBool;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tetmesh::core::algorithms::bowyer_watson::triangulate;
use tetmesh::core::mesh::TetMesh;
use tetmesh::core::vertex::{Vertex, VertexKey};
use tetmesh::geometry::point::Point;

fn random_points(n: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
        .collect()
}

fn bench_triangulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_triangulation");
    for &n in &[100_usize, 500, 2_000] {
        let points = random_points(n, 42);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| {
                let mut mesh = TetMesh::new();
                let keys: Vec<VertexKey> = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| mesh.add_vertex(Vertex::input(Point::new(*p), i)))
                    .collect();
                triangulate(&mut mesh, &keys, &AtomicBool::new(false)).unwrap();
                mesh.number_of_finite_tets()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_triangulation);
criterion_main!(benches);
