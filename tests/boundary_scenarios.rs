//! End-to-end scenarios exercising the full pipeline on known geometries:
//! the unit cube PLC, the regular tetrahedron, a convex hull run, a
//! cospherical configuration, quality refinement, and a domain with an
//! interior hole.

use std::sync::atomic::AtomicBool;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use tetmesh::core::behavior::BehaviorBuilder;
use tetmesh::geometry::predicates::{orient3d, Orientation};
use tetmesh::geometry::primitives::{radius_edge_ratio, signed_volume, triangle_area, volume};
use tetmesh::prelude::*;

fn run(behavior: &Behavior, input: &PlcInput) -> Result<MeshOutput, MeshError> {
    tetrahedralize(behavior, input, None, &AtomicBool::new(false))
}

fn cube_input(origin: f64, size: f64) -> (Vec<[f64; 3]>, Vec<Facet>) {
    let (lo, hi) = (origin, origin + size);
    let points = vec![
        [lo, lo, lo],
        [hi, lo, lo],
        [hi, hi, lo],
        [lo, hi, lo],
        [lo, lo, hi],
        [hi, lo, hi],
        [hi, hi, hi],
        [lo, hi, hi],
    ];
    let quads = [
        [0, 1, 2, 3],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [1, 2, 6, 5],
        [2, 3, 7, 6],
        [3, 0, 4, 7],
    ];
    let facets = quads
        .iter()
        .map(|q| Facet {
            polygons: vec![Polygon {
                vertices: q.to_vec(),
            }],
            holes: Vec::new(),
        })
        .collect();
    (points, facets)
}

/// `true` when all vertices of `face` lie on one axis plane of the cube
/// `[lo, hi]^3`.
fn face_on_cube_plane(points: &[[f64; 3]], face: &[usize; 3], lo: f64, hi: f64) -> bool {
    (0..3).any(|axis| {
        let coords: Vec<f64> = face.iter().map(|&v| points[v][axis]).collect();
        coords.iter().all(|&c| (c - lo).abs() < 1e-12)
            || coords.iter().all(|&c| (c - hi).abs() < 1e-12)
    })
}

// =============================================================================
// Scenario A: unit cube PLC
// =============================================================================

#[test]
fn unit_cube_plc() {
    let (points, facets) = cube_input(0.0, 1.0);
    let input = PlcInput {
        points,
        facets,
        facet_markers: (1..=6).collect(),
        ..PlcInput::default()
    };
    let behavior = Behavior::parse("pfz").unwrap();
    let output = run(&behavior, &input).unwrap();

    // No Steiner points, 5 or 6 tetrahedra, unit volume.
    assert_eq!(output.number_of_points(), 8);
    assert!(
        (5..=6).contains(&output.number_of_tetrahedra()),
        "got {} tetrahedra",
        output.number_of_tetrahedra()
    );
    assert_relative_eq!(output.total_volume(), 1.0, epsilon = 1e-12);

    // Every boundary face lies on a cube plane, and together they cover all
    // six unit squares.
    assert!(!output.faces.is_empty());
    let mut boundary_area = 0.0;
    for (face, _) in &output.faces {
        assert!(face_on_cube_plane(&output.points, face, 0.0, 1.0));
        let [a, b, c] = face.map(|i| Point::new(output.points[i]));
        boundary_area += triangle_area(&a, &b, &c);
    }
    assert_relative_eq!(boundary_area, 6.0, epsilon = 1e-12);
}

// =============================================================================
// Scenario B: regular tetrahedron
// =============================================================================

#[test]
fn regular_tetrahedron() {
    let h = (2.0_f64 / 3.0).sqrt();
    let input = PlcInput::from_points(vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.5, 3.0_f64.sqrt() / 2.0, 0.0],
        [0.5, 3.0_f64.sqrt() / 6.0, h],
    ]);
    let output = run(&Behavior::default(), &input).unwrap();

    assert_eq!(output.number_of_points(), 4);
    assert_eq!(output.number_of_tetrahedra(), 1);
    assert_relative_eq!(
        output.total_volume(),
        2.0_f64.sqrt() / 12.0,
        epsilon = 1e-12
    );

    let [a, b, c, d] = output.tetrahedra[0].map(|i| Point::new(output.points[i]));
    assert_relative_eq!(
        radius_edge_ratio(&a, &b, &c, &d),
        (3.0_f64 / 8.0).sqrt(),
        epsilon = 1e-12
    );
    // The output cell is positively oriented.
    assert_eq!(orient3d(&a, &b, &c, &d), Orientation::POSITIVE);
}

// =============================================================================
// Scenario C: convex hull of 20 points
// =============================================================================

/// Deterministic pseudo-random points in [-1, 1]^3, free of degeneracies.
fn scattered_points(n: usize) -> Vec<[f64; 3]> {
    (0..n)
        .map(|i| {
            let f = i as f64;
            [
                (f * 12.989_8).sin() * 0.97,
                (f * 78.233_1).sin() * 0.93,
                (f * 39.425_7).sin() * 0.89,
            ]
        })
        .collect()
}

/// Brute-force convex hull facets: every triple with all remaining points
/// strictly on one side.
fn brute_force_hull_faces(points: &[[f64; 3]]) -> Vec<[usize; 3]> {
    let pts: Vec<Point> = points.iter().map(|&p| Point::new(p)).collect();
    let n = pts.len();
    let mut faces = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let mut side = Orientation::DEGENERATE;
                let mut on_hull = true;
                for m in 0..n {
                    if m == i || m == j || m == k {
                        continue;
                    }
                    let o = orient3d(&pts[i], &pts[j], &pts[k], &pts[m]);
                    if o == Orientation::DEGENERATE {
                        on_hull = false;
                        break;
                    }
                    if side == Orientation::DEGENERATE {
                        side = o;
                    } else if side != o {
                        on_hull = false;
                        break;
                    }
                }
                if on_hull {
                    faces.push([i, j, k]);
                }
            }
        }
    }
    faces
}

#[test]
fn convex_hull_of_20_points() {
    let points = scattered_points(20);
    let input = PlcInput::from_points(points.clone());
    let behavior = Behavior::parse("cfz").unwrap();
    let output = run(&behavior, &input).unwrap();

    assert_eq!(output.number_of_points(), 20);

    // The boundary triangles are exactly the hull facets found by the
    // independent brute-force search.
    let mut expected: Vec<[usize; 3]> = brute_force_hull_faces(&points);
    for f in &mut expected {
        f.sort_unstable();
    }
    expected.sort_unstable();
    let mut actual: Vec<[usize; 3]> = output
        .faces
        .iter()
        .map(|(f, _)| {
            let mut f = *f;
            f.sort_unstable();
            f
        })
        .collect();
    actual.sort_unstable();
    assert_eq!(actual, expected);

    // Total mesh volume equals the hull volume (summed over hull faces
    // against an interior reference point).
    let centroid = Point::centroid(&points.iter().map(|&p| Point::new(p)).collect::<Vec<_>>());
    let mut hull_volume = 0.0;
    for [i, j, k] in expected {
        let (a, b, c) = (
            Point::new(points[i]),
            Point::new(points[j]),
            Point::new(points[k]),
        );
        hull_volume += signed_volume(&a, &b, &c, &centroid).abs();
    }
    assert_relative_eq!(output.total_volume(), hull_volume, epsilon = 1e-9);
}

// =============================================================================
// Scenario D: cospherical octahedron
// =============================================================================

#[test]
fn cospherical_octahedron_is_deterministic() {
    let input = PlcInput::from_points(vec![
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ]);
    let behavior = Behavior::parse("z").unwrap();
    let first = run(&behavior, &input).unwrap();
    let second = run(&behavior, &input).unwrap();

    // The insphere ties are broken symbolically: valid, deterministic
    // output with four cells and no flat cell.
    assert_eq!(first.number_of_tetrahedra(), 4);
    assert_eq!(first.points, second.points);
    assert_eq!(first.tetrahedra, second.tetrahedra);
    for tet in &first.tetrahedra {
        let [a, b, c, d] = tet.map(|i| Point::new(first.points[i]));
        assert!(volume(&a, &b, &c, &d) > 1e-12, "zero-volume cell");
    }
    assert_relative_eq!(first.total_volume(), 4.0 / 3.0, epsilon = 1e-12);
}

// =============================================================================
// Scenario E: quality refinement on the cube
// =============================================================================

#[test]
fn quality_refinement_on_cube() {
    let (points, facets) = cube_input(0.0, 1.0);
    let input = PlcInput {
        points,
        facets,
        ..PlcInput::default()
    };
    let behavior = BehaviorBuilder::default()
        .plc(true)
        .quality(true)
        .min_ratio(1.2)
        .faces_out(true)
        .zero_index(true)
        .refine_step_limit(50_000_usize)
        .build()
        .unwrap();
    let output = run(&behavior, &input).unwrap();

    // Every cell meets the ratio bound.
    let mut min_dihedral: f64 = f64::INFINITY;
    for tet in &output.tetrahedra {
        let [a, b, c, d] = tet.map(|i| Point::new(output.points[i]));
        assert!(
            radius_edge_ratio(&a, &b, &c, &d) <= 1.2 + 1e-9,
            "cell exceeds the ratio bound"
        );
        for angle in tetmesh::geometry::primitives::dihedral_angles(&a, &b, &c, &d) {
            min_dihedral = min_dihedral.min(angle);
        }
    }
    // Radius-edge refinement does not eliminate slivers, but it never
    // produces flat cells either.
    assert!(min_dihedral > 0.0);

    // Boundary faces stay on the cube planes, and the volume is preserved.
    for (face, _) in &output.faces {
        assert!(face_on_cube_plane(&output.points, face, 0.0, 1.0));
    }
    assert_relative_eq!(output.total_volume(), 1.0, epsilon = 1e-9);
}

// =============================================================================
// Scenario F: cube with an interior hole
// =============================================================================

#[test]
fn cube_with_interior_hole() {
    let (mut points, mut facets) = cube_input(0.0, 3.0);
    let (inner_points, inner_facets) = cube_input(1.0, 1.0);
    let offset = points.len();
    points.extend(inner_points);
    for mut facet in inner_facets {
        for polygon in &mut facet.polygons {
            for v in &mut polygon.vertices {
                *v += offset;
            }
        }
        facets.push(facet);
    }
    let input = PlcInput {
        points,
        facets,
        holes: vec![[1.5, 1.5, 1.5]],
        ..PlcInput::default()
    };
    let behavior = Behavior::parse("pz").unwrap();
    let output = run(&behavior, &input).unwrap();

    // No cell reaches into the hole.
    for tet in &output.tetrahedra {
        let corners: Vec<Point> = tet.iter().map(|&i| Point::new(output.points[i])).collect();
        let centroid = Point::centroid(&corners);
        let inside_hole = (0..3).all(|axis| {
            let c = centroid.coords()[axis];
            c > 1.0 && c < 2.0
        });
        assert!(
            !inside_hole,
            "cell centroid {centroid:?} lies inside the hole"
        );
    }

    // Outer volume minus the carved-out cube.
    assert_abs_diff_eq!(output.total_volume(), 27.0 - 1.0, epsilon = 1e-9);
}
