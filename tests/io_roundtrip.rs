//! Round-trip laws of the text formats: writing a mesh to `.node`/`.ele`/
//! `.face` and re-reading it yields an isomorphic topology, and the
//! `.v.node` listing matches the tetrahedron circumcenters one-to-one.

use std::sync::atomic::AtomicBool;

use approx::assert_relative_eq;
use tetmesh::core::behavior::BehaviorBuilder;
use tetmesh::geometry::primitives::circumsphere;
use tetmesh::io::text::{
    parse_ele, parse_face, parse_node, write_ele, write_face, write_node, write_voronoi_node,
};
use tetmesh::prelude::*;

fn sample_mesh(zero_index: bool) -> MeshOutput {
    let input = PlcInput::from_points(vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.9, 0.8, 0.7],
        [0.3, 0.2, 0.1],
        [-0.5, 0.4, 0.6],
    ]);
    let behavior = BehaviorBuilder::default()
        .faces_out(true)
        .edges_out(true)
        .voronoi_out(true)
        .zero_index(zero_index)
        .build()
        .unwrap();
    tetrahedralize(&behavior, &input, None, &AtomicBool::new(false)).unwrap()
}

fn canonical_cells(tets: &[[usize; 4]]) -> Vec<[usize; 4]> {
    let mut cells: Vec<[usize; 4]> = tets
        .iter()
        .map(|t| {
            let mut c = *t;
            c.sort_unstable();
            c
        })
        .collect();
    cells.sort_unstable();
    cells
}

#[test]
fn node_ele_round_trip_is_isomorphic() {
    for zero_index in [false, true] {
        let output = sample_mesh(zero_index);

        let node_text = write_node(&output);
        let parsed_nodes = parse_node(&node_text).unwrap();
        assert_eq!(parsed_nodes.points, output.points);
        assert_eq!(parsed_nodes.first_index, output.first_index);

        let ele_text = write_ele(&output);
        let (parsed_tets, _) = parse_ele(&ele_text, parsed_nodes.first_index).unwrap();
        // Same cell set up to per-cell vertex order.
        assert_eq!(
            canonical_cells(&parsed_tets),
            canonical_cells(&output.tetrahedra)
        );
    }
}

#[test]
fn face_round_trip_preserves_boundary() {
    let output = sample_mesh(true);
    let face_text = write_face(&output);
    let parsed = parse_face(&face_text, output.first_index).unwrap();
    assert_eq!(parsed.len(), output.faces.len());
    for ((face, marker), (expected_face, expected_marker)) in parsed.iter().zip(&output.faces) {
        assert_eq!(face, expected_face);
        assert_eq!(marker, expected_marker);
    }
}

#[test]
fn voronoi_listing_matches_circumcenters() {
    let output = sample_mesh(true);
    assert_eq!(
        output.voronoi_points.len(),
        output.number_of_tetrahedra(),
        "one dual vertex per finite tetrahedron"
    );

    // The .v.node schema parses back as a node file with the same entries.
    let text = write_voronoi_node(&output);
    let parsed = parse_node(&text).unwrap();
    assert_eq!(parsed.points.len(), output.voronoi_points.len());

    // Incidence: entry i is the circumcenter of tetrahedron i.
    for (dual, tet) in output.voronoi_points.iter().zip(&output.tetrahedra) {
        let [a, b, c, d] = tet.map(|i| Point::new(output.points[i]));
        let (center, _) = circumsphere(&a, &b, &c, &d);
        assert_relative_eq!(dual[0], center.x(), epsilon = 1e-12);
        assert_relative_eq!(dual[1], center.y(), epsilon = 1e-12);
        assert_relative_eq!(dual[2], center.z(), epsilon = 1e-12);
    }
}

#[test]
fn rebuilt_mesh_matches_written_mesh() {
    // Feeding the written mesh back through refine mode (with no bounds)
    // reproduces the same topology.
    let output = sample_mesh(true);
    let node_text = write_node(&output);
    let ele_text = write_ele(&output);

    let nodes = parse_node(&node_text).unwrap();
    let (tets, _) = parse_ele(&ele_text, nodes.first_index).unwrap();

    let input = PlcInput {
        points: nodes.points,
        tetrahedra: tets,
        ..PlcInput::default()
    };
    let behavior = BehaviorBuilder::default()
        .refine(true)
        .zero_index(true)
        .build()
        .unwrap();
    let rebuilt = tetrahedralize(&behavior, &input, None, &AtomicBool::new(false)).unwrap();

    assert_eq!(rebuilt.points, output.points);
    assert_eq!(
        canonical_cells(&rebuilt.tetrahedra),
        canonical_cells(&output.tetrahedra)
    );
}
