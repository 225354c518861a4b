//! Boundary extraction: faces, edges, convex hull, and the Voronoi dual.
//!
//! A *boundary face* separates the meshed domain from the outside world: its
//! other side is a ghost, a carved-away exterior cell, nothing at all (after
//! exterior stripping), or it carries a PLC constraint. These are the faces
//! written to `.face` files; their unique edges feed `.edge` output; and the
//! circumcenters of the finite cells are the vertices of the dual Voronoi
//! diagram.

use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::TetKey;
use crate::core::vertex::VertexKey;
use crate::geometry::point::Point;
use crate::geometry::primitives::circumsphere;

/// The boundary faces of the mesh with their markers.
///
/// A face marked during facet recovery reports its facet's marker; an
/// unmarked boundary face (a convex-hull face of an unconstrained
/// triangulation) reports 1, matching the conventional default.
#[must_use]
pub fn boundary_triangles(
    mesh: &TetMesh,
    face_markers: &FastHashMap<[VertexKey; 3], i32>,
) -> Vec<([VertexKey; 3], i32)> {
    let mut seen: FastHashSet<[VertexKey; 3]> = FastHashSet::default();
    let mut triangles = Vec::new();
    for (tet, face) in mesh.boundary_faces() {
        let corners = mesh.tet(tet).face(face);
        let keys: SmallBuffer<VertexKey, 3> = corners.iter().flatten().copied().collect();
        if keys.len() != 3 {
            continue;
        }
        let mut sorted = [keys[0], keys[1], keys[2]];
        sorted.sort_unstable();
        if !seen.insert(sorted) {
            continue;
        }
        let marker = face_markers.get(&sorted).copied().unwrap_or(1);
        triangles.push(([keys[0], keys[1], keys[2]], marker));
    }
    triangles
}

/// Every unique edge of the finite, interior cells, with segment markers.
///
/// `segment_edges` maps subsegment endpoint pairs (sorted) to their marker;
/// other edges report 0.
#[must_use]
pub fn unique_edges(
    mesh: &TetMesh,
    segment_edges: &FastHashMap<(VertexKey, VertexKey), i32>,
) -> Vec<([VertexKey; 2], i32)> {
    let mut seen: FastHashSet<(VertexKey, VertexKey)> = FastHashSet::default();
    let mut edges = Vec::new();
    for (_, tet) in mesh.finite_tets() {
        if tet.exterior {
            continue;
        }
        let corners: SmallBuffer<VertexKey, 4> = tet.vertices.iter().flatten().copied().collect();
        for i in 0..corners.len() {
            for j in i + 1..corners.len() {
                let key = (corners[i].min(corners[j]), corners[i].max(corners[j]));
                if !seen.insert(key) {
                    continue;
                }
                let marker = segment_edges.get(&key).copied().unwrap_or(0);
                edges.push(([key.0, key.1], marker));
            }
        }
    }
    edges
}

/// Circumcenters of the given finite cells, in order: the vertices of the
/// dual Voronoi diagram, matching the `.v.node` listing one-to-one with the
/// `.ele` listing.
#[must_use]
pub fn voronoi_vertices(mesh: &TetMesh, cells: &[TetKey]) -> Vec<Point> {
    cells
        .iter()
        .filter_map(|&k| mesh.tet_points(k))
        .map(|[a, b, c, d]| circumsphere(&a, &b, &c, &d).0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::bowyer_watson::triangulate;
    use crate::core::vertex::Vertex;
    use std::sync::atomic::AtomicBool;

    fn simple_mesh() -> TetMesh {
        let mut mesh = TetMesh::new();
        let coords = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [2.0, 2.0, 2.0],
        ];
        let keys: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(i, c)| mesh.add_vertex(Vertex::input(Point::new(*c), i)))
            .collect();
        triangulate(&mut mesh, &keys, &AtomicBool::new(false)).unwrap();
        mesh
    }

    #[test]
    fn hull_faces_default_marker() {
        let mesh = simple_mesh();
        let faces = boundary_triangles(&mesh, &FastHashMap::default());
        // Two tetrahedra glued on one face: 6 hull faces.
        assert_eq!(faces.len(), 6);
        assert!(faces.iter().all(|(_, marker)| *marker == 1));
    }

    #[test]
    fn edge_count_of_double_tet() {
        let mesh = simple_mesh();
        let edges = unique_edges(&mesh, &FastHashMap::default());
        // 5 vertices, two cells sharing a face: 6 + 3 unique edges.
        assert_eq!(edges.len(), 9);
        assert!(edges.iter().all(|(_, marker)| *marker == 0));
    }

    #[test]
    fn voronoi_vertex_per_cell() {
        let mesh = simple_mesh();
        let cells: Vec<TetKey> = mesh.finite_tets().map(|(k, _)| k).collect();
        let centers = voronoi_vertices(&mesh, &cells);
        assert_eq!(centers.len(), cells.len());
        // Each center is equidistant from its cell's corners.
        for (center, cell) in centers.iter().zip(&cells) {
            let [a, b, c, d] = mesh.tet_points(*cell).unwrap();
            let r = center.distance(&a);
            for p in [&b, &c, &d] {
                approx::assert_relative_eq!(center.distance(p), r, epsilon = 1e-9);
            }
        }
    }
}
