//! The tetrahedral mesh store.
//!
//! [`TetMesh`] owns the vertex and tetrahedron arenas and maintains the
//! topological invariants:
//!
//! - every non-ghost tetrahedron is positively oriented;
//! - neighbor links are symmetric and agree on the shared face triple;
//! - each hull face of the triangulation abuts exactly one ghost
//!   tetrahedron, so the neighbor graph is closed.
//!
//! Entities are stored in slotmaps: removal frees the slot for reuse while
//! key versioning keeps stale keys from aliasing new entities. Internal
//! accesses index the arenas directly; a stale key here is a topology bug,
//! and the resulting panic is the fatal invariant-violation outcome of the
//! error policy (see the notes on [`crate::error`]).

use slotmap::SecondaryMap;
use thiserror::Error;

use crate::core::collections::{FastHashMap, SmallBuffer, StorageMap};
use crate::core::tetrahedron::{TetKey, Tetrahedron};
use crate::core::vertex::{Vertex, VertexKey};
use crate::geometry::point::Point;
use crate::geometry::predicates::{insphere_perturbed, orient3d, InSphere, Orientation};

/// Structural validation failures of the mesh store.
#[derive(Debug, Error)]
pub enum MeshValidationError {
    /// A finite tetrahedron is flat or inverted.
    #[error("tetrahedron {tet:?} has non-positive orientation")]
    NonPositiveTetrahedron {
        /// The offending tetrahedron.
        tet: TetKey,
    },

    /// A neighbor link is one-directional or disagrees on the shared face.
    #[error("asymmetric neighbor link between {tet:?} (face {face}) and {neighbor:?}")]
    AsymmetricNeighbors {
        /// The tetrahedron holding the link.
        tet: TetKey,
        /// The face slot of the link.
        face: usize,
        /// The neighbor that does not link back over the same face.
        neighbor: TetKey,
    },

    /// A vertex lies strictly inside the circumsphere of a tetrahedron.
    #[error("vertex {vertex:?} violates the empty circumsphere of {tet:?}")]
    DelaunayViolation {
        /// The offending tetrahedron.
        tet: TetKey,
        /// The encroaching vertex.
        vertex: VertexKey,
    },
}

/// The mesh store: vertex and tetrahedron arenas plus their side tables.
#[derive(Debug, Default)]
pub struct TetMesh {
    vertices: StorageMap<VertexKey, Vertex>,
    tets: StorageMap<TetKey, Tetrahedron>,
    /// Variable-length per-vertex attributes, kept out of the hot entity.
    vertex_attributes: SecondaryMap<VertexKey, Vec<f64>>,
    /// Monotone visit-stamp generator for traversals.
    epoch: u32,
    /// Highest vertex output index handed out so far.
    next_index: usize,
    /// A recently touched tetrahedron, used to seed walks.
    pub(crate) hint: Option<TetKey>,
}

impl TetMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Vertices
    // =========================================================================

    /// Adds a vertex and returns its key.
    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexKey {
        self.next_index = self.next_index.max(vertex.index() + 1);
        self.vertices.insert(vertex)
    }

    /// A fresh output index for a Steiner vertex.
    pub fn fresh_index(&mut self) -> usize {
        let idx = self.next_index;
        self.next_index += 1;
        idx
    }

    /// The vertex behind `key`.
    #[inline]
    #[must_use]
    pub fn vertex(&self, key: VertexKey) -> &Vertex {
        &self.vertices[key]
    }

    /// The position of vertex `key`.
    #[inline]
    #[must_use]
    pub fn point(&self, key: VertexKey) -> &Point {
        self.vertices[key].point()
    }

    /// Number of vertices in the store.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Iterates over all vertices.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.vertices.iter()
    }

    /// Attaches variable-length attributes to a vertex.
    pub fn set_vertex_attributes(&mut self, key: VertexKey, attributes: Vec<f64>) {
        self.vertex_attributes.insert(key, attributes);
    }

    /// The attributes of a vertex, empty if none were set.
    #[must_use]
    pub fn vertex_attributes(&self, key: VertexKey) -> &[f64] {
        self.vertex_attributes.get(key).map_or(&[], Vec::as_slice)
    }

    /// Repoints a vertex's incident back-reference.
    pub(crate) fn set_incident(&mut self, v: VertexKey, t: TetKey) {
        self.vertices[v].incident = Some(t);
    }

    // =========================================================================
    // Tetrahedra
    // =========================================================================

    /// Adds a tetrahedron, updating the incident back-reference of each of
    /// its finite corners.
    pub fn add_tet(&mut self, tet: Tetrahedron) -> TetKey {
        let corners = tet.vertices;
        let key = self.tets.insert(tet);
        for v in corners.into_iter().flatten() {
            self.vertices[v].incident = Some(key);
        }
        self.hint = Some(key);
        key
    }

    /// Removes a tetrahedron. Neighbor links of the survivors are the
    /// caller's responsibility; cavity operations always rebond before
    /// returning.
    pub fn remove_tet(&mut self, key: TetKey) {
        if self.hint == Some(key) {
            self.hint = None;
        }
        self.tets.remove(key);
    }

    /// The tetrahedron behind `key`.
    #[inline]
    #[must_use]
    pub fn tet(&self, key: TetKey) -> &Tetrahedron {
        &self.tets[key]
    }

    /// Mutable access to the tetrahedron behind `key`.
    #[inline]
    pub fn tet_mut(&mut self, key: TetKey) -> &mut Tetrahedron {
        &mut self.tets[key]
    }

    /// `true` when `key` refers to a live tetrahedron.
    #[inline]
    #[must_use]
    pub fn contains_tet(&self, key: TetKey) -> bool {
        self.tets.contains_key(key)
    }

    /// Number of live tetrahedra, ghosts included.
    #[must_use]
    pub fn number_of_tets(&self) -> usize {
        self.tets.len()
    }

    /// Number of live finite (non-ghost) tetrahedra.
    #[must_use]
    pub fn number_of_finite_tets(&self) -> usize {
        self.tets.values().filter(|t| !t.is_ghost()).count()
    }

    /// Iterates over all live tetrahedra.
    pub fn tets(&self) -> impl Iterator<Item = (TetKey, &Tetrahedron)> {
        self.tets.iter()
    }

    /// Iterates over live finite tetrahedra.
    pub fn finite_tets(&self) -> impl Iterator<Item = (TetKey, &Tetrahedron)> {
        self.tets.iter().filter(|(_, t)| !t.is_ghost())
    }

    /// The corner points of a finite tetrahedron.
    ///
    /// Returns `None` for ghosts.
    #[must_use]
    pub fn tet_points(&self, key: TetKey) -> Option<[Point; 4]> {
        let tet = &self.tets[key];
        let mut points = [Point::default(); 4];
        for (slot, v) in tet.vertices.iter().enumerate() {
            points[slot] = *self.vertices[(*v)?].point();
        }
        Some(points)
    }

    /// A fresh visit stamp; traversals mark cells with it to avoid revisits.
    pub fn next_epoch(&mut self) -> u32 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    // =========================================================================
    // Topology maintenance
    // =========================================================================

    /// Bonds face `face_a` of `a` to face `face_b` of `b`, symmetrically.
    ///
    /// Both directions are written before returning, so the symmetry
    /// invariant can never be observed half-updated.
    pub fn bond(&mut self, a: TetKey, face_a: usize, b: TetKey, face_b: usize) {
        self.tets[a].neighbors[face_a] = Some(b);
        self.tets[b].neighbors[face_b] = Some(a);
    }

    /// The neighbor across face `face` of `tet`.
    #[inline]
    #[must_use]
    pub fn neighbor(&self, tet: TetKey, face: usize) -> Option<TetKey> {
        self.tets[tet].neighbors[face]
    }

    /// All live tetrahedra incident to `v`, by flood fill from the vertex's
    /// back-reference across faces that keep `v` as a corner.
    #[must_use]
    pub fn incident_tets(&mut self, v: VertexKey) -> Vec<TetKey> {
        let mut start = None;
        if let Some(k) = self.vertices[v].incident {
            if self.tets.contains_key(k) && self.tets[k].contains(v) {
                start = Some(k);
            }
        }
        if start.is_none() {
            // Stale back-reference: fall back to a scan and repair it.
            start = self.tets.iter().find(|(_, t)| t.contains(v)).map(|(k, _)| k);
            match start {
                Some(found) => self.vertices[v].incident = Some(found),
                None => return Vec::new(),
            }
        }
        let Some(start) = start else {
            return Vec::new();
        };

        let stamp = self.next_epoch();
        let mut result = Vec::new();
        let mut stack: SmallBuffer<TetKey, 32> = SmallBuffer::new();
        self.tets[start].epoch = stamp;
        stack.push(start);
        while let Some(current) = stack.pop() {
            result.push(current);
            for i in 0..4 {
                let Some(next) = self.tets[current].neighbors[i] else {
                    continue;
                };
                if self.tets[next].epoch != stamp && self.tets[next].contains(v) {
                    self.tets[next].epoch = stamp;
                    stack.push(next);
                }
            }
        }
        result
    }

    /// A tetrahedron containing both endpoints of edge `(u, v)`, if the edge
    /// exists in the mesh.
    #[must_use]
    pub fn find_edge_tet(&mut self, u: VertexKey, v: VertexKey) -> Option<TetKey> {
        self.incident_tets(u)
            .into_iter()
            .find(|&t| self.tets[t].contains(v))
    }

    /// `true` when `(u, v)` is an edge of some live tetrahedron.
    #[must_use]
    pub fn edge_exists(&mut self, u: VertexKey, v: VertexKey) -> bool {
        self.find_edge_tet(u, v).is_some()
    }

    /// The tetrahedra around edge `(u, v)`, in pivot order starting from an
    /// arbitrary incident tetrahedron.
    ///
    /// The ring is closed when the edge is interior; an edge touching the
    /// hull yields the ghost cells as part of the ring, keeping it closed
    /// there as well. Returns `None` when the edge does not exist or the
    /// ring is open (possible only after exterior stripping).
    #[must_use]
    pub fn edge_ring(&mut self, u: VertexKey, v: VertexKey) -> Option<Vec<TetKey>> {
        let start = self.find_edge_tet(u, v)?;
        let mut ring = vec![start];
        let mut prev = None;
        let mut current = start;
        loop {
            let tet = &self.tets[current];
            // The two faces of `current` containing edge (u, v) are those
            // opposite its other two corners.
            let mut exits: SmallBuffer<TetKey, 4> = SmallBuffer::new();
            for (slot, corner) in tet.vertices.iter().enumerate() {
                if *corner == Some(u) || *corner == Some(v) {
                    continue;
                }
                if let Some(n) = tet.neighbors[slot] {
                    if self.tets[n].contains(u) && self.tets[n].contains(v) {
                        exits.push(n);
                    }
                }
            }
            let next = exits.into_iter().find(|&n| Some(n) != prev)?;
            if next == start {
                return Some(ring);
            }
            prev = Some(current);
            ring.push(next);
            current = next;
        }
    }

    /// Locates the face `(a, b, c)` as `(tet, face_slot)`, if it exists.
    #[must_use]
    pub fn find_face(&mut self, a: VertexKey, b: VertexKey, c: VertexKey) -> Option<(TetKey, usize)> {
        for t in self.incident_tets(a) {
            let tet = &self.tets[t];
            if !(tet.contains(b) && tet.contains(c)) {
                continue;
            }
            for (slot, corner) in tet.vertices.iter().enumerate() {
                if *corner != Some(a) && *corner != Some(b) && *corner != Some(c) {
                    return Some((t, slot));
                }
            }
        }
        None
    }

    // =========================================================================
    // Boundary enumeration
    // =========================================================================

    /// Faces of finite, interior tetrahedra whose other side differs in
    /// ghost/exterior status or carries a PLC constraint.
    ///
    /// These are the faces written out as the mesh boundary.
    #[must_use]
    pub fn boundary_faces(&self) -> Vec<(TetKey, usize)> {
        let mut faces = Vec::new();
        for (key, tet) in &self.tets {
            if tet.is_ghost() || tet.exterior {
                continue;
            }
            for face in 0..4 {
                let exposed = match tet.neighbors[face] {
                    None => true,
                    Some(n) => {
                        let other = &self.tets[n];
                        other.is_ghost() || other.exterior
                    }
                };
                if exposed || tet.is_face_constrained(face) {
                    faces.push((key, face));
                }
            }
        }
        faces
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks the structural invariants: positive orientation of every
    /// finite tetrahedron and symmetric neighbor links agreeing on the
    /// shared face triple.
    pub fn is_valid(&self) -> Result<(), MeshValidationError> {
        for (key, tet) in &self.tets {
            if !tet.is_ghost() {
                let [a, b, c, d] = self.tet_points_unchecked(tet);
                if orient3d(&a, &b, &c, &d) != Orientation::POSITIVE {
                    return Err(MeshValidationError::NonPositiveTetrahedron { tet: key });
                }
            }
            for face in 0..4 {
                let Some(neighbor) = tet.neighbors[face] else {
                    continue;
                };
                let Some(back) = self.tets[neighbor].neighbor_slot(key) else {
                    return Err(MeshValidationError::AsymmetricNeighbors {
                        tet: key,
                        face,
                        neighbor,
                    });
                };
                let mut mine = tet.face(face);
                let mut theirs = self.tets[neighbor].face(back);
                mine.sort_unstable();
                theirs.sort_unstable();
                if mine != theirs {
                    return Err(MeshValidationError::AsymmetricNeighbors {
                        tet: key,
                        face,
                        neighbor,
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks the global Delaunay property under symbolic perturbation: no
    /// vertex lies strictly inside the circumsphere of any finite
    /// tetrahedron. Quadratic; intended for tests and diagnostics.
    pub fn validate_delaunay(&self) -> Result<(), MeshValidationError> {
        for (tkey, tet) in &self.tets {
            if tet.is_ghost() {
                continue;
            }
            let corners = tet.vertices;
            let [pa, pb, pc, pd] = self.tet_points_unchecked(tet);
            let corner_keys: SmallBuffer<VertexKey, 4> =
                corners.iter().flatten().copied().collect();
            let ids: SmallBuffer<usize, 4> = corner_keys
                .iter()
                .map(|&k| self.vertices[k].index())
                .collect();
            for (vkey, vertex) in &self.vertices {
                if corner_keys.contains(&vkey) || vertex.incident().is_none() {
                    continue;
                }
                let result = insphere_perturbed(
                    (&pa, ids[0]),
                    (&pb, ids[1]),
                    (&pc, ids[2]),
                    (&pd, ids[3]),
                    (vertex.point(), vertex.index()),
                );
                if result == InSphere::INSIDE {
                    return Err(MeshValidationError::DelaunayViolation {
                        tet: tkey,
                        vertex: vkey,
                    });
                }
            }
        }
        Ok(())
    }

    fn tet_points_unchecked(&self, tet: &Tetrahedron) -> [Point; 4] {
        let mut points = [Point::default(); 4];
        for (slot, v) in tet.vertices.iter().enumerate() {
            if let Some(v) = v {
                points[slot] = *self.vertices[*v].point();
            }
        }
        points
    }

    /// The face triple of `(tet, face)` as an unordered, sorted key.
    #[must_use]
    pub fn face_key(&self, tet: TetKey, face: usize) -> [Option<VertexKey>; 3] {
        let mut key = self.tets[tet].face(face);
        key.sort_unstable();
        key
    }

    /// Builds the face-to-tetrahedra incidence map over live cells.
    ///
    /// Each face triple maps to the one or two `(tet, face_slot)` pairs
    /// sharing it; more than two sharers means corrupted topology.
    #[must_use]
    pub fn face_map(&self) -> FastHashMap<[Option<VertexKey>; 3], SmallBuffer<(TetKey, usize), 2>> {
        let mut map: FastHashMap<[Option<VertexKey>; 3], SmallBuffer<(TetKey, usize), 2>> =
            FastHashMap::default();
        for (key, tet) in &self.tets {
            for face in 0..4 {
                let mut face_key = tet.face(face);
                face_key.sort_unstable();
                map.entry(face_key).or_default().push((key, face));
            }
        }
        map
    }
}

/// Ghost-aware conflict and orientation support shared by location and
/// insertion.
impl TetMesh {
    /// Orientation of the query point against face [`GHOST_APEX`] of a ghost
    /// tetrahedron: the hull face, ordered outward.
    ///
    /// `POSITIVE` means strictly outside the hull through that face.
    #[must_use]
    pub fn ghost_face_orientation(&self, ghost: TetKey, p: &Point) -> Orientation {
        let tet = &self.tets[ghost];
        let [Some(v0), Some(v1), Some(v2)] = tet.hull_face() else {
            unreachable!("ghost stores its finite face in slots 0..3");
        };
        orient3d(
            self.vertices[v0].point(),
            self.vertices[v1].point(),
            self.vertices[v2].point(),
            p,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::Vertex;

    fn single_tet_mesh() -> (TetMesh, [VertexKey; 4], TetKey) {
        let mut mesh = TetMesh::new();
        // Positively oriented: (0,0,0), (0,1,0), (1,0,0), (0,0,1).
        let coords = [
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let mut keys = [VertexKey::default(); 4];
        for (i, c) in coords.iter().enumerate() {
            keys[i] = mesh.add_vertex(Vertex::input(Point::new(*c), i));
        }
        let tet = mesh.add_tet(Tetrahedron::new(keys[0], keys[1], keys[2], keys[3]));
        (mesh, keys, tet)
    }

    #[test]
    fn add_and_count() {
        let (mesh, _, _) = single_tet_mesh();
        assert_eq!(mesh.number_of_vertices(), 4);
        assert_eq!(mesh.number_of_tets(), 1);
        assert_eq!(mesh.number_of_finite_tets(), 1);
    }

    #[test]
    fn incident_back_references() {
        let (mesh, keys, tet) = single_tet_mesh();
        for key in keys {
            assert_eq!(mesh.vertex(key).incident(), Some(tet));
        }
    }

    #[test]
    fn single_tet_is_valid() {
        let (mesh, _, _) = single_tet_mesh();
        mesh.is_valid().expect("valid single-tet mesh");
        mesh.validate_delaunay().expect("trivially Delaunay");
    }

    #[test]
    fn bond_restores_symmetry() {
        let (mut mesh, keys, tet) = single_tet_mesh();
        // A second tetrahedron glued across face 3 = (v0, v1, v2): apex on
        // the negative side of that face.
        let below = mesh.add_vertex(Vertex::input(Point::new([0.3, 0.3, -1.0]), 4));
        // Face 3 of `tet` is (v0, v1, v2); the mirror cell must see the
        // shared face from the other side, so it is (v1, v0, v2, below).
        let other = mesh.add_tet(Tetrahedron::new(keys[1], keys[0], keys[2], below));
        let other_face = mesh.tet(other).slot_of(below).expect("below is a corner");
        mesh.bond(tet, 3, other, other_face);
        mesh.is_valid().expect("two bonded tets");
    }

    #[test]
    fn incident_walk_and_edge_queries() {
        let (mut mesh, keys, tet) = single_tet_mesh();
        assert_eq!(mesh.incident_tets(keys[0]), vec![tet]);
        assert!(mesh.edge_exists(keys[0], keys[3]));
        assert_eq!(mesh.find_edge_tet(keys[1], keys[2]), Some(tet));
        let (found, slot) = mesh.find_face(keys[0], keys[1], keys[2]).expect("face exists");
        assert_eq!(found, tet);
        assert_eq!(slot, 3);
    }

    #[test]
    fn boundary_of_single_tet() {
        let (mesh, _, _) = single_tet_mesh();
        // No ghosts in this bare store: all four faces are exposed.
        assert_eq!(mesh.boundary_faces().len(), 4);
    }

    #[test]
    fn vertex_attribute_side_table() {
        let (mut mesh, keys, _) = single_tet_mesh();
        assert!(mesh.vertex_attributes(keys[0]).is_empty());
        mesh.set_vertex_attributes(keys[0], vec![1.5, 2.5]);
        assert_eq!(mesh.vertex_attributes(keys[0]), &[1.5, 2.5]);
    }

    #[test]
    fn remove_reuses_slots_without_aliasing() {
        let (mut mesh, keys, tet) = single_tet_mesh();
        mesh.remove_tet(tet);
        assert!(!mesh.contains_tet(tet));
        let replacement = mesh.add_tet(Tetrahedron::new(keys[0], keys[1], keys[2], keys[3]));
        // The stale key must not resolve to the replacement.
        assert_ne!(tet, replacement);
        assert!(mesh.contains_tet(replacement));
    }

    #[test]
    fn face_map_counts_sharers() {
        let (mut mesh, keys, tet) = single_tet_mesh();
        let below = mesh.add_vertex(Vertex::input(Point::new([0.3, 0.3, -1.0]), 4));
        let other = mesh.add_tet(Tetrahedron::new(keys[1], keys[0], keys[2], below));
        let other_face = mesh.tet(other).slot_of(below).expect("below is a corner");
        mesh.bond(tet, 3, other, other_face);

        let map = mesh.face_map();
        let shared = mesh.face_key(tet, 3);
        assert_eq!(map[&shared].len(), 2);
        let hull = mesh.face_key(tet, 0);
        assert_eq!(map[&hull].len(), 1);
    }
}
