//! Mesh tetrahedra.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::core::vertex::VertexKey;

new_key_type! {
    /// Stable key of a tetrahedron in the mesh store.
    pub struct TetKey;
}

/// Vertex ordering of the face opposite each corner.
///
/// For a positively oriented tetrahedron `(v0, v1, v2, v3)`, face `i`
/// consists of the three corners other than `v_i`, ordered so that
/// `orient3d(face_i, v_i) == POSITIVE`: the opposite corner sits on the
/// positive side of its face.
pub const FACE_VERTICES: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];

/// The slot a ghost tetrahedron keeps its infinite apex in.
///
/// Ghost tetrahedra always store their three finite (hull) vertices in slots
/// 0..3 and `None` in slot 3, so face [`GHOST_APEX`] is the hull face shared
/// with the adjacent finite tetrahedron.
pub const GHOST_APEX: usize = 3;

/// A tetrahedron: four vertex slots and four neighbor slots.
///
/// Slot `i` of `neighbors` is the tetrahedron sharing the face opposite
/// vertex `i`. A `None` vertex slot is the vertex at infinity: such a
/// *ghost* tetrahedron closes the neighbor graph across the convex hull.
/// The finite face of a ghost is ordered so that points strictly outside
/// the hull are on its positive side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tetrahedron {
    /// Corner vertices; `None` marks the infinite apex of a ghost.
    pub vertices: [Option<VertexKey>; 4],
    /// Face-sharing neighbors, indexed opposite the same-numbered corner.
    pub neighbors: [Option<TetKey>; 4],
    /// Region attribute assigned by region flooding.
    pub region: Option<f64>,
    /// Maximum volume bound inherited from the enclosing region.
    pub max_volume: Option<f64>,
    /// Bit `i` set when face `i` lies on a recovered PLC facet.
    pub constrained: u8,
    /// `true` once flood-fill classified this cell as outside the domain.
    pub exterior: bool,
    /// Visit stamp for cavity and flood traversals.
    pub epoch: u32,
}

impl Tetrahedron {
    /// Creates a finite tetrahedron from four vertex keys.
    #[must_use]
    pub const fn new(v0: VertexKey, v1: VertexKey, v2: VertexKey, v3: VertexKey) -> Self {
        Self {
            vertices: [Some(v0), Some(v1), Some(v2), Some(v3)],
            neighbors: [None; 4],
            region: None,
            max_volume: None,
            constrained: 0,
            exterior: false,
            epoch: 0,
        }
    }

    /// Creates a ghost tetrahedron over the hull face `(v0, v1, v2)`.
    ///
    /// The face must be ordered so that points outside the hull are on its
    /// positive side.
    #[must_use]
    pub const fn ghost(v0: VertexKey, v1: VertexKey, v2: VertexKey) -> Self {
        Self {
            vertices: [Some(v0), Some(v1), Some(v2), None],
            neighbors: [None; 4],
            region: None,
            max_volume: None,
            constrained: 0,
            exterior: false,
            epoch: 0,
        }
    }

    /// `true` when one vertex slot holds the infinite apex.
    #[inline]
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.vertices[GHOST_APEX].is_none()
    }

    /// The three finite vertices of a ghost's hull face.
    #[inline]
    #[must_use]
    pub fn hull_face(&self) -> [Option<VertexKey>; 3] {
        [self.vertices[0], self.vertices[1], self.vertices[2]]
    }

    /// The vertices of face `i`, in the [`FACE_VERTICES`] order.
    #[inline]
    #[must_use]
    pub fn face(&self, i: usize) -> [Option<VertexKey>; 3] {
        let [a, b, c] = FACE_VERTICES[i];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// The slot holding vertex `v`, if present.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, v: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&s| s == Some(v))
    }

    /// `true` when `v` is one of the corners.
    #[inline]
    #[must_use]
    pub fn contains(&self, v: VertexKey) -> bool {
        self.slot_of(v).is_some()
    }

    /// The slot of the neighbor `n`, if bonded.
    #[inline]
    #[must_use]
    pub fn neighbor_slot(&self, n: TetKey) -> Option<usize> {
        self.neighbors.iter().position(|&s| s == Some(n))
    }

    /// `true` when face `i` lies on a recovered PLC facet.
    #[inline]
    #[must_use]
    pub const fn is_face_constrained(&self, i: usize) -> bool {
        self.constrained & (1 << i) != 0
    }

    /// Marks or clears the constraint bit of face `i`.
    #[inline]
    pub fn set_face_constrained(&mut self, i: usize, constrained: bool) {
        if constrained {
            self.constrained |= 1 << i;
        } else {
            self.constrained &= !(1 << i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<VertexKey> {
        let mut arena: SlotMap<VertexKey, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn face_vertex_orders_are_even_permutations() {
        // Each face order plus the opposite corner must be an even
        // permutation of (0, 1, 2, 3), so the opposite corner sees the face
        // positively for a positively oriented tetrahedron.
        for (i, face) in FACE_VERTICES.iter().enumerate() {
            let perm = [face[0], face[1], face[2], i];
            let mut inversions = 0;
            for a in 0..4 {
                for b in a + 1..4 {
                    if perm[a] > perm[b] {
                        inversions += 1;
                    }
                }
            }
            assert_eq!(inversions % 2, 0, "face {i} ordering has odd parity");
        }
    }

    #[test]
    fn ghost_detection_and_faces() {
        let vs = keys(4);
        let tet = Tetrahedron::new(vs[0], vs[1], vs[2], vs[3]);
        assert!(!tet.is_ghost());
        assert_eq!(tet.face(3), [Some(vs[0]), Some(vs[1]), Some(vs[2])]);

        let ghost = Tetrahedron::ghost(vs[0], vs[1], vs[2]);
        assert!(ghost.is_ghost());
        assert_eq!(ghost.hull_face(), [Some(vs[0]), Some(vs[1]), Some(vs[2])]);
        // The hull face is the face opposite the infinite apex.
        assert_eq!(ghost.face(GHOST_APEX), ghost.hull_face());
    }

    #[test]
    fn constrained_bits() {
        let vs = keys(4);
        let mut tet = Tetrahedron::new(vs[0], vs[1], vs[2], vs[3]);
        assert!(!tet.is_face_constrained(2));
        tet.set_face_constrained(2, true);
        assert!(tet.is_face_constrained(2));
        assert!(!tet.is_face_constrained(0));
        tet.set_face_constrained(2, false);
        assert_eq!(tet.constrained, 0);
    }

    #[test]
    fn slot_lookups() {
        let vs = keys(5);
        let tet = Tetrahedron::new(vs[0], vs[1], vs[2], vs[3]);
        assert_eq!(tet.slot_of(vs[2]), Some(2));
        assert_eq!(tet.slot_of(vs[4]), None);
        assert!(tet.contains(vs[0]));
        assert!(!tet.contains(vs[4]));
    }
}
