//! Incremental Bowyer–Watson insertion.
//!
//! A point is inserted by excising the *cavity*, the connected set of
//! tetrahedra whose (symbolically perturbed) circumsphere contains the
//! point, and re-filling it with a star of new tetrahedra, one per cavity
//! boundary face. Ghost tetrahedra participate uniformly: a ghost conflicts
//! when the point lies beyond its hull face (or on the face plane, inside
//! the face's circumcircle), so insertions outside the convex hull grow the
//! hull without any special casing in the flood fill.
//!
//! Bulk construction inserts points in BRIO order (see
//! [`crate::core::util::hilbert`]) after bootstrapping a first tetrahedron
//! from four affinely independent input points wrapped in a shell of four
//! ghosts.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use log::{debug, trace};
use thiserror::Error;

use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::{TetKey, Tetrahedron, GHOST_APEX};
use crate::core::util::hilbert::brio_order;
use crate::core::vertex::VertexKey;
use crate::geometry::point::Point;
use crate::geometry::predicates::{
    incircle_perturbed, insphere_perturbed, orient2d, orient3d, InSphere, Orientation,
};
use crate::geometry::primitives::{dominant_axis, project_away};

use super::locate::{locate, LocateError, LocateResult};

/// Outcome bookkeeping of one insertion.
#[derive(Debug, Clone, Default)]
pub struct InsertionInfo {
    /// Tetrahedra removed with the cavity.
    pub cavity_size: usize,
    /// New tetrahedra created for the star.
    pub created: Vec<TetKey>,
}

/// Errors raised by a single point insertion.
#[derive(Debug, Error)]
pub enum InsertionError {
    /// The point coincides exactly with an existing vertex.
    #[error("vertex {inserted} coincides with existing vertex {existing}")]
    Coincident {
        /// Index of the vertex already in the mesh.
        existing: usize,
        /// Index of the vertex being inserted.
        inserted: usize,
    },

    /// No conflicting tetrahedron was found around the located cell.
    #[error("no conflict cavity found for vertex {index}")]
    NoCavity {
        /// Index of the vertex being inserted.
        index: usize,
    },

    /// Point location failed.
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// Errors raised by bulk triangulation.
#[derive(Debug, Error)]
pub enum TriangulateError {
    /// Fewer than four affinely independent points.
    #[error("input points are affinely dependent; no tetrahedron exists")]
    Degenerate,

    /// Two input points share coordinates.
    #[error("vertices {first} and {second} have identical coordinates")]
    Coincident {
        /// Index of the first coincident vertex.
        first: usize,
        /// Index of the second coincident vertex.
        second: usize,
    },

    /// The caller's interrupt flag was raised.
    #[error("triangulation cancelled by caller")]
    Cancelled,

    /// An insertion failed for another reason.
    #[error(transparent)]
    Insertion(#[from] InsertionError),
}

// =============================================================================
// Conflict predicate
// =============================================================================

/// Does the (perturbed) circumsphere of `tet` contain `p`?
///
/// For ghosts the circumsphere degenerates to the outer halfspace of the
/// hull face, closed by the face's circumcircle on the face plane itself.
#[must_use]
pub fn conflicts(mesh: &TetMesh, tet: TetKey, p: &Point, p_index: usize) -> bool {
    let t = mesh.tet(tet);
    if t.is_ghost() {
        let [Some(v0), Some(v1), Some(v2)] = t.hull_face() else {
            unreachable!("ghost stores its finite face in slots 0..3");
        };
        let (a, b, c) = (mesh.point(v0), mesh.point(v1), mesh.point(v2));
        return match orient3d(a, b, c, p) {
            Orientation::POSITIVE => true,
            Orientation::NEGATIVE => false,
            Orientation::DEGENERATE => {
                // On the hull plane: conflict iff inside the circumcircle of
                // the hull face, decided in the projected plane.
                let axis = dominant_axis(a, b, c);
                let (ia, ib, ic) = (
                    mesh.vertex(v0).index(),
                    mesh.vertex(v1).index(),
                    mesh.vertex(v2).index(),
                );
                let (mut pa, mut pb, pc) =
                    (project_away(a, axis), project_away(b, axis), project_away(c, axis));
                let (mut ja, mut jb, jc) = (ia, ib, ic);
                if orient2d(pa, pb, pc) == Orientation::NEGATIVE {
                    std::mem::swap(&mut pa, &mut pb);
                    std::mem::swap(&mut ja, &mut jb);
                }
                incircle_perturbed(
                    (pa, ja),
                    (pb, jb),
                    (pc, jc),
                    (project_away(p, axis), p_index),
                ) == InSphere::INSIDE
            }
        };
    }

    let corners: SmallBuffer<VertexKey, 4> = t.vertices.iter().flatten().copied().collect();
    let pts: SmallBuffer<&Point, 4> = corners.iter().map(|&v| mesh.point(v)).collect();
    let ids: SmallBuffer<usize, 4> = corners.iter().map(|&v| mesh.vertex(v).index()).collect();
    insphere_perturbed(
        (pts[0], ids[0]),
        (pts[1], ids[1]),
        (pts[2], ids[2]),
        (pts[3], ids[3]),
        (p, p_index),
    ) == InSphere::INSIDE
}

// =============================================================================
// Cavity insertion
// =============================================================================

/// One face of the cavity boundary, recorded from its surviving side.
struct BoundaryFace {
    outside: TetKey,
    outside_slot: usize,
}

/// Inserts the already-stored vertex `vkey` by cavity retriangulation,
/// flooding from `seed`.
///
/// When `respect_constraints` is set, the flood does not cross a face marked
/// as a PLC constraint unless the new point lies exactly on that face's
/// plane (i.e. the insertion splits the facet); sub-faces of a split facet
/// are re-marked on the new cells.
///
/// # Errors
///
/// [`InsertionError::NoCavity`] when neither `seed` nor any of its
/// neighbors conflicts with the point; with exact predicates this means the
/// seed did not come from a valid location query.
#[allow(clippy::too_many_lines)]
pub fn insert_in_cavity(
    mesh: &mut TetMesh,
    vkey: VertexKey,
    seed: TetKey,
    respect_constraints: bool,
) -> Result<InsertionInfo, InsertionError> {
    let p = *mesh.point(vkey);
    let p_index = mesh.vertex(vkey).index();

    // The located cell conflicts by construction; when the point sits on a
    // face or edge, exact ties may push the conflict a cell or two away.
    let seed = if conflicts(mesh, seed, &p, p_index) {
        seed
    } else {
        find_conflict_near(mesh, seed, &p, p_index)
            .ok_or(InsertionError::NoCavity { index: p_index })?
    };

    // Flood-fill the conflict region.
    let stamp = mesh.next_epoch();
    let mut cavity: Vec<TetKey> = Vec::new();
    let mut stack: SmallBuffer<TetKey, 16> = SmallBuffer::new();
    mesh.tet_mut(seed).epoch = stamp;
    stack.push(seed);
    let mut crossed_constrained: FastHashSet<(VertexKey, VertexKey)> = FastHashSet::default();
    while let Some(current) = stack.pop() {
        cavity.push(current);
        for face in 0..4 {
            let Some(next) = mesh.neighbor(current, face) else {
                continue;
            };
            if mesh.tet(next).epoch == stamp {
                continue;
            }
            if respect_constraints && mesh.tet(current).is_face_constrained(face) {
                if !face_coplanar_with(mesh, current, face, &p) {
                    continue;
                }
                record_face_edges(mesh, current, face, &mut crossed_constrained);
            }
            if conflicts(mesh, next, &p, p_index) {
                mesh.tet_mut(next).epoch = stamp;
                stack.push(next);
            }
        }
    }

    // Cavity validation: every finite boundary face must see the new point
    // strictly on its cavity side, or the star would contain a flat cell.
    // Absorb offending outside cells and re-check.
    loop {
        let mut grew = false;
        let snapshot = cavity.clone();
        for &t in &snapshot {
            for face in 0..4 {
                let Some(outside) = mesh.neighbor(t, face) else {
                    continue;
                };
                if mesh.tet(outside).epoch == stamp {
                    continue;
                }
                let slot = mesh
                    .tet(outside)
                    .neighbor_slot(t)
                    .unwrap_or_else(|| unreachable!("neighbor links are symmetric"));
                if boundary_face_degenerate(mesh, outside, slot, &p) {
                    if respect_constraints && mesh.tet(t).is_face_constrained(face) {
                        record_face_edges(mesh, t, face, &mut crossed_constrained);
                    }
                    mesh.tet_mut(outside).epoch = stamp;
                    cavity.push(outside);
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
    }

    // Collect the boundary from the outside.
    let mut boundary: Vec<BoundaryFace> = Vec::new();
    for &t in &cavity {
        for face in 0..4 {
            let Some(outside) = mesh.neighbor(t, face) else {
                continue;
            };
            if mesh.tet(outside).epoch == stamp {
                continue;
            }
            let outside_slot = mesh
                .tet(outside)
                .neighbor_slot(t)
                .unwrap_or_else(|| unreachable!("neighbor links are symmetric"));
            boundary.push(BoundaryFace {
                outside,
                outside_slot,
            });
        }
    }
    trace!(
        "cavity of vertex {p_index}: {} cells, {} boundary faces",
        cavity.len(),
        boundary.len()
    );

    // Region attributes carry over from the excised cells.
    let inherited = cavity
        .iter()
        .map(|&t| mesh.tet(t))
        .find(|t| !t.is_ghost())
        .map(|t| (t.region, t.max_volume, t.exterior))
        .unwrap_or_default();

    // Star the boundary: one new cell per face, vertices reversed so the new
    // point lands on the positive side. A face containing the infinite apex
    // yields a new ghost; an even permutation moves the apex to its slot.
    let mut created: Vec<TetKey> = Vec::with_capacity(boundary.len());
    let mut edge_map: FastHashMap<[Option<VertexKey>; 2], (TetKey, usize)> =
        FastHashMap::default();
    for bf in &boundary {
        let [w0, w1, w2] = mesh.tet(bf.outside).face(bf.outside_slot);
        let mut cell_vertices = [w0, w2, w1, Some(vkey)];
        if let Some(apex) = cell_vertices[..3].iter().position(Option::is_none) {
            // Double transposition keeps the orientation even.
            cell_vertices.swap(apex, GHOST_APEX);
            let (o1, o2) = match apex {
                0 => (1, 2),
                1 => (0, 2),
                _ => (0, 1),
            };
            cell_vertices.swap(o1, o2);
        }

        let mut tet = Tetrahedron {
            vertices: cell_vertices,
            neighbors: [None; 4],
            region: inherited.0,
            max_volume: inherited.1,
            constrained: 0,
            exterior: inherited.2,
            epoch: 0,
        };
        let p_slot = tet
            .slot_of(vkey)
            .unwrap_or_else(|| unreachable!("new cell contains the new vertex"));
        // The face opposite the new vertex is the boundary face: it keeps
        // the constraint mark of the outside cell.
        tet.set_face_constrained(
            p_slot,
            mesh.tet(bf.outside).is_face_constrained(bf.outside_slot),
        );
        let new = mesh.add_tet(tet);
        mesh.bond(new, p_slot, bf.outside, bf.outside_slot);

        // Faces containing the new vertex pair up along boundary edges.
        for slot in 0..4 {
            if slot == p_slot {
                continue;
            }
            let mut key: SmallBuffer<Option<VertexKey>, 3> = SmallBuffer::new();
            for (i, v) in mesh.tet(new).vertices.iter().enumerate() {
                if i != slot && *v != Some(vkey) {
                    key.push(*v);
                }
            }
            let mut key: [Option<VertexKey>; 2] = [key[0], key[1]];
            key.sort_unstable();
            if let Some((other, other_slot)) = edge_map.remove(&key) {
                mesh.bond(new, slot, other, other_slot);
            } else {
                edge_map.insert(key, (new, slot));
            }
        }
        created.push(new);
    }

    // Sub-faces of a split constrained facet get re-marked on both sides.
    if !crossed_constrained.is_empty() {
        for &new in &created {
            let p_slot = mesh
                .tet(new)
                .slot_of(vkey)
                .unwrap_or_else(|| unreachable!("new cell contains the new vertex"));
            for slot in 0..4 {
                if slot == p_slot {
                    continue;
                }
                let face = mesh.tet(new).face(slot);
                let mut others: SmallBuffer<VertexKey, 2> = face
                    .iter()
                    .flatten()
                    .filter(|&&v| v != vkey)
                    .copied()
                    .collect();
                if others.len() != 2 {
                    continue;
                }
                others.sort_unstable();
                if crossed_constrained.contains(&(others[0], others[1])) {
                    mesh.tet_mut(new).set_face_constrained(slot, true);
                    if let Some(n) = mesh.neighbor(new, slot) {
                        if let Some(back) = mesh.tet(n).neighbor_slot(new) {
                            mesh.tet_mut(n).set_face_constrained(back, true);
                        }
                    }
                }
            }
        }
    }

    for &t in &cavity {
        mesh.remove_tet(t);
    }
    mesh.hint = created.last().copied();

    Ok(InsertionInfo {
        cavity_size: cavity.len(),
        created,
    })
}

/// Bounded breadth-first search for a conflicting cell around `seed`.
///
/// A point located on an edge can have its perturbed conflict anywhere in
/// the edge ring, so a couple of adjacency levels are searched.
fn find_conflict_near(mesh: &TetMesh, seed: TetKey, p: &Point, p_index: usize) -> Option<TetKey> {
    let mut frontier: SmallBuffer<TetKey, 16> = SmallBuffer::new();
    let mut seen: FastHashSet<TetKey> = FastHashSet::default();
    frontier.push(seed);
    seen.insert(seed);
    for _depth in 0..3 {
        let mut next: SmallBuffer<TetKey, 16> = SmallBuffer::new();
        for &t in &frontier {
            for face in 0..4 {
                let Some(n) = mesh.neighbor(t, face) else {
                    continue;
                };
                if !seen.insert(n) {
                    continue;
                }
                if conflicts(mesh, n, p, p_index) {
                    return Some(n);
                }
                next.push(n);
            }
        }
        frontier = next;
    }
    None
}

/// `true` when the finite face `(tet, face)` is exactly coplanar with `p`.
fn face_coplanar_with(mesh: &TetMesh, tet: TetKey, face: usize, p: &Point) -> bool {
    let [a, b, c] = mesh.tet(tet).face(face);
    let (Some(a), Some(b), Some(c)) = (a, b, c) else {
        return false;
    };
    orient3d(mesh.point(a), mesh.point(b), mesh.point(c), p) == Orientation::DEGENERATE
}

/// Records the three (sorted) edges of a face for later constraint
/// re-marking.
fn record_face_edges(
    mesh: &TetMesh,
    tet: TetKey,
    face: usize,
    edges: &mut FastHashSet<(VertexKey, VertexKey)>,
) {
    let verts: SmallBuffer<VertexKey, 3> =
        mesh.tet(tet).face(face).iter().flatten().copied().collect();
    if verts.len() != 3 {
        return;
    }
    for (i, j) in [(0, 1), (0, 2), (1, 2)] {
        let (u, v) = (verts[i].min(verts[j]), verts[i].max(verts[j]));
        edges.insert((u, v));
    }
}

/// Would the star cell over the face `(outside, slot)` be flat or inverted?
///
/// Only finite faces can produce a flat cell; faces through the infinite
/// apex always star cleanly.
fn boundary_face_degenerate(mesh: &TetMesh, outside: TetKey, slot: usize, p: &Point) -> bool {
    let [w0, w1, w2] = mesh.tet(outside).face(slot);
    let (Some(w0), Some(w1), Some(w2)) = (w0, w1, w2) else {
        return false;
    };
    // Face order as seen from outside has the outside corner positive; the
    // new point must be strictly on the other side.
    orient3d(mesh.point(w0), mesh.point(w1), mesh.point(w2), p) != Orientation::NEGATIVE
}

/// Locates and inserts the stored vertex `vkey`.
///
/// # Errors
///
/// [`InsertionError::Coincident`] when the point coincides with an existing
/// vertex; location and cavity errors otherwise.
pub fn insert_vertex(mesh: &mut TetMesh, vkey: VertexKey) -> Result<InsertionInfo, InsertionError> {
    let p = *mesh.point(vkey);
    let hint = mesh.hint;
    let seed = match locate(mesh, &p, hint)? {
        LocateResult::OnVertex(_, existing) => {
            return Err(InsertionError::Coincident {
                existing: mesh.vertex(existing).index(),
                inserted: mesh.vertex(vkey).index(),
            });
        }
        LocateResult::InsideTet(t)
        | LocateResult::OnFace(t, _)
        | LocateResult::OnEdge(t)
        | LocateResult::OutsideHull(t) => t,
    };
    insert_in_cavity(mesh, vkey, seed, false)
}

// =============================================================================
// Bootstrap and bulk construction
// =============================================================================

/// Finds four affinely independent vertices, creates the first positively
/// oriented tetrahedron, and closes the hull with four ghosts.
///
/// Coincident points are skipped by the search itself; they surface later,
/// during insertion, as [`InsertionError::Coincident`].
///
/// # Errors
///
/// [`TriangulateError::Degenerate`] when every choice of four points is
/// coplanar.
pub fn bootstrap(mesh: &mut TetMesh, keys: &[VertexKey]) -> Result<[VertexKey; 4], TriangulateError> {
    let first = *keys.first().ok_or(TriangulateError::Degenerate)?;
    let a = first;

    // b: first point distinct from a.
    let b = *keys[1..]
        .iter()
        .find(|&&k| mesh.point(k) != mesh.point(a))
        .ok_or(TriangulateError::Degenerate)?;

    // c: first point not collinear with (a, b); collinearity holds exactly
    // when all three axis-aligned projections are degenerate.
    let collinear = |mesh: &TetMesh, a: VertexKey, b: VertexKey, c: VertexKey| {
        (0..3).all(|axis| {
            orient2d(
                project_away(mesh.point(a), axis),
                project_away(mesh.point(b), axis),
                project_away(mesh.point(c), axis),
            ) == Orientation::DEGENERATE
        })
    };
    let c = *keys
        .iter()
        .find(|&&k| k != a && k != b && !collinear(mesh, a, b, k))
        .ok_or(TriangulateError::Degenerate)?;

    // d: first point off the (a, b, c) plane; swap two base vertices when
    // the orientation comes out negative.
    let mut base = [a, b, c];
    let d = *keys
        .iter()
        .find(|&&k| {
            k != a
                && k != b
                && k != c
                && orient3d(
                    mesh.point(a),
                    mesh.point(b),
                    mesh.point(c),
                    mesh.point(k),
                ) != Orientation::DEGENERATE
        })
        .ok_or(TriangulateError::Degenerate)?;
    if orient3d(
        mesh.point(base[0]),
        mesh.point(base[1]),
        mesh.point(base[2]),
        mesh.point(d),
    ) == Orientation::NEGATIVE
    {
        base.swap(1, 2);
    }

    let t0 = mesh.add_tet(Tetrahedron::new(base[0], base[1], base[2], d));
    debug!(
        "bootstrap tetrahedron from input vertices {:?}",
        [base[0], base[1], base[2], d]
            .map(|k| mesh.vertex(k).index())
    );

    // Ghost shell: one ghost per face, finite face reversed to face outward.
    let mut ghost_faces: FastHashMap<[Option<VertexKey>; 3], (TetKey, usize)> =
        FastHashMap::default();
    for face in 0..4 {
        let [f0, f1, f2] = mesh.tet(t0).face(face);
        let (Some(f0), Some(f1), Some(f2)) = (f0, f1, f2) else {
            unreachable!("bootstrap cell is finite");
        };
        let ghost = mesh.add_tet(Tetrahedron::ghost(f0, f2, f1));
        mesh.bond(t0, face, ghost, GHOST_APEX);
        for slot in 0..GHOST_APEX {
            let mut key = mesh.tet(ghost).face(slot);
            key.sort_unstable();
            if let Some((other, other_slot)) = ghost_faces.remove(&key) {
                mesh.bond(ghost, slot, other, other_slot);
            } else {
                ghost_faces.insert(key, (ghost, slot));
            }
        }
    }
    mesh.hint = Some(t0);
    Ok([base[0], base[1], base[2], d])
}

/// Builds the Delaunay tetrahedralization of all `keys` already stored in
/// `mesh`, inserting in BRIO order and checking `interrupt` before each
/// insertion.
///
/// # Errors
///
/// Degenerate input, coincident vertices, insertion failures, and
/// cancellation, as [`TriangulateError`].
pub fn triangulate(
    mesh: &mut TetMesh,
    keys: &[VertexKey],
    interrupt: &AtomicBool,
) -> Result<(), TriangulateError> {
    let seeded = bootstrap(mesh, keys)?;

    let mut remaining: Vec<VertexKey> = keys
        .iter()
        .copied()
        .filter(|k| !seeded.contains(k))
        .collect();
    let point_of = {
        // BRIO sorts by coordinates only; capture them up front.
        let coords: FastHashMap<VertexKey, Point> = remaining
            .iter()
            .map(|&k| (k, *mesh.point(k)))
            .collect();
        move |k: &VertexKey| coords[k]
    };
    brio_order(&mut remaining, point_of, 0x5eed_7e7);

    debug!(
        "bulk triangulation: {} vertices after bootstrap",
        remaining.len()
    );
    for key in remaining {
        if interrupt.load(AtomicOrdering::Relaxed) {
            return Err(TriangulateError::Cancelled);
        }
        match insert_vertex(mesh, key) {
            Ok(_) => {}
            Err(InsertionError::Coincident { existing, inserted }) => {
                return Err(TriangulateError::Coincident {
                    first: existing,
                    second: inserted,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::Vertex;

    fn mesh_with_points(coords: &[[f64; 3]]) -> (TetMesh, Vec<VertexKey>) {
        let mut mesh = TetMesh::new();
        let keys = coords
            .iter()
            .enumerate()
            .map(|(i, c)| mesh.add_vertex(Vertex::input(Point::new(*c), i)))
            .collect();
        (mesh, keys)
    }

    fn not_interrupted() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn bootstrap_creates_ghost_shell() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        bootstrap(&mut mesh, &keys).unwrap();
        assert_eq!(mesh.number_of_finite_tets(), 1);
        assert_eq!(mesh.number_of_tets(), 5);
        mesh.is_valid().expect("bootstrap invariants");
        // Every face of every cell is bonded: the neighbor graph is closed.
        for (_, tet) in mesh.tets() {
            assert!(tet.neighbors.iter().all(Option::is_some));
        }
    }

    #[test]
    fn bootstrap_skips_coplanar_prefix() {
        // First four points coplanar; the fifth rescues the bootstrap.
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.5, 0.5, 2.0],
        ]);
        let chosen = bootstrap(&mut mesh, &keys).unwrap();
        assert!(chosen.contains(&keys[4]));
        mesh.is_valid().expect("bootstrap invariants");
    }

    #[test]
    fn fully_coplanar_input_is_degenerate() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [2.0, 3.0, 0.0],
        ]);
        assert!(matches!(
            bootstrap(&mut mesh, &keys),
            Err(TriangulateError::Degenerate)
        ));
    }

    #[test]
    fn edge_ring_closes_through_ghosts() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        bootstrap(&mut mesh, &keys).unwrap();
        // An edge of the only finite cell: its ring is that cell plus the
        // two ghosts over the faces meeting at the edge.
        let ring = mesh.edge_ring(keys[0], keys[1]).expect("edge exists");
        assert_eq!(ring.len(), 3);
        let finite = ring.iter().filter(|&&t| !mesh.tet(t).is_ghost()).count();
        assert_eq!(finite, 1);
    }

    #[test]
    fn insert_interior_point() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 2.0],
            [0.3, 0.3, 0.3],
        ]);
        bootstrap(&mut mesh, &keys[..4]).unwrap();
        let info = insert_vertex(&mut mesh, keys[4]).unwrap();
        assert!(info.cavity_size >= 1);
        assert_eq!(mesh.number_of_finite_tets(), 4);
        mesh.is_valid().expect("structure after interior insertion");
        mesh.validate_delaunay().expect("Delaunay after insertion");
    }

    #[test]
    fn insert_exterior_point_grows_hull() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [2.0, 2.0, 2.0],
        ]);
        bootstrap(&mut mesh, &keys[..4]).unwrap();
        insert_vertex(&mut mesh, keys[4]).unwrap();
        mesh.is_valid().expect("structure after hull growth");
        mesh.validate_delaunay().expect("Delaunay after hull growth");
        // The new vertex is on the hull now.
        let hull_vertices: FastHashSet<VertexKey> = mesh
            .tets()
            .filter(|(_, t)| t.is_ghost())
            .flat_map(|(_, t)| t.hull_face().into_iter().flatten())
            .collect();
        assert!(hull_vertices.contains(&keys[4]));
    }

    #[test]
    fn duplicate_point_is_rejected() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
        ]);
        bootstrap(&mut mesh, &keys[..4]).unwrap();
        let result = insert_vertex(&mut mesh, keys[4]);
        assert!(matches!(
            result,
            Err(InsertionError::Coincident {
                existing: 1,
                inserted: 4
            })
        ));
    }

    #[test]
    fn triangulate_grid() {
        let mut coords = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    coords.push([f64::from(x), f64::from(y), f64::from(z)]);
                }
            }
        }
        let (mut mesh, keys) = mesh_with_points(&coords);
        triangulate(&mut mesh, &keys, &not_interrupted()).unwrap();
        assert_eq!(mesh.number_of_vertices(), 27);
        mesh.is_valid().expect("grid structure");
        mesh.validate_delaunay().expect("grid Delaunay");
    }

    #[test]
    fn triangulate_respects_interrupt() {
        let (mut mesh, keys) = mesh_with_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.2, 0.2, 0.2],
        ]);
        let cancelled = AtomicBool::new(true);
        assert!(matches!(
            triangulate(&mut mesh, &keys, &cancelled),
            Err(TriangulateError::Cancelled)
        ));
    }

    #[test]
    fn cospherical_octahedron_is_deterministic() {
        let octahedron = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ];
        let run = || {
            let (mut mesh, keys) = mesh_with_points(&octahedron);
            triangulate(&mut mesh, &keys, &not_interrupted()).unwrap();
            mesh.is_valid().expect("octahedron structure");
            let mut cells: Vec<Vec<usize>> = mesh
                .finite_tets()
                .map(|(_, t)| {
                    let mut c: Vec<usize> = t
                        .vertices
                        .iter()
                        .flatten()
                        .map(|&v| mesh.vertex(v).index())
                        .collect();
                    c.sort_unstable();
                    c
                })
                .collect();
            cells.sort();
            cells
        };
        let first = run();
        let second = run();
        assert_eq!(first, second, "reruns must be bit-identical");
        assert_eq!(first.len(), 4, "octahedron splits into 4 tetrahedra");
    }
}
