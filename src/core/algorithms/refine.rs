//! Quality-driven Delaunay refinement.
//!
//! A tetrahedron is *bad* when its circumradius-to-shortest-edge ratio
//! exceeds the behavior's bound, or its volume exceeds the applicable
//! (global or per-region) bound. Bad cells are processed worst-first from a
//! priority queue; each is attacked by inserting its circumcenter, unless
//! the circumcenter *encroaches* a protected boundary feature, in which case
//! the feature is split instead, segments before facets. Splitting keeps
//! Steiner points off the protection spheres of the PLC, which is what lets
//! refinement terminate for ratio bounds above `sqrt(2)`; below that, the
//! step limit is the backstop.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use log::debug;
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::core::behavior::Behavior;
use crate::core::collections::FastHashSet;
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::TetKey;
use crate::core::vertex::{Vertex, VertexKey, VertexKind};
use crate::geometry::point::Point;
use crate::geometry::primitives::{
    encroaches_segment, encroaches_triangle, circumsphere, radius_edge_ratio,
    triangle_circumcircle, volume,
};

use super::bowyer_watson::{insert_in_cavity, InsertionError};
use super::locate::{locate, LocateError, LocateResult};
use super::recovery::{PlcContext, RecoveryError};

/// Errors raised by the refinement loop.
#[derive(Debug, Error)]
pub enum RefineError {
    /// The step limit ran out with bad tetrahedra remaining.
    #[error("refinement exceeded its step limit of {limit}")]
    StepLimit {
        /// The exhausted limit.
        limit: usize,
    },

    /// The caller's interrupt flag was raised.
    #[error("refinement cancelled by caller")]
    Cancelled,

    /// An insertion failed.
    #[error(transparent)]
    Insertion(#[from] InsertionError),

    /// A protected-segment split failed.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Point location failed.
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// What refinement did.
#[derive(Debug, Clone, Default)]
pub struct RefineOutcome {
    /// Insertion steps taken.
    pub steps: usize,
    /// Bad tetrahedra abandoned because their circumcenter was unreachable
    /// (typically wedged against an acute input angle).
    pub skipped: usize,
}

/// The badness score of a cell: how far past its bounds it is.
///
/// `> 1` means bad; the queue pops the worst score first.
fn badness(mesh: &TetMesh, tet: TetKey, behavior: &Behavior) -> Option<f64> {
    if !mesh.contains_tet(tet) {
        return None;
    }
    let t = mesh.tet(tet);
    if t.is_ghost() || t.exterior {
        return None;
    }
    let [a, b, c, d] = mesh.tet_points(tet)?;
    let mut score = 0.0_f64;
    if behavior.quality {
        score = score.max(radius_edge_ratio(&a, &b, &c, &d) / behavior.min_ratio);
    }
    if let Some(bound) = behavior.volume_bound(t.max_volume) {
        if bound > 0.0 {
            score = score.max(volume(&a, &b, &c, &d) / bound);
        }
    }
    (score > 1.0 + 1e-12).then_some(score)
}

/// Splits every subsegment encroached by an existing mesh vertex, making
/// the mesh conforming Delaunay (`-D`).
///
/// # Errors
///
/// Budget exhaustion and insertion failures, as [`RecoveryError`].
pub fn enforce_conforming(
    mesh: &mut TetMesh,
    ctx: &mut PlcContext,
    interrupt: &AtomicBool,
) -> Result<(), RefineError> {
    loop {
        if interrupt.load(AtomicOrdering::Relaxed) {
            return Err(RefineError::Cancelled);
        }
        let mut split_target = None;
        'outer: for (chain_idx, chain) in ctx.segments.iter().enumerate() {
            for (a, b) in chain.subsegments() {
                let (pa, pb) = (*mesh.point(a), *mesh.point(b));
                for (_, vertex) in mesh.vertices() {
                    if vertex.incident().is_none() {
                        continue;
                    }
                    let p = vertex.point();
                    if *p == pa || *p == pb {
                        continue;
                    }
                    if encroaches_segment(p, &pa, &pb) {
                        split_target = Some((chain_idx, a, b));
                        break 'outer;
                    }
                }
            }
        }
        let Some((chain_idx, a, b)) = split_target else {
            return Ok(());
        };
        ctx.split_subsegment(mesh, chain_idx, a, b)?;
    }
}

/// The constrained face whose diametral ball strictly contains `p`, if any.
fn encroached_subfacet(mesh: &TetMesh, p: &Point) -> Option<(VertexKey, VertexKey, VertexKey)> {
    for (_, tet) in mesh.tets() {
        if tet.is_ghost() {
            continue;
        }
        for face in 0..4 {
            if !tet.is_face_constrained(face) {
                continue;
            }
            let corners = tet.face(face);
            let [Some(a), Some(b), Some(c)] = corners else {
                continue;
            };
            let (pa, pb, pc) = (mesh.point(a), mesh.point(b), mesh.point(c));
            if p == pa || p == pb || p == pc {
                continue;
            }
            if encroaches_triangle(p, pa, pb, pc) {
                return Some((a, b, c));
            }
        }
    }
    None
}

/// Runs the refinement loop until no bad tetrahedra remain.
///
/// Returns the steps taken and the number of abandoned cells. The interrupt
/// flag is checked at the top of every iteration.
///
/// # Errors
///
/// [`RefineError::StepLimit`] when the loop does not converge within
/// `behavior.refine_step_limit`; insertion, split, and cancellation errors
/// otherwise.
#[allow(clippy::too_many_lines)]
pub fn refine(
    mesh: &mut TetMesh,
    ctx: &mut PlcContext,
    behavior: &Behavior,
    interrupt: &AtomicBool,
) -> Result<RefineOutcome, RefineError> {
    let mut queue: BinaryHeap<(OrderedFloat<f64>, TetKey)> = BinaryHeap::new();
    let initial: Vec<TetKey> = mesh.tets().map(|(k, _)| k).collect();
    for t in initial {
        if let Some(score) = badness(mesh, t, behavior) {
            queue.push((OrderedFloat(score), t));
        }
    }
    debug!("refinement starts with {} bad tetrahedra", queue.len());

    let mut outcome = RefineOutcome::default();
    let mut abandoned: FastHashSet<TetKey> = FastHashSet::default();

    while let Some((_, tet)) = queue.pop() {
        if interrupt.load(AtomicOrdering::Relaxed) {
            return Err(RefineError::Cancelled);
        }
        // Stale or repaired entries fall out here.
        if badness(mesh, tet, behavior).is_none() || abandoned.contains(&tet) {
            continue;
        }
        outcome.steps += 1;
        if outcome.steps > behavior.refine_step_limit {
            return Err(RefineError::StepLimit {
                limit: behavior.refine_step_limit,
            });
        }

        let [a, b, c, d] = mesh
            .tet_points(tet)
            .unwrap_or_else(|| unreachable!("badness filtered ghosts"));
        let (center, _) = circumsphere(&a, &b, &c, &d);
        if !center.is_finite() {
            abandoned.insert(tet);
            outcome.skipped += 1;
            continue;
        }

        // Encroachment: segments outrank facets, both outrank the volume.
        let created = if let Some((chain_idx, sa, sb)) = ctx.encroached_subsegment(mesh, &center)
        {
            if behavior.no_bisect {
                abandoned.insert(tet);
                outcome.skipped += 1;
                continue;
            }
            match ctx.split_subsegment(mesh, chain_idx, sa, sb) {
                Ok(mid) => {
                    let info = mesh.incident_tets(mid);
                    queue.push((OrderedFloat(f64::INFINITY), tet));
                    info
                }
                Err(RecoveryError::UnsplittableSegment { .. }) => {
                    abandoned.insert(tet);
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        } else if let Some((fa, fb, fc)) = encroached_subfacet(mesh, &center) {
            let (pa, pb, pc) = (*mesh.point(fa), *mesh.point(fb), *mesh.point(fc));
            let (fcenter, _) = triangle_circumcircle(&pa, &pb, &pc);
            let steiner = if fcenter.is_finite() {
                fcenter
            } else {
                Point::centroid(&[pa, pb, pc])
            };
            // A facet split that would itself encroach a segment defers to
            // the segment.
            if let Some((chain_idx, sa, sb)) = ctx.encroached_subsegment(mesh, &steiner) {
                if behavior.no_bisect {
                    abandoned.insert(tet);
                    outcome.skipped += 1;
                    continue;
                }
                match ctx.split_subsegment(mesh, chain_idx, sa, sb) {
                    Ok(mid) => {
                        let info = mesh.incident_tets(mid);
                        queue.push((OrderedFloat(f64::INFINITY), tet));
                        info
                    }
                    Err(RecoveryError::UnsplittableSegment { .. }) => {
                        abandoned.insert(tet);
                        outcome.skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                match insert_steiner(mesh, steiner, VertexKind::SteinerFacet) {
                    SteinerResult::Created(created) => {
                        queue.push((OrderedFloat(f64::INFINITY), tet));
                        created
                    }
                    SteinerResult::Unplaceable => {
                        abandoned.insert(tet);
                        outcome.skipped += 1;
                        continue;
                    }
                    SteinerResult::Failed(e) => return Err(e),
                }
            }
        } else {
            match insert_steiner(mesh, center, VertexKind::SteinerVolume) {
                SteinerResult::Created(created) => created,
                SteinerResult::Unplaceable => {
                    // Circumcenter out of reach (outside the hull or in an
                    // exterior pocket): the centroid still makes progress
                    // on volume bounds without growing the domain.
                    let centroid = Point::centroid(&[a, b, c, d]);
                    match insert_steiner(mesh, centroid, VertexKind::SteinerVolume) {
                        SteinerResult::Created(created) => created,
                        SteinerResult::Unplaceable => {
                            abandoned.insert(tet);
                            outcome.skipped += 1;
                            continue;
                        }
                        SteinerResult::Failed(e) => return Err(e),
                    }
                }
                SteinerResult::Failed(e) => return Err(e),
            }
        };

        for t in created {
            if let Some(score) = badness(mesh, t, behavior) {
                queue.push((OrderedFloat(score), t));
            }
        }
    }

    debug!(
        "refinement finished after {} steps, {} cells abandoned",
        outcome.steps, outcome.skipped
    );
    Ok(outcome)
}

enum SteinerResult {
    Created(Vec<TetKey>),
    Unplaceable,
    Failed(RefineError),
}

/// Inserts a refinement Steiner point, respecting constrained faces.
///
/// Points that land outside the domain (beyond the hull, in an exterior
/// pocket, or on an existing vertex) are unplaceable, not errors: the bad
/// cell that produced them is reported as skipped instead.
fn insert_steiner(mesh: &mut TetMesh, point: Point, kind: VertexKind) -> SteinerResult {
    let seed = match locate(mesh, &point, mesh.hint) {
        Ok(LocateResult::InsideTet(t) | LocateResult::OnFace(t, _) | LocateResult::OnEdge(t)) => {
            if mesh.tet(t).exterior {
                return SteinerResult::Unplaceable;
            }
            t
        }
        Ok(LocateResult::OutsideHull(_) | LocateResult::OnVertex(_, _)) => {
            return SteinerResult::Unplaceable;
        }
        Err(e) => return SteinerResult::Failed(e.into()),
    };
    let index = mesh.fresh_index();
    let vkey = mesh.add_vertex(Vertex::new(point, index, 0, kind));
    match insert_in_cavity(mesh, vkey, seed, true) {
        Ok(info) => SteinerResult::Created(info.created),
        Err(InsertionError::Coincident { .. }) => SteinerResult::Unplaceable,
        Err(e) => SteinerResult::Failed(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::bowyer_watson::triangulate;
    use crate::core::behavior::BehaviorBuilder;

    fn tet_mesh_from(coords: &[[f64; 3]]) -> (TetMesh, Vec<VertexKey>) {
        let mut mesh = TetMesh::new();
        let keys: Vec<VertexKey> = coords
            .iter()
            .enumerate()
            .map(|(i, c)| mesh.add_vertex(Vertex::input(Point::new(*c), i)))
            .collect();
        triangulate(&mut mesh, &keys, &AtomicBool::new(false)).unwrap();
        (mesh, keys)
    }

    #[test]
    fn good_mesh_needs_no_steps() {
        // A regular tetrahedron is as good as it gets: ratio ~0.612.
        let h = (2.0_f64 / 3.0).sqrt();
        let (mut mesh, _) = tet_mesh_from(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.5, 3.0_f64.sqrt() / 2.0, 0.0],
            [0.5, 3.0_f64.sqrt() / 6.0, h],
        ]);
        let behavior = BehaviorBuilder::default()
            .quality(true)
            .build()
            .unwrap();
        let mut ctx = PlcContext::default();
        let outcome = refine(&mut mesh, &mut ctx, &behavior, &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.steps, 0);
        assert_eq!(mesh.number_of_vertices(), 4);
    }

    #[test]
    fn volume_bound_drives_insertion() {
        let (mut mesh, _) = tet_mesh_from(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let behavior = BehaviorBuilder::default()
            .var_volume(true)
            .max_volume(Some(0.02))
            .build()
            .unwrap();
        let mut ctx = PlcContext::default();
        let outcome = refine(&mut mesh, &mut ctx, &behavior, &AtomicBool::new(false)).unwrap();
        assert!(outcome.steps > 0, "volume bound must force splits");
        for (k, _) in mesh.finite_tets().collect::<Vec<_>>() {
            let [a, b, c, d] = mesh.tet_points(k).unwrap();
            assert!(volume(&a, &b, &c, &d) <= 0.02 + 1e-9);
        }
        mesh.is_valid().unwrap();
    }

    #[test]
    fn refinement_is_interruptible() {
        let (mut mesh, _) = tet_mesh_from(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let behavior = BehaviorBuilder::default()
            .var_volume(true)
            .max_volume(Some(1e-6))
            .build()
            .unwrap();
        let mut ctx = PlcContext::default();
        let flag = AtomicBool::new(true);
        assert!(matches!(
            refine(&mut mesh, &mut ctx, &behavior, &flag),
            Err(RefineError::Cancelled)
        ));
    }

    #[test]
    fn step_limit_is_enforced() {
        let (mut mesh, _) = tet_mesh_from(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let behavior = BehaviorBuilder::default()
            .var_volume(true)
            .max_volume(Some(1e-9))
            .refine_step_limit(5_usize)
            .build()
            .unwrap();
        let mut ctx = PlcContext::default();
        assert!(matches!(
            refine(&mut mesh, &mut ctx, &behavior, &AtomicBool::new(false)),
            Err(RefineError::StepLimit { limit: 5 })
        ));
    }
}
