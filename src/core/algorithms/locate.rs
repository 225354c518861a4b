//! Walk-based point location.
//!
//! The walk starts from a recently touched tetrahedron and repeatedly crosses
//! the first face whose orientation test puts the query point on the far
//! side. The smallest-face-index tie-break is deterministic and, together
//! with exact predicates, keeps degenerate walks from cycling. Ghost
//! tetrahedra close the neighbor graph, so a walk that leaves the convex
//! hull terminates in the ghost layer instead of falling off the mesh.

use thiserror::Error;

use crate::core::collections::FastHashSet;
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::{TetKey, FACE_VERTICES};
use crate::core::vertex::VertexKey;
use crate::geometry::point::Point;
use crate::geometry::predicates::{orient3d, Orientation};

/// Safety cap on walk length; exceeded only on corrupted topology.
const MAX_STEPS: usize = 1_000_000;

/// Where a query point landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateResult {
    /// Strictly inside a finite tetrahedron.
    InsideTet(TetKey),
    /// On the interior of face `face` of the tetrahedron.
    OnFace(TetKey, usize),
    /// On the interior of an edge of the tetrahedron.
    OnEdge(TetKey),
    /// Coincident with an existing vertex.
    OnVertex(TetKey, VertexKey),
    /// Outside the convex hull, in the region of the given ghost.
    OutsideHull(TetKey),
}

/// Errors during point location.
#[derive(Debug, Error)]
pub enum LocateError {
    /// The mesh has no tetrahedra to walk through.
    #[error("cannot locate a point in an empty triangulation")]
    EmptyTriangulation,

    /// The walk revisited a tetrahedron or exceeded the step cap.
    #[error("point location cycled after {steps} steps")]
    CycleDetected {
        /// Steps taken before the cycle was detected.
        steps: usize,
    },
}

/// Locates `point` in the triangulation, walking from `hint` when given.
///
/// # Errors
///
/// Returns [`LocateError::EmptyTriangulation`] when the mesh has no cells and
/// [`LocateError::CycleDetected`] when the walk revisits a cell; with exact
/// predicates the latter indicates corrupted topology.
pub fn locate(
    mesh: &TetMesh,
    point: &Point,
    hint: Option<TetKey>,
) -> Result<LocateResult, LocateError> {
    let mut current = hint
        .filter(|k| mesh.contains_tet(*k))
        .or_else(|| mesh.finite_tets().next().map(|(k, _)| k))
        .ok_or(LocateError::EmptyTriangulation)?;

    // If the hint is a ghost, step into its finite neighbor first.
    if mesh.tet(current).is_ghost() {
        match mesh.neighbor(current, crate::core::tetrahedron::GHOST_APEX) {
            Some(inner) if !mesh.tet(inner).is_ghost() => current = inner,
            _ => {
                current = mesh
                    .finite_tets()
                    .next()
                    .map(|(k, _)| k)
                    .ok_or(LocateError::EmptyTriangulation)?;
            }
        }
    }

    let mut visited = FastHashSet::default();
    for step in 0..MAX_STEPS {
        if !visited.insert(current) {
            return Err(LocateError::CycleDetected { steps: step });
        }

        if mesh.tet(current).is_ghost() {
            return Ok(LocateResult::OutsideHull(current));
        }

        let tet = mesh.tet(current);
        let mut signs = [Orientation::POSITIVE; 4];
        let mut crossed = false;
        for face in 0..4 {
            let [a, b, c] = FACE_VERTICES[face];
            let (Some(va), Some(vb), Some(vc)) =
                (tet.vertices[a], tet.vertices[b], tet.vertices[c])
            else {
                continue;
            };
            signs[face] = orient3d(mesh.point(va), mesh.point(vb), mesh.point(vc), point);
            if signs[face] == Orientation::NEGATIVE {
                // Cross the first negative face (smallest index).
                if let Some(next) = tet.neighbors[face] {
                    current = next;
                    crossed = true;
                    break;
                }
                // An unbonded face can only appear after exterior removal;
                // walking is not used in that phase.
                return Err(LocateError::CycleDetected { steps: step });
            }
        }
        if crossed {
            continue;
        }

        // All four signs non-negative: classify by the zero pattern.
        let zeros: Vec<usize> = (0..4)
            .filter(|&f| signs[f] == Orientation::DEGENERATE)
            .collect();
        return Ok(match zeros.len() {
            0 => LocateResult::InsideTet(current),
            1 => LocateResult::OnFace(current, zeros[0]),
            2 => LocateResult::OnEdge(current),
            _ => {
                // On three face planes at once: the point coincides with the
                // corner opposite the single positive face.
                let positive = (0..4)
                    .find(|&f| signs[f] == Orientation::POSITIVE)
                    .unwrap_or(3);
                let vertex = mesh.tet(current).vertices[positive]
                    .unwrap_or_else(|| unreachable!("finite cell has finite corners"));
                LocateResult::OnVertex(current, vertex)
            }
        });
    }

    Err(LocateError::CycleDetected { steps: MAX_STEPS })
}
