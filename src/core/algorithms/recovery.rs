//! PLC constraint recovery: segments, facets, holes, and regions.
//!
//! After the Delaunay tetrahedralization of the input points is built, the
//! PLC's segments and facets may be missing from the mesh. Segment recovery
//! re-creates each missing segment by a 2-to-3 flip when the segment crosses
//! a single face, and otherwise by splitting the longest missing subsegment
//! at its midpoint and recursing. Facet recovery triangulates each facet in
//! its plane and drives every sub-triangle into the mesh, splitting with
//! on-facet Steiner points where the mesh disagrees. Finally, a flood from
//! the ghost layer (and from hole and region seeds) classifies every cell as
//! exterior, hole, or region-interior without crossing recovered facets.
//!
//! Steiner placement respects the protection spheres of segments: a facet
//! Steiner point that would land inside a segment's diametral sphere is
//! replaced by a split of that segment, which is what makes the whole
//! process terminate on well-graded input.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use log::{debug, trace};
use thiserror::Error;

use crate::core::behavior::Behavior;
use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::TetKey;
use crate::core::vertex::{Vertex, VertexKey, VertexKind};
use crate::geometry::point::Point;
use crate::geometry::predicates::{orient2d, orient3d, Orientation};
use crate::geometry::primitives::{
    dominant_axis, encroaches_segment, project_away, triangle_area, triangle_circumcircle,
};
use crate::io::PlcInput;

use super::bowyer_watson::{insert_in_cavity, InsertionError};
use super::locate::{locate, LocateError, LocateResult};

/// Errors raised during constraint recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The Steiner budget ran out before a feature was recovered.
    #[error("steiner budget exhausted while recovering {feature}")]
    BudgetExhausted {
        /// A description of the unrecoverable feature.
        feature: String,
    },

    /// A segment shrank below representable length while splitting.
    #[error("segment between input vertices {first} and {second} cannot be split further")]
    UnsplittableSegment {
        /// First endpoint's input index.
        first: usize,
        /// Second endpoint's input index.
        second: usize,
    },

    /// A hole or region seed landed outside the triangulated domain.
    #[error("{kind} seed at ({x}, {y}, {z}) lies outside the domain")]
    SeedOutsideDomain {
        /// "hole" or "region".
        kind: &'static str,
        /// Seed coordinates.
        x: f64,
        /// Seed coordinates.
        y: f64,
        /// Seed coordinates.
        z: f64,
    },

    /// The caller's interrupt flag was raised.
    #[error("constraint recovery cancelled by caller")]
    Cancelled,

    /// An insertion failed.
    #[error(transparent)]
    Insertion(#[from] InsertionError),

    /// Point location failed.
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// One input segment together with the chain of vertices that subdivide it.
///
/// The chain always starts and ends at the input endpoints and is kept
/// sorted by the parameter along the segment; consecutive pairs are the
/// current *subsegments*.
#[derive(Debug, Clone)]
pub struct SegmentChain {
    /// Vertices along the segment, endpoints included, in order.
    pub chain: Vec<VertexKey>,
    /// Boundary marker inherited from the facet that produced the segment.
    pub marker: i32,
}

impl SegmentChain {
    /// Consecutive vertex pairs: the current subsegments.
    pub fn subsegments(&self) -> impl Iterator<Item = (VertexKey, VertexKey)> + '_ {
        self.chain.windows(2).map(|w| (w[0], w[1]))
    }
}

/// A facet triangle pending recovery, as mesh vertex keys.
type FacetTriangle = [VertexKey; 3];

/// Everything recovery learns about the PLC, used again by refinement and
/// output extraction.
#[derive(Debug, Default)]
pub struct PlcContext {
    /// Input vertex index -> mesh key.
    pub vertex_keys: Vec<VertexKey>,
    /// All PLC segments with their subdivision chains.
    pub segments: Vec<SegmentChain>,
    /// Steiner budget remaining.
    pub steiner_left: usize,
    /// Boundary marker per recovered face (sorted vertex triple).
    pub face_markers: FastHashMap<[VertexKey; 3], i32>,
}

impl PlcContext {
    /// Splits the subsegment `(a, b)` of chain `chain_idx` by inserting the
    /// midpoint into the mesh and the chain.
    ///
    /// Returns the new vertex.
    ///
    /// # Errors
    ///
    /// Budget exhaustion, unsplittable segments, insertion failures.
    pub fn split_subsegment(
        &mut self,
        mesh: &mut TetMesh,
        chain_idx: usize,
        a: VertexKey,
        b: VertexKey,
    ) -> Result<VertexKey, RecoveryError> {
        if self.steiner_left == 0 {
            return Err(RecoveryError::BudgetExhausted {
                feature: "segment".to_string(),
            });
        }
        self.steiner_left -= 1;

        let pa = *mesh.point(a);
        let pb = *mesh.point(b);
        let mid = Point::midpoint(&pa, &pb);
        if mid == pa || mid == pb {
            let chain = &self.segments[chain_idx];
            let (first, last) = (chain.chain[0], chain.chain[chain.chain.len() - 1]);
            return Err(RecoveryError::UnsplittableSegment {
                first: mesh.vertex(first).index(),
                second: mesh.vertex(last).index(),
            });
        }

        let marker = self.segments[chain_idx].marker;
        let index = mesh.fresh_index();
        let vkey = mesh.add_vertex(Vertex::new(mid, index, marker, VertexKind::SteinerSegment));

        let seed = match locate(mesh, &mid, mesh.hint)? {
            LocateResult::OnVertex(_, existing) => {
                return Err(RecoveryError::Insertion(InsertionError::Coincident {
                    existing: mesh.vertex(existing).index(),
                    inserted: index,
                }));
            }
            LocateResult::InsideTet(t)
            | LocateResult::OnFace(t, _)
            | LocateResult::OnEdge(t)
            | LocateResult::OutsideHull(t) => t,
        };
        insert_in_cavity(mesh, vkey, seed, true)?;

        let chain = &mut self.segments[chain_idx].chain;
        let pos = chain
            .iter()
            .position(|&v| v == b)
            .unwrap_or_else(|| unreachable!("subsegment endpoints come from the chain"));
        chain.insert(pos, vkey);
        trace!("split subsegment of chain {chain_idx}; {} left in budget", self.steiner_left);
        Ok(vkey)
    }

    /// The subsegment whose diametral sphere strictly contains `p`, if any.
    #[must_use]
    pub fn encroached_subsegment(
        &self,
        mesh: &TetMesh,
        p: &Point,
    ) -> Option<(usize, VertexKey, VertexKey)> {
        for (chain_idx, chain) in self.segments.iter().enumerate() {
            for (a, b) in chain.subsegments() {
                if p == mesh.point(a) || p == mesh.point(b) {
                    continue;
                }
                if encroaches_segment(p, mesh.point(a), mesh.point(b)) {
                    return Some((chain_idx, a, b));
                }
            }
        }
        None
    }
}

// =============================================================================
// Segment recovery
// =============================================================================

/// Builds the segment set of a PLC: the unique edges of its facet polygon
/// loops, each carrying its facet's marker.
#[must_use]
pub fn collect_segments(input: &PlcInput, vertex_keys: &[VertexKey]) -> Vec<SegmentChain> {
    let mut seen: FastHashMap<(VertexKey, VertexKey), usize> = FastHashMap::default();
    let mut segments = Vec::new();
    for (facet_idx, facet) in input.facets.iter().enumerate() {
        let marker = input
            .facet_markers
            .get(facet_idx)
            .copied()
            .unwrap_or_default();
        for polygon in &facet.polygons {
            let n = polygon.vertices.len();
            for i in 0..n {
                let u = vertex_keys[polygon.vertices[i]];
                let v = vertex_keys[polygon.vertices[(i + 1) % n]];
                if u == v {
                    continue;
                }
                let key = (u.min(v), u.max(v));
                if seen.contains_key(&key) {
                    continue;
                }
                seen.insert(key, segments.len());
                segments.push(SegmentChain {
                    chain: vec![u, v],
                    marker,
                });
            }
        }
    }
    segments
}

/// `true` when segment `(u, v)` strictly crosses the interior of the face
/// of `tet` opposite `u`'s slot. The face is ordered with `u` on its
/// positive side, so a strict crossing puts `v` on the negative side of the
/// face plane and of all three wedge planes through `u`.
fn segment_crosses_opposite_face(
    mesh: &TetMesh,
    tet: TetKey,
    u_slot: usize,
    u: VertexKey,
    v: VertexKey,
) -> bool {
    let face = mesh.tet(tet).face(u_slot);
    let [Some(f0), Some(f1), Some(f2)] = face else {
        return false;
    };
    let (pu, pv) = (*mesh.point(u), *mesh.point(v));
    let (a, b, c) = (*mesh.point(f0), *mesh.point(f1), *mesh.point(f2));
    if orient3d(&a, &b, &c, &pv) != Orientation::NEGATIVE {
        return false;
    }
    // Wedge tests around the three directed face edges.
    orient3d(&pu, &a, &b, &pv) == Orientation::NEGATIVE
        && orient3d(&pu, &b, &c, &pv) == Orientation::NEGATIVE
        && orient3d(&pu, &c, &a, &pv) == Orientation::NEGATIVE
}

/// Attempts a 2-to-3 flip creating edge `(u, v)`: succeeds when the segment
/// crosses exactly one face, shared by a tetrahedron at `u` and one at `v`.
fn try_flip_segment(mesh: &mut TetMesh, u: VertexKey, v: VertexKey) -> bool {
    for ta in mesh.incident_tets(u) {
        let Some(u_slot) = mesh.tet(ta).slot_of(u) else {
            continue;
        };
        if !segment_crosses_opposite_face(mesh, ta, u_slot, u, v) {
            continue;
        }
        if mesh.tet(ta).is_face_constrained(u_slot) {
            return false;
        }
        let Some(tb) = mesh.neighbor(ta, u_slot) else {
            continue;
        };
        if !mesh.tet(tb).contains(v) {
            // The segment pierces more than one face; flips alone cannot
            // recover it.
            return false;
        }
        return flip23(mesh, ta, u_slot, tb);
    }
    false
}

/// Replaces the two cells sharing face `(ta, shared_slot)` by three cells
/// around the new edge between the opposite apexes.
///
/// Preconditions: the face is finite and unconstrained, and the segment
/// between the apexes crosses its interior (checked by the caller through
/// [`segment_crosses_opposite_face`]); under those conditions all three new
/// cells are positively oriented.
fn flip23(mesh: &mut TetMesh, ta: TetKey, shared_slot: usize, tb: TetKey) -> bool {
    let apex_a = mesh.tet(ta).vertices[shared_slot];
    let Some(apex_a) = apex_a else {
        return false;
    };
    let [Some(p), Some(q), Some(r)] = mesh.tet(ta).face(shared_slot) else {
        return false;
    };
    let Some(tb_slot) = mesh.tet(tb).neighbor_slot(ta) else {
        return false;
    };
    let Some(apex_b) = mesh.tet(tb).vertices[tb_slot] else {
        return false;
    };

    // External neighbors and constraint marks, captured before removal.
    // For each face corner z: ta's face opposite z (containing the other two
    // corners and apex_a) and tb's face opposite z.
    let capture = |mesh: &TetMesh, t: TetKey, z: VertexKey| -> (Option<(TetKey, usize)>, bool) {
        let tet = mesh.tet(t);
        let Some(slot) = tet.slot_of(z) else {
            return (None, false);
        };
        let outside = tet.neighbors[slot].and_then(|n| {
            mesh.tet(n).neighbor_slot(t).map(|back| (n, back))
        });
        (outside, tet.is_face_constrained(slot))
    };

    let corners = [p, q, r];
    let mut outside_a = [None; 3];
    let mut outside_b = [None; 3];
    let mut constrained_a = [false; 3];
    let mut constrained_b = [false; 3];
    for (i, &z) in corners.iter().enumerate() {
        let (oa, ca) = capture(mesh, ta, z);
        let (ob, cb) = capture(mesh, tb, z);
        outside_a[i] = oa;
        outside_b[i] = ob;
        constrained_a[i] = ca;
        constrained_b[i] = cb;
    }
    let inherited = {
        let t = mesh.tet(ta);
        (t.region, t.max_volume, t.exterior)
    };

    mesh.remove_tet(ta);
    mesh.remove_tet(tb);

    // One new cell per face edge (x, y): (x, y, apex_b, apex_a).
    let mut new_cells = [TetKey::default(); 3];
    for i in 0..3 {
        let x = corners[i];
        let y = corners[(i + 1) % 3];
        let mut tet = crate::core::tetrahedron::Tetrahedron::new(x, y, apex_b, apex_a);
        tet.region = inherited.0;
        tet.max_volume = inherited.1;
        tet.exterior = inherited.2;
        new_cells[i] = mesh.add_tet(tet);
    }
    for i in 0..3 {
        let cell = new_cells[i];
        // Face opposite apex_a (slot 3) belonged to tb, opposite the third
        // corner; face opposite apex_b (slot 2) belonged to ta.
        let third = (i + 2) % 3;
        if let Some((n, back)) = outside_b[third] {
            mesh.bond(cell, 3, n, back);
        }
        if let Some((n, back)) = outside_a[third] {
            mesh.bond(cell, 2, n, back);
        }
        mesh.tet_mut(cell).set_face_constrained(3, constrained_b[third]);
        mesh.tet_mut(cell).set_face_constrained(2, constrained_a[third]);
        // Internal faces: cell i shares the face opposite its slot-0 corner
        // with the previous cell, and opposite slot 1 with the next.
        let next = new_cells[(i + 1) % 3];
        mesh.bond(cell, 0, next, 1);
    }
    mesh.hint = Some(new_cells[0]);
    true
}

/// Recovers every PLC segment as a union of mesh edges.
///
/// # Errors
///
/// Budget exhaustion, unsplittable segments, insertion failures,
/// cancellation.
pub fn recover_segments(
    mesh: &mut TetMesh,
    ctx: &mut PlcContext,
    interrupt: &AtomicBool,
) -> Result<(), RecoveryError> {
    for chain_idx in 0..ctx.segments.len() {
        // Work queue of unrecovered subsegments of this chain.
        let mut work: Vec<(VertexKey, VertexKey)> =
            ctx.segments[chain_idx].subsegments().collect();
        while let Some((a, b)) = work.pop() {
            if interrupt.load(AtomicOrdering::Relaxed) {
                return Err(RecoveryError::Cancelled);
            }
            if mesh.edge_exists(a, b) {
                continue;
            }
            if try_flip_segment(mesh, a, b) {
                debug!("recovered a subsegment of chain {chain_idx} by flipping");
                continue;
            }
            let mid = ctx.split_subsegment(mesh, chain_idx, a, b)?;
            work.push((a, mid));
            work.push((mid, b));
        }
    }
    Ok(())
}

// =============================================================================
// Facet recovery
// =============================================================================

/// Triangulates a polygon loop in its projected plane by ear clipping,
/// falling back to a fan when no ear is found.
fn ear_clip(points: &[[f64; 2]]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    // Work on a counterclockwise copy.
    let mut order: Vec<usize> = (0..n).collect();
    let mut area2 = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area2 += points[i][0].mul_add(points[j][1], -(points[j][0] * points[i][1]));
    }
    if area2 < 0.0 {
        order.reverse();
    }

    let inside = |a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]| {
        orient2d(a, b, p) != Orientation::NEGATIVE
            && orient2d(b, c, p) != Orientation::NEGATIVE
            && orient2d(c, a, p) != Orientation::NEGATIVE
    };

    let mut triangles = Vec::with_capacity(n - 2);
    let mut ring = order;
    'clip: while ring.len() > 3 {
        for i in 0..ring.len() {
            let prev = ring[(i + ring.len() - 1) % ring.len()];
            let curr = ring[i];
            let next = ring[(i + 1) % ring.len()];
            if orient2d(points[prev], points[curr], points[next]) != Orientation::POSITIVE {
                continue;
            }
            let blocked = ring.iter().any(|&k| {
                k != prev
                    && k != curr
                    && k != next
                    && inside(points[prev], points[curr], points[next], points[k])
            });
            if blocked {
                continue;
            }
            triangles.push([prev, curr, next]);
            ring.remove(i);
            continue 'clip;
        }
        // Degenerate ring: fan out what is left rather than looping.
        for i in 1..ring.len() - 1 {
            triangles.push([ring[0], ring[i], ring[i + 1]]);
        }
        return triangles;
    }
    triangles.push([ring[0], ring[1], ring[2]]);
    triangles
}

/// Remembers the boundary marker of a recovered face for output.
fn record_face_marker(ctx: &mut PlcContext, mut face: [VertexKey; 3], marker: i32) {
    face.sort_unstable();
    ctx.face_markers.insert(face, marker);
}

/// Marks the face `(a, b, c)` as constrained on both sides, when present.
fn mark_constrained_face(mesh: &mut TetMesh, a: VertexKey, b: VertexKey, c: VertexKey) -> bool {
    let Some((tet, slot)) = mesh.find_face(a, b, c) else {
        return false;
    };
    mesh.tet_mut(tet).set_face_constrained(slot, true);
    if let Some(n) = mesh.neighbor(tet, slot) {
        if let Some(back) = mesh.tet(n).neighbor_slot(tet) {
            mesh.tet_mut(n).set_face_constrained(back, true);
        }
    }
    true
}

/// Projected point-in-triangle test for facet-hole filtering.
fn triangle_contains_projected(
    a: [f64; 2],
    b: [f64; 2],
    c: [f64; 2],
    p: [f64; 2],
) -> bool {
    let reference = orient2d(a, b, c);
    if reference == Orientation::DEGENERATE {
        return false;
    }
    let same = |o: Orientation| o == reference || o == Orientation::DEGENERATE;
    same(orient2d(a, b, p)) && same(orient2d(b, c, p)) && same(orient2d(c, a, p))
}

/// Even-odd point-in-polygon test in the projected plane. Approximate on
/// purpose: it classifies face centroids for coverage accounting, never for
/// topological decisions.
fn point_in_loop(p: [f64; 2], ring: &[[f64; 2]]) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) * (b[0] - a[0]) / (b[1] - a[1]);
            if p[0] < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// The projected vertex loops of a facet.
struct FacetGeometry {
    axis: usize,
    loops: Vec<Vec<[f64; 2]>>,
    /// Total facet area to cover (loop triangulations minus facet holes).
    target_area: f64,
    /// Facet triangles to force into the mesh, as vertex keys.
    triangles: Vec<FacetTriangle>,
}

/// Triangulates the facet loops and computes the coverage target.
fn facet_geometry(mesh: &TetMesh, ctx: &PlcContext, facet: &crate::io::Facet) -> FacetGeometry {
    let mut geometry = FacetGeometry {
        axis: 2,
        loops: Vec::new(),
        target_area: 0.0,
        triangles: Vec::new(),
    };
    for polygon in &facet.polygons {
        if polygon.vertices.len() < 3 {
            continue;
        }
        let keys: Vec<VertexKey> = polygon
            .vertices
            .iter()
            .map(|&i| ctx.vertex_keys[i])
            .collect();
        let pts: Vec<Point> = keys.iter().map(|&k| *mesh.point(k)).collect();
        let axis = dominant_axis(&pts[0], &pts[1], &pts[2]);
        let projected: Vec<[f64; 2]> = pts.iter().map(|p| project_away(p, axis)).collect();
        let mut triangles = ear_clip(&projected);

        // Facet holes: drop the triangles containing a hole seed.
        if !facet.holes.is_empty() {
            let seeds: Vec<[f64; 2]> = facet
                .holes
                .iter()
                .map(|h| project_away(&Point::new(*h), axis))
                .collect();
            triangles.retain(|t| {
                !seeds.iter().any(|&s| {
                    triangle_contains_projected(
                        projected[t[0]],
                        projected[t[1]],
                        projected[t[2]],
                        s,
                    )
                })
            });
        }

        geometry.axis = axis;
        for t in &triangles {
            geometry.target_area +=
                triangle_area(&pts[t[0]], &pts[t[1]], &pts[t[2]]);
        }
        geometry.loops.push(projected);
        geometry
            .triangles
            .extend(triangles.into_iter().map(|t| [keys[t[0]], keys[t[1]], keys[t[2]]]));
    }
    geometry
}

/// All mesh faces whose corners lie in `vertex_set` and whose centroid
/// falls inside the facet, provided they cover the facet's area exactly.
///
/// This is how a facet already conforming to the mesh, possibly with quad
/// diagonals chosen differently than the reference triangulation, is
/// detected without inserting a single Steiner point.
fn covering_faces(
    mesh: &mut TetMesh,
    vertex_set: &FastHashSet<VertexKey>,
    geometry: &FacetGeometry,
) -> Option<Vec<[VertexKey; 3]>> {
    let mut seen: FastHashSet<[VertexKey; 3]> = FastHashSet::default();
    let mut faces = Vec::new();
    let mut area = 0.0;
    let members: Vec<VertexKey> = vertex_set.iter().copied().collect();
    for v in members {
        for t in mesh.incident_tets(v) {
            for face in 0..4 {
                let corners = mesh.tet(t).face(face);
                let keys: SmallBuffer<VertexKey, 3> =
                    corners.iter().flatten().copied().collect();
                if keys.len() != 3 || !keys.iter().all(|k| vertex_set.contains(k)) {
                    continue;
                }
                let mut id = [keys[0], keys[1], keys[2]];
                id.sort_unstable();
                if !seen.insert(id) {
                    continue;
                }
                let pts = [
                    *mesh.point(keys[0]),
                    *mesh.point(keys[1]),
                    *mesh.point(keys[2]),
                ];
                let centroid = project_away(&Point::centroid(&pts), geometry.axis);
                if !geometry.loops.iter().any(|ring| point_in_loop(centroid, ring)) {
                    continue;
                }
                area += triangle_area(&pts[0], &pts[1], &pts[2]);
                faces.push(id);
            }
        }
    }
    let tolerance = 1e-9 * geometry.target_area.max(1.0);
    ((area - geometry.target_area).abs() <= tolerance).then_some(faces)
}

/// Recovers every facet as a union of constrained mesh faces.
///
/// # Errors
///
/// Budget exhaustion, insertion failures, cancellation.
#[allow(clippy::too_many_lines)]
pub fn recover_facets(
    mesh: &mut TetMesh,
    ctx: &mut PlcContext,
    input: &PlcInput,
    interrupt: &AtomicBool,
) -> Result<(), RecoveryError> {
    for (facet_idx, facet) in input.facets.iter().enumerate() {
        let marker = input
            .facet_markers
            .get(facet_idx)
            .copied()
            .unwrap_or_default();
        let geometry = facet_geometry(mesh, ctx, facet);
        let mut vertex_set: FastHashSet<VertexKey> = geometry
            .triangles
            .iter()
            .flat_map(|t| t.iter().copied())
            .collect();
        let mut pending: Vec<FacetTriangle> = geometry.triangles.clone();

        while let Some([a, b, c]) = pending.pop() {
            if interrupt.load(AtomicOrdering::Relaxed) {
                return Err(RecoveryError::Cancelled);
            }
            if a == b || b == c || a == c {
                continue;
            }
            if mark_constrained_face(mesh, a, b, c) {
                record_face_marker(ctx, [a, b, c], marker);
                continue;
            }

            // The reference triangle is absent, but the mesh may still
            // conform to the facet with a different diagonal choice.
            if let Some(cover) = covering_faces(mesh, &vertex_set, &geometry) {
                for [x, y, z] in cover {
                    mark_constrained_face(mesh, x, y, z);
                    record_face_marker(ctx, [x, y, z], marker);
                }
                pending.clear();
                break;
            }

            if ctx.steiner_left == 0 {
                return Err(RecoveryError::BudgetExhausted {
                    feature: format!("facet {facet_idx}"),
                });
            }

            // The mesh genuinely disagrees: split the sub-triangle. The
            // circumcenter of a skinny sub-triangle is the terminating
            // choice; when it falls outside the triangle (or inside a
            // segment's protection sphere) the centroid or a segment split
            // stands in.
            let (pa, pb, pc) = (*mesh.point(a), *mesh.point(b), *mesh.point(c));
            let (center, _) = triangle_circumcircle(&pa, &pb, &pc);
            let axis = dominant_axis(&pa, &pb, &pc);
            let in_triangle = triangle_contains_projected(
                project_away(&pa, axis),
                project_away(&pb, axis),
                project_away(&pc, axis),
                project_away(&center, axis),
            );
            let steiner = if in_triangle {
                center
            } else {
                Point::centroid(&[pa, pb, pc])
            };

            if let Some((chain_idx, sa, sb)) = ctx.encroached_subsegment(mesh, &steiner) {
                // Protected: split the encroached segment instead and try
                // this triangle again afterwards.
                let mid = ctx.split_subsegment(mesh, chain_idx, sa, sb)?;
                vertex_set.insert(mid);
                pending.push([a, b, c]);
                continue;
            }

            ctx.steiner_left -= 1;
            let index = mesh.fresh_index();
            let vkey =
                mesh.add_vertex(Vertex::new(steiner, index, marker, VertexKind::SteinerFacet));
            let seed = match locate(mesh, &steiner, mesh.hint)? {
                LocateResult::OnVertex(_, existing) => {
                    return Err(RecoveryError::Insertion(InsertionError::Coincident {
                        existing: mesh.vertex(existing).index(),
                        inserted: index,
                    }));
                }
                LocateResult::InsideTet(t)
                | LocateResult::OnFace(t, _)
                | LocateResult::OnEdge(t)
                | LocateResult::OutsideHull(t) => t,
            };
            insert_in_cavity(mesh, vkey, seed, true)?;
            vertex_set.insert(vkey);

            pending.push([a, b, vkey]);
            pending.push([b, c, vkey]);
            pending.push([c, a, vkey]);
        }
        debug!("facet {facet_idx} recovered");
    }
    Ok(())
}

// =============================================================================
// Hole and region flooding
// =============================================================================

/// Flood fill across unconstrained faces, marking the visited cells.
fn flood(
    mesh: &mut TetMesh,
    seeds: &[TetKey],
    mut visit: impl FnMut(&mut TetMesh, TetKey),
) {
    let stamp = mesh.next_epoch();
    let mut stack: Vec<TetKey> = Vec::new();
    for &s in seeds {
        if mesh.tet(s).epoch != stamp {
            mesh.tet_mut(s).epoch = stamp;
            stack.push(s);
        }
    }
    while let Some(t) = stack.pop() {
        visit(mesh, t);
        for face in 0..4 {
            if mesh.tet(t).is_face_constrained(face) {
                continue;
            }
            let Some(n) = mesh.neighbor(t, face) else {
                continue;
            };
            if mesh.tet(n).epoch != stamp {
                mesh.tet_mut(n).epoch = stamp;
                stack.push(n);
            }
        }
    }
}

/// Locates the finite tetrahedron containing `seed`.
fn locate_seed(mesh: &mut TetMesh, seed: [f64; 3]) -> Result<Option<TetKey>, RecoveryError> {
    let p = Point::new(seed);
    match locate(mesh, &p, mesh.hint)? {
        LocateResult::InsideTet(t) | LocateResult::OnFace(t, _) | LocateResult::OnEdge(t) => {
            Ok(Some(t))
        }
        LocateResult::OnVertex(_, _) | LocateResult::OutsideHull(_) => Ok(None),
    }
}

/// Classifies every cell after facet recovery: the outside component is
/// flooded from the ghost layer, hole components are erased, and region
/// seeds spread their attribute and volume bound.
///
/// With `behavior.convex` the hull is kept: only hole flooding applies.
///
/// # Errors
///
/// [`RecoveryError::SeedOutsideDomain`] when a hole or region seed is
/// unreachable; location errors otherwise.
pub fn flood_regions(
    mesh: &mut TetMesh,
    input: &PlcInput,
    behavior: &Behavior,
) -> Result<(), RecoveryError> {
    // Exterior: everything reachable from the ghost layer without crossing
    // a recovered facet.
    if !behavior.convex {
        let ghost_seeds: Vec<TetKey> = mesh
            .tets()
            .filter(|(_, t)| t.is_ghost())
            .map(|(k, _)| k)
            .collect();
        // Enter the domain side only through unconstrained hull faces: seed
        // with the ghosts; the flood refuses constrained faces on its own.
        flood(mesh, &ghost_seeds, |mesh, t| {
            mesh.tet_mut(t).exterior = true;
        });
    }

    for hole in &input.holes {
        let Some(seed_tet) = locate_seed(mesh, *hole)? else {
            return Err(RecoveryError::SeedOutsideDomain {
                kind: "hole",
                x: hole[0],
                y: hole[1],
                z: hole[2],
            });
        };
        flood(mesh, &[seed_tet], |mesh, t| {
            mesh.tet_mut(t).exterior = true;
        });
    }

    for region in &input.regions {
        let Some(seed_tet) = locate_seed(mesh, region.seed)? else {
            return Err(RecoveryError::SeedOutsideDomain {
                kind: "region",
                x: region.seed[0],
                y: region.seed[1],
                z: region.seed[2],
            });
        };
        if mesh.tet(seed_tet).exterior {
            return Err(RecoveryError::SeedOutsideDomain {
                kind: "region",
                x: region.seed[0],
                y: region.seed[1],
                z: region.seed[2],
            });
        }
        let attribute = region.attribute;
        let bound = region.max_volume;
        flood(mesh, &[seed_tet], |mesh, t| {
            let tet = mesh.tet_mut(t);
            tet.region = Some(attribute);
            tet.max_volume = bound;
        });
    }
    Ok(())
}

/// Removes ghost and exterior tetrahedra, leaving `None` neighbors on the
/// new boundary. Called once the mesh is final (no more point location).
pub fn strip_exterior(mesh: &mut TetMesh) {
    let doomed: Vec<TetKey> = mesh
        .tets()
        .filter(|(_, t)| t.is_ghost() || t.exterior)
        .map(|(k, _)| k)
        .collect();
    let doomed_set: FastHashSet<TetKey> = doomed.iter().copied().collect();

    // Detach survivors from cells about to go away.
    let survivors: Vec<TetKey> = mesh
        .tets()
        .filter(|(k, _)| !doomed_set.contains(k))
        .map(|(k, _)| k)
        .collect();
    for t in survivors {
        for face in 0..4 {
            if let Some(n) = mesh.neighbor(t, face) {
                if doomed_set.contains(&n) {
                    mesh.tet_mut(t).neighbors[face] = None;
                }
            }
        }
    }
    for t in doomed {
        mesh.remove_tet(t);
    }

    // Incident back-references of surviving vertices may now dangle; the
    // store repairs them lazily, but a cheap fixup keeps later walks fast.
    let fixups: Vec<(VertexKey, TetKey)> = mesh
        .tets()
        .flat_map(|(k, t)| {
            t.vertices
                .iter()
                .flatten()
                .map(move |&v| (v, k))
                .collect::<SmallBuffer<_, 4>>()
        })
        .collect();
    for (v, t) in fixups {
        // Last writer wins; any incident cell is fine.
        mesh.set_incident(v, t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::bowyer_watson::triangulate;
    use crate::io::{Facet, Polygon};
    use std::sync::atomic::AtomicBool;

    fn cube_input() -> PlcInput {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
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
        PlcInput {
            points,
            facets,
            facet_markers: (1..=6).collect(),
            ..PlcInput::default()
        }
    }

    fn build_cube() -> (TetMesh, PlcContext, PlcInput) {
        let input = cube_input();
        let mut mesh = TetMesh::new();
        let keys: Vec<VertexKey> = input
            .points
            .iter()
            .enumerate()
            .map(|(i, c)| mesh.add_vertex(Vertex::input(Point::new(*c), i)))
            .collect();
        triangulate(&mut mesh, &keys, &AtomicBool::new(false)).unwrap();
        let segments = collect_segments(&input, &keys);
        let ctx = PlcContext {
            vertex_keys: keys,
            segments,
            steiner_left: 1000,
            ..PlcContext::default()
        };
        (mesh, ctx, input)
    }

    #[test]
    fn cube_segments_all_present_after_delaunay() {
        let (mut mesh, mut ctx, _) = build_cube();
        // The segment set is exactly the unique quad edges: 12 of them.
        assert_eq!(ctx.segments.len(), 12);
        recover_segments(&mut mesh, &mut ctx, &AtomicBool::new(false)).unwrap();
        for chain in &ctx.segments {
            assert_eq!(chain.chain.len(), 2, "no Steiner points expected on a cube");
        }
        mesh.is_valid().unwrap();
    }

    #[test]
    fn cube_facets_recovered_without_steiner_points() {
        let (mut mesh, mut ctx, input) = build_cube();
        let flag = AtomicBool::new(false);
        recover_segments(&mut mesh, &mut ctx, &flag).unwrap();
        recover_facets(&mut mesh, &mut ctx, &input, &flag).unwrap();
        assert_eq!(mesh.number_of_vertices(), 8, "cube needs no Steiner points");

        // Every constrained face lies in one of the six cube planes.
        let mut constrained = 0;
        let cells: Vec<_> = mesh.tets().map(|(k, t)| (k, t.clone())).collect();
        for (key, tet) in cells {
            for face in 0..4 {
                if tet.is_ghost() || !tet.is_face_constrained(face) {
                    continue;
                }
                constrained += 1;
                let verts: Vec<Point> = mesh
                    .face_key(key, face)
                    .iter()
                    .flatten()
                    .map(|&v| *mesh.point(v))
                    .collect();
                assert_eq!(verts.len(), 3);
                let on_cube_plane = (0..3).any(|axis| {
                    let coords: Vec<f64> = verts.iter().map(|p| p.coords()[axis]).collect();
                    coords.iter().all(|&c| c == 0.0) || coords.iter().all(|&c| c == 1.0)
                });
                assert!(on_cube_plane, "constrained face off the cube boundary");
            }
        }
        // 6 hull facets, 2 triangles each, counted on their finite side.
        assert_eq!(constrained, 12);
    }

    #[test]
    fn cube_flood_keeps_interior() {
        let (mut mesh, mut ctx, input) = build_cube();
        let flag = AtomicBool::new(false);
        recover_segments(&mut mesh, &mut ctx, &flag).unwrap();
        recover_facets(&mut mesh, &mut ctx, &input, &flag).unwrap();
        flood_regions(&mut mesh, &input, &Behavior::default()).unwrap();
        // Nothing inside the cube may be exterior.
        for (_, tet) in mesh.finite_tets() {
            assert!(!tet.exterior, "interior cell marked exterior");
        }
        strip_exterior(&mut mesh);
        let total: f64 = mesh
            .finite_tets()
            .map(|(k, _)| {
                let [a, b, c, d] = mesh.tet_points(k).unwrap();
                crate::geometry::primitives::volume(&a, &b, &c, &d)
            })
            .sum();
        approx::assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ear_clip_square_and_l_shape() {
        let square = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert_eq!(ear_clip(&square).len(), 2);

        let l_shape = vec![
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [0.0, 2.0],
        ];
        let triangles = ear_clip(&l_shape);
        assert_eq!(triangles.len(), 4);
        // The clipped triangulation covers the L exactly: area 3.
        let area: f64 = triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| l_shape[i]);
                0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs()
            })
            .sum();
        approx::assert_relative_eq!(area, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn flip_recovers_a_crossing_segment() {
        // Two apexes far above and below a unit triangle: each apex lies
        // outside the other side's circumsphere, so the Delaunay mesh is the
        // two cells glued on the triangle and the vertical edge is missing.
        // Recovery must create it by a single 2-to-3 flip, no Steiner points.
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.3, 0.3, 3.0],
            [0.3, 0.3, -3.0],
        ];
        let mut mesh = TetMesh::new();
        let keys: Vec<VertexKey> = points
            .iter()
            .enumerate()
            .map(|(i, c)| mesh.add_vertex(Vertex::input(Point::new(*c), i)))
            .collect();
        triangulate(&mut mesh, &keys, &AtomicBool::new(false)).unwrap();

        let mut ctx = PlcContext {
            vertex_keys: keys.clone(),
            segments: vec![SegmentChain {
                chain: vec![keys[3], keys[4]],
                marker: 0,
            }],
            steiner_left: 10,
            ..PlcContext::default()
        };
        assert!(
            !mesh.edge_exists(keys[3], keys[4]),
            "test setup: the vertical edge must start out missing"
        );
        recover_segments(&mut mesh, &mut ctx, &AtomicBool::new(false)).unwrap();
        assert!(mesh.edge_exists(keys[3], keys[4]));
        assert_eq!(mesh.number_of_vertices(), 5, "flip, not a Steiner split");
        mesh.is_valid().unwrap();
    }
}
