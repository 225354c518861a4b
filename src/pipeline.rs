//! The tetrahedralization pipeline.
//!
//! [`tetrahedralize`] is the single entry point: it validates the input
//! geometry, builds the Delaunay tetrahedralization, optionally recovers PLC
//! constraints and floods holes and regions, optionally refines for quality,
//! and assembles the requested output. Input problems are reported before
//! any mesh is built; recovery and quality failures hand the partial mesh
//! back inside the error; cancellation returns nothing.

use std::sync::atomic::AtomicBool;

use log::{debug, info};

use crate::core::algorithms::bowyer_watson::{triangulate, TriangulateError};
use crate::core::algorithms::recovery::{
    collect_segments, flood_regions, recover_facets, recover_segments, strip_exterior,
    PlcContext, RecoveryError,
};
use crate::core::algorithms::refine::{enforce_conforming, refine, RefineError};
use crate::core::behavior::Behavior;
use crate::core::boundary::{boundary_triangles, unique_edges, voronoi_vertices};
use crate::core::collections::{FastHashMap, FastHashSet};
use crate::core::mesh::TetMesh;
use crate::core::tetrahedron::{TetKey, Tetrahedron, GHOST_APEX};
use crate::core::vertex::{Vertex, VertexKey, VertexKind};
use crate::error::MeshError;
use crate::geometry::point::Point;
use crate::geometry::predicates::{orient3d, Orientation};
use crate::geometry::primitives::{dihedral_angles, radius_edge_ratio, volume};
use crate::io::{MeshOutput, MeshStatistics, PlcInput};

/// Generates a tetrahedral mesh according to `behavior`.
///
/// `additional` supplies the secondary point set of `-i` mode; it is ignored
/// unless `behavior.insert_points` is set. The caller may raise `interrupt`
/// from another context at any time; the kernel checks it before each point
/// insertion and at the top of each refinement iteration.
///
/// # Errors
///
/// Every kind of [`MeshError`]; see the error taxonomy for which kinds carry
/// a partial mesh.
pub fn tetrahedralize(
    behavior: &Behavior,
    input: &PlcInput,
    additional: Option<&PlcInput>,
    interrupt: &AtomicBool,
) -> Result<MeshOutput, MeshError> {
    if !behavior.quiet {
        info!(
            "tetrahedralize: {} points, {} facets, switches \"{}\"",
            input.points.len(),
            input.facets.len(),
            behavior.switches()
        );
    }

    validate_input(behavior, input)?;

    // Load vertices. Input points keep their input order as output indices;
    // additional points follow.
    let mut mesh = TetMesh::new();
    let mut keys: Vec<VertexKey> = Vec::with_capacity(input.points.len());
    for (i, coords) in input.points.iter().enumerate() {
        let marker = input.point_markers.get(i).copied().unwrap_or(0);
        let key = mesh.add_vertex(Vertex::new(Point::new(*coords), i, marker, VertexKind::Input));
        if let Some(attrs) = input.point_attributes.get(i) {
            if !attrs.is_empty() {
                mesh.set_vertex_attributes(key, attrs.clone());
            }
        }
        keys.push(key);
    }
    if behavior.insert_points {
        if let Some(extra) = additional {
            for coords in &extra.points {
                let index = mesh.fresh_index();
                let key =
                    mesh.add_vertex(Vertex::new(Point::new(*coords), index, 0, VertexKind::Input));
                keys.push(key);
            }
        }
    }

    // Delaunay tetrahedralization: built incrementally, or rebuilt from an
    // existing element list in refine mode.
    if behavior.refine {
        rebuild_from_elements(&mut mesh, &keys, &input.tetrahedra)?;
    } else {
        triangulate(&mut mesh, &keys, interrupt).map_err(|e| match e {
            TriangulateError::Degenerate => MeshError::MalformedInput {
                message: "input points are affinely dependent".to_string(),
            },
            TriangulateError::Coincident { first, second } => {
                MeshError::CoincidentVertices { first, second }
            }
            TriangulateError::Cancelled => MeshError::Cancelled,
            TriangulateError::Insertion(e) => MeshError::MalformedInput {
                message: format!("insertion failed: {e}"),
            },
        })?;
    }
    debug!(
        "Delaunay phase done: {} finite tetrahedra",
        mesh.number_of_finite_tets()
    );

    // PLC constraint recovery and domain classification.
    let mut ctx = PlcContext {
        vertex_keys: keys,
        segments: Vec::new(),
        steiner_left: behavior.steiner_budget,
        face_markers: FastHashMap::default(),
    };
    if behavior.plc && !behavior.refine {
        ctx.segments = collect_segments(input, &ctx.vertex_keys);
        let recovered = recover_segments(&mut mesh, &mut ctx, interrupt)
            .and_then(|()| recover_facets(&mut mesh, &mut ctx, input, interrupt))
            .and_then(|()| flood_regions(&mut mesh, input, behavior));
        match recovered {
            Ok(()) => {
                debug!("constraint recovery done; {} Steiner left", ctx.steiner_left);
            }
            Err(e) => return Err(map_recovery_error(e, mesh, behavior, &ctx, input)),
        }
    }

    // Conforming Delaunay and quality refinement.
    if behavior.conforming && !ctx.segments.is_empty() {
        if let Err(e) = enforce_conforming(&mut mesh, &mut ctx, interrupt) {
            return Err(map_refine_error(e, mesh, behavior, &ctx, input));
        }
    }
    if behavior.quality || behavior.var_volume {
        match refine(&mut mesh, &mut ctx, behavior, interrupt) {
            Ok(outcome) => {
                if !behavior.quiet && outcome.skipped > 0 {
                    info!(
                        "refinement abandoned {} cells near acute input angles",
                        outcome.skipped
                    );
                }
            }
            Err(e) => return Err(map_refine_error(e, mesh, behavior, &ctx, input)),
        }
    }

    strip_exterior(&mut mesh);
    let output = assemble_output(&mesh, behavior, &ctx, input);
    if !behavior.quiet {
        log_statistics(&output.statistics);
    }
    Ok(output)
}

fn map_recovery_error(
    error: RecoveryError,
    mut mesh: TetMesh,
    behavior: &Behavior,
    ctx: &PlcContext,
    input: &PlcInput,
) -> MeshError {
    match error {
        RecoveryError::Cancelled => MeshError::Cancelled,
        RecoveryError::SeedOutsideDomain { kind, x, y, z } => MeshError::MalformedInput {
            message: format!("{kind} seed ({x}, {y}, {z}) lies outside the domain"),
        },
        other => {
            strip_exterior(&mut mesh);
            MeshError::RecoveryFailed {
                message: other.to_string(),
                partial: Box::new(assemble_output(&mesh, behavior, ctx, input)),
            }
        }
    }
}

fn map_refine_error(
    error: RefineError,
    mut mesh: TetMesh,
    behavior: &Behavior,
    ctx: &PlcContext,
    input: &PlcInput,
) -> MeshError {
    match error {
        RefineError::Cancelled => MeshError::Cancelled,
        RefineError::StepLimit { limit } => {
            strip_exterior(&mut mesh);
            MeshError::QualityNotConverged {
                steps: limit,
                partial: Box::new(assemble_output(&mesh, behavior, ctx, input)),
            }
        }
        other => {
            strip_exterior(&mut mesh);
            MeshError::RecoveryFailed {
                message: other.to_string(),
                partial: Box::new(assemble_output(&mesh, behavior, ctx, input)),
            }
        }
    }
}

// =============================================================================
// Input validation (error kinds 1-3, before any mesh exists)
// =============================================================================

#[allow(clippy::too_many_lines)]
fn validate_input(behavior: &Behavior, input: &PlcInput) -> Result<(), MeshError> {
    if input.points.len() < 4 {
        return Err(MeshError::MalformedInput {
            message: format!(
                "tetrahedralization needs at least 4 points, got {}",
                input.points.len()
            ),
        });
    }
    for (i, coords) in input.points.iter().enumerate() {
        if !coords.iter().all(|c| c.is_finite()) {
            return Err(MeshError::MalformedInput {
                message: format!("point {i} has a non-finite coordinate"),
            });
        }
    }

    // Exact duplicates are a distinct error kind: the caller chose not to
    // deduplicate, so the kernel refuses rather than silently dropping.
    let mut seen: FastHashMap<Point, usize> = FastHashMap::default();
    for (i, coords) in input.points.iter().enumerate() {
        if let Some(&first) = seen.get(&Point::new(*coords)) {
            return Err(MeshError::CoincidentVertices { first, second: i });
        }
        seen.insert(Point::new(*coords), i);
    }

    for seed in input.holes.iter().chain(input.regions.iter().map(|r| &r.seed)) {
        if !seed.iter().all(|c| c.is_finite()) {
            return Err(MeshError::MalformedInput {
                message: "hole or region seed has a non-finite coordinate".to_string(),
            });
        }
    }

    for (facet_idx, facet) in input.facets.iter().enumerate() {
        for polygon in &facet.polygons {
            let mut distinct: Vec<usize> = polygon.vertices.clone();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() < 3 {
                return Err(MeshError::MalformedInput {
                    message: format!(
                        "facet {facet_idx} has a polygon with fewer than 3 distinct vertices"
                    ),
                });
            }
            if let Some(&bad) = polygon.vertices.iter().find(|&&v| v >= input.points.len()) {
                return Err(MeshError::MalformedInput {
                    message: format!("facet {facet_idx} references missing vertex {bad}"),
                });
            }
        }
        validate_facet_planarity(behavior, input, facet_idx)?;
        validate_facet_simplicity(input, facet_idx)?;
    }

    if behavior.refine {
        if input.tetrahedra.is_empty() {
            return Err(MeshError::MalformedInput {
                message: "refine mode needs an existing element list".to_string(),
            });
        }
        for (i, tet) in input.tetrahedra.iter().enumerate() {
            if let Some(&bad) = tet.iter().find(|&&v| v >= input.points.len()) {
                return Err(MeshError::MalformedInput {
                    message: format!("element {i} references missing vertex {bad}"),
                });
            }
        }
    }
    Ok(())
}

/// Rejects facets whose vertices leave the facet plane by more than the
/// configured tolerance (relative to the facet's extent).
fn validate_facet_planarity(
    behavior: &Behavior,
    input: &PlcInput,
    facet_idx: usize,
) -> Result<(), MeshError> {
    use nalgebra::Vector3;

    let facet = &input.facets[facet_idx];
    let vertices: Vec<Vector3<f64>> = facet
        .polygons
        .iter()
        .flat_map(|p| p.vertices.iter())
        .map(|&v| Vector3::from(input.points[v]))
        .collect();
    if vertices.len() < 4 {
        return Ok(());
    }

    // Plane from the first vertex pair plus the point making the widest
    // triangle; degenerate when everything is collinear.
    let origin = vertices[0];
    let u = vertices[1] - origin;
    let mut normal = Vector3::zeros();
    let mut best = 0.0;
    for v in &vertices[2..] {
        let n = u.cross(&(v - origin));
        if n.norm() > best {
            best = n.norm();
            normal = n;
        }
    }
    if best <= f64::MIN_POSITIVE {
        return Err(MeshError::DegeneratePlc {
            message: format!("facet {facet_idx} is collinear"),
        });
    }
    let normal = normal / normal.norm();
    let scale = vertices
        .iter()
        .map(|v| (v - origin).norm())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    for (i, v) in vertices.iter().enumerate() {
        let deviation = (v - origin).dot(&normal).abs();
        if deviation > behavior.plc_tolerance * scale {
            return Err(MeshError::DegeneratePlc {
                message: format!(
                    "facet {facet_idx} is non-planar: vertex {i} deviates by {deviation:e}"
                ),
            });
        }
    }
    Ok(())
}

/// Rejects self-intersecting facet polygons (properly crossing edges in the
/// projected plane).
fn validate_facet_simplicity(input: &PlcInput, facet_idx: usize) -> Result<(), MeshError> {
    use crate::geometry::predicates::orient2d;
    use crate::geometry::primitives::{dominant_axis, project_away};

    let facet = &input.facets[facet_idx];
    for polygon in &facet.polygons {
        let n = polygon.vertices.len();
        if n < 4 {
            continue;
        }
        let pts: Vec<Point> = polygon
            .vertices
            .iter()
            .map(|&v| Point::new(input.points[v]))
            .collect();
        let axis = dominant_axis(&pts[0], &pts[1], &pts[2]);
        let projected: Vec<[f64; 2]> = pts.iter().map(|p| project_away(p, axis)).collect();

        let crosses = |a: [f64; 2], b: [f64; 2], c: [f64; 2], d: [f64; 2]| {
            let abc = orient2d(a, b, c);
            let abd = orient2d(a, b, d);
            let cda = orient2d(c, d, a);
            let cdb = orient2d(c, d, b);
            abc != abd
                && cda != cdb
                && abc != Orientation::DEGENERATE
                && abd != Orientation::DEGENERATE
        };
        for i in 0..n {
            for j in i + 1..n {
                // Skip adjacent edges (they share a vertex).
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                if crosses(
                    projected[i],
                    projected[(i + 1) % n],
                    projected[j],
                    projected[(j + 1) % n],
                ) {
                    return Err(MeshError::DegeneratePlc {
                        message: format!("facet {facet_idx} has self-intersecting edges"),
                    });
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Refine-mode reconstruction
// =============================================================================

/// Rebuilds the mesh store from an existing element list, restoring
/// orientation, neighbor symmetry, and the ghost shell.
fn rebuild_from_elements(
    mesh: &mut TetMesh,
    keys: &[VertexKey],
    tetrahedra: &[[usize; 4]],
) -> Result<(), MeshError> {
    for (i, tet) in tetrahedra.iter().enumerate() {
        let mut corners = [keys[tet[0]], keys[tet[1]], keys[tet[2]], keys[tet[3]]];
        let points: Vec<Point> = corners.iter().map(|&k| *mesh.point(k)).collect();
        match orient3d(&points[0], &points[1], &points[2], &points[3]) {
            Orientation::POSITIVE => {}
            Orientation::NEGATIVE => corners.swap(1, 2),
            Orientation::DEGENERATE => {
                return Err(MeshError::MalformedInput {
                    message: format!("element {i} is flat"),
                });
            }
        }
        mesh.add_tet(Tetrahedron::new(corners[0], corners[1], corners[2], corners[3]));
    }

    // Bond interior faces; wrap boundary faces in ghosts.
    let face_map = mesh.face_map();
    let mut ghost_faces: FastHashMap<[Option<VertexKey>; 3], (TetKey, usize)> =
        FastHashMap::default();
    for (_, sharers) in face_map {
        match sharers.as_slice() {
            [(t, f)] => {
                let [w0, w1, w2] = mesh.tet(*t).face(*f);
                let (Some(w0), Some(w1), Some(w2)) = (w0, w1, w2) else {
                    continue;
                };
                let ghost = mesh.add_tet(Tetrahedron::ghost(w0, w2, w1));
                mesh.bond(*t, *f, ghost, GHOST_APEX);
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
            [(t1, f1), (t2, f2)] => {
                mesh.bond(*t1, *f1, *t2, *f2);
            }
            _ => {
                return Err(MeshError::MalformedInput {
                    message: "a face is shared by more than two elements".to_string(),
                });
            }
        }
    }
    Ok(())
}

// =============================================================================
// Output assembly
// =============================================================================

#[allow(clippy::too_many_lines)]
fn assemble_output(
    mesh: &TetMesh,
    behavior: &Behavior,
    ctx: &PlcContext,
    input: &PlcInput,
) -> MeshOutput {
    // Cells of the output, in a deterministic order (by smallest vertex
    // output index, then lexicographically).
    let mut cells: Vec<TetKey> = mesh
        .finite_tets()
        .filter(|(_, t)| !t.exterior)
        .map(|(k, _)| k)
        .collect();
    let cell_sort_key = |k: &TetKey| {
        let mut ids: Vec<usize> = mesh
            .tet(*k)
            .vertices
            .iter()
            .flatten()
            .map(|&v| mesh.vertex(v).index())
            .collect();
        ids.sort_unstable();
        ids
    };
    cells.sort_by_key(cell_sort_key);

    // Jettison vertices not referenced by any surviving cell, keeping the
    // relative input order.
    let mut used: Vec<VertexKey> = Vec::new();
    {
        let mut seen: FastHashSet<VertexKey> = FastHashSet::default();
        for &cell in &cells {
            for v in mesh.tet(cell).vertices.iter().flatten() {
                if seen.insert(*v) {
                    used.push(*v);
                }
            }
        }
    }
    used.sort_by_key(|&v| mesh.vertex(v).index());
    let remap: FastHashMap<VertexKey, usize> =
        used.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut output = MeshOutput {
        first_index: usize::from(!behavior.zero_index),
        ..MeshOutput::default()
    };
    let attribute_arity = input.point_attributes.first().map_or(0, Vec::len);
    for &v in &used {
        let vertex = mesh.vertex(v);
        output.points.push(*vertex.point().coords());
        output.point_markers.push(vertex.marker());
        if attribute_arity > 0 {
            // Steiner points carry zero attributes; pad to the input arity
            // so every output row has the same width.
            let mut attrs = mesh.vertex_attributes(v).to_vec();
            attrs.resize(attribute_arity, 0.0);
            output.point_attributes.push(attrs);
        }
    }

    for &cell in &cells {
        let tet = mesh.tet(cell);
        let mut corners = [0_usize; 4];
        for (slot, v) in tet.vertices.iter().enumerate() {
            if let Some(v) = v {
                corners[slot] = remap[v];
            }
        }
        output.tetrahedra.push(corners);
        if behavior.region_attributes {
            output
                .tet_attributes
                .push(vec![tet.region.unwrap_or(0.0)]);
        }
    }

    if behavior.faces_out || behavior.plc || behavior.convex {
        for (face, marker) in boundary_triangles(mesh, &ctx.face_markers) {
            if face.iter().any(|v| !remap.contains_key(v)) {
                continue;
            }
            output
                .faces
                .push(([remap[&face[0]], remap[&face[1]], remap[&face[2]]], marker));
        }
        output.faces.sort_unstable();
    }

    if behavior.edges_out {
        let mut segment_edges: FastHashMap<(VertexKey, VertexKey), i32> = FastHashMap::default();
        for chain in &ctx.segments {
            for (a, b) in chain.subsegments() {
                segment_edges.insert((a.min(b), a.max(b)), chain.marker.max(1));
            }
        }
        for (edge, marker) in unique_edges(mesh, &segment_edges) {
            if edge.iter().any(|v| !remap.contains_key(v)) {
                continue;
            }
            output.edges.push(([remap[&edge[0]], remap[&edge[1]]], marker));
        }
        output.edges.sort_unstable();
    }

    if behavior.voronoi_out {
        output.voronoi_points = voronoi_vertices(mesh, &cells)
            .into_iter()
            .map(|p| *p.coords())
            .collect();
    }

    output.statistics = compute_statistics(&output, input);
    output
}

fn compute_statistics(output: &MeshOutput, input: &PlcInput) -> MeshStatistics {
    let mut stats = MeshStatistics {
        input_points: input.points.len(),
        input_facets: input.facets.len(),
        output_points: output.points.len(),
        output_tetrahedra: output.tetrahedra.len(),
        output_faces: output.faces.len(),
        output_edges: output.edges.len(),
        min_radius_edge_ratio: f64::INFINITY,
        max_radius_edge_ratio: 0.0,
        min_dihedral: f64::INFINITY,
        max_dihedral: 0.0,
        total_volume: 0.0,
    };
    for tet in &output.tetrahedra {
        let [a, b, c, d] = tet.map(|i| Point::new(output.points[i]));
        stats.total_volume += volume(&a, &b, &c, &d);
        let ratio = radius_edge_ratio(&a, &b, &c, &d);
        stats.min_radius_edge_ratio = stats.min_radius_edge_ratio.min(ratio);
        stats.max_radius_edge_ratio = stats.max_radius_edge_ratio.max(ratio);
        for angle in dihedral_angles(&a, &b, &c, &d) {
            stats.min_dihedral = stats.min_dihedral.min(angle);
            stats.max_dihedral = stats.max_dihedral.max(angle);
        }
    }
    if output.tetrahedra.is_empty() {
        stats.min_radius_edge_ratio = 0.0;
        stats.min_dihedral = 0.0;
    }
    stats
}

fn log_statistics(stats: &MeshStatistics) {
    info!(
        "mesh: {} points, {} tetrahedra, {} faces, {} edges",
        stats.output_points, stats.output_tetrahedra, stats.output_faces, stats.output_edges
    );
    info!(
        "quality: radius-edge {:.3}..{:.3}, dihedral {:.1}..{:.1} deg, volume {:.6e}",
        stats.min_radius_edge_ratio,
        stats.max_radius_edge_ratio,
        stats.min_dihedral,
        stats.max_dihedral,
        stats.total_volume
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::behavior::BehaviorBuilder;
    use approx::assert_relative_eq;

    fn run(behavior: &Behavior, input: &PlcInput) -> Result<MeshOutput, MeshError> {
        tetrahedralize(behavior, input, None, &AtomicBool::new(false))
    }

    #[test]
    fn too_few_points() {
        let input = PlcInput::from_points(vec![[0.0; 3], [1.0, 0.0, 0.0]]);
        assert!(matches!(
            run(&Behavior::default(), &input),
            Err(MeshError::MalformedInput { .. })
        ));
    }

    #[test]
    fn non_finite_coordinate() {
        let input = PlcInput::from_points(vec![
            [0.0; 3],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, f64::NAN],
        ]);
        assert!(matches!(
            run(&Behavior::default(), &input),
            Err(MeshError::MalformedInput { .. })
        ));
    }

    #[test]
    fn duplicate_points_reported_with_indices() {
        let input = PlcInput::from_points(vec![
            [0.0; 3],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        assert!(matches!(
            run(&Behavior::default(), &input),
            Err(MeshError::CoincidentVertices {
                first: 1,
                second: 3
            })
        ));
    }

    #[test]
    fn single_tetrahedron_pipeline() {
        let input = PlcInput::from_points(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let output = run(&Behavior::default(), &input).unwrap();
        assert_eq!(output.number_of_points(), 4);
        assert_eq!(output.number_of_tetrahedra(), 1);
        assert_relative_eq!(output.total_volume(), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(output.first_index, 1);
    }

    #[test]
    fn zero_index_switch() {
        let input = PlcInput::from_points(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        let behavior = BehaviorBuilder::default().zero_index(true).build().unwrap();
        let output = run(&behavior, &input).unwrap();
        assert_eq!(output.first_index, 0);
    }

    #[test]
    fn cancelled_run_returns_no_mesh() {
        let input = PlcInput::from_points(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.3, 0.3, 0.3],
        ]);
        let result = tetrahedralize(
            &Behavior::default(),
            &input,
            None,
            &AtomicBool::new(true),
        );
        assert!(matches!(result, Err(MeshError::Cancelled)));
    }

    #[test]
    fn additional_points_are_inserted() {
        let input = PlcInput::from_points(vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, 0.0, 2.0],
        ]);
        let extra = PlcInput::from_points(vec![[0.3, 0.3, 0.3]]);
        let behavior = BehaviorBuilder::default().insert_points(true).build().unwrap();
        let output = tetrahedralize(&behavior, &input, Some(&extra), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(output.number_of_points(), 5);
        assert_eq!(output.number_of_tetrahedra(), 4);
    }

    #[test]
    fn refine_mode_rebuilds_and_refines() {
        let input = PlcInput {
            points: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            tetrahedra: vec![[0, 1, 2, 3]],
            ..PlcInput::default()
        };
        let behavior = BehaviorBuilder::default()
            .refine(true)
            .var_volume(true)
            .max_volume(Some(0.05))
            .build()
            .unwrap();
        let output = run(&behavior, &input).unwrap();
        assert!(output.number_of_tetrahedra() > 1);
        for tet in &output.tetrahedra {
            let [a, b, c, d] = tet.map(|i| Point::new(output.points[i]));
            assert!(volume(&a, &b, &c, &d) <= 0.05 + 1e-9);
        }
    }

    #[test]
    fn voronoi_points_match_cells() {
        let input = PlcInput::from_points(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [2.0, 2.0, 2.0],
        ]);
        let behavior = BehaviorBuilder::default().voronoi_out(true).build().unwrap();
        let output = run(&behavior, &input).unwrap();
        assert_eq!(output.voronoi_points.len(), output.number_of_tetrahedra());
        // Each dual vertex is equidistant from its cell's corners.
        for (center, tet) in output.voronoi_points.iter().zip(&output.tetrahedra) {
            let c = Point::new(*center);
            let corners = tet.map(|i| Point::new(output.points[i]));
            let r = c.distance(&corners[0]);
            for p in &corners[1..] {
                assert_relative_eq!(c.distance(p), r, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn non_planar_facet_is_rejected() {
        let input = PlcInput {
            points: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.3],
                [0.0, 1.0, 0.0],
                [0.5, 0.5, 2.0],
            ],
            facets: vec![crate::io::Facet {
                polygons: vec![crate::io::Polygon {
                    vertices: vec![0, 1, 2, 3],
                }],
                holes: Vec::new(),
            }],
            ..PlcInput::default()
        };
        let behavior = BehaviorBuilder::default().plc(true).build().unwrap();
        assert!(matches!(
            run(&behavior, &input),
            Err(MeshError::DegeneratePlc { .. })
        ));
    }
}
