//! Input and output geometry containers, and the TetGen text formats.
//!
//! [`PlcInput`] carries everything a caller can feed the mesher (points with
//! attributes and markers, facets with polygons and facet holes, hole seeds,
//! region seeds); [`MeshOutput`] carries everything it can produce. The text
//! readers and writers in [`text`] follow the established `.node` / `.poly`
//! / `.ele` / `.face` / `.edge` conventions, including `#` comments and
//! 0- or 1-based index normalization.

pub mod text;

use serde::{Deserialize, Serialize};

/// A single polygon loop of a facet, as input vertex indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    /// Input vertex indices around the loop.
    pub vertices: Vec<usize>,
}

/// A planar facet of the PLC: one or more coplanar polygon loops, with
/// optional holes punched by interior seed points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    /// The polygon loops; the first is the outer boundary by convention.
    pub polygons: Vec<Polygon>,
    /// Seed points marking holes within the facet plane.
    pub holes: Vec<[f64; 3]>,
}

/// A region seed: floods its PLC-bounded component with an attribute and an
/// optional volume bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// A point inside the region.
    pub seed: [f64; 3],
    /// The attribute value spread over the region's tetrahedra.
    pub attribute: f64,
    /// Maximum tetrahedron volume within the region, if constrained.
    pub max_volume: Option<f64>,
}

/// Input geometry: a point cloud, optionally a PLC around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlcInput {
    /// Point coordinates.
    pub points: Vec<[f64; 3]>,
    /// Per-point attribute rows; empty, or one row per point.
    pub point_attributes: Vec<Vec<f64>>,
    /// Per-point boundary markers; empty, or one per point.
    pub point_markers: Vec<i32>,
    /// PLC facets.
    pub facets: Vec<Facet>,
    /// Per-facet boundary markers; empty, or one per facet.
    pub facet_markers: Vec<i32>,
    /// Hole seeds: tetrahedra in their component are removed.
    pub holes: Vec<[f64; 3]>,
    /// Region seeds.
    pub regions: Vec<Region>,
    /// An existing tetrahedralization to refine (`-r` mode).
    pub tetrahedra: Vec<[usize; 4]>,
}

impl PlcInput {
    /// A pure point-cloud input.
    #[must_use]
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }
}

/// Aggregate mesh statistics computed after a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshStatistics {
    /// Points in the input geometry.
    pub input_points: usize,
    /// Facets in the input geometry.
    pub input_facets: usize,
    /// Points in the output mesh.
    pub output_points: usize,
    /// Tetrahedra in the output mesh.
    pub output_tetrahedra: usize,
    /// Boundary faces in the output mesh (when extracted).
    pub output_faces: usize,
    /// Edges in the output mesh (when extracted).
    pub output_edges: usize,
    /// Smallest radius-edge ratio over output tetrahedra.
    pub min_radius_edge_ratio: f64,
    /// Largest radius-edge ratio over output tetrahedra.
    pub max_radius_edge_ratio: f64,
    /// Smallest dihedral angle (degrees) over output tetrahedra.
    pub min_dihedral: f64,
    /// Largest dihedral angle (degrees) over output tetrahedra.
    pub max_dihedral: f64,
    /// Total volume of the output mesh.
    pub total_volume: f64,
}

/// Output geometry produced by `tetrahedralize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshOutput {
    /// Point coordinates, input points first, Steiner points after.
    pub points: Vec<[f64; 3]>,
    /// Per-point attribute rows; empty, or one row per point.
    pub point_attributes: Vec<Vec<f64>>,
    /// Per-point boundary markers; empty, or one per point.
    pub point_markers: Vec<i32>,
    /// Tetrahedra as 0-based indices into `points`.
    pub tetrahedra: Vec<[usize; 4]>,
    /// Per-tetrahedron attribute rows (region attributes under `-A`).
    pub tet_attributes: Vec<Vec<f64>>,
    /// Boundary faces with markers (`-f`).
    pub faces: Vec<([usize; 3], i32)>,
    /// Edges with markers (`-e`).
    pub edges: Vec<([usize; 2], i32)>,
    /// Voronoi dual vertices: circumcenters of finite tetrahedra, one per
    /// entry of `tetrahedra` (`-v`).
    pub voronoi_points: Vec<[f64; 3]>,
    /// First index used when writing files (0 under `-z`, 1 otherwise).
    pub first_index: usize,
    /// Aggregate statistics of the run.
    pub statistics: MeshStatistics,
}

impl MeshOutput {
    /// Number of points.
    #[must_use]
    pub fn number_of_points(&self) -> usize {
        self.points.len()
    }

    /// Number of tetrahedra.
    #[must_use]
    pub fn number_of_tetrahedra(&self) -> usize {
        self.tetrahedra.len()
    }

    /// Total volume of all tetrahedra.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        use crate::geometry::point::Point;
        use crate::geometry::primitives::volume;
        self.tetrahedra
            .iter()
            .map(|t| {
                let [a, b, c, d] = t.map(|i| Point::new(self.points[i]));
                volume(&a, &b, &c, &d)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn total_volume_of_single_tet() {
        let output = MeshOutput {
            points: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            tetrahedra: vec![[0, 1, 2, 3]],
            ..MeshOutput::default()
        };
        assert_relative_eq!(output.total_volume(), 1.0 / 6.0);
    }

    #[test]
    fn input_from_points() {
        let input = PlcInput::from_points(vec![[0.0; 3], [1.0; 3]]);
        assert_eq!(input.points.len(), 2);
        assert!(input.facets.is_empty());
    }
}
