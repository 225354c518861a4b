//! # tetmesh
//!
//! A quality tetrahedral mesh generator and 3D Delaunay triangulator.
//!
//! Given a point set or a [piecewise linear complex](https://en.wikipedia.org/wiki/Piecewise_linear_complex)
//! (PLC), the crate produces:
//!
//! - the Delaunay tetrahedralization of the input points,
//! - a constrained tetrahedralization respecting the PLC's segments and
//!   facets, with holes carved out and regions attributed,
//! - a quality mesh in which no tetrahedron exceeds a radius-edge ratio or
//!   volume bound,
//! - optionally the boundary faces and edges, and the dual Voronoi vertices.
//!
//! # Features
//!
//! - Sign-exact `orient3d`/`insphere` predicates with an adaptive
//!   floating-point expansion fallback and symbolic perturbation for
//!   degenerate input
//! - Incremental Bowyer–Watson insertion over a ghost-closed neighbor graph,
//!   with BRIO/Hilbert insertion ordering
//! - Segment and facet recovery with diametral-sphere protection, hole and
//!   region flooding
//! - Encroachment-aware Delaunay refinement with a worst-first queue
//! - The TetGen text formats (`.node`, `.poly`, `.ele`, `.face`, `.edge`,
//!   `.v.node`) and the TetGen-style concatenated switch strings
//!
//! # Basic Usage
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use tetmesh::core::behavior::Behavior;
//! use tetmesh::io::PlcInput;
//! use tetmesh::tetrahedralize;
//!
//! // Delaunay tetrahedralization of five points.
//! let input = PlcInput::from_points(vec![
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [0.0, 0.0, 1.0],
//!     [0.9, 0.9, 0.9],
//! ]);
//! let behavior = Behavior::parse("fz").unwrap();
//! let interrupt = AtomicBool::new(false);
//!
//! let mesh = tetrahedralize(&behavior, &input, None, &interrupt).unwrap();
//! assert_eq!(mesh.number_of_points(), 5);
//! assert!(mesh.number_of_tetrahedra() >= 2);
//! // `-f` asked for boundary faces; `-z` numbers output from zero.
//! assert!(!mesh.faces.is_empty());
//! assert_eq!(mesh.first_index, 0);
//! ```
//!
//! # Invariants
//!
//! The mesh store maintains, after every public operation:
//!
//! - every non-ghost tetrahedron has strictly positive orientation;
//! - neighbor links are symmetric and agree on the shared face;
//! - the neighbor graph is closed over the convex hull by ghost cells;
//! - after Delaunay construction, no vertex lies strictly inside the
//!   (symbolically perturbed) circumsphere of any cell;
//! - after recovery, every PLC segment is a union of mesh edges and every
//!   facet a union of mesh faces.
//!
//! `TetMesh::is_valid` checks the structural invariants;
//! `TetMesh::validate_delaunay` checks the (expensive) global Delaunay
//! property.
//!
//! # References
//!
//! - Shewchuk, J. R. "Adaptive Precision Floating-Point Arithmetic and Fast
//!   Robust Geometric Predicates." *Discrete & Computational Geometry* 18
//!   (1997).
//! - Bowyer, A. "Computing Dirichlet tessellations." / Watson, D. F.
//!   "Computing the n-dimensional Delaunay tessellation." *The Computer
//!   Journal* 24.2 (1981).
//! - Si, H. "TetGen, a Delaunay-Based Quality Tetrahedral Mesh Generator."
//!   *ACM Transactions on Mathematical Software* 41.2 (2015).
//! - Shewchuk, J. R. "Delaunay refinement algorithms for triangular mesh
//!   generation." *Computational Geometry* 22.1-3 (2002).

// Forbidden in Cargo.toml lints as well; stated here for readers.
#![forbid(unsafe_code)]

/// Core data structures and algorithms: the mesh store, the Delaunay
/// kernel, constraint recovery, and refinement.
pub mod core {
    /// Mesh construction and maintenance algorithms.
    pub mod algorithms {
        /// Incremental Bowyer–Watson insertion and bulk construction.
        pub mod bowyer_watson;
        /// Walk-based point location.
        pub mod locate;
        /// Segment/facet recovery and hole/region flooding.
        pub mod recovery;
        /// Quality-driven Delaunay refinement.
        pub mod refine;
    }
    /// The behavior record and switch-string parsing.
    pub mod behavior;
    /// Boundary faces, edges, and the Voronoi dual.
    pub mod boundary;
    /// Collection aliases tuned for the kernel.
    pub mod collections;
    /// The tetrahedral mesh store.
    pub mod mesh;
    /// Tetrahedron entities.
    pub mod tetrahedron;
    /// Ordering utilities (Hilbert curve, BRIO).
    pub mod util;
    /// Vertex entities.
    pub mod vertex;
}

/// Geometric types and predicates.
pub mod geometry {
    /// Multi-component floating-point expansions.
    pub mod expansion;
    /// 3D points.
    pub mod point;
    /// Sign-exact predicates with symbolic perturbation.
    pub mod predicates;
    /// Derived quantities: circumspheres, volumes, angles, encroachment.
    pub mod primitives;
}

/// Input/output geometry containers and the TetGen text formats.
pub mod io;

/// The error taxonomy.
pub mod error;

/// The tetrahedralization pipeline.
pub mod pipeline;

pub use error::MeshError;
pub use pipeline::tetrahedralize;

/// A prelude re-exporting the types most callers need.
pub mod prelude {
    pub use crate::core::behavior::{Behavior, BehaviorBuilder, SwitchParseError};
    pub use crate::core::mesh::{MeshValidationError, TetMesh};
    pub use crate::core::tetrahedron::{TetKey, Tetrahedron};
    pub use crate::core::vertex::{Vertex, VertexKey, VertexKind};
    pub use crate::error::MeshError;
    pub use crate::geometry::point::Point;
    pub use crate::geometry::predicates::{
        insphere, insphere_perturbed, orient3d, InSphere, Orientation,
    };
    pub use crate::io::{Facet, MeshOutput, MeshStatistics, PlcInput, Polygon, Region};
    pub use crate::pipeline::tetrahedralize;
}
