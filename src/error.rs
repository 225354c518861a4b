//! The error taxonomy of the mesh kernel.
//!
//! Every failure a caller can observe is one of the [`MeshError`] kinds, and
//! the kinds are mutually exclusive: there is no silent fallback from one to
//! another:
//!
//! - input problems (malformed input, coincident vertices, degenerate PLC)
//!   are reported before any mesh is built and produce no output;
//! - recovery and quality failures return the best mesh built so far inside
//!   the error, so the caller can inspect it;
//! - cancellation returns no mesh;
//! - internal invariant violations are bugs and abort via panic with a
//!   diagnostic rather than appearing as a recoverable error (the arena
//!   accessors index unconditionally for the same reason).

use thiserror::Error;

use crate::io::MeshOutput;

/// Everything `tetrahedralize` can fail with.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Structurally invalid input: non-finite coordinates, bad indices,
    /// facets with fewer than three distinct vertices, seeds outside the
    /// domain.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// What was wrong with the input.
        message: String,
    },

    /// Two input vertices with exactly equal coordinates.
    #[error("input vertices {first} and {second} have identical coordinates")]
    CoincidentVertices {
        /// Index of the first vertex.
        first: usize,
        /// Index of the second vertex.
        second: usize,
    },

    /// A facet is non-planar beyond tolerance or self-intersecting.
    #[error("degenerate PLC: {message}")]
    DegeneratePlc {
        /// Which facet failed, and how.
        message: String,
    },

    /// Segment or facet recovery ran out of its Steiner budget.
    #[error("constraint recovery failed: {message}")]
    RecoveryFailed {
        /// Which feature could not be recovered.
        message: String,
        /// The best mesh built before the failure.
        partial: Box<MeshOutput>,
    },

    /// Quality refinement exceeded its step limit.
    #[error("quality refinement did not converge within {steps} steps")]
    QualityNotConverged {
        /// The step limit that was exhausted.
        steps: usize,
        /// The best mesh built before the failure.
        partial: Box<MeshOutput>,
    },

    /// The caller raised the interrupt flag.
    #[error("tetrahedralization cancelled by caller")]
    Cancelled,

    /// A file could not be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A mesh file had invalid syntax or inconsistent counts.
    #[error("parse error in {file}: {message}")]
    Parse {
        /// The file (or format) being parsed.
        file: String,
        /// What failed.
        message: String,
    },
}

impl MeshError {
    /// The partially built mesh attached to recovery or quality failures.
    #[must_use]
    pub fn partial_mesh(&self) -> Option<&MeshOutput> {
        match self {
            Self::RecoveryFailed { partial, .. } | Self::QualityNotConverged { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}
