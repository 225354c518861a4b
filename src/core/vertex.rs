//! Mesh vertices.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::geometry::point::Point;

new_key_type! {
    /// Stable key of a vertex in the mesh store.
    pub struct VertexKey;
}

/// How a vertex came to exist.
///
/// Input vertices are loaded from the caller's geometry; the three Steiner
/// kinds record which recovery or refinement stage created the vertex, which
/// in turn constrains where it is allowed to lie (on its segment, on its
/// facet, or freely in the volume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexKind {
    /// Supplied by the caller.
    Input,
    /// Inserted on a PLC segment during segment recovery or encroachment
    /// splitting.
    SteinerSegment,
    /// Inserted on a PLC facet during facet recovery or encroachment
    /// splitting.
    SteinerFacet,
    /// Inserted in the interior by quality refinement.
    SteinerVolume,
}

impl VertexKind {
    /// `true` for any of the Steiner kinds.
    #[inline]
    #[must_use]
    pub const fn is_steiner(self) -> bool {
        !matches!(self, Self::Input)
    }
}

/// A mesh vertex.
///
/// The point, output index, boundary marker, and kind are immutable once the
/// vertex is created; only the incident-tetrahedron back-reference is updated
/// as the topology around the vertex changes. Variable-length per-vertex
/// attributes live in a side table on the mesh store so this struct stays
/// cache-dense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    point: Point,
    index: usize,
    marker: i32,
    kind: VertexKind,
    /// One tetrahedron this vertex belongs to, maintained by the store.
    pub(crate) incident: Option<crate::core::tetrahedron::TetKey>,
}

impl Vertex {
    /// Creates a vertex.
    #[must_use]
    pub const fn new(point: Point, index: usize, marker: i32, kind: VertexKind) -> Self {
        Self {
            point,
            index,
            marker,
            kind,
            incident: None,
        }
    }

    /// Creates an input vertex with marker 0.
    #[must_use]
    pub const fn input(point: Point, index: usize) -> Self {
        Self::new(point, index, 0, VertexKind::Input)
    }

    /// The vertex position.
    #[inline]
    #[must_use]
    pub const fn point(&self) -> &Point {
        &self.point
    }

    /// The stable output index of this vertex.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The boundary marker.
    #[inline]
    #[must_use]
    pub const fn marker(&self) -> i32 {
        self.marker
    }

    /// The vertex classification.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> VertexKind {
        self.kind
    }

    /// One tetrahedron incident to this vertex, if the vertex is part of the
    /// triangulation.
    #[inline]
    #[must_use]
    pub const fn incident(&self) -> Option<crate::core::tetrahedron::TetKey> {
        self.incident
    }
}
