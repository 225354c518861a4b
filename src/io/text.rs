//! Readers and writers for the TetGen text formats.
//!
//! All parsers work on in-memory text: `#` starts a comment, blank lines are
//! skipped, and headers may omit trailing fields (which default to zero).
//! Input indices may start at 0 or 1; the first data line decides, and every
//! reference is normalized to the kernel's 0-based convention. Writers number
//! from [`MeshOutput::first_index`].
//!
//! Floating-point values are written with Rust's shortest round-trip
//! formatting, so write-then-read reproduces coordinates exactly.

use std::fmt::Write as _;

use crate::error::MeshError;
use crate::io::{Facet, MeshOutput, PlcInput, Polygon, Region};

/// A parsed `.node` section: points with attributes and markers.
#[derive(Debug, Clone, Default)]
pub struct NodeSection {
    /// Point coordinates.
    pub points: Vec<[f64; 3]>,
    /// Attribute rows, one per point when present.
    pub attributes: Vec<Vec<f64>>,
    /// Boundary markers, one per point when present.
    pub markers: Vec<i32>,
    /// The index base the file used (0 or 1).
    pub first_index: usize,
}

fn parse_error(file: &str, message: impl Into<String>) -> MeshError {
    MeshError::Parse {
        file: file.to_string(),
        message: message.into(),
    }
}

/// Logical content lines: comments stripped, blanks skipped.
fn logical_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
}

fn parse_fields<T: std::str::FromStr>(
    line: &str,
    file: &str,
) -> Result<Vec<T>, MeshError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse()
                .map_err(|_| parse_error(file, format!("invalid number '{tok}'")))
        })
        .collect()
}

/// Parses a `.node` file (or the node section at the head of `lines`).
///
/// # Errors
///
/// [`MeshError::Parse`] on malformed headers, short lines, or an index base
/// other than 0 or 1.
pub fn parse_node(text: &str) -> Result<NodeSection, MeshError> {
    let mut lines = logical_lines(text);
    parse_node_section(&mut lines, "node")
}

fn parse_node_section<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    file: &str,
) -> Result<NodeSection, MeshError> {
    let header = lines
        .next()
        .ok_or_else(|| parse_error(file, "missing node header"))?;
    let fields: Vec<i64> = parse_fields(header, file)?;
    if fields.is_empty() {
        return Err(parse_error(file, "empty node header"));
    }
    let count = usize::try_from(fields[0])
        .map_err(|_| parse_error(file, "negative point count"))?;
    let dim = fields.get(1).copied().unwrap_or(3);
    if dim != 3 {
        return Err(parse_error(file, format!("dimension {dim} is not 3")));
    }
    let n_attrs = usize::try_from(fields.get(2).copied().unwrap_or(0))
        .map_err(|_| parse_error(file, "negative attribute count"))?;
    let has_markers = fields.get(3).copied().unwrap_or(0) != 0;

    let mut section = NodeSection::default();
    for row in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| parse_error(file, format!("expected {count} points, found {row}")))?;
        let values: Vec<f64> = parse_fields(line, file)?;
        let needed = 1 + 3 + n_attrs + usize::from(has_markers);
        if values.len() < needed {
            return Err(parse_error(
                file,
                format!("point line has {} fields, expected {needed}", values.len()),
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = values[0] as i64;
        if row == 0 {
            section.first_index = match index {
                0 => 0,
                1 => 1,
                other => {
                    return Err(parse_error(
                        file,
                        format!("indices must start at 0 or 1, found {other}"),
                    ));
                }
            };
        }
        section.points.push([values[1], values[2], values[3]]);
        if n_attrs > 0 {
            section
                .attributes
                .push(values[4..4 + n_attrs].to_vec());
        }
        if has_markers {
            #[allow(clippy::cast_possible_truncation)]
            section.markers.push(values[4 + n_attrs] as i32);
        }
    }
    Ok(section)
}

/// Parses a `.poly` file: node section, facets, holes, regions.
///
/// # Errors
///
/// [`MeshError::Parse`] on structural problems in any section.
#[allow(clippy::too_many_lines)]
pub fn parse_poly(text: &str) -> Result<PlcInput, MeshError> {
    const FILE: &str = "poly";
    let mut lines = logical_lines(text);
    let nodes = parse_node_section(&mut lines, FILE)?;
    let base = nodes.first_index;

    let mut input = PlcInput {
        points: nodes.points,
        point_attributes: nodes.attributes,
        point_markers: nodes.markers,
        ..PlcInput::default()
    };

    // Facet section: `F nmarkers`.
    let header = lines
        .next()
        .ok_or_else(|| parse_error(FILE, "missing facet header"))?;
    let fields: Vec<i64> = parse_fields(header, FILE)?;
    let facet_count = usize::try_from(fields.first().copied().unwrap_or(0))
        .map_err(|_| parse_error(FILE, "negative facet count"))?;
    let has_markers = fields.get(1).copied().unwrap_or(0) != 0;

    for _ in 0..facet_count {
        let line = lines
            .next()
            .ok_or_else(|| parse_error(FILE, "missing facet descriptor"))?;
        let descriptor: Vec<i64> = parse_fields(line, FILE)?;
        let polygon_count = usize::try_from(descriptor.first().copied().unwrap_or(0))
            .map_err(|_| parse_error(FILE, "negative polygon count"))?;
        let hole_count = usize::try_from(descriptor.get(1).copied().unwrap_or(0))
            .map_err(|_| parse_error(FILE, "negative facet hole count"))?;
        #[allow(clippy::cast_possible_truncation)]
        let marker = if has_markers {
            descriptor.get(2).copied().unwrap_or(0) as i32
        } else {
            0
        };

        let mut facet = Facet::default();
        for _ in 0..polygon_count {
            let line = lines
                .next()
                .ok_or_else(|| parse_error(FILE, "missing polygon line"))?;
            let values: Vec<i64> = parse_fields(line, FILE)?;
            let vertex_count = usize::try_from(values.first().copied().unwrap_or(0))
                .map_err(|_| parse_error(FILE, "negative polygon vertex count"))?;
            if values.len() < 1 + vertex_count {
                return Err(parse_error(FILE, "polygon line shorter than its count"));
            }
            let vertices = values[1..=vertex_count]
                .iter()
                .map(|&v| {
                    usize::try_from(v)
                        .ok()
                        .and_then(|v| v.checked_sub(base))
                        .ok_or_else(|| {
                            parse_error(FILE, format!("polygon vertex index {v} out of range"))
                        })
                })
                .collect::<Result<Vec<usize>, MeshError>>()?;
            facet.polygons.push(Polygon { vertices });
        }
        for _ in 0..hole_count {
            let line = lines
                .next()
                .ok_or_else(|| parse_error(FILE, "missing facet hole line"))?;
            let values: Vec<f64> = parse_fields(line, FILE)?;
            if values.len() < 3 {
                return Err(parse_error(FILE, "facet hole line needs 3 coordinates"));
            }
            facet.holes.push([values[0], values[1], values[2]]);
        }
        input.facets.push(facet);
        if has_markers {
            input.facet_markers.push(marker);
        }
    }

    // Hole section: `NH` then `idx hx hy hz`.
    if let Some(header) = lines.next() {
        let fields: Vec<i64> = parse_fields(header, FILE)?;
        let hole_count = usize::try_from(fields.first().copied().unwrap_or(0))
            .map_err(|_| parse_error(FILE, "negative hole count"))?;
        for _ in 0..hole_count {
            let line = lines
                .next()
                .ok_or_else(|| parse_error(FILE, "missing hole line"))?;
            let values: Vec<f64> = parse_fields(line, FILE)?;
            if values.len() < 4 {
                return Err(parse_error(FILE, "hole line needs index and 3 coordinates"));
            }
            input.holes.push([values[1], values[2], values[3]]);
        }

        // Region section: `NR` then `idx rx ry rz attr [volume]`.
        if let Some(header) = lines.next() {
            let fields: Vec<i64> = parse_fields(header, FILE)?;
            let region_count = usize::try_from(fields.first().copied().unwrap_or(0))
                .map_err(|_| parse_error(FILE, "negative region count"))?;
            for _ in 0..region_count {
                let line = lines
                    .next()
                    .ok_or_else(|| parse_error(FILE, "missing region line"))?;
                let values: Vec<f64> = parse_fields(line, FILE)?;
                if values.len() < 5 {
                    return Err(parse_error(
                        FILE,
                        "region line needs index, seed, and attribute",
                    ));
                }
                let max_volume = values.get(5).copied().filter(|&v| v > 0.0);
                input.regions.push(Region {
                    seed: [values[1], values[2], values[3]],
                    attribute: values[4],
                    max_volume,
                });
            }
        }
    }

    Ok(input)
}

/// Parses a `.ele` file against a node numbering starting at
/// `node_first_index`.
///
/// # Errors
///
/// [`MeshError::Parse`] on malformed lines or out-of-range references.
pub fn parse_ele(
    text: &str,
    node_first_index: usize,
) -> Result<(Vec<[usize; 4]>, Vec<Vec<f64>>), MeshError> {
    const FILE: &str = "ele";
    let mut lines = logical_lines(text);
    let header = lines
        .next()
        .ok_or_else(|| parse_error(FILE, "missing element header"))?;
    let fields: Vec<i64> = parse_fields(header, FILE)?;
    let count = usize::try_from(fields.first().copied().unwrap_or(0))
        .map_err(|_| parse_error(FILE, "negative element count"))?;
    let corners = fields.get(1).copied().unwrap_or(4);
    if corners != 4 {
        return Err(parse_error(
            FILE,
            format!("{corners}-node elements are not supported, expected 4"),
        ));
    }
    let n_attrs = usize::try_from(fields.get(2).copied().unwrap_or(0))
        .map_err(|_| parse_error(FILE, "negative attribute count"))?;

    let mut tetrahedra = Vec::with_capacity(count);
    let mut attributes = Vec::new();
    for row in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| parse_error(FILE, format!("expected {count} elements, found {row}")))?;
        let values: Vec<f64> = parse_fields(line, FILE)?;
        if values.len() < 5 + n_attrs {
            return Err(parse_error(FILE, "element line too short"));
        }
        let mut tet = [0_usize; 4];
        for (slot, value) in values[1..5].iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let raw = *value as i64;
            tet[slot] = usize::try_from(raw)
                .ok()
                .and_then(|v| v.checked_sub(node_first_index))
                .ok_or_else(|| {
                    parse_error(FILE, format!("vertex reference {raw} out of range"))
                })?;
        }
        tetrahedra.push(tet);
        if n_attrs > 0 {
            attributes.push(values[5..5 + n_attrs].to_vec());
        }
    }
    Ok((tetrahedra, attributes))
}

/// Parses a `.face` file against a node numbering starting at
/// `node_first_index`.
///
/// # Errors
///
/// [`MeshError::Parse`] on malformed lines or out-of-range references.
pub fn parse_face(
    text: &str,
    node_first_index: usize,
) -> Result<Vec<([usize; 3], i32)>, MeshError> {
    const FILE: &str = "face";
    let mut lines = logical_lines(text);
    let header = lines
        .next()
        .ok_or_else(|| parse_error(FILE, "missing face header"))?;
    let fields: Vec<i64> = parse_fields(header, FILE)?;
    let count = usize::try_from(fields.first().copied().unwrap_or(0))
        .map_err(|_| parse_error(FILE, "negative face count"))?;
    let has_markers = fields.get(1).copied().unwrap_or(0) != 0;

    let mut faces = Vec::with_capacity(count);
    for row in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| parse_error(FILE, format!("expected {count} faces, found {row}")))?;
        let values: Vec<i64> = parse_fields(line, FILE)?;
        if values.len() < 4 + usize::from(has_markers) {
            return Err(parse_error(FILE, "face line too short"));
        }
        let mut face = [0_usize; 3];
        for (slot, value) in values[1..4].iter().enumerate() {
            face[slot] = usize::try_from(*value)
                .ok()
                .and_then(|v| v.checked_sub(node_first_index))
                .ok_or_else(|| {
                    parse_error(FILE, format!("vertex reference {value} out of range"))
                })?;
        }
        #[allow(clippy::cast_possible_truncation)]
        let marker = if has_markers { values[4] as i32 } else { 0 };
        faces.push((face, marker));
    }
    Ok(faces)
}

// =============================================================================
// Writers
// =============================================================================

/// Writes the point section as a `.node` file.
#[must_use]
pub fn write_node(output: &MeshOutput) -> String {
    let n_attrs = output
        .point_attributes
        .first()
        .map_or(0, Vec::len);
    let has_markers = !output.point_markers.is_empty();
    let mut text = String::new();
    let _ = writeln!(
        text,
        "{} 3 {} {}",
        output.points.len(),
        n_attrs,
        u8::from(has_markers)
    );
    for (i, p) in output.points.iter().enumerate() {
        let _ = write!(text, "{} {} {} {}", i + output.first_index, p[0], p[1], p[2]);
        if let Some(attrs) = output.point_attributes.get(i) {
            for a in attrs {
                let _ = write!(text, " {a}");
            }
        }
        if has_markers {
            let _ = write!(text, " {}", output.point_markers.get(i).copied().unwrap_or(0));
        }
        text.push('\n');
    }
    text
}

/// Writes the tetrahedra as a `.ele` file.
#[must_use]
pub fn write_ele(output: &MeshOutput) -> String {
    let n_attrs = output.tet_attributes.first().map_or(0, Vec::len);
    let mut text = String::new();
    let _ = writeln!(text, "{} 4 {}", output.tetrahedra.len(), n_attrs);
    for (i, tet) in output.tetrahedra.iter().enumerate() {
        let _ = write!(text, "{}", i + output.first_index);
        for &v in tet {
            let _ = write!(text, " {}", v + output.first_index);
        }
        if let Some(attrs) = output.tet_attributes.get(i) {
            for a in attrs {
                let _ = write!(text, " {a}");
            }
        }
        text.push('\n');
    }
    text
}

/// Writes the boundary faces as a `.face` file.
#[must_use]
pub fn write_face(output: &MeshOutput) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{} 1", output.faces.len());
    for (i, (face, marker)) in output.faces.iter().enumerate() {
        let _ = writeln!(
            text,
            "{} {} {} {} {marker}",
            i + output.first_index,
            face[0] + output.first_index,
            face[1] + output.first_index,
            face[2] + output.first_index,
        );
    }
    text
}

/// Writes the edges as a `.edge` file.
#[must_use]
pub fn write_edge(output: &MeshOutput) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{} 1", output.edges.len());
    for (i, (edge, marker)) in output.edges.iter().enumerate() {
        let _ = writeln!(
            text,
            "{} {} {} {marker}",
            i + output.first_index,
            edge[0] + output.first_index,
            edge[1] + output.first_index,
        );
    }
    text
}

/// Writes the Voronoi dual vertices as a `.v.node` file: one entry per
/// finite tetrahedron, in tetrahedron order.
#[must_use]
pub fn write_voronoi_node(output: &MeshOutput) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{} 3 0 0", output.voronoi_points.len());
    for (i, p) in output.voronoi_points.iter().enumerate() {
        let _ = writeln!(
            text,
            "{} {} {} {}",
            i + output.first_index,
            p[0],
            p[1],
            p[2]
        );
    }
    text
}
