//! The behavior record: every switch and numeric parameter of a
//! tetrahedralization run.
//!
//! A [`Behavior`] is configured either programmatically (via
//! [`BehaviorBuilder`]) or by parsing a TetGen-style concatenated switch
//! string such as `"pq1.414a0.1V"`. It is read-only for the duration of a
//! `tetrahedralize` call and passed by reference, never stored globally.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed switch string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwitchParseError {
    /// A switch character the kernel does not implement.
    #[error("unknown or unsupported switch '{switch}'")]
    UnknownSwitch {
        /// The offending character.
        switch: char,
    },

    /// A numeric argument that did not parse.
    #[error("invalid numeric argument '{value}' for switch '{switch}'")]
    InvalidNumber {
        /// The switch the argument belongs to.
        switch: char,
        /// The unparsable text.
        value: String,
    },
}

/// Configuration for one tetrahedralization run.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Behavior {
    /// `-p`: treat the input as a PLC and recover its segments and facets.
    pub plc: bool,
    /// `-q`: quality refinement.
    pub quality: bool,
    /// Radius-edge ratio bound enforced by refinement (`-q<ratio>`).
    pub min_ratio: f64,
    /// `-a`: impose maximum tetrahedron volumes.
    pub var_volume: bool,
    /// A global maximum volume (`-a<vol>`); per-region bounds otherwise.
    pub max_volume: Option<f64>,
    /// `-A`: write region attributes onto output tetrahedra.
    pub region_attributes: bool,
    /// `-r`: refine an existing mesh given as .node + .ele.
    pub refine: bool,
    /// `-i`: insert additional points from a secondary .node file.
    pub insert_points: bool,
    /// `-c`: keep the convex hull instead of carving out exterior cells.
    pub convex: bool,
    /// `-D`: conforming Delaunay (encroached constraint splitting even
    /// without `-q`).
    pub conforming: bool,
    /// `-f`: emit boundary faces.
    pub faces_out: bool,
    /// `-e`: emit edges.
    pub edges_out: bool,
    /// `-v`: emit the Voronoi dual vertices.
    pub voronoi_out: bool,
    /// `-z`: number output items from zero.
    pub zero_index: bool,
    /// `-Q`: quiet.
    pub quiet: bool,
    /// `-V`: verbose.
    pub verbose: bool,
    /// `-Y`: do not split boundary segments.
    pub no_bisect: bool,
    /// `-S<n>`: Steiner point budget for constraint recovery.
    pub steiner_budget: usize,
    /// `-T<tol>`: coplanarity tolerance for PLC facet validation.
    pub plc_tolerance: f64,
    /// Step limit for the refinement loop.
    pub refine_step_limit: usize,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            plc: false,
            quality: false,
            min_ratio: 2.0,
            var_volume: false,
            max_volume: None,
            region_attributes: false,
            refine: false,
            insert_points: false,
            convex: false,
            conforming: false,
            faces_out: false,
            edges_out: false,
            voronoi_out: false,
            zero_index: false,
            quiet: false,
            verbose: false,
            no_bisect: false,
            steiner_budget: 10_000,
            plc_tolerance: 1e-8,
            refine_step_limit: 1_000_000,
        }
    }
}

impl Behavior {
    /// Parses a concatenated switch string, e.g. `"pq1.414a0.1V"`.
    ///
    /// A leading dash is tolerated. Switch letters of the original tool that
    /// fall outside this kernel's scope (`o2`, `g`, `G`, `O`, `R`, `w`,
    /// `m`, `d`) are rejected rather than silently ignored.
    ///
    /// # Errors
    ///
    /// [`SwitchParseError`] on unknown switches or malformed numbers.
    pub fn parse(switches: &str) -> Result<Self, SwitchParseError> {
        let mut behavior = Self::default();
        let chars: Vec<char> = switches.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let switch = chars[i];
            i += 1;
            match switch {
                '-' => {}
                'p' => behavior.plc = true,
                'q' => {
                    behavior.quality = true;
                    if let Some(value) = take_number(&chars, &mut i) {
                        behavior.min_ratio = parse_number(switch, &value)?;
                    }
                }
                'a' => {
                    behavior.var_volume = true;
                    if let Some(value) = take_number(&chars, &mut i) {
                        behavior.max_volume = Some(parse_number(switch, &value)?);
                    }
                }
                'A' => behavior.region_attributes = true,
                'r' => behavior.refine = true,
                'i' => behavior.insert_points = true,
                'c' => behavior.convex = true,
                'D' => behavior.conforming = true,
                'f' => behavior.faces_out = true,
                'e' => behavior.edges_out = true,
                'v' => behavior.voronoi_out = true,
                'z' => behavior.zero_index = true,
                'Q' => behavior.quiet = true,
                'V' => behavior.verbose = true,
                'Y' => {
                    behavior.no_bisect = true;
                    // Swallow an optional level digit (Y0, Y1, ...).
                    if i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                'S' => {
                    let value = take_number(&chars, &mut i).unwrap_or_default();
                    let parsed: f64 = parse_number(switch, &value)?;
                    if parsed < 0.0 || parsed.fract() != 0.0 {
                        return Err(SwitchParseError::InvalidNumber {
                            switch,
                            value,
                        });
                    }
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        behavior.steiner_budget = parsed as usize;
                    }
                }
                'T' => {
                    let value = take_number(&chars, &mut i).unwrap_or_default();
                    behavior.plc_tolerance = parse_number(switch, &value)?;
                }
                other => return Err(SwitchParseError::UnknownSwitch { switch: other }),
            }
        }
        Ok(behavior)
    }

    /// Reconstructs a switch string equivalent to this behavior.
    #[must_use]
    #[allow(clippy::cognitive_complexity)]
    pub fn switches(&self) -> String {
        use std::fmt::Write;

        let defaults = Self::default();
        let mut out = String::new();
        if self.plc {
            out.push('p');
        }
        if self.refine {
            out.push('r');
        }
        if self.quality {
            out.push('q');
            if (self.min_ratio - defaults.min_ratio).abs() > f64::EPSILON {
                let _ = write!(out, "{}", self.min_ratio);
            }
        }
        if self.var_volume {
            out.push('a');
            if let Some(volume) = self.max_volume {
                let _ = write!(out, "{volume}");
            }
        }
        if self.region_attributes {
            out.push('A');
        }
        if self.conforming {
            out.push('D');
        }
        if self.insert_points {
            out.push('i');
        }
        if self.convex {
            out.push('c');
        }
        if self.zero_index {
            out.push('z');
        }
        if self.faces_out {
            out.push('f');
        }
        if self.edges_out {
            out.push('e');
        }
        if self.voronoi_out {
            out.push('v');
        }
        if self.quiet {
            out.push('Q');
        }
        if self.verbose {
            out.push('V');
        }
        if self.no_bisect {
            out.push('Y');
        }
        if self.steiner_budget != defaults.steiner_budget {
            let _ = write!(out, "S{}", self.steiner_budget);
        }
        if (self.plc_tolerance - defaults.plc_tolerance).abs() > f64::EPSILON {
            let _ = write!(out, "T{}", self.plc_tolerance);
        }
        out
    }

    /// The effective volume bound for a tetrahedron carrying an optional
    /// per-region bound.
    #[must_use]
    pub fn volume_bound(&self, region_bound: Option<f64>) -> Option<f64> {
        if !self.var_volume {
            return None;
        }
        match (self.max_volume, region_bound) {
            (Some(global), Some(region)) => Some(global.min(region)),
            (Some(global), None) => Some(global),
            (None, region) => region,
        }
    }
}

/// Consume the longest numeric-literal prefix at `*i`.
fn take_number(chars: &[char], i: &mut usize) -> Option<String> {
    let start = *i;
    while *i < chars.len() {
        let c = chars[*i];
        if c.is_ascii_digit() || c == '.' {
            *i += 1;
        } else if (c == 'e' || c == 'E' || c == '+' || c == '-') && *i > start {
            // Exponent characters only inside a literal, never leading.
            *i += 1;
        } else {
            break;
        }
    }
    (*i > start).then(|| chars[start..*i].iter().collect())
}

fn parse_number(switch: char, value: &str) -> Result<f64, SwitchParseError> {
    value
        .parse()
        .map_err(|_| SwitchParseError::InvalidNumber {
            switch,
            value: value.to_string(),
        })
}
