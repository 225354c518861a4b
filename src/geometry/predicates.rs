//! Sign-exact geometric predicates for 3D mesh generation.
//!
//! The two load-bearing tests are [`orient3d`] and [`insphere`]. Both follow
//! the adaptive pattern: a straight floating-point evaluation guarded by a
//! static forward error bound, falling back to an exact evaluation with
//! multi-component expansions when the estimate cannot certify a sign. The
//! returned sign is exact for every finite input.
//!
//! Exact-zero results are eliminated by the symbolic perturbation wrappers
//! ([`insphere_perturbed`], [`incircle_perturbed`]): each vertex is treated as
//! perturbed by an infinitesimal keyed to its index, evaluated as a
//! lexicographic tie-break over the index order. The wrappers are
//! deterministic and antisymmetric under argument permutation, so degenerate
//! (cospherical, cocircular) inputs behave as if in general position.
//!
//! # Sign conventions
//!
//! - `orient3d(a, b, c, d)` is `POSITIVE` when `d` lies below the plane
//!   through `a`, `b`, `c`, with `a`, `b`, `c` appearing counterclockwise
//!   when viewed from above. A valid tetrahedron is stored with `POSITIVE`
//!   orientation.
//! - `insphere(a, b, c, d, e)` requires `orient3d(a, b, c, d) == POSITIVE`
//!   and is `INSIDE` when `e` lies strictly inside the circumsphere of
//!   `abcd`.
//! - `orient2d(a, b, c)` is `POSITIVE` when the triangle is counterclockwise;
//!   `incircle(a, b, c, d)` requires counterclockwise `abc`.
//!
//! # References
//!
//! - Shewchuk, J. R. "Adaptive Precision Floating-Point Arithmetic and Fast
//!   Robust Geometric Predicates." *Discrete & Computational Geometry* 18,
//!   no. 3 (1997): 305-363.
//! - Edelsbrunner, H. and Mücke, E. P. "Simulation of Simplicity."
//!   *ACM Transactions on Graphics* 9, no. 1 (1990): 66-104.

use super::expansion::{
    diff_expansion, expansion_diff, expansion_product, expansion_sign, expansion_sum,
};
use super::point::Point;

/// Machine epsilon for the error-bound formulas (`2^-53`).
const EPSILON: f64 = f64::EPSILON * 0.5;

/// Static error bound coefficient for the `orient2d` fast path.
const CCW_ERRBOUND_A: f64 = (3.0 + 16.0 * EPSILON) * EPSILON;
/// Static error bound coefficient for the `orient3d` fast path.
const O3D_ERRBOUND_A: f64 = (7.0 + 56.0 * EPSILON) * EPSILON;
/// Static error bound coefficient for the `incircle` fast path.
const ICC_ERRBOUND_A: f64 = (10.0 + 96.0 * EPSILON) * EPSILON;
/// Static error bound coefficient for the `insphere` fast path.
const ISP_ERRBOUND_A: f64 = (16.0 + 224.0 * EPSILON) * EPSILON;

/// Represents the orientation of a simplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The simplex has negative orientation (determinant < 0)
    NEGATIVE,
    /// The simplex is degenerate (determinant exactly 0)
    DEGENERATE,
    /// The simplex has positive orientation (determinant > 0)
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

impl Orientation {
    /// The orientation as `-1`, `0`, or `1`.
    #[inline]
    #[must_use]
    pub const fn sign(self) -> i32 {
        match self {
            Self::NEGATIVE => -1,
            Self::DEGENERATE => 0,
            Self::POSITIVE => 1,
        }
    }

    /// The opposite orientation; `DEGENERATE` is its own opposite.
    #[inline]
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::NEGATIVE => Self::POSITIVE,
            Self::DEGENERATE => Self::DEGENERATE,
            Self::POSITIVE => Self::NEGATIVE,
        }
    }
}

/// Represents the position of a point relative to a circumsphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSphere {
    /// The point is outside the circumsphere
    OUTSIDE,
    /// The point is exactly on the circumsphere
    BOUNDARY,
    /// The point is inside the circumsphere
    INSIDE,
}

impl std::fmt::Display for InSphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

#[inline]
fn sign_of(value: f64) -> Orientation {
    if value > 0.0 {
        Orientation::POSITIVE
    } else if value < 0.0 {
        Orientation::NEGATIVE
    } else {
        Orientation::DEGENERATE
    }
}

#[inline]
const fn sign_to_orientation(sign: i32) -> Orientation {
    if sign > 0 {
        Orientation::POSITIVE
    } else if sign < 0 {
        Orientation::NEGATIVE
    } else {
        Orientation::DEGENERATE
    }
}

// =============================================================================
// orient2d
// =============================================================================

/// 2D orientation test: `POSITIVE` when `pa`, `pb`, `pc` occur in
/// counterclockwise order, exact in sign.
#[must_use]
pub fn orient2d(pa: [f64; 2], pb: [f64; 2], pc: [f64; 2]) -> Orientation {
    let detleft = (pa[0] - pc[0]) * (pb[1] - pc[1]);
    let detright = (pa[1] - pc[1]) * (pb[0] - pc[0]);
    let det = detleft - detright;

    let detsum = if detleft > 0.0 {
        if detright <= 0.0 {
            return sign_of(det);
        }
        detleft + detright
    } else if detleft < 0.0 {
        if detright >= 0.0 {
            return sign_of(det);
        }
        -detleft - detright
    } else {
        return sign_of(det);
    };

    let errbound = CCW_ERRBOUND_A * detsum;
    if det >= errbound || -det >= errbound {
        return sign_of(det);
    }

    orient2d_exact(pa, pb, pc)
}

fn orient2d_exact(pa: [f64; 2], pb: [f64; 2], pc: [f64; 2]) -> Orientation {
    let acx = diff_expansion(pa[0], pc[0]);
    let acy = diff_expansion(pa[1], pc[1]);
    let bcx = diff_expansion(pb[0], pc[0]);
    let bcy = diff_expansion(pb[1], pc[1]);

    let left = expansion_product(&acx, &bcy);
    let right = expansion_product(&acy, &bcx);
    let det = expansion_diff(&left, &right);
    sign_to_orientation(expansion_sign(&det))
}

// =============================================================================
// orient3d
// =============================================================================

/// 3D orientation test, exact in sign.
///
/// `POSITIVE` when `pd` lies below the plane through `pa`, `pb`, `pc`
/// (counterclockwise seen from above); equivalently, when the tetrahedron
/// `abcd` has positive signed volume.
#[must_use]
pub fn orient3d(pa: &Point, pb: &Point, pc: &Point, pd: &Point) -> Orientation {
    let adx = pa.x() - pd.x();
    let bdx = pb.x() - pd.x();
    let cdx = pc.x() - pd.x();
    let ady = pa.y() - pd.y();
    let bdy = pb.y() - pd.y();
    let cdy = pc.y() - pd.y();
    let adz = pa.z() - pd.z();
    let bdz = pb.z() - pd.z();
    let cdz = pc.z() - pd.z();

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;

    let det = adz * (bdxcdy - cdxbdy) + bdz * (cdxady - adxcdy) + cdz * (adxbdy - bdxady);

    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * adz.abs()
        + (cdxady.abs() + adxcdy.abs()) * bdz.abs()
        + (adxbdy.abs() + bdxady.abs()) * cdz.abs();
    let errbound = O3D_ERRBOUND_A * permanent;
    if det > errbound || -det > errbound {
        return sign_of(det);
    }

    orient3d_exact(pa, pb, pc, pd)
}

fn orient3d_exact(pa: &Point, pb: &Point, pc: &Point, pd: &Point) -> Orientation {
    let adx = diff_expansion(pa.x(), pd.x());
    let ady = diff_expansion(pa.y(), pd.y());
    let adz = diff_expansion(pa.z(), pd.z());
    let bdx = diff_expansion(pb.x(), pd.x());
    let bdy = diff_expansion(pb.y(), pd.y());
    let bdz = diff_expansion(pb.z(), pd.z());
    let cdx = diff_expansion(pc.x(), pd.x());
    let cdy = diff_expansion(pc.y(), pd.y());
    let cdz = diff_expansion(pc.z(), pd.z());

    // det = adz (bdx cdy - cdx bdy) + bdz (cdx ady - adx cdy) + cdz (adx bdy - bdx ady)
    let bxcy = expansion_product(&bdx, &cdy);
    let cxby = expansion_product(&cdx, &bdy);
    let cxay = expansion_product(&cdx, &ady);
    let axcy = expansion_product(&adx, &cdy);
    let axby = expansion_product(&adx, &bdy);
    let bxay = expansion_product(&bdx, &ady);

    let t1 = expansion_product(&adz, &expansion_diff(&bxcy, &cxby));
    let t2 = expansion_product(&bdz, &expansion_diff(&cxay, &axcy));
    let t3 = expansion_product(&cdz, &expansion_diff(&axby, &bxay));

    let det = expansion_sum(&expansion_sum(&t1, &t2), &t3);
    sign_to_orientation(expansion_sign(&det))
}

// =============================================================================
// incircle
// =============================================================================

/// 2D incircle test, exact in sign.
///
/// Requires `orient2d(pa, pb, pc) == POSITIVE`; `INSIDE` when `pd` lies
/// strictly inside the circle through `pa`, `pb`, `pc`.
#[must_use]
pub fn incircle(pa: [f64; 2], pb: [f64; 2], pc: [f64; 2], pd: [f64; 2]) -> InSphere {
    let adx = pa[0] - pd[0];
    let ady = pa[1] - pd[1];
    let bdx = pb[0] - pd[0];
    let bdy = pb[1] - pd[1];
    let cdx = pc[0] - pd[0];
    let cdy = pc[1] - pd[1];

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let alift = adx * adx + ady * ady;

    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let blift = bdx * bdx + bdy * bdy;

    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdxcdy - cdxbdy) + blift * (cdxady - adxcdy) + clift * (adxbdy - bdxady);

    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * alift
        + (cdxady.abs() + adxcdy.abs()) * blift
        + (adxbdy.abs() + bdxady.abs()) * clift;
    let errbound = ICC_ERRBOUND_A * permanent;
    if det > errbound {
        return InSphere::INSIDE;
    }
    if -det > errbound {
        return InSphere::OUTSIDE;
    }

    incircle_exact(pa, pb, pc, pd)
}

fn incircle_exact(pa: [f64; 2], pb: [f64; 2], pc: [f64; 2], pd: [f64; 2]) -> InSphere {
    let adx = diff_expansion(pa[0], pd[0]);
    let ady = diff_expansion(pa[1], pd[1]);
    let bdx = diff_expansion(pb[0], pd[0]);
    let bdy = diff_expansion(pb[1], pd[1]);
    let cdx = diff_expansion(pc[0], pd[0]);
    let cdy = diff_expansion(pc[1], pd[1]);

    let bc = expansion_diff(
        &expansion_product(&bdx, &cdy),
        &expansion_product(&cdx, &bdy),
    );
    let ca = expansion_diff(
        &expansion_product(&cdx, &ady),
        &expansion_product(&adx, &cdy),
    );
    let ab = expansion_diff(
        &expansion_product(&adx, &bdy),
        &expansion_product(&bdx, &ady),
    );

    let alift = expansion_sum(
        &expansion_product(&adx, &adx),
        &expansion_product(&ady, &ady),
    );
    let blift = expansion_sum(
        &expansion_product(&bdx, &bdx),
        &expansion_product(&bdy, &bdy),
    );
    let clift = expansion_sum(
        &expansion_product(&cdx, &cdx),
        &expansion_product(&cdy, &cdy),
    );

    let det = expansion_sum(
        &expansion_sum(
            &expansion_product(&alift, &bc),
            &expansion_product(&blift, &ca),
        ),
        &expansion_product(&clift, &ab),
    );
    match expansion_sign(&det) {
        1 => InSphere::INSIDE,
        -1 => InSphere::OUTSIDE,
        _ => InSphere::BOUNDARY,
    }
}

// =============================================================================
// insphere
// =============================================================================

/// 3D insphere test, exact in sign.
///
/// Requires `orient3d(pa, pb, pc, pd) == POSITIVE`; `INSIDE` when `pe` lies
/// strictly inside the circumsphere of `abcd`.
#[must_use]
#[allow(clippy::too_many_lines, clippy::suboptimal_flops)]
pub fn insphere(pa: &Point, pb: &Point, pc: &Point, pd: &Point, pe: &Point) -> InSphere {
    let aex = pa.x() - pe.x();
    let bex = pb.x() - pe.x();
    let cex = pc.x() - pe.x();
    let dex = pd.x() - pe.x();
    let aey = pa.y() - pe.y();
    let bey = pb.y() - pe.y();
    let cey = pc.y() - pe.y();
    let dey = pd.y() - pe.y();
    let aez = pa.z() - pe.z();
    let bez = pb.z() - pe.z();
    let cez = pc.z() - pe.z();
    let dez = pd.z() - pe.z();

    let aexbey = aex * bey;
    let bexaey = bex * aey;
    let ab = aexbey - bexaey;
    let bexcey = bex * cey;
    let cexbey = cex * bey;
    let bc = bexcey - cexbey;
    let cexdey = cex * dey;
    let dexcey = dex * cey;
    let cd = cexdey - dexcey;
    let dexaey = dex * aey;
    let aexdey = aex * dey;
    let da = dexaey - aexdey;

    let aexcey = aex * cey;
    let cexaey = cex * aey;
    let ac = aexcey - cexaey;
    let bexdey = bex * dey;
    let dexbey = dex * bey;
    let bd = bexdey - dexbey;

    let abc = aez * bc - bez * ac + cez * ab;
    let bcd = bez * cd - cez * bd + dez * bc;
    let cda = cez * da + dez * ac + aez * cd;
    let dab = dez * ab + aez * bd + bez * da;

    let alift = aex * aex + aey * aey + aez * aez;
    let blift = bex * bex + bey * bey + bez * bez;
    let clift = cex * cex + cey * cey + cez * cez;
    let dlift = dex * dex + dey * dey + dez * dez;

    let det = (dlift * abc - clift * dab) + (blift * cda - alift * bcd);

    let aezplus = aez.abs();
    let bezplus = bez.abs();
    let cezplus = cez.abs();
    let dezplus = dez.abs();
    let permanent = ((cexdey.abs() + dexcey.abs()) * bezplus
        + (dexbey.abs() + bexdey.abs()) * cezplus
        + (bexcey.abs() + cexbey.abs()) * dezplus)
        * alift
        + ((dexaey.abs() + aexdey.abs()) * cezplus
            + (aexcey.abs() + cexaey.abs()) * dezplus
            + (cexdey.abs() + dexcey.abs()) * aezplus)
            * blift
        + ((aexbey.abs() + bexaey.abs()) * dezplus
            + (bexdey.abs() + dexbey.abs()) * aezplus
            + (dexaey.abs() + aexdey.abs()) * bezplus)
            * clift
        + ((bexcey.abs() + cexbey.abs()) * aezplus
            + (cexaey.abs() + aexcey.abs()) * bezplus
            + (aexbey.abs() + bexaey.abs()) * cezplus)
            * dlift;
    let errbound = ISP_ERRBOUND_A * permanent;
    if det > errbound {
        return InSphere::INSIDE;
    }
    if -det > errbound {
        return InSphere::OUTSIDE;
    }

    insphere_exact(pa, pb, pc, pd, pe)
}

fn insphere_exact(pa: &Point, pb: &Point, pc: &Point, pd: &Point, pe: &Point) -> InSphere {
    let aex = diff_expansion(pa.x(), pe.x());
    let aey = diff_expansion(pa.y(), pe.y());
    let aez = diff_expansion(pa.z(), pe.z());
    let bex = diff_expansion(pb.x(), pe.x());
    let bey = diff_expansion(pb.y(), pe.y());
    let bez = diff_expansion(pb.z(), pe.z());
    let cex = diff_expansion(pc.x(), pe.x());
    let cey = diff_expansion(pc.y(), pe.y());
    let cez = diff_expansion(pc.z(), pe.z());
    let dex = diff_expansion(pd.x(), pe.x());
    let dey = diff_expansion(pd.y(), pe.y());
    let dez = diff_expansion(pd.z(), pe.z());

    let cross = |ux: &[f64], uy: &[f64], vx: &[f64], vy: &[f64]| {
        expansion_diff(&expansion_product(ux, vy), &expansion_product(vx, uy))
    };

    let ab = cross(&aex, &aey, &bex, &bey);
    let bc = cross(&bex, &bey, &cex, &cey);
    let cd = cross(&cex, &cey, &dex, &dey);
    let da = cross(&dex, &dey, &aex, &aey);
    let ac = cross(&aex, &aey, &cex, &cey);
    let bd = cross(&bex, &bey, &dex, &dey);

    // abc = aez*bc - bez*ac + cez*ab, and cyclic variants.
    let abc = expansion_sum(
        &expansion_diff(
            &expansion_product(&aez, &bc),
            &expansion_product(&bez, &ac),
        ),
        &expansion_product(&cez, &ab),
    );
    let bcd = expansion_sum(
        &expansion_diff(
            &expansion_product(&bez, &cd),
            &expansion_product(&cez, &bd),
        ),
        &expansion_product(&dez, &bc),
    );
    let cda = expansion_sum(
        &expansion_sum(
            &expansion_product(&cez, &da),
            &expansion_product(&dez, &ac),
        ),
        &expansion_product(&aez, &cd),
    );
    let dab = expansion_sum(
        &expansion_sum(
            &expansion_product(&dez, &ab),
            &expansion_product(&aez, &bd),
        ),
        &expansion_product(&bez, &da),
    );

    let lift = |ex: &[f64], ey: &[f64], ez: &[f64]| {
        expansion_sum(
            &expansion_sum(&expansion_product(ex, ex), &expansion_product(ey, ey)),
            &expansion_product(ez, ez),
        )
    };
    let alift = lift(&aex, &aey, &aez);
    let blift = lift(&bex, &bey, &bez);
    let clift = lift(&cex, &cey, &cez);
    let dlift = lift(&dex, &dey, &dez);

    let det = expansion_sum(
        &expansion_diff(
            &expansion_product(&dlift, &abc),
            &expansion_product(&clift, &dab),
        ),
        &expansion_diff(
            &expansion_product(&blift, &cda),
            &expansion_product(&alift, &bcd),
        ),
    );
    match expansion_sign(&det) {
        1 => InSphere::INSIDE,
        -1 => InSphere::OUTSIDE,
        _ => InSphere::BOUNDARY,
    }
}

// =============================================================================
// Symbolic perturbation
// =============================================================================

/// Insphere test that never returns `BOUNDARY` for five distinct points.
///
/// When the exact test is zero, each vertex is treated as perturbed by an
/// infinitesimal keyed to its index (smaller index, larger perturbation of the
/// lifted coordinate). The tie-break reduces to at most two `orient3d`
/// evaluations on the index-sorted arguments, corrected by the sort parity,
/// which makes the result deterministic and antisymmetric under any
/// permutation of the arguments.
///
/// Requires `orient3d(a, b, c, d) == POSITIVE`, like [`insphere`].
#[must_use]
pub fn insphere_perturbed(
    pa: (&Point, usize),
    pb: (&Point, usize),
    pc: (&Point, usize),
    pd: (&Point, usize),
    pe: (&Point, usize),
) -> InSphere {
    match insphere(pa.0, pb.0, pc.0, pd.0, pe.0) {
        InSphere::BOUNDARY => {}
        definite => return definite,
    }

    let mut pt = [pa, pb, pc, pd, pe];
    let swaps = sort_by_index(&mut pt);

    let mut sign = orient3d(pt[1].0, pt[2].0, pt[3].0, pt[4].0).sign();
    if sign == 0 {
        sign = -orient3d(pt[0].0, pt[2].0, pt[3].0, pt[4].0).sign();
    }
    if swaps % 2 == 1 {
        sign = -sign;
    }
    match sign {
        1 => InSphere::INSIDE,
        -1 => InSphere::OUTSIDE,
        // Five points in a common 2-flat: only possible with coincident or
        // fully degenerate input, which the loaders reject.
        _ => InSphere::BOUNDARY,
    }
}

/// Incircle test in the plane that never returns `BOUNDARY` for four distinct
/// points, via the same index-keyed perturbation as [`insphere_perturbed`].
///
/// Requires `orient2d(a, b, c) == POSITIVE`.
#[must_use]
pub fn incircle_perturbed(
    pa: ([f64; 2], usize),
    pb: ([f64; 2], usize),
    pc: ([f64; 2], usize),
    pd: ([f64; 2], usize),
) -> InSphere {
    match incircle(pa.0, pb.0, pc.0, pd.0) {
        InSphere::BOUNDARY => {}
        definite => return definite,
    }

    let mut pt = [pa, pb, pc, pd];
    let swaps = sort_by_index(&mut pt);

    let mut sign = -orient2d(pt[1].0, pt[2].0, pt[3].0).sign();
    if sign == 0 {
        sign = orient2d(pt[0].0, pt[2].0, pt[3].0).sign();
    }
    if swaps % 2 == 1 {
        sign = -sign;
    }
    match sign {
        1 => InSphere::INSIDE,
        -1 => InSphere::OUTSIDE,
        _ => InSphere::BOUNDARY,
    }
}

/// Bubble sort by the index component, returning the number of swaps.
/// Counting parity is what makes the perturbed predicates antisymmetric.
fn sort_by_index<T>(items: &mut [(T, usize)]) -> usize {
    let mut swaps = 0;
    let n = items.len();
    for pass in 0..n {
        for j in 0..n - 1 - pass {
            if items[j].1 > items[j + 1].1 {
                items.swap(j, j + 1);
                swaps += 1;
            }
        }
    }
    swaps
}
