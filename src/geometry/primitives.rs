//! Derived geometric quantities for tetrahedra and triangles.
//!
//! Unlike [`crate::geometry::predicates`], nothing here is exact: these are
//! ordinary floating-point computations used for quality measures, Steiner
//! point placement, and output (circumcenters, volumes, angles). Topological
//! decisions are never made from these values alone.

use nalgebra::{Matrix3, Vector3};

use super::point::Point;
use super::predicates::{orient3d, Orientation};

/// Signed volume of the tetrahedron `abcd`.
///
/// Positive exactly when `orient3d(a, b, c, d)` is `POSITIVE` (up to
/// round-off), so a valid mesh cell always reports a positive volume.
#[must_use]
pub fn signed_volume(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    let ad = a.to_vector() - d.to_vector();
    let bd = b.to_vector() - d.to_vector();
    let cd = c.to_vector() - d.to_vector();
    Matrix3::from_columns(&[ad, bd, cd]).determinant() / 6.0
}

/// Unsigned volume of the tetrahedron `abcd`.
#[inline]
#[must_use]
pub fn volume(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    signed_volume(a, b, c, d).abs()
}

/// Circumcenter and circumradius of the tetrahedron `abcd`.
///
/// For a degenerate (near-flat) tetrahedron the linear system is singular;
/// the fallback is the centroid paired with the largest centroid-to-vertex
/// distance, which keeps refinement making progress instead of emitting
/// non-finite coordinates.
#[must_use]
pub fn circumsphere(a: &Point, b: &Point, c: &Point, d: &Point) -> (Point, f64) {
    let av = a.to_vector();
    let bv = b.to_vector() - av;
    let cv = c.to_vector() - av;
    let dv = d.to_vector() - av;

    // 2 (p - a) . v = |v|^2 for each edge vector v out of a.
    let m = Matrix3::from_rows(&[
        (2.0 * bv).transpose(),
        (2.0 * cv).transpose(),
        (2.0 * dv).transpose(),
    ]);
    let rhs = Vector3::new(bv.norm_squared(), cv.norm_squared(), dv.norm_squared());

    if let Some(rel) = m.lu().solve(&rhs) {
        let radius = rel.norm();
        if radius.is_finite() {
            let center = av + rel;
            return (Point::new([center.x, center.y, center.z]), radius);
        }
    }

    let center = Point::centroid(&[*a, *b, *c, *d]);
    let radius = [a, b, c, d]
        .iter()
        .map(|p| center.distance(p))
        .fold(0.0_f64, f64::max);
    (center, radius)
}

/// Circumcenter and circumradius of the triangle `abc` in 3D.
///
/// Falls back to centroid + max distance when the triangle is degenerate.
#[must_use]
pub fn triangle_circumcircle(a: &Point, b: &Point, c: &Point) -> (Point, f64) {
    let av = a.to_vector();
    let ab = b.to_vector() - av;
    let ac = c.to_vector() - av;
    let n = ab.cross(&ac);

    let denom = 2.0 * n.norm_squared();
    if denom > f64::MIN_POSITIVE {
        let rel =
            (ac.norm_squared() * n.cross(&ab) + ab.norm_squared() * ac.cross(&n)) / denom;
        let radius = rel.norm();
        if radius.is_finite() {
            let center = av + rel;
            return (Point::new([center.x, center.y, center.z]), radius);
        }
    }

    let center = Point::centroid(&[*a, *b, *c]);
    let radius = [a, b, c]
        .iter()
        .map(|p| center.distance(p))
        .fold(0.0_f64, f64::max);
    (center, radius)
}

/// Area of the triangle `abc` in 3D.
#[must_use]
pub fn triangle_area(a: &Point, b: &Point, c: &Point) -> f64 {
    let ab = b.to_vector() - a.to_vector();
    let ac = c.to_vector() - a.to_vector();
    0.5 * ab.cross(&ac).norm()
}

/// The six edge lengths of the tetrahedron `abcd`, in the fixed order
/// `ab, ac, ad, bc, bd, cd`.
#[must_use]
pub fn edge_lengths(a: &Point, b: &Point, c: &Point, d: &Point) -> [f64; 6] {
    [
        a.distance(b),
        a.distance(c),
        a.distance(d),
        b.distance(c),
        b.distance(d),
        c.distance(d),
    ]
}

/// Shortest edge length of the tetrahedron `abcd`.
#[must_use]
pub fn shortest_edge(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    edge_lengths(a, b, c, d)
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

/// Longest edge length of the tetrahedron `abcd`.
#[must_use]
pub fn longest_edge(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    edge_lengths(a, b, c, d).into_iter().fold(0.0, f64::max)
}

/// Radius-edge ratio of the tetrahedron `abcd`: circumradius divided by
/// shortest edge length.
///
/// This is the aspect ratio driven down by refinement; a regular tetrahedron
/// scores `sqrt(3/8) ≈ 0.612`, slivers score arbitrarily high. Returns
/// `f64::INFINITY` for a tetrahedron with a zero-length edge.
#[must_use]
pub fn radius_edge_ratio(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    let (_, circumradius) = circumsphere(a, b, c, d);
    let min_edge = shortest_edge(a, b, c, d);
    if min_edge <= 0.0 {
        return f64::INFINITY;
    }
    circumradius / min_edge
}

/// Dihedral angle (in degrees) along edge `ab`, between faces `abc` and `abd`.
#[must_use]
pub fn dihedral_angle(a: &Point, b: &Point, c: &Point, d: &Point) -> f64 {
    let edge = b.to_vector() - a.to_vector();
    let edge_norm = edge.norm();
    if edge_norm <= f64::MIN_POSITIVE {
        return 0.0;
    }
    let edge = edge / edge_norm;

    let perp = |p: &Point| {
        let v = p.to_vector() - a.to_vector();
        v - v.dot(&edge) * edge
    };
    let v1 = perp(c);
    let v2 = perp(d);
    let (n1, n2) = (v1.norm(), v2.norm());
    if n1 <= f64::MIN_POSITIVE || n2 <= f64::MIN_POSITIVE {
        return 0.0;
    }
    let cos_angle = (v1.dot(&v2) / (n1 * n2)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// The six dihedral angles of the tetrahedron `abcd`, in degrees.
///
/// One angle per edge, ordered `ab, ac, ad, bc, bd, cd`.
#[must_use]
pub fn dihedral_angles(a: &Point, b: &Point, c: &Point, d: &Point) -> [f64; 6] {
    [
        dihedral_angle(a, b, c, d),
        dihedral_angle(a, c, b, d),
        dihedral_angle(a, d, b, c),
        dihedral_angle(b, c, a, d),
        dihedral_angle(b, d, a, c),
        dihedral_angle(c, d, a, b),
    ]
}

/// Point-in-tetrahedron test by four orientation tests.
///
/// Requires `orient3d(a, b, c, d) == POSITIVE`. Boundary points count as
/// inside.
#[must_use]
pub fn point_in_tetrahedron(p: &Point, a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    // One test per face, each face ordered so the opposite vertex is on the
    // positive side.
    orient3d(b, d, c, p) != Orientation::NEGATIVE
        && orient3d(a, c, d, p) != Orientation::NEGATIVE
        && orient3d(a, d, b, p) != Orientation::NEGATIVE
        && orient3d(a, b, c, p) != Orientation::NEGATIVE
}

/// `true` when `p` lies strictly inside the diametral sphere of the segment
/// `uv`, the smallest sphere through both endpoints.
///
/// This is the protection region of a boundary segment: a candidate Steiner
/// point inside it *encroaches* on the segment.
#[must_use]
pub fn encroaches_segment(p: &Point, u: &Point, v: &Point) -> bool {
    let center = Point::midpoint(u, v);
    let radius_sq = 0.25 * u.distance_squared(v);
    center.distance_squared(p) < radius_sq * (1.0 - 1e-12)
}

/// `true` when `p` lies strictly inside the diametral (equatorial) sphere of
/// the triangle `abc`, the smallest sphere through its circumcircle.
#[must_use]
pub fn encroaches_triangle(p: &Point, a: &Point, b: &Point, c: &Point) -> bool {
    let (center, radius) = triangle_circumcircle(a, b, c);
    center.distance_squared(p) < radius * radius * (1.0 - 1e-12)
}

/// Index of the coordinate axis most aligned with the normal of triangle
/// `abc`, used to project near-planar configurations to 2D.
#[must_use]
pub fn dominant_axis(a: &Point, b: &Point, c: &Point) -> usize {
    let n = (b.to_vector() - a.to_vector()).cross(&(c.to_vector() - a.to_vector()));
    let (nx, ny, nz) = (n.x.abs(), n.y.abs(), n.z.abs());
    if nx >= ny && nx >= nz {
        0
    } else if ny >= nz {
        1
    } else {
        2
    }
}

/// Drop coordinate `axis`, projecting a 3D point to 2D.
#[inline]
#[must_use]
pub fn project_away(p: &Point, axis: usize) -> [f64; 2] {
    match axis {
        0 => [p.y(), p.z()],
        1 => [p.z(), p.x()],
        _ => [p.x(), p.y()],
    }
}
