//! Hilbert-curve ordering and biased randomized insertion order (BRIO).
//!
//! Bulk Delaunay construction inserts points in BRIO order: a random
//! permutation is split into rounds of geometrically increasing size, and
//! each round is sorted along a Hilbert space-filling curve. Successive
//! insertions then land near each other, which keeps point-location walks
//! short. Correctness never depends on the order, only performance does,
//! but the shuffle is seeded so that reruns are bit-identical.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::geometry::point::Point;

/// Bits of Hilbert resolution per axis; `3 * 16 = 48` index bits fit a `u64`.
const HILBERT_BITS: u32 = 16;

/// Rounds smaller than this are merged into the first round.
const MIN_ROUND: usize = 64;

/// Quantize a point into the integer grid `[0, 2^bits)^3` over `bounds`.
fn quantize(p: &Point, bounds: &([f64; 3], [f64; 3]), bits: u32) -> [u32; 3] {
    let max_val = (1_u32 << bits) - 1;
    let mut q = [0_u32; 3];
    for axis in 0..3 {
        let extent = bounds.1[axis] - bounds.0[axis];
        let t = if extent > 0.0 {
            ((p.coords()[axis] - bounds.0[axis]) / extent).clamp(0.0, 1.0)
        } else {
            0.0
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (t * f64::from(max_val)) as u32;
        q[axis] = scaled.min(max_val);
    }
    q
}

/// Map quantized 3D grid coordinates to a Hilbert index.
///
/// Skilling's transpose algorithm: undo the rotations top-down, Gray-decode,
/// then interleave the bits.
fn hilbert_index_from_quantized(coords: [u32; 3], bits: u32) -> u64 {
    let mut x = coords;

    // Step 1: transform into transposed Hilbert form.
    let mut bit_mask: u32 = 1 << (bits - 1);
    while bit_mask > 1 {
        let mask_minus_one = bit_mask - 1;
        for i in 0..3 {
            if x[i] & bit_mask != 0 {
                x[0] ^= mask_minus_one;
            } else {
                let toggle = (x[0] ^ x[i]) & mask_minus_one;
                x[0] ^= toggle;
                x[i] ^= toggle;
            }
        }
        bit_mask >>= 1;
    }

    // Step 2: Gray encode.
    for i in 1..3 {
        x[i] ^= x[i - 1];
    }
    let mut gray_mask: u32 = 0;
    bit_mask = 1 << (bits - 1);
    while bit_mask > 1 {
        if x[2] & bit_mask != 0 {
            gray_mask ^= bit_mask - 1;
        }
        bit_mask >>= 1;
    }
    for c in &mut x {
        *c ^= gray_mask;
    }

    // Step 3: interleave into the final index.
    let mut index: u64 = 0;
    for bit_pos in (0..bits).rev() {
        for &c in &x {
            index = (index << 1) | u64::from((c >> bit_pos) & 1);
        }
    }
    index
}

/// Hilbert index of a point over the given bounding box.
#[must_use]
pub fn hilbert_index(p: &Point, bounds: &([f64; 3], [f64; 3])) -> u64 {
    hilbert_index_from_quantized(quantize(p, bounds, HILBERT_BITS), HILBERT_BITS)
}

/// The axis-aligned bounding box of a point set.
#[must_use]
pub fn bounding_box(points: impl Iterator<Item = Point>) -> ([f64; 3], [f64; 3]) {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for p in points {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(p.coords()[axis]);
            hi[axis] = hi[axis].max(p.coords()[axis]);
        }
    }
    (lo, hi)
}

/// Reorder `items` into BRIO order: seeded shuffle, geometric rounds,
/// Hilbert sort within each round.
///
/// The same `seed` always yields the same order for the same input.
pub fn brio_order<T>(items: &mut [T], coords_of: impl Fn(&T) -> Point, seed: u64) {
    let n = items.len();
    if n <= MIN_ROUND {
        let bounds = bounding_box(items.iter().map(&coords_of));
        items.sort_by_key(|item| hilbert_index(&coords_of(item), &bounds));
        return;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    // Round boundaries by repeated halving from the full set: the prefix
    // rounds are small and inserted first.
    let mut boundaries = vec![n];
    let mut size = n / 2;
    while size >= MIN_ROUND {
        boundaries.push(size);
        size /= 2;
    }
    boundaries.reverse(); // increasing prefix sizes

    let bounds = bounding_box(items.iter().map(&coords_of));
    let mut start = 0;
    for &end in &boundaries {
        items[start..end].sort_by_key(|item| hilbert_index(&coords_of(item), &bounds));
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hilbert_indices_distinguish_corners() {
        let bounds = ([0.0; 3], [1.0; 3]);
        let origin = hilbert_index(&Point::new([0.0, 0.0, 0.0]), &bounds);
        let corner = hilbert_index(&Point::new([1.0, 1.0, 1.0]), &bounds);
        let center = hilbert_index(&Point::new([0.5, 0.5, 0.5]), &bounds);
        assert_eq!(origin, 0);
        assert_ne!(origin, corner);
        assert_ne!(center, corner);
    }

    #[test]
    fn hilbert_curve_is_continuous_on_coarse_grid() {
        // Successive indices must map to face-adjacent grid cells.
        let bits = 3;
        let n = 1_u32 << bits;
        let mut cells: Vec<([u32; 3], u64)> = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    cells.push(([x, y, z], hilbert_index_from_quantized([x, y, z], bits)));
                }
            }
        }
        cells.sort_by_key(|(_, idx)| *idx);
        for (i, (_, idx)) in cells.iter().enumerate() {
            assert_eq!(*idx, i as u64, "indices must form a permutation");
        }
        for window in cells.windows(2) {
            let (a, b) = (window[0].0, window[1].0);
            let manhattan: u32 = (0..3).map(|i| a[i].abs_diff(b[i])).sum();
            assert_eq!(manhattan, 1, "non-adjacent step: {a:?} -> {b:?}");
        }
    }

    #[test]
    fn brio_is_deterministic() {
        let mut a: Vec<Point> = (0..500)
            .map(|i| {
                let f = f64::from(i);
                Point::new([f.sin(), (2.0 * f).cos(), (0.1 * f).sin()])
            })
            .collect();
        let mut b = a.clone();
        brio_order(&mut a, |p| *p, 42);
        brio_order(&mut b, |p| *p, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn brio_is_a_permutation() {
        let original: Vec<Point> = (0..300)
            .map(|i| {
                let f = f64::from(i);
                Point::new([f.cos(), f.sin(), f.sqrt()])
            })
            .collect();
        let mut shuffled = original.clone();
        brio_order(&mut shuffled, |p| *p, 7);
        let mut sorted_a = original;
        let mut sorted_b = shuffled;
        let key = |p: &Point| {
            (
                ordered_float::OrderedFloat(p.x()),
                ordered_float::OrderedFloat(p.y()),
                ordered_float::OrderedFloat(p.z()),
            )
        };
        sorted_a.sort_by_key(key);
        sorted_b.sort_by_key(key);
        assert_eq!(sorted_a, sorted_b);
    }

    #[test]
    fn small_sets_are_hilbert_sorted() {
        let mut pts = vec![
            Point::new([0.9, 0.9, 0.9]),
            Point::new([0.0, 0.0, 0.0]),
            Point::new([0.5, 0.5, 0.5]),
        ];
        brio_order(&mut pts, |p| *p, 1);
        assert_eq!(pts[0], Point::new([0.0, 0.0, 0.0]));
    }
}
