use num_traits::Float;

use crate::{Kbn, StatsError, StatsResult};

/// Checks that two parallel slices have the same length
///
/// # Arguments
///
/// * `what` - Name of the slice pair, used in the error
/// * `expected` - Length of the reference slice
/// * `actual` - Length of the paired slice
///
/// # Returns
///
/// * `StatsResult<()>` - `LengthMismatch` if the lengths differ
#[inline]
pub fn ensure_same_len(what: &'static str, expected: usize, actual: usize) -> StatsResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StatsError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Linear interpolation between `a` and `b`
///
/// # Arguments
///
/// * `a` - Value at `t = 0`
/// * `b` - Value at `t = 1`
/// * `t` - Position between the two values
///
/// # Returns
///
/// * `T` - The interpolated value
#[inline]
pub fn lerp<T: Float>(a: T, b: T, t: T) -> T {
    a + t * (b - a)
}

/// Returns the first index whose element is not less than `x`
///
/// # Arguments
///
/// * `ss` - A slice sorted in non-decreasing order
/// * `x` - The probe value
///
/// # Returns
///
/// * `usize` - Index in `0..=ss.len()`
#[inline]
pub fn bisect<T: PartialOrd>(ss: &[T], x: &T) -> usize {
    ss.partition_point(|v| v < x)
}

/// Scales `weights` in place so that they sum to one
///
/// Leaves the slice untouched when the sum is zero.
pub fn normalize_l1(weights: &mut [f64]) {
    let mut norm = Kbn::<f64>::default();
    for w in weights.iter() {
        norm += w.abs();
    }
    let norm = norm.total();
    if norm > 0.0 {
        weights.iter_mut().for_each(|w| *w /= norm);
    }
}

/// Compensated dot product of two equally long slices
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = Kbn::<f64>::default();
    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum.total()
}
