//! Size policy for value segments

use crate::config::GROWTH_FACTOR;

/// Smallest segment size able to hold `length` bytes.
///
/// Starts at one byte and grows geometrically by [`GROWTH_FACTOR`], rounding
/// up each step, so the result is always positive and at least `length`.
pub fn calculate_segment_size(length: usize) -> usize {
    let mut size: usize = 1;
    while size < length {
        size = (size as f64 * GROWTH_FACTOR).ceil() as usize;
    }
    size
}
