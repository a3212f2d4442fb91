//! 33-bit MPEG timestamp helpers.

use super::MPEG_CLOCK_HZ;

/// PTS/DTS fields wrap at 2^33.
pub const PTS_WRAP: i64 = 1 << 33;

pub const PTS_MASK: i64 = PTS_WRAP - 1;

/// Extends `raw` against the previous extended value, trusting only the low
/// 32 bits of the difference. Deltas within +-(2^31 - 1) survive any number
/// of 33-bit wraps.
pub fn extend(prev: i64, raw: i64) -> i64 {
    prev + (raw as i32).wrapping_sub(prev as i32) as i64
}

/// Signed distance from `b` to `a` on the 33-bit circle.
pub fn wrapped_diff(a: i64, b: i64) -> i64 {
    let d = (a - b) & PTS_MASK;
    if d >= PTS_WRAP / 2 {
        d - PTS_WRAP
    } else {
        d
    }
}

pub fn ticks_to_secs(ticks: f64) -> f64 {
    ticks / MPEG_CLOCK_HZ as f64
}

pub fn secs_to_ticks(secs: f64) -> f64 {
    secs * MPEG_CLOCK_HZ as f64
}
