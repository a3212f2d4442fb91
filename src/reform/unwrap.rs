//! Timestamp unwrapping and data PTS construction.

use log::warn;

use crate::av::timestamp::{extend, ticks_to_secs};
use crate::diagnostics::{Counter, Diagnostics};

/// Turns one series of raw 33-bit timestamps into a continuous 64-bit one.
///
/// The series starts from `seed`, an already extended value that `raw[0]`
/// is extended against, so several series can share one reference. Unknown
/// values (-1) repeat the previous extended value.
pub fn unwrap_series(
    raw: &[i64],
    seed: i64,
    max_backward_ticks: i64,
    name: &str,
    diag: &mut Diagnostics,
) -> Vec<i64> {
    let mut out = Vec::with_capacity(raw.len());
    let mut prev = seed;
    for (i, &value) in raw.iter().enumerate() {
        if value < 0 {
            diag.incr(Counter::UnknownPts);
            out.push(prev);
            continue;
        }
        let cur = extend(prev, value);
        if i > 0 && prev - cur > max_backward_ticks {
            warn!(
                "{} timestamp jumps back {:.1}s at index {}",
                name,
                ticks_to_secs((prev - cur) as f64),
                i
            );
            diag.incr(Counter::NonContinuousPts);
        }
        out.push(cur);
        prev = cur;
    }
    out
}

/// First known value of a raw series.
pub fn first_known(raw: &[i64]) -> Option<i64> {
    raw.iter().copied().find(|&v| v >= 0)
}

/// Running minimum from the end: a non-decreasing lower bound of the
/// presentation time at every decode position.
pub fn data_pts(pts: &[i64]) -> Vec<i64> {
    let mut out = vec![0; pts.len()];
    let mut min = i64::MAX;
    for (i, &p) in pts.iter().enumerate().rev() {
        min = min.min(p);
        out[i] = min;
    }
    out
}

/// Extended timelines of every series in a recording.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub video_pts: Vec<i64>,
    pub video_dts: Vec<i64>,
    pub audio_pts: Vec<i64>,
    pub caption_pts: Vec<i64>,
    pub anchor_pts: Vec<i64>,
    pub data_pts: Vec<i64>,
    pub first_pts: i64,
    /// One past the last presentation time.
    pub end_pts: i64,
}

impl Timeline {
    /// Unwraps all series against the first known video PTS.
    ///
    /// Returns `None` when no video frame carries a timestamp.
    pub fn build(
        video_pts: &[i64],
        video_dts: &[i64],
        audio_pts: &[i64],
        caption_pts: &[i64],
        anchor_pts: &[i64],
        max_backward_ticks: i64,
        diag: &mut Diagnostics,
    ) -> Option<Self> {
        let origin = first_known(video_pts)?;
        let video = unwrap_series(video_pts, origin, max_backward_ticks, "video", diag);
        // dts defaults to pts when a parser could not tell them apart
        let dts_seed = first_known(video_dts).map_or(origin, |d| extend(origin, d));
        let dts = unwrap_series(video_dts, dts_seed, max_backward_ticks, "video dts", diag);
        let seed_of = |raw: &[i64]| first_known(raw).map_or(origin, |v| extend(origin, v));
        let audio = unwrap_series(audio_pts, seed_of(audio_pts), max_backward_ticks, "audio", diag);
        let captions = unwrap_series(
            caption_pts,
            seed_of(caption_pts),
            max_backward_ticks,
            "caption",
            diag,
        );
        // anchors come from the transport clock and legitimately jump
        let anchors = unwrap_series(anchor_pts, seed_of(anchor_pts), i64::MAX, "anchor", diag);

        let data = data_pts(&video);
        let first_pts = data.first().copied().unwrap_or(origin);
        let end_pts = video.iter().copied().max().unwrap_or(origin) + 1;
        Some(Self {
            video_pts: video,
            video_dts: dts,
            audio_pts: audio,
            caption_pts: captions,
            anchor_pts: anchors,
            data_pts: data,
            first_pts,
            end_pts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::timestamp::{PTS_MASK, PTS_WRAP};
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    const MAX_BACK: i64 = 60 * 90_000;

    #[test]
    fn test_unwrap_across_wrap() {
        let raw = [PTS_WRAP - 3003, PTS_WRAP - 1, 3002, 6005];
        let mut diag = Diagnostics::new();
        let out = unwrap_series(&raw, raw[0], MAX_BACK, "video", &mut diag);
        assert_eq!(
            out,
            vec![PTS_WRAP - 3003, PTS_WRAP - 1, PTS_WRAP + 3002, PTS_WRAP + 6005]
        );
        assert!(diag.is_clean());
    }

    #[test]
    fn test_unknown_and_backward_jumps() {
        let mut diag = Diagnostics::new();
        let raw = [90_000 * 100, -1, 90_000 * 101, 90_000 * 20];
        let out = unwrap_series(&raw, raw[0], MAX_BACK, "video", &mut diag);
        assert_eq!(out[1], out[0]);
        assert_eq!(out[3], 90_000 * 20);
        assert_eq!(diag.get(Counter::UnknownPts), 1);
        assert_eq!(diag.get(Counter::NonContinuousPts), 1);
    }

    #[test]
    fn test_data_pts_is_running_minimum() {
        let pts = [3003, 12012, 6006, 9009, 21021, 15015, 18018];
        assert_eq!(
            data_pts(&pts),
            vec![3003, 6006, 6006, 9009, 15015, 15015, 18018]
        );
    }

    #[test]
    fn test_series_share_reference() {
        let mut diag = Diagnostics::new();
        let video = [PTS_WRAP - 9000, PTS_WRAP - 6000];
        // audio already wrapped when the first video frame is seen
        let audio = [1000, 2920];
        let timeline = Timeline::build(&video, &video, &audio, &[], &[], MAX_BACK, &mut diag).unwrap();
        assert_eq!(timeline.audio_pts, vec![PTS_WRAP + 1000, PTS_WRAP + 2920]);
        assert_eq!(timeline.first_pts, PTS_WRAP - 9000);
        assert_eq!(timeline.end_pts, PTS_WRAP - 5999);
        assert!(Timeline::build(&[-1], &[-1], &[], &[], &[], MAX_BACK, &mut diag).is_none());
    }

    #[quickcheck]
    fn prop_unwrap_is_offset_of_truth(start: u32, deltas: Vec<i32>) -> bool {
        let mut truth = vec![start as i64];
        for d in &deltas {
            let last = *truth.last().unwrap_or(&0);
            truth.push(last + (*d as i64).clamp(-(i32::MAX as i64), i32::MAX as i64));
        }
        let raw: Vec<i64> = truth.iter().map(|t| t & PTS_MASK).collect();
        let mut diag = Diagnostics::new();
        let out = unwrap_series(&raw, raw[0], i64::MAX, "video", &mut diag);
        let offset = out[0] - truth[0];
        out.iter().zip(&truth).all(|(o, t)| o - t == offset)
    }
}
