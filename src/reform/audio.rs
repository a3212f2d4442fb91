//! Audio to video alignment.
//!
//! Audio frames are pulled per stream from a cursor so that the audio handed
//! to an output covers exactly the time of the video frames it keeps. A gap
//! is filled by repeating the frame before it, as often as the gap needs, and
//! counts as one insertion. Early frames are skipped and frames without
//! samples are dropped; nothing is ever synthesised.

use std::fmt;

use log::debug;

use crate::av::{AudioFormat, AudioFrameInfo};
use crate::diagnostics::{Counter, Diagnostics};

/// Drift and repair statistics of one aligned audio stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioStats {
    pub source_frames: u64,
    /// Frames handed out, repeats included.
    pub output_frames: u64,
    pub unique_output_frames: u64,
    /// Gaps repaired by repeating a frame.
    pub inserted: u64,
    /// Repeated frames handed out over all repaired gaps.
    pub repeated: u64,
    pub skipped: u64,
    /// Frames that carry no samples and were never used.
    pub dropped: u64,
    /// Video frame windows left without enough audio.
    pub underfilled: u64,
    /// Sum of `|audio pts - target pts|` over unique output frames, in ticks.
    pub sum_diff: f64,
    pub max_diff: f64,
    /// Position on the output timeline (video PTS) where the largest drift
    /// occurred.
    pub max_diff_pts: i64,
}

impl AudioStats {
    pub fn avg_diff(&self) -> f64 {
        if self.unique_output_frames == 0 {
            0.0
        } else {
            self.sum_diff / self.unique_output_frames as f64
        }
    }

    pub fn merge(&mut self, other: &AudioStats) {
        self.source_frames += other.source_frames;
        self.output_frames += other.output_frames;
        self.unique_output_frames += other.unique_output_frames;
        self.inserted += other.inserted;
        self.repeated += other.repeated;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.underfilled += other.underfilled;
        self.sum_diff += other.sum_diff;
        if other.max_diff > self.max_diff {
            self.max_diff = other.max_diff;
            self.max_diff_pts = other.max_diff_pts;
        }
    }

    /// Adds the repair counts to the diagnostic counters.
    pub fn report(&self, diag: &mut Diagnostics) {
        diag.add(Counter::AudioInserted, self.inserted);
        diag.add(Counter::AudioSkipped, self.skipped);
        diag.add(Counter::DecodeError, self.dropped);
        diag.add(Counter::AudioUnderfilled, self.underfilled);
    }
}

impl fmt::Display for AudioStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in, {} out ({} unique), {} gaps filled with {} repeats, {} skipped, {} dropped, \
             avg drift {:.2}ms, max {:.2}ms",
            self.source_frames,
            self.output_frames,
            self.unique_output_frames,
            self.inserted,
            self.repeated,
            self.skipped,
            self.dropped,
            self.avg_diff() / 90.0,
            self.max_diff / 90.0
        )
    }
}

/// Position of one audio stream within an alignment run.
#[derive(Debug, Clone, Default)]
pub struct ChannelCursor {
    pos: usize,
    /// Time up to which audio has been handed out.
    filled: Option<f64>,
    last: Option<usize>,
    skipping: bool,
    /// Inside a gap that has already been counted.
    repairing: bool,
}

impl ChannelCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Audio frames of a recording indexed per stream in presentation order.
#[derive(Debug, Clone)]
pub struct AudioAligner<'a> {
    frames: &'a [AudioFrameInfo],
    pts: &'a [i64],
    channels: Vec<Vec<usize>>,
    dropped: Vec<u64>,
}

impl<'a> AudioAligner<'a> {
    /// `pts` holds the extended timestamps of `frames`. Frames lasting no
    /// time are left out of their stream.
    pub fn new(frames: &'a [AudioFrameInfo], pts: &'a [i64], num_channels: usize) -> Self {
        let mut channels = vec![Vec::new(); num_channels];
        let mut dropped = vec![0; num_channels];
        for (idx, frame) in frames.iter().enumerate() {
            let channel = frame.audio_idx as usize;
            let Some(list) = channels.get_mut(channel) else {
                continue;
            };
            if frame.duration() > 0.0 {
                list.push(idx);
            } else {
                debug!("audio {}: dropping empty frame at {}", channel, pts[idx]);
                dropped[channel] += 1;
            }
        }
        for list in &mut channels {
            list.sort_by_key(|&i| pts[i]);
        }
        Self {
            frames,
            pts,
            channels,
            dropped,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_len(&self, channel: usize) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }

    /// Frames of `channel` left out for lasting no time.
    pub fn dropped(&self, channel: usize) -> u64 {
        self.dropped.get(channel).copied().unwrap_or(0)
    }

    /// First position in `list` whose frame is not too early for `time`.
    fn seek(&self, list: &[usize], time: f64) -> usize {
        list.partition_point(|&i| {
            (self.pts[i] as f64) + self.frames[i].duration() / 2.0 < time
        })
    }

    /// Hands out the audio of `channel` covering the video window
    /// `[start, end)`, appending frame indices to `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        &self,
        channel: usize,
        format: AudioFormat,
        start: f64,
        end: f64,
        cursor: &mut ChannelCursor,
        out: &mut Vec<usize>,
        stats: &mut AudioStats,
    ) {
        let Some(list) = self.channels.get(channel) else {
            return;
        };
        let Some(nominal) = list
            .iter()
            .map(|&i| &self.frames[i])
            .find(|f| f.format == format)
            .map(|f| f.duration())
            .filter(|&d| d > 0.0)
        else {
            stats.underfilled += 1;
            return;
        };

        let mut filled = match cursor.filled {
            Some(filled) if (filled - start).abs() <= (end - start) / 2.0 => filled,
            _ => {
                cursor.pos = self.seek(list, start);
                cursor.last = None;
                cursor.repairing = false;
                start
            }
        };

        let mut retried = false;
        while end - filled > nominal / 2.0 {
            let Some(&idx) = list.get(cursor.pos) else {
                if retried {
                    debug!(
                        "audio {}: no audio for {:.1}ms at {:.0}",
                        channel,
                        (end - filled) / 90.0,
                        filled
                    );
                    stats.underfilled += 1;
                    break;
                }
                retried = true;
                cursor.pos = self.seek(list, filled);
                continue;
            };
            let frame = &self.frames[idx];
            if frame.format != format {
                cursor.pos += 1;
                continue;
            }

            let duration = frame.duration();
            let diff = self.pts[idx] as f64 - filled;
            if diff < -duration / 2.0 {
                if !cursor.skipping {
                    debug!("audio {}: skipping early frames from {}", channel, self.pts[idx]);
                    cursor.skipping = true;
                }
                stats.skipped += 1;
                cursor.pos += 1;
                continue;
            }
            cursor.skipping = false;

            if diff > duration * 0.75 {
                if let Some(last) = cursor.last {
                    if !cursor.repairing {
                        debug!("audio {}: repeating frame {} at {:.0}", channel, last, filled);
                        stats.inserted += 1;
                        cursor.repairing = true;
                    }
                    out.push(last);
                    stats.repeated += 1;
                    stats.output_frames += 1;
                    filled += self.frames[last].duration();
                    continue;
                }
            }

            out.push(idx);
            cursor.last = Some(idx);
            cursor.repairing = false;
            cursor.pos += 1;
            stats.output_frames += 1;
            stats.unique_output_frames += 1;
            let drift = diff.abs();
            stats.sum_diff += drift;
            if drift > stats.max_diff {
                stats.max_diff = drift;
                stats.max_diff_pts = filled.round() as i64;
            }
            filled += duration;
        }
        cursor.filled = Some(filled);
    }
}
