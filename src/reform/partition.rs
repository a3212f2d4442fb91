//! Partitioning of the reformed timeline into encoder inputs.
//!
//! Frame positions used by commercial zones and division points are global:
//! they count the logical output frames of all source files in file order.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};

use super::audio::{AudioAligner, AudioStats, ChannelCursor};
use super::frames::{FrameTable, OutputFrame};
use super::input::ReformInput;
use super::section::SectionPlan;
use super::unwrap::Timeline;
use crate::av::timestamp::ticks_to_secs;
use crate::error::{ReformError, Result};

/// Which side of the commercial zones an output holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CmType {
    /// Zones are not split out.
    Both,
    NonCm,
    Cm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodeFileKey {
    pub video_file_id: usize,
    pub format_id: usize,
    /// Number of division points before the output.
    pub div: usize,
    pub cm: CmType,
}

/// User supplied cuts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Commercial breaks as global frame ranges.
    pub cm_zones: Vec<Range<usize>>,
    /// Global frame indices that start a new output, strictly increasing.
    pub divisions: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionOptions {
    /// Zones shorter than this are ignored.
    pub min_zone_frames: usize,
    /// Route commercial frames to their own outputs.
    pub split_cm: bool,
}

impl PartitionSpec {
    /// Drops zones that are too short and checks the division points.
    pub fn validate(&self, min_zone_frames: usize, total_frames: usize) -> Result<PartitionSpec> {
        if self.divisions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ReformError::Format(format!(
                "division points are not strictly increasing: {:?}",
                self.divisions
            )));
        }
        let mut cm_zones = Vec::with_capacity(self.cm_zones.len());
        for zone in &self.cm_zones {
            let zone = zone.start.min(total_frames)..zone.end.min(total_frames);
            if zone.len() < min_zone_frames.max(1) {
                debug!("ignoring short commercial zone {:?}", zone);
                continue;
            }
            cm_zones.push(zone);
        }
        cm_zones.sort_by_key(|z| z.start);
        Ok(PartitionSpec {
            cm_zones,
            divisions: self.divisions.clone(),
        })
    }

    pub fn is_cm(&self, frame: usize) -> bool {
        let i = self.cm_zones.partition_point(|z| z.end <= frame);
        self.cm_zones.get(i).is_some_and(|z| z.contains(&frame))
    }

    pub fn division(&self, frame: usize) -> usize {
        self.divisions.partition_point(|&d| d <= frame)
    }
}

/// A timed text line in extended source time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLine {
    pub start: i64,
    pub end: i64,
    pub lang_index: i32,
    pub text: String,
}

/// A caption line in output time, ticks from the start of the output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutCaptionLine {
    pub start: f64,
    pub end: f64,
    pub lang_index: i32,
    pub text: String,
}

/// Everything an encoder and muxer need for one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeFileInput {
    pub key: EncodeFileKey,
    /// Indices into the frames of source file `key.video_file_id`.
    pub video_frames: Vec<usize>,
    /// Audio frame indices of the recording, per audio stream.
    pub audio_frames: Vec<Vec<usize>>,
    pub captions: Vec<OutCaptionLine>,
    /// Output frame durations in ticks.
    pub frame_durations: Vec<f64>,
    pub duration: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub audio_stats: Vec<AudioStats>,
}

/// Resolves caption durations against the recording: an open line lasts
/// until the next line of the same language, or the end of the recording.
pub fn caption_lines(input: &ReformInput, timeline: &Timeline) -> Vec<TimedLine> {
    let mut order: Vec<usize> = (0..input.captions.len()).collect();
    order.sort_by_key(|&i| timeline.caption_pts[i]);

    let mut lines = Vec::with_capacity(order.len());
    for (pos, &i) in order.iter().enumerate() {
        let item = &input.captions[i];
        let start = timeline.caption_pts[i];
        let end = if item.duration >= 0 {
            start + item.duration
        } else {
            order[pos + 1..]
                .iter()
                .find(|&&j| input.captions[j].lang_index == item.lang_index)
                .map_or(timeline.end_pts, |&j| timeline.caption_pts[j])
        };
        lines.push(TimedLine {
            start,
            end,
            lang_index: item.lang_index,
            text: item.text.clone(),
        });
    }
    lines
}

/// Maps source times into output times.
///
/// `frame_pts` holds the source time of every output frame in order and
/// `frame_start` its output time. A source time between two frames snaps to
/// the later one; lines left empty are dropped.
pub fn slice_lines(lines: &[TimedLine], frame_pts: &[f64], frame_start: &[f64], total: f64) -> Vec<OutCaptionLine> {
    let to_output = |t: i64| {
        let k = frame_pts.partition_point(|&p| p < t as f64);
        frame_start.get(k).copied().unwrap_or(total)
    };
    lines
        .iter()
        .filter_map(|line| {
            let (start, end) = (to_output(line.start), to_output(line.end));
            (end > start).then(|| OutCaptionLine {
                start,
                end,
                lang_index: line.lang_index,
                text: line.text.clone(),
            })
        })
        .collect()
}

/// Wall clock time at `pts`, from the nearest anchor at or before it.
pub fn wall_clock_at(input: &ReformInput, timeline: &Timeline, pts: f64) -> Option<DateTime<Utc>> {
    let anchors = &timeline.anchor_pts;
    let i = anchors.partition_point(|&a| (a as f64) <= pts);
    let i = i.checked_sub(1).or((!anchors.is_empty()).then_some(0))?;
    let offset_ms = ticks_to_secs(pts - anchors[i] as f64) * 1000.0;
    Utc.timestamp_millis_opt(input.time_anchors[i].wall_clock_ms + offset_ms.round() as i64)
        .single()
}

/// Splits the frame table by file, format, division and commercial zone,
/// and aligns audio and captions to every resulting output.
pub fn partition(
    input: &ReformInput,
    timeline: &Timeline,
    plan: &SectionPlan,
    table: &FrameTable,
    spec: &PartitionSpec,
    options: &PartitionOptions,
) -> Result<BTreeMap<EncodeFileKey, EncodeFileInput>> {
    let spec = spec.validate(options.min_zone_frames, table.total_frames())?;

    let mut pending: BTreeMap<EncodeFileKey, Vec<(usize, &OutputFrame)>> = BTreeMap::new();
    let mut global = 0;
    for file in &table.files {
        for (idx, frame) in file.frames.iter().enumerate() {
            let cm = match (options.split_cm, spec.is_cm(global)) {
                (false, _) => CmType::Both,
                (true, false) => CmType::NonCm,
                (true, true) => CmType::Cm,
            };
            let key = EncodeFileKey {
                video_file_id: file.video_file_id,
                format_id: frame.format_id,
                div: spec.division(global),
                cm,
            };
            pending.entry(key).or_default().push((idx, frame));
            global += 1;
        }
    }

    let num_channels = plan.formats.iter().map(|f| f.audio.len()).max().unwrap_or(0);
    let aligner = AudioAligner::new(&input.audio_frames, &timeline.audio_pts, num_channels);
    let lines = caption_lines(input, timeline);

    let mut outputs = BTreeMap::new();
    for (key, frames) in pending {
        let audio_formats = &plan.formats[key.format_id].audio;
        let mut audio_frames = vec![Vec::new(); audio_formats.len()];
        let mut audio_stats = vec![AudioStats::default(); audio_formats.len()];
        for (channel, format) in audio_formats.iter().enumerate() {
            audio_stats[channel].source_frames = aligner.channel_len(channel) as u64;
            audio_stats[channel].dropped = aligner.dropped(channel);
            let mut cursor = ChannelCursor::new();
            for (_, frame) in &frames {
                aligner.fill(
                    channel,
                    *format,
                    frame.pts,
                    frame.pts + frame.duration,
                    &mut cursor,
                    &mut audio_frames[channel],
                    &mut audio_stats[channel],
                );
            }
        }

        let frame_durations: Vec<f64> = frames.iter().map(|(_, f)| f.duration).collect();
        let frame_pts: Vec<f64> = frames.iter().map(|(_, f)| f.pts).collect();
        let mut frame_start = Vec::with_capacity(frame_durations.len());
        let mut duration = 0.0;
        for d in &frame_durations {
            frame_start.push(duration);
            duration += d;
        }
        let captions = slice_lines(&lines, &frame_pts, &frame_start, duration);
        let start_time = frame_pts
            .first()
            .and_then(|&pts| wall_clock_at(input, timeline, pts));

        info!(
            "output {:?}: {} frames, {:.3}s, {} captions",
            key,
            frame_durations.len(),
            ticks_to_secs(duration),
            captions.len()
        );
        for (channel, stats) in audio_stats.iter().enumerate() {
            if stats.underfilled > 0 {
                warn!("output {:?} audio {}: video runs ahead of audio, {}", key, channel, stats);
            }
        }

        outputs.insert(
            key,
            EncodeFileInput {
                key,
                video_frames: frames.iter().map(|(idx, _)| *idx).collect(),
                audio_frames,
                captions,
                frame_durations,
                duration,
                start_time,
                audio_stats,
            },
        );
    }
    Ok(outputs)
}
