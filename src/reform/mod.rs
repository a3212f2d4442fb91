//! The stream reform engine.
//!
//! Takes the frame and event lists of a whole recording and rebuilds one
//! consistent timeline from them: timestamps are unwrapped, format changes
//! grouped into sections, pictures expanded into output frames and audio
//! aligned to the video it belongs to. The resulting [`ReformPlan`] is then
//! cut into encoder inputs.
//!
//! ```
//! use tsreform::diagnostics::Diagnostics;
//! use tsreform::reform::{ReformConfig, ReformInput, StreamReform};
//!
//! let mut diag = Diagnostics::new();
//! let err = StreamReform::new(ReformConfig::default())
//!     .reform(ReformInput::default(), &mut diag)
//!     .unwrap_err();
//! assert!(err.is_fatal());
//! ```

pub mod audio;
pub mod collector;
pub mod frames;
pub mod input;
pub mod partition;
pub mod section;
pub mod unwrap;
pub mod zones;

use std::collections::BTreeMap;

use log::{info, warn};

use crate::av::MPEG_CLOCK_HZ;
use crate::diagnostics::Diagnostics;
use crate::error::{ReformError, Result};

pub use audio::{AudioAligner, AudioStats, ChannelCursor};
pub use collector::RecordingCollector;
pub use frames::{FrameTable, OutputFrame, SourceFile};
pub use input::ReformInput;
pub use partition::{CmType, EncodeFileInput, EncodeFileKey, OutCaptionLine, PartitionOptions, PartitionSpec};
pub use section::{FormatSection, OutVideoFormat, SectionPlan};
pub use unwrap::Timeline;
pub use zones::{BitrateParams, BitrateZone};

/// Audio drift worth a warning, in ticks.
const DRIFT_WARN_TICKS: f64 = 0.010 * MPEG_CLOCK_HZ as f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReformConfig {
    /// Format changes closer than this are merged into one section boundary.
    pub change_tolerance_secs: f64,
    /// Larger backward timestamp jumps are reported as discontinuities.
    pub max_backward_jump_secs: f64,
    pub min_zone_frames: usize,
    pub split_cm: bool,
    pub bitrate: BitrateParams,
}

impl Default for ReformConfig {
    fn default() -> Self {
        Self {
            change_tolerance_secs: 3.0,
            max_backward_jump_secs: 60.0,
            min_zone_frames: 30,
            split_cm: false,
            bitrate: BitrateParams::default(),
        }
    }
}

impl ReformConfig {
    fn ticks(secs: f64) -> i64 {
        (secs * MPEG_CLOCK_HZ as f64).round() as i64
    }

    pub fn partition_options(&self) -> PartitionOptions {
        PartitionOptions {
            min_zone_frames: self.min_zone_frames,
            split_cm: self.split_cm,
        }
    }
}

/// Runs the reform passes over a recording.
#[derive(Debug, Clone, Default)]
pub struct StreamReform {
    config: ReformConfig,
}

impl StreamReform {
    pub fn new(config: ReformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReformConfig {
        &self.config
    }

    /// Builds the reform plan of a recording.
    ///
    /// Fails with [`ReformError::Format`] when the recording has no video or
    /// no audio, or its events do not start with a PID table change.
    /// Everything recoverable is counted in `diag` instead.
    pub fn reform(&self, input: ReformInput, diag: &mut Diagnostics) -> Result<ReformPlan> {
        if input.video_frames.is_empty() {
            return Err(ReformError::Format("no video frames".into()));
        }
        let video_pts: Vec<i64> = input.video_frames.iter().map(|f| f.pts).collect();
        let video_dts: Vec<i64> = input.video_frames.iter().map(|f| f.dts).collect();
        let audio_pts: Vec<i64> = input.audio_frames.iter().map(|f| f.pts).collect();
        let caption_pts: Vec<i64> = input.captions.iter().map(|c| c.pts).collect();
        let anchor_pts: Vec<i64> = input.time_anchors.iter().map(|a| a.pts).collect();
        let timeline = Timeline::build(
            &video_pts,
            &video_dts,
            &audio_pts,
            &caption_pts,
            &anchor_pts,
            ReformConfig::ticks(self.config.max_backward_jump_secs),
            diag,
        )
        .ok_or_else(|| ReformError::Format("no video frame carries a timestamp".into()))?;

        let sections = section::sectionize(
            &input,
            &timeline,
            ReformConfig::ticks(self.config.change_tolerance_secs),
        )?;
        let frames = frames::build_frame_table(&input, &timeline, &sections, diag);
        let audio_stats = replay_audio(&input, &timeline, &sections, &frames);
        for (channel, stats) in audio_stats.iter().enumerate() {
            stats.report(diag);
            info!("audio {}: {}", channel, stats);
            if stats.max_diff > DRIFT_WARN_TICKS {
                warn!(
                    "audio {}: drift up to {:.1}ms at {}",
                    channel,
                    stats.max_diff / 90.0,
                    stats.max_diff_pts
                );
            }
            if stats.underfilled > 0 {
                warn!(
                    "audio {}: video runs ahead of audio in {} frames",
                    channel, stats.underfilled
                );
            }
        }

        Ok(ReformPlan {
            config: self.config,
            input,
            timeline,
            sections,
            frames,
            audio_stats,
        })
    }
}

/// Aligns every audio stream against the whole output timeline once, for
/// the recording wide statistics.
fn replay_audio(
    input: &ReformInput,
    timeline: &Timeline,
    sections: &SectionPlan,
    frames: &FrameTable,
) -> Vec<AudioStats> {
    let num_channels = sections.formats.iter().map(|f| f.audio.len()).max().unwrap_or(0);
    let aligner = AudioAligner::new(&input.audio_frames, &timeline.audio_pts, num_channels);
    (0..num_channels)
        .map(|channel| {
            let mut stats = AudioStats {
                source_frames: aligner.channel_len(channel) as u64,
                dropped: aligner.dropped(channel),
                ..Default::default()
            };
            let mut cursor = ChannelCursor::new();
            let mut out = Vec::new();
            for frame in frames.iter() {
                let Some(&format) = sections.formats[frame.format_id].audio.get(channel) else {
                    continue;
                };
                aligner.fill(
                    channel,
                    format,
                    frame.pts,
                    frame.pts + frame.duration,
                    &mut cursor,
                    &mut out,
                    &mut stats,
                );
            }
            stats
        })
        .collect()
}

/// The reformed timeline of one recording.
#[derive(Debug, Clone)]
pub struct ReformPlan {
    config: ReformConfig,
    input: ReformInput,
    timeline: Timeline,
    sections: SectionPlan,
    frames: FrameTable,
    audio_stats: Vec<AudioStats>,
}

impl ReformPlan {
    pub fn input(&self) -> &ReformInput {
        &self.input
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn sections(&self) -> &SectionPlan {
        &self.sections
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// Recording wide statistics per audio stream.
    pub fn audio_stats(&self) -> &[AudioStats] {
        &self.audio_stats
    }

    /// Cuts the plan into encoder inputs.
    pub fn partition(&self, spec: &PartitionSpec) -> Result<BTreeMap<EncodeFileKey, EncodeFileInput>> {
        partition::partition(
            &self.input,
            &self.timeline,
            &self.sections,
            &self.frames,
            spec,
            &self.config.partition_options(),
        )
    }

    /// Bitrate zones over all output frames, in global frame positions.
    pub fn bitrate_zones(&self, spec: &PartitionSpec) -> Result<Vec<BitrateZone>> {
        let spec = spec.validate(self.config.min_zone_frames, self.frames.total_frames())?;
        let Some(video) = self.sections.formats.first().map(|f| f.video) else {
            return Ok(Vec::new());
        };
        // durations count fields, so the rate is the field rate
        let durations: Vec<f64> = self
            .frames
            .iter()
            .map(|f| {
                let field = self.sections.formats[f.format_id].video.frame_duration() / 2.0;
                f.duration / field
            })
            .collect();
        Ok(zones::make_bitrate_zones(
            &durations,
            &spec.cm_zones,
            video.frame_rate_num.max(1) * 2,
            video.frame_rate_den.max(1),
            &self.config.bitrate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{AudioChannels, AudioFormat, AudioFrameInfo, StreamEvent, VideoFormat, VideoFrameInfo};
    use crate::diagnostics::Counter;
    use pretty_assertions::assert_eq;

    fn recording(frames: usize, missing_audio: &[usize]) -> ReformInput {
        let format = VideoFormat {
            width: 1920,
            height: 1080,
            frame_rate_num: 30,
            frame_rate_den: 1,
            ..Default::default()
        };
        ReformInput {
            source_file_count: 1,
            video_frames: (0..frames)
                .map(|i| VideoFrameInfo {
                    pts: 3000 * i as i64,
                    dts: 3000 * i as i64,
                    is_gop_start: i == 0,
                    format,
                    ..Default::default()
                })
                .collect(),
            audio_frames: (0..frames)
                .filter(|i| !missing_audio.contains(i))
                .map(|i| AudioFrameInfo {
                    pts: 3000 * i as i64,
                    samples: 1600,
                    format: AudioFormat {
                        channels: AudioChannels::Stereo,
                        sample_rate: 48000,
                    },
                    ..Default::default()
                })
                .collect(),
            events: vec![StreamEvent::pid_table(0, 1), StreamEvent::video_format(0)],
            ..Default::default()
        }
    }

    #[test]
    fn test_gap_is_counted_globally() {
        // 10 frames at 30 fps with audio frames 4 and 5 missing
        let mut diag = Diagnostics::new();
        let plan = StreamReform::default().reform(recording(10, &[4, 5]), &mut diag).unwrap();
        assert_eq!(plan.frames().total_frames(), 10);
        let stats = &plan.audio_stats()[0];
        assert_eq!((stats.inserted, stats.repeated), (1, 2));
        assert_eq!(stats.max_diff, 0.0);
        assert_eq!(diag.get(Counter::AudioInserted), 1);

        // per output alignment does not count again
        let outputs = plan.partition(&PartitionSpec::default()).unwrap();
        assert_eq!(outputs.len(), 1);
        let output = outputs.values().next().unwrap();
        // frame 3 is repeated over the gap, frame 6 onwards is on time
        assert_eq!(output.audio_frames[0], vec![0, 1, 2, 3, 3, 3, 4, 5, 6, 7]);
        assert_eq!(diag.get(Counter::AudioInserted), 1);
    }

    #[test]
    fn test_empty_audio_frames_do_not_stall() {
        let mut input = recording(6, &[]);
        input.audio_frames[2].samples = 0;
        let mut diag = Diagnostics::new();
        let plan = StreamReform::default().reform(input, &mut diag).unwrap();
        let stats = &plan.audio_stats()[0];
        assert_eq!(stats.dropped, 1);
        assert_eq!((stats.inserted, stats.repeated), (1, 1));
        assert_eq!(diag.get(Counter::DecodeError), 1);
    }

    #[test]
    fn test_fatal_inputs() {
        let mut diag = Diagnostics::new();
        let reform = StreamReform::default();
        assert!(matches!(
            reform.reform(ReformInput::default(), &mut diag),
            Err(ReformError::Format(_))
        ));

        let mut input = recording(5, &[]);
        input.events.swap(0, 1);
        assert!(matches!(reform.reform(input, &mut diag), Err(ReformError::Format(_))));

        let mut input = recording(5, &[]);
        for f in &mut input.video_frames {
            f.pts = -1;
        }
        assert!(matches!(reform.reform(input, &mut diag), Err(ReformError::Format(_))));
    }

    #[test]
    fn test_split_cm_outputs() {
        let config = ReformConfig {
            split_cm: true,
            min_zone_frames: 2,
            ..Default::default()
        };
        let mut diag = Diagnostics::new();
        let plan = StreamReform::new(config).reform(recording(12, &[]), &mut diag).unwrap();
        let spec = PartitionSpec {
            cm_zones: vec![4..8],
            divisions: vec![10],
        };
        let outputs = plan.partition(&spec).unwrap();
        let sizes: Vec<(CmType, usize, usize)> = outputs
            .values()
            .map(|o| (o.key.cm, o.key.div, o.video_frames.len()))
            .collect();
        assert_eq!(
            sizes,
            vec![(CmType::NonCm, 0, 6), (CmType::Cm, 0, 4), (CmType::NonCm, 1, 2)]
        );
        let cm = outputs.values().find(|o| o.key.cm == CmType::Cm).unwrap();
        assert_eq!(cm.video_frames, vec![4, 5, 6, 7]);
        assert_eq!(cm.audio_frames[0], vec![4, 5, 6, 7]);
        assert!((cm.duration - 12000.0).abs() < 1e-9);
    }
}
