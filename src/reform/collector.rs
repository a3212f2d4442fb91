//! Builds a [`ReformInput`] from a demuxer run.

use log::debug;

use super::input::ReformInput;
use crate::av::{AudioFormat, AudioFrameInfo, CaptionItem, StreamEvent, TimeAnchor, VideoFormat, VideoFrameInfo};
use crate::format::ts::{DemuxSink, PidTable};

/// A [`DemuxSink`] that keeps every frame and derives the stream events.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    input: ReformInput,
    last_video: Option<VideoFormat>,
    /// Current format per audio index, trimmed by a table change.
    last_audio: Vec<Option<AudioFormat>>,
    /// First format ever seen per audio index.
    first_audio: Vec<Option<AudioFormat>>,
}

impl RecordingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an externally decoded caption line.
    pub fn add_caption(&mut self, caption: CaptionItem) {
        self.input.captions.push(caption);
    }

    pub fn input(&self) -> &ReformInput {
        &self.input
    }

    pub fn finish(mut self) -> ReformInput {
        self.input.source_file_count = 1;
        self.input
    }

    fn audio_changed(&mut self, audio_idx: usize, format: AudioFormat) -> bool {
        if self.last_audio.len() <= audio_idx {
            self.last_audio.resize(audio_idx + 1, None);
        }
        if self.first_audio.len() <= audio_idx {
            self.first_audio.resize(audio_idx + 1, None);
        }
        let reference = self.last_audio[audio_idx].or(self.first_audio[audio_idx]);
        self.last_audio[audio_idx] = Some(format);
        self.first_audio[audio_idx].get_or_insert(format);
        reference.is_some_and(|r| r != format)
    }
}

impl DemuxSink for RecordingCollector {
    fn on_pid_table(&mut self, table: &PidTable) {
        debug!(
            "PID table at video frame {}: {} audio streams",
            self.input.video_frames.len(),
            table.audio_pids.len()
        );
        self.input.events.push(StreamEvent::pid_table(
            self.input.video_frames.len() as i32,
            table.audio_pids.len() as i32,
        ));
        self.last_audio.truncate(table.audio_pids.len());
    }

    fn on_video_frames(&mut self, frames: &[VideoFrameInfo]) {
        for frame in frames {
            if self.last_video != Some(frame.format) {
                self.input
                    .events
                    .push(StreamEvent::video_format(self.input.video_frames.len() as i32));
                self.last_video = Some(frame.format);
            }
            self.input.video_frames.push(*frame);
        }
    }

    fn on_audio_frames(&mut self, audio_idx: usize, frames: &[AudioFrameInfo]) {
        for frame in frames {
            if self.audio_changed(audio_idx, frame.format) {
                self.input.events.push(StreamEvent::audio_format(
                    self.input.audio_frames.len() as i32,
                    audio_idx as i32,
                ));
            }
            self.input.audio_frames.push(*frame);
        }
    }

    fn on_time_anchor(&mut self, anchor: TimeAnchor) {
        self.input.time_anchors.push(anchor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{AudioChannels, StreamEventKind};
    use pretty_assertions::assert_eq;

    fn table(audio: usize) -> PidTable {
        PidTable {
            pcr_pid: 0x100,
            video_pid: Some(0x100),
            video_stream_type: 0x02,
            audio_pids: (0..audio as u16).map(|i| 0x110 + i).collect(),
        }
    }

    fn audio(channels: AudioChannels, audio_idx: u32) -> AudioFrameInfo {
        AudioFrameInfo {
            samples: 1024,
            audio_idx,
            format: AudioFormat {
                channels,
                sample_rate: 48000,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_events() {
        let mut c = RecordingCollector::new();
        let sd = VideoFrameInfo {
            format: VideoFormat {
                width: 720,
                height: 480,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut hd = sd;
        hd.format.width = 1440;

        c.on_pid_table(&table(1));
        c.on_video_frames(&[sd, sd]);
        c.on_audio_frames(0, &[audio(AudioChannels::Stereo, 0)]);
        c.on_video_frames(&[hd]);
        c.on_audio_frames(0, &[audio(AudioChannels::Stereo, 0), audio(AudioChannels::DualMono, 0)]);
        c.on_pid_table(&table(2));
        c.on_audio_frames(1, &[audio(AudioChannels::Mono, 1)]);
        c.on_audio_frames(0, &[audio(AudioChannels::DualMono, 0)]);
        c.add_caption(CaptionItem {
            pts: 100,
            duration: -1,
            lang_index: 0,
            text: "hello".into(),
        });

        let input = c.finish();
        assert_eq!(input.source_file_count, 1);
        assert_eq!(input.video_frames.len(), 3);
        assert_eq!(input.audio_frames.len(), 5);
        assert_eq!(input.captions.len(), 1);
        assert_eq!(
            input.events,
            vec![
                StreamEvent::pid_table(0, 1),
                StreamEvent::video_format(0),
                StreamEvent::video_format(2),
                StreamEvent::audio_format(2, 0),
                StreamEvent::pid_table(3, 2),
            ]
        );
        assert_eq!(input.events[0].kind, StreamEventKind::PidTableChanged);
    }
}
