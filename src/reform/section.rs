//! Format sections: time ranges of the recording sharing one video format
//! and one set of audio formats.

use log::{debug, info};

use super::input::ReformInput;
use super::unwrap::Timeline;
use crate::av::timestamp::ticks_to_secs;
use crate::av::{AudioFormat, StreamEvent, StreamEventKind, VideoFormat};
use crate::error::{ReformError, Result};

/// A distinct (video format, audio formats) combination within one source
/// video file.
#[derive(Debug, Clone, PartialEq)]
pub struct OutVideoFormat {
    pub format_id: usize,
    pub video_file_id: usize,
    pub video: VideoFormat,
    pub audio: Vec<AudioFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSection {
    /// Extended PTS of the first instant covered.
    pub start: i64,
    /// One past the last instant covered.
    pub end: i64,
    pub format_id: usize,
    pub video_file_id: usize,
}

impl FormatSection {
    pub fn contains(&self, pts: i64) -> bool {
        self.start <= pts && pts < self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionPlan {
    /// Ids are positions in this list, in first-seen order.
    pub formats: Vec<OutVideoFormat>,
    /// Contiguous, covering `[first_pts, end_pts)`.
    pub sections: Vec<FormatSection>,
    pub file_count: usize,
}

impl SectionPlan {
    /// Index of the section covering `pts`. Times outside the recording map
    /// to the nearest section.
    pub fn section_index(&self, pts: i64) -> usize {
        self.sections
            .partition_point(|s| s.end <= pts)
            .min(self.sections.len().saturating_sub(1))
    }

    pub fn section_at(&self, pts: i64) -> Option<&FormatSection> {
        self.sections.get(self.section_index(pts))
    }

    pub fn format(&self, format_id: usize) -> Option<&OutVideoFormat> {
        self.formats.get(format_id)
    }
}

#[derive(Debug, Clone)]
struct StreamState {
    video: VideoFormat,
    audio: Vec<AudioFormat>,
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    start: i64,
    /// Frame index of the video format change inside the cluster.
    video_change: Option<i32>,
}

#[derive(Default)]
struct Builder {
    plan: SectionPlan,
    file_id: Option<usize>,
    last_video_change: Option<i32>,
}

impl Builder {
    fn register(&mut self, state: &StreamState, file: usize) -> usize {
        let existing = self
            .plan
            .formats
            .iter()
            .find(|f| f.video_file_id == file && f.video == state.video && f.audio == state.audio);
        if let Some(f) = existing {
            return f.format_id;
        }
        let format_id = self.plan.formats.len();
        self.plan.formats.push(OutVideoFormat {
            format_id,
            video_file_id: file,
            video: state.video,
            audio: state.audio.clone(),
        });
        format_id
    }

    fn commit(&mut self, cluster: Cluster, state: &StreamState) {
        let new_file = match cluster.video_change {
            Some(idx) if self.last_video_change != Some(idx) => {
                self.last_video_change = Some(idx);
                true
            }
            _ => self.file_id.is_none(),
        };
        if new_file {
            self.file_id = Some(self.file_id.map_or(0, |f| f + 1));
        }
        let file = self.file_id.unwrap_or_default();
        let format_id = self.register(state, file);

        match self.plan.sections.last_mut() {
            Some(last) if cluster.start <= last.start => {
                debug!(
                    "format change at {} supersedes section at {}",
                    cluster.start, last.start
                );
                last.format_id = format_id;
                last.video_file_id = file;
            }
            _ => self.plan.sections.push(FormatSection {
                start: cluster.start,
                end: 0,
                format_id,
                video_file_id: file,
            }),
        }
    }
}

/// Renumbers formats and files densely in section order, forgetting the
/// ones no section refers to after superseding and trimming.
fn renumber(plan: &mut SectionPlan) {
    let mut format_ids = vec![None; plan.formats.len()];
    let mut files: Vec<usize> = Vec::new();
    let mut formats = Vec::new();
    for section in &mut plan.sections {
        let file = match files.iter().position(|&f| f == section.video_file_id) {
            Some(pos) => pos,
            None => {
                files.push(section.video_file_id);
                files.len() - 1
            }
        };
        let format_id = match format_ids[section.format_id] {
            Some(id) => id,
            None => {
                let id = formats.len();
                formats.push(OutVideoFormat {
                    format_id: id,
                    video_file_id: file,
                    ..plan.formats[section.format_id].clone()
                });
                format_ids[section.format_id] = Some(id);
                id
            }
        };
        section.format_id = format_id;
        section.video_file_id = file;
    }
    plan.formats = formats;
    plan.file_count = files.len();
}

fn event_pts(event: &StreamEvent, input: &ReformInput, timeline: &Timeline) -> i64 {
    let clamp = |idx: i32, len: usize| (idx.max(0) as usize).min(len.saturating_sub(1));
    match event.kind {
        StreamEventKind::AudioFormatChanged if !timeline.audio_pts.is_empty() => {
            timeline.audio_pts[clamp(event.frame_idx, input.audio_frames.len())]
        }
        _ => timeline.data_pts[clamp(event.frame_idx, timeline.data_pts.len())],
    }
}

fn first_audio_format(input: &ReformInput, audio_idx: usize) -> AudioFormat {
    input
        .audio_frames
        .iter()
        .find(|f| f.audio_idx as usize == audio_idx)
        .map(|f| f.format)
        .unwrap_or_default()
}

/// Groups the stream events into format sections.
///
/// Events closer than `tolerance_ticks` to the first event of a pending
/// change are merged into it, except that a second video format change
/// always starts a new one.
pub fn sectionize(input: &ReformInput, timeline: &Timeline, tolerance_ticks: i64) -> Result<SectionPlan> {
    if input.video_frames.is_empty() || timeline.data_pts.is_empty() {
        return Err(ReformError::Format("no video frames".into()));
    }
    if input.audio_frames.is_empty() {
        return Err(ReformError::Format("no audio frames".into()));
    }
    match input.events.first() {
        Some(e) if e.kind == StreamEventKind::PidTableChanged => {}
        Some(e) => {
            return Err(ReformError::Format(format!(
                "first stream event is {:?}, expected a PID table change",
                e.kind
            )))
        }
        None => return Err(ReformError::Format("no stream events".into())),
    }

    let mut state = StreamState {
        video: input.video_frames[0].format,
        audio: Vec::new(),
    };
    let mut builder = Builder::default();
    let mut cluster: Option<Cluster> = None;

    for event in &input.events {
        if event.kind == StreamEventKind::AudioFormatChanged
            && (event.audio_idx < 0 || event.audio_idx as usize >= state.audio.len())
        {
            return Err(ReformError::Format(format!(
                "audio format change for stream {} with {} audio streams",
                event.audio_idx,
                state.audio.len()
            )));
        }

        let pts = event_pts(event, input, timeline);
        let joins = cluster.is_some_and(|c| {
            let second_video_change = event.kind == StreamEventKind::VideoFormatChanged
                && c.video_change.is_some_and(|idx| idx != event.frame_idx);
            pts - c.start < tolerance_ticks && !second_video_change
        });
        if !joins {
            if let Some(c) = cluster {
                builder.commit(c, &state);
            }
            cluster = Some(Cluster {
                start: pts,
                video_change: None,
            });
        }

        match event.kind {
            StreamEventKind::PidTableChanged => {
                let num_audio = event.num_audio.max(0) as usize;
                let known = state.audio.len();
                state.audio.truncate(num_audio);
                for idx in known..num_audio {
                    state.audio.push(first_audio_format(input, idx));
                }
            }
            StreamEventKind::VideoFormatChanged => {
                let idx = (event.frame_idx.max(0) as usize).min(input.video_frames.len() - 1);
                state.video = input.video_frames[idx].format;
                if let Some(c) = cluster.as_mut() {
                    c.video_change = Some(event.frame_idx);
                }
            }
            StreamEventKind::AudioFormatChanged => {
                if let Some(frame) = input.audio_frames.get(event.frame_idx.max(0) as usize) {
                    state.audio[event.audio_idx as usize] = frame.format;
                }
            }
        }
    }
    if let Some(c) = cluster {
        builder.commit(c, &state);
    }

    let mut plan = builder.plan;
    while plan.sections.len() > 1 && plan.sections[1].start <= timeline.first_pts {
        plan.sections.remove(0);
    }
    plan.sections.retain(|s| s.start < timeline.end_pts);
    if let Some(first) = plan.sections.first_mut() {
        first.start = timeline.first_pts;
    }
    let starts: Vec<i64> = plan.sections.iter().skip(1).map(|s| s.start).collect();
    for (section, next) in plan.sections.iter_mut().zip(starts.into_iter().chain([timeline.end_pts])) {
        section.end = next;
    }
    if plan.sections.is_empty() || plan.sections.iter().any(|s| s.start >= s.end) {
        return Err(ReformError::Format("format sections do not partition the timeline".into()));
    }
    renumber(&mut plan);

    for s in &plan.sections {
        let f = &plan.formats[s.format_id];
        info!(
            "section {:.3}s-{:.3}s: file {} format {} ({}x{}, {} audio)",
            ticks_to_secs((s.start - timeline.first_pts) as f64),
            ticks_to_secs((s.end - timeline.first_pts) as f64),
            s.video_file_id,
            s.format_id,
            f.video.width,
            f.video.height,
            f.audio.len()
        );
    }
    Ok(plan)
}
