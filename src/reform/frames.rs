//! Per source file output frame lists.

use log::{debug, info, warn};

use super::input::ReformInput;
use super::section::SectionPlan;
use super::unwrap::Timeline;
use crate::av::{FrameType, PicStruct};
use crate::diagnostics::{Counter, Diagnostics};

/// One logical output frame. A coded picture yields one to three of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFrame {
    /// Index into the recording's video frame list.
    pub source_idx: usize,
    /// Extended presentation time in 90 kHz ticks.
    pub pts: f64,
    pub duration: f64,
    pub format_id: usize,
    /// Source index of the GOP start this frame decodes from.
    pub key_frame: usize,
    pub frame_type: FrameType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFile {
    pub video_file_id: usize,
    /// Source frame indices kept for this file, in presentation order.
    pub source_frames: Vec<usize>,
    pub frames: Vec<OutputFrame>,
}

impl SourceFile {
    pub fn duration(&self) -> f64 {
        self.frames.iter().map(|f| f.duration).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTable {
    pub files: Vec<SourceFile>,
    /// Frame timing is irregular somewhere: durations differ or frames
    /// are missing from the timeline.
    pub is_vfr: bool,
    /// Some picture repeats a field.
    pub has_rff: bool,
    pub src_total_duration: f64,
    pub out_total_duration: f64,
}

impl FrameTable {
    /// All output frames in file order.
    pub fn iter(&self) -> impl Iterator<Item = &OutputFrame> + '_ {
        self.files.iter().flat_map(|f| f.frames.iter())
    }

    pub fn total_frames(&self) -> usize {
        self.files.iter().map(|f| f.frames.len()).sum()
    }
}

/// Expands a picture into logical frames of nominal period `d`.
pub fn expand_picture(pic_struct: PicStruct, pts: f64, d: f64) -> Vec<(f64, f64)> {
    match pic_struct {
        PicStruct::Frame | PicStruct::Tff => vec![(pts, d)],
        PicStruct::Bff => vec![(pts - d / 2.0, d)],
        PicStruct::FrameDoubling => vec![(pts, d), (pts + d, d)],
        PicStruct::FrameTripling => vec![(pts, d), (pts + d, d), (pts + 2.0 * d, d)],
        PicStruct::TffRff => vec![(pts, d), (pts + d, d / 2.0)],
        PicStruct::BffRff => vec![(pts - d / 2.0, d / 2.0), (pts, d)],
    }
}

pub fn build_frame_table(
    input: &ReformInput,
    timeline: &Timeline,
    plan: &SectionPlan,
    diag: &mut Diagnostics,
) -> FrameTable {
    let mut by_file: Vec<Vec<usize>> = vec![Vec::new(); plan.file_count];
    for (idx, frame) in input.video_frames.iter().enumerate() {
        let section = &plan.sections[plan.section_index(timeline.video_pts[idx])];
        if plan.formats[section.format_id].video != frame.format {
            diag.incr(Counter::FrameFileMismatch);
        }
        by_file[section.video_file_id].push(idx);
    }

    let mut table = FrameTable {
        src_total_duration: (timeline.end_pts - timeline.first_pts) as f64,
        ..Default::default()
    };
    for (video_file_id, mut indices) in by_file.into_iter().enumerate() {
        indices.sort_by_key(|&i| timeline.video_pts[i]);
        let first_gop = indices.iter().position(|&i| input.video_frames[i].is_gop_start);
        let skip = first_gop.unwrap_or(indices.len());
        if skip > 0 {
            debug!(
                "file {}: dropping {} frames before the first GOP start",
                video_file_id, skip
            );
        }

        let mut file = SourceFile {
            video_file_id,
            ..Default::default()
        };
        let mut key_frame = 0;
        for &idx in &indices[skip..] {
            let frame = &input.video_frames[idx];
            if frame.is_gop_start {
                key_frame = idx;
            }
            table.has_rff |= matches!(frame.pic_struct, PicStruct::TffRff | PicStruct::BffRff);
            let pts = timeline.video_pts[idx];
            let format_id = plan.sections[plan.section_index(pts)].format_id;
            let d = frame.format.frame_duration();
            for (pts, duration) in expand_picture(frame.pic_struct, pts as f64, d) {
                file.frames.push(OutputFrame {
                    source_idx: idx,
                    pts,
                    duration,
                    format_id,
                    key_frame,
                    frame_type: frame.frame_type,
                });
            }
            file.source_frames.push(idx);
        }

        if let Some(first) = file.frames.first() {
            let nominal = first.duration;
            table.is_vfr |= file.frames.windows(2).any(|w| {
                let gap = w[1].pts - w[0].pts;
                (w[0].duration - nominal).abs() > 1.0 || (gap - w[0].duration).abs() > nominal / 2.0
            });
        }
        table.out_total_duration += file.duration();
        table.files.push(file);
    }

    if table.total_frames() == 0 {
        warn!("no decodable video frames");
    }
    info!(
        "{} output frames in {} files, source {:.1}s, output {:.1}s{}{}",
        table.total_frames(),
        table.files.len(),
        table.src_total_duration / 90_000.0,
        table.out_total_duration / 90_000.0,
        if table.is_vfr { ", VFR" } else { "" },
        if table.has_rff { ", RFF" } else { "" }
    );
    table
}
