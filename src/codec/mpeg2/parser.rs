use log::debug;

use super::types::*;
use crate::av::{FrameType, PayloadUnit, PicStruct, VideoCodec, VideoFormat, VideoFrameInfo};
use crate::diagnostics::{Counter, Diagnostics};
use crate::error::Result;
use crate::utils::{gcd, BitReader};

/// Positions and codes of every 00 00 01 xx start code.
pub fn find_start_codes(data: &[u8]) -> Vec<(usize, u8)> {
    let mut codes = Vec::new();
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            codes.push((i, data[i + 3]));
            i += 4;
        } else {
            i += 1;
        }
    }
    codes
}

#[derive(Debug, Clone)]
struct Picture {
    header: PictureHeader,
    coding: PictureCodingExtension,
    pts: Option<i64>,
    dts: Option<i64>,
    gop_start: bool,
    start: usize,
    size: usize,
    file_offset: i64,
}

/// MPEG-2 video elementary stream parser.
#[derive(Debug, Default)]
pub struct Mpeg2Parser {
    sequence: Option<SequenceHeader>,
    extension: Option<SequenceExtension>,
    display: Option<SequenceDisplayExtension>,
    gop: Option<GopHeader>,
    new_sequence: bool,
    pending_field: Option<(Picture, i64, i64)>,
}

impl Mpeg2Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn gop(&self) -> Option<&GopHeader> {
        self.gop.as_ref()
    }

    pub fn parse_unit(&mut self, unit: &PayloadUnit, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        let data = &unit.data[..];
        let codes = find_start_codes(data);
        let mut frames = Vec::new();
        let mut current: Option<Picture> = None;
        let mut timestamps = Some((unit.pts, unit.dts));

        for (n, &(pos, code)) in codes.iter().enumerate() {
            let end = codes.get(n + 1).map_or(data.len(), |c| c.0);
            let body = &data[pos + 4..end];

            match code {
                PICTURE_START_CODE => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, pos, &mut frames, diag);
                    }
                    match PictureHeader::parse(body) {
                        Ok(header) => {
                            let (pts, dts) = timestamps.take().unwrap_or((None, None));
                            current = Some(Picture {
                                header,
                                coding: PictureCodingExtension::default(),
                                pts,
                                dts,
                                gop_start: std::mem::take(&mut self.new_sequence),
                                start: pos,
                                size: 0,
                                file_offset: unit.file_offset + pos as i64,
                            });
                        }
                        Err(e) => {
                            debug!("dropping picture: {}", e);
                            diag.incr(Counter::MalformedHeader);
                        }
                    }
                }
                SEQUENCE_HEADER_CODE => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, pos, &mut frames, diag);
                    }
                    match SequenceHeader::parse(body) {
                        Ok(header) => {
                            self.sequence = Some(header);
                            self.extension = None;
                            self.display = None;
                            self.new_sequence = true;
                        }
                        Err(e) => {
                            debug!("dropping sequence header: {}", e);
                            diag.incr(Counter::MalformedHeader);
                        }
                    }
                }
                EXTENSION_START_CODE => {
                    if let Err(e) = self.parse_extension(body, current.as_mut()) {
                        debug!("dropping extension: {}", e);
                        diag.incr(Counter::MalformedHeader);
                    }
                }
                GOP_START_CODE => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, pos, &mut frames, diag);
                    }
                    match GopHeader::parse(body) {
                        Ok(gop) => self.gop = Some(gop),
                        Err(_) => diag.incr(Counter::MalformedHeader),
                    }
                }
                SEQUENCE_END_CODE => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, pos, &mut frames, diag);
                    }
                }
                _ => {}
            }
        }

        if let Some(pic) = current.take() {
            self.finish_picture(pic, data.len(), &mut frames, diag);
        }
        frames
    }

    /// Emits a field still waiting for its partner.
    pub fn flush(&mut self, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        match self.pending_field.take() {
            Some((orphan, pts, dts)) => {
                diag.incr(Counter::UnpairedField);
                vec![self.emit(&orphan, None, pts, dts)]
            }
            None => Vec::new(),
        }
    }

    fn parse_extension(&mut self, body: &[u8], current: Option<&mut Picture>) -> Result<()> {
        let mut reader = BitReader::new(body);
        match reader.read_bits(4)? {
            SEQUENCE_EXTENSION_ID => self.extension = Some(SequenceExtension::parse(&mut reader)?),
            SEQUENCE_DISPLAY_EXTENSION_ID => {
                self.display = Some(SequenceDisplayExtension::parse(&mut reader)?)
            }
            PICTURE_CODING_EXTENSION_ID => {
                if let Some(pic) = current {
                    pic.coding = PictureCodingExtension::parse(&mut reader)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_picture(
        &mut self,
        mut pic: Picture,
        end: usize,
        frames: &mut Vec<VideoFrameInfo>,
        diag: &mut Diagnostics,
    ) {
        pic.size = end.saturating_sub(pic.start);

        if pic.coding.picture_structure != FRAME_PICTURE {
            if let Some((first, pts, dts)) = self.pending_field.take() {
                if first.coding.picture_structure != pic.coding.picture_structure {
                    frames.push(self.emit(&first, Some(&pic), pts, dts));
                    return;
                }
                diag.incr(Counter::UnpairedField);
                frames.push(self.emit(&first, None, pts, dts));
            }
            let (pts, dts) = resolve(&pic, diag);
            self.pending_field = Some((pic, pts, dts));
            return;
        }

        if let Some((orphan, pts, dts)) = self.pending_field.take() {
            diag.incr(Counter::UnpairedField);
            frames.push(self.emit(&orphan, None, pts, dts));
        }
        let (pts, dts) = resolve(&pic, diag);
        frames.push(self.emit(&pic, None, pts, dts));
    }

    fn emit(&self, first: &Picture, second: Option<&Picture>, pts: i64, dts: i64) -> VideoFrameInfo {
        let progressive_sequence = self.extension.map_or(true, |e| e.progressive_sequence);
        let coding = &first.coding;
        let pic_struct = if coding.picture_structure != FRAME_PICTURE {
            if coding.picture_structure == TOP_FIELD {
                PicStruct::Tff
            } else {
                PicStruct::Bff
            }
        } else if progressive_sequence {
            match (coding.repeat_first_field, coding.top_field_first) {
                (false, _) => PicStruct::Frame,
                (true, false) => PicStruct::FrameDoubling,
                (true, true) => PicStruct::FrameTripling,
            }
        } else {
            match (coding.repeat_first_field, coding.top_field_first) {
                (true, true) => PicStruct::TffRff,
                (true, false) => PicStruct::BffRff,
                (false, true) => PicStruct::Tff,
                (false, false) => PicStruct::Bff,
            }
        };

        VideoFrameInfo {
            pts,
            dts,
            pic_struct,
            is_gop_start: first.gop_start || second.map_or(false, |s| s.gop_start),
            frame_type: match first.header.picture_coding_type {
                1 => FrameType::I,
                2 => FrameType::P,
                3 => FrameType::B,
                _ => FrameType::Unknown,
            },
            coded_size: (first.size + second.map_or(0, |s| s.size)) as u32,
            format: self.video_format(),
            file_offset: first.file_offset,
        }
    }

    /// Format implied by the current sequence header and its extensions.
    pub fn video_format(&self) -> VideoFormat {
        let seq = match self.sequence {
            Some(seq) => seq,
            None => return VideoFormat::default(),
        };
        let ext = self.extension.unwrap_or_default();
        let width = seq.horizontal_size as u32 | (ext.horizontal_size_extension as u32) << 12;
        let height = seq.vertical_size as u32 | (ext.vertical_size_extension as u32) << 12;

        let (num, den) = FRAME_RATE_TABLE[seq.frame_rate_code as usize];
        let num = num as u64 * (ext.frame_rate_extension_n as u64 + 1);
        let den = den as u64 * (ext.frame_rate_extension_d as u64 + 1);
        let g = gcd(num, den);

        let dar = match seq.aspect_ratio_code {
            2 => Some((4, 3)),
            3 => Some((16, 9)),
            4 => Some((221, 100)),
            _ => None,
        };
        let (sar_width, sar_height) = match dar {
            Some((dw, dh)) => {
                let (sw, sh) = (dw * height as u64, dh * width as u64);
                let g = gcd(sw, sh);
                ((sw / g) as u16, (sh / g) as u16)
            }
            _ => (1, 1),
        };
        let display_width = (width as u64 * sar_width as u64 / sar_height.max(1) as u64)
            .min(u16::MAX as u64);
        let (primaries, transfer, matrix) = self
            .display
            .and_then(|d| d.colour)
            .unwrap_or((2, 2, 2));

        VideoFormat {
            codec: VideoCodec::Mpeg2,
            width: width as u16,
            height: height as u16,
            display_width: display_width as u16,
            display_height: height as u16,
            sar_width,
            sar_height,
            frame_rate_num: (num / g) as u32,
            frame_rate_den: (den / g) as u32,
            color_primaries: primaries,
            transfer_characteristics: transfer,
            color_space: matrix,
            progressive: self.extension.map_or(true, |e| e.progressive_sequence),
        }
    }
}

fn resolve(pic: &Picture, diag: &mut Diagnostics) -> (i64, i64) {
    match pic.pts {
        Some(pts) => (pts, pic.dts.unwrap_or(pts)),
        None => {
            diag.incr(Counter::UnknownPts);
            (-1, -1)
        }
    }
}
