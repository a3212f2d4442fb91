use std::collections::HashMap;

use log::{debug, warn};

use super::types::*;
use crate::av::timestamp::{wrapped_diff, PTS_MASK};
use crate::av::{FrameType, PayloadUnit, PicStruct, VideoFrameInfo};
use crate::diagnostics::{Counter, Diagnostics};
use crate::error::{ReformError, Result};
use crate::utils::BitReader;

/// Largest picture dimension accepted, in macroblocks (16384 pixels).
const MAX_DIMENSION_MBS: u32 = 1024;

/// Splits an Annex B byte stream into NAL units.
///
/// Returns each unit with the offset of its first byte (the NAL header).
/// Trailing zero bytes before the next start code are dropped.
pub fn split_nal_units(data: &[u8]) -> Vec<(usize, &[u8])> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |&next| next - 3);
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push((start, &data[start..end]));
        }
    }
    units
}

/// Strips emulation prevention bytes (00 00 03 -> 00 00).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// Reads ue(v) and rejects values above `max`.
fn read_golomb_max(reader: &mut BitReader, max: u32, name: &str) -> Result<u32> {
    let value = reader.read_golomb()?;
    if value > max {
        return Err(ReformError::Codec(format!("{} {} out of range", name, value)));
    }
    Ok(value)
}

fn size_overflow() -> ReformError {
    ReformError::Codec("picture size overflows".into())
}

/// Parses seq_parameter_set_rbsp() (without the NAL header byte).
pub fn parse_sps(rbsp: &[u8]) -> Result<SpsInfo> {
    let mut reader = BitReader::new(rbsp);

    let profile_idc = reader.read_bits(8)? as u8;
    reader.skip_bits(8)?; // constraint flags and reserved bits
    let level_idc = reader.read_bits(8)? as u8;
    let sps_id = read_golomb_max(&mut reader, 31, "sps id")?;

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = read_golomb_max(&mut reader, 3, "chroma_format_idc")?;
        if chroma_format_idc == 3 {
            separate_colour_plane = reader.read_bit()?;
        }
        reader.read_golomb()?; // bit_depth_luma_minus8
        reader.read_golomb()?; // bit_depth_chroma_minus8
        reader.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        if reader.read_bit()? {
            let count = if chroma_format_idc != 3 { 8 } else { 12 };
            for i in 0..count {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num = read_golomb_max(&mut reader, 12, "log2_max_frame_num_minus4")? + 4;
    let pic_order_cnt_type = read_golomb_max(&mut reader, 2, "pic_order_cnt_type")?;
    if pic_order_cnt_type == 0 {
        read_golomb_max(&mut reader, 12, "log2_max_pic_order_cnt_lsb_minus4")?;
    } else if pic_order_cnt_type == 1 {
        reader.skip_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_signed_golomb()?; // offset_for_non_ref_pic
        reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
        let cycle = read_golomb_max(&mut reader, 255, "num_ref_frames_in_pic_order_cnt_cycle")?;
        for _ in 0..cycle {
            reader.read_signed_golomb()?;
        }
    }

    reader.read_golomb()?; // max_num_ref_frames
    reader.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let pic_width_in_mbs =
        read_golomb_max(&mut reader, MAX_DIMENSION_MBS - 1, "pic_width_in_mbs_minus1")? + 1;
    let pic_height_in_map_units =
        read_golomb_max(&mut reader, MAX_DIMENSION_MBS - 1, "pic_height_in_map_units_minus1")? + 1;
    let frame_mbs_only = reader.read_bit()?;
    if !frame_mbs_only {
        reader.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    reader.skip_bits(1)?; // direct_8x8_inference_flag

    let (mut crop_x, mut crop_y) = (0, 0);
    if reader.read_bit()? {
        let left = reader.read_golomb()?;
        let right = reader.read_golomb()?;
        let top = reader.read_golomb()?;
        let bottom = reader.read_golomb()?;
        let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
            (0, _) | (3, true) => (1, 1),
            (1, _) => (2, 2),
            (2, _) => (2, 1),
            _ => (1, 1),
        };
        let unit_y = sub_height * if frame_mbs_only { 1 } else { 2 };
        crop_x = left
            .checked_add(right)
            .and_then(|v| v.checked_mul(sub_width))
            .ok_or_else(size_overflow)?;
        crop_y = top
            .checked_add(bottom)
            .and_then(|v| v.checked_mul(unit_y))
            .ok_or_else(size_overflow)?;
    }

    let vui = if reader.read_bit()? {
        Some(parse_vui(&mut reader)?)
    } else {
        None
    };

    let full_width = pic_width_in_mbs * 16;
    let full_height = pic_height_in_map_units * 16 * if frame_mbs_only { 1 } else { 2 };
    if crop_x >= full_width || crop_y >= full_height {
        return Err(ReformError::Codec("cropping exceeds picture size".into()));
    }

    Ok(SpsInfo {
        profile_idc,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        log2_max_frame_num,
        pic_order_cnt_type,
        frame_mbs_only,
        width: full_width - crop_x,
        height: full_height - crop_y,
        vui,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8;
    let mut next_scale = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(ReformError::Codec(format!(
                    "delta_scale {} out of range",
                    delta_scale
                )));
            }
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

fn parse_vui(reader: &mut BitReader) -> Result<VuiInfo> {
    let mut vui = VuiInfo::default();

    if reader.read_bit()? {
        let idc = reader.read_bits(8)? as usize;
        if idc == 255 {
            vui.sar_width = reader.read_bits(16)? as u16;
            vui.sar_height = reader.read_bits(16)? as u16;
        } else if let Some(&(w, h)) = SAR_TABLE.get(idc) {
            vui.sar_width = w;
            vui.sar_height = h;
        }
    }
    if reader.read_bit()? {
        reader.skip_bits(1)?; // overscan_appropriate_flag
    }
    if reader.read_bit()? {
        reader.skip_bits(3)?; // video_format
        vui.full_range = reader.read_bit()?;
        if reader.read_bit()? {
            vui.colour_primaries = reader.read_bits(8)? as u8;
            vui.transfer_characteristics = reader.read_bits(8)? as u8;
            vui.matrix_coefficients = reader.read_bits(8)? as u8;
        }
    }
    if reader.read_bit()? {
        reader.read_golomb()?; // chroma_sample_loc_type_top_field
        reader.read_golomb()?; // chroma_sample_loc_type_bottom_field
    }
    if reader.read_bit()? {
        vui.timing = Some(TimingInfo {
            num_units_in_tick: reader.read_bits(32)?,
            time_scale: reader.read_bits(32)?,
            fixed_frame_rate: reader.read_bit()?,
        });
    }
    if reader.read_bit()? {
        vui.nal_hrd = Some(parse_hrd(reader)?);
    }
    if reader.read_bit()? {
        vui.vcl_hrd = Some(parse_hrd(reader)?);
    }
    if vui.nal_hrd.is_some() || vui.vcl_hrd.is_some() {
        reader.skip_bits(1)?; // low_delay_hrd_flag
    }
    vui.pic_struct_present = reader.read_bit()?;
    // bitstream_restriction is not needed
    Ok(vui)
}

fn parse_hrd(reader: &mut BitReader) -> Result<HrdInfo> {
    let cpb_cnt = read_golomb_max(reader, 31, "cpb_cnt_minus1")? + 1;
    reader.skip_bits(4 + 4)?; // bit_rate_scale, cpb_size_scale
    for _ in 0..cpb_cnt {
        reader.read_golomb()?; // bit_rate_value_minus1
        reader.read_golomb()?; // cpb_size_value_minus1
        reader.skip_bits(1)?; // cbr_flag
    }
    Ok(HrdInfo {
        cpb_cnt,
        initial_cpb_removal_delay_length: reader.read_bits(5)? + 1,
        cpb_removal_delay_length: reader.read_bits(5)? + 1,
        dpb_output_delay_length: reader.read_bits(5)? + 1,
        time_offset_length: reader.read_bits(5)?,
    })
}

pub fn parse_pps(rbsp: &[u8]) -> Result<PpsInfo> {
    let mut reader = BitReader::new(rbsp);
    Ok(PpsInfo {
        pps_id: reader.read_golomb()?,
        sps_id: reader.read_golomb()?,
        entropy_coding_mode_flag: reader.read_bit()?,
    })
}

pub fn parse_slice_header(rbsp: &[u8], sps: &SpsInfo) -> Result<SliceHeader> {
    let mut reader = BitReader::new(rbsp);
    let first_mb_in_slice = reader.read_golomb()?;
    let slice_type = reader.read_golomb()?;
    if slice_type > 9 {
        return Err(ReformError::Codec(format!("slice type {}", slice_type)));
    }
    let pps_id = reader.read_golomb()?;
    if sps.separate_colour_plane {
        reader.skip_bits(2)?;
    }
    let frame_num = reader.read_bits(sps.log2_max_frame_num)?;
    let mut header = SliceHeader {
        first_mb_in_slice,
        slice_type,
        pps_id,
        frame_num,
        ..Default::default()
    };
    if !sps.frame_mbs_only {
        header.field_pic = reader.read_bit()?;
        if header.field_pic {
            header.bottom_field = reader.read_bit()?;
        }
    }
    Ok(header)
}

/// SEI messages relevant to timing, found in one SEI NAL unit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeiTiming {
    pub buffering_period: bool,
    pub pic_timing: Option<PicTiming>,
}

pub fn parse_sei(rbsp: &[u8], sps: Option<&SpsInfo>) -> Result<SeiTiming> {
    let mut out = SeiTiming::default();
    let mut pos = 0;
    // the rbsp trailing bits byte ends the message list
    while pos < rbsp.len() && rbsp[pos] != 0x80 {
        let mut payload_type = 0usize;
        while *rbsp.get(pos).ok_or(ReformError::Eof)? == 0xFF {
            payload_type += 255;
            pos += 1;
        }
        payload_type += rbsp[pos] as usize;
        pos += 1;
        let mut payload_size = 0usize;
        while *rbsp.get(pos).ok_or(ReformError::Eof)? == 0xFF {
            payload_size += 255;
            pos += 1;
        }
        payload_size += rbsp[pos] as usize;
        pos += 1;

        let payload = rbsp
            .get(pos..pos + payload_size)
            .ok_or_else(|| ReformError::Codec("SEI payload overruns NAL unit".into()))?;
        pos += payload_size;

        match payload_type {
            0 => out.buffering_period = true,
            1 => {
                if let Some(sps) = sps {
                    out.pic_timing = Some(parse_pic_timing(payload, sps)?);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn parse_pic_timing(payload: &[u8], sps: &SpsInfo) -> Result<PicTiming> {
    let mut reader = BitReader::new(payload);
    let mut timing = PicTiming::default();
    if let Some(hrd) = sps.hrd() {
        timing.cpb_removal_delay = Some(reader.read_bits(hrd.cpb_removal_delay_length)?);
        timing.dpb_output_delay = Some(reader.read_bits(hrd.dpb_output_delay_length)?);
    }
    if sps.pic_struct_present() {
        timing.pic_struct = Some(reader.read_bits(4)? as u8);
    }
    Ok(timing)
}

fn frame_type_of(slice_type: u32) -> FrameType {
    match slice_type % 5 {
        0 | 3 => FrameType::P,
        1 => FrameType::B,
        2 | 4 => FrameType::I,
        _ => FrameType::Unknown,
    }
}

/// One coded picture (a frame or a single field) being collected.
#[derive(Debug, Clone)]
struct Picture {
    slice: SliceHeader,
    frame_type: FrameType,
    timing: Option<PicTiming>,
    buffering_period: bool,
    pes_pts: Option<i64>,
    pes_dts: Option<i64>,
    gop_start: bool,
    size: usize,
    file_offset: i64,
}

/// A first field waiting for its partner, with resolved timestamps.
#[derive(Debug, Clone)]
struct PendingField {
    picture: Picture,
    pts: i64,
    dts: i64,
}

/// H.264 elementary stream parser.
///
/// State carried across payload units: the active SPS and PPS set, the
/// decode time of the last buffering period, and a first field waiting for
/// its second.
#[derive(Debug, Default)]
pub struct H264Parser {
    sps: Option<SpsInfo>,
    pps: HashMap<u32, PpsInfo>,
    buffering_dts: Option<i64>,
    pending_field: Option<PendingField>,
    sequence_start: bool,
    mismatch_logged: bool,
}

impl H264Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sps(&self) -> Option<&SpsInfo> {
        self.sps.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Parses one PES payload, returning the frames completed by it.
    pub fn parse_unit(&mut self, unit: &PayloadUnit, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        let mut frames = Vec::new();
        let mut current: Option<Picture> = None;
        let mut sei = SeiTiming::default();
        let mut unit_timestamps = Some((unit.pts, unit.dts));

        for (offset, nal) in split_nal_units(&unit.data) {
            let nal_type = NalUnitType::from(nal[0]);
            match nal_type {
                NalUnitType::AccessUnitDelimiter | NalUnitType::EndOfSequence => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, &mut frames, diag);
                    }
                }
                NalUnitType::Sps => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, &mut frames, diag);
                    }
                    match parse_sps(&remove_emulation_prevention(&nal[1..])) {
                        Ok(sps) => {
                            self.sps = Some(sps);
                            self.sequence_start = true;
                        }
                        Err(e) => {
                            debug!("dropping broken SPS: {}", e);
                            diag.incr(Counter::MalformedHeader);
                        }
                    }
                }
                NalUnitType::Pps => match parse_pps(&remove_emulation_prevention(&nal[1..])) {
                    Ok(pps) => {
                        self.pps.insert(pps.pps_id, pps);
                    }
                    Err(_) => diag.incr(Counter::MalformedHeader),
                },
                NalUnitType::Sei => {
                    if let Some(pic) = current.take() {
                        self.finish_picture(pic, &mut frames, diag);
                    }
                    match parse_sei(&remove_emulation_prevention(&nal[1..]), self.sps.as_ref()) {
                        Ok(parsed) => {
                            sei.buffering_period |= parsed.buffering_period;
                            if parsed.pic_timing.is_some() {
                                sei.pic_timing = parsed.pic_timing;
                            }
                        }
                        Err(_) => diag.incr(Counter::MalformedHeader),
                    }
                }
                NalUnitType::CodedSliceNonIdr | NalUnitType::CodedSliceIdr => {
                    let slice = match self.slice_header(nal) {
                        Ok(s) => s,
                        Err(e) => {
                            debug!("dropping slice: {}", e);
                            diag.incr(Counter::MalformedHeader);
                            continue;
                        }
                    };
                    if slice.first_mb_in_slice == 0 {
                        if let Some(pic) = current.take() {
                            self.finish_picture(pic, &mut frames, diag);
                        }
                        let (pes_pts, pes_dts) = unit_timestamps.take().unwrap_or((None, None));
                        current = Some(Picture {
                            slice,
                            frame_type: frame_type_of(slice.slice_type),
                            timing: sei.pic_timing.take(),
                            buffering_period: std::mem::take(&mut sei.buffering_period),
                            pes_pts,
                            pes_dts,
                            gop_start: std::mem::take(&mut self.sequence_start),
                            size: nal.len(),
                            file_offset: unit.file_offset + offset as i64,
                        });
                    } else if let Some(pic) = current.as_mut() {
                        pic.size += nal.len();
                    }
                }
                _ => {
                    if let Some(pic) = current.as_mut() {
                        pic.size += nal.len();
                    }
                }
            }
        }

        if let Some(pic) = current.take() {
            self.finish_picture(pic, &mut frames, diag);
        }
        frames
    }

    /// Emits a field still waiting for its partner at end of stream.
    pub fn flush(&mut self, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        match self.pending_field.take() {
            Some(orphan) => {
                diag.incr(Counter::UnpairedField);
                vec![self.emit(&orphan.picture, None, orphan.pts, orphan.dts)]
            }
            None => Vec::new(),
        }
    }

    fn slice_header(&self, nal: &[u8]) -> Result<SliceHeader> {
        let sps = self
            .sps
            .as_ref()
            .ok_or_else(|| ReformError::Codec("slice before any SPS".into()))?;
        // the slice header fits well within the first bytes
        let head = &nal[1..nal.len().min(64)];
        let slice = parse_slice_header(&remove_emulation_prevention(head), sps)?;
        if !self.pps.contains_key(&slice.pps_id) {
            return Err(ReformError::Codec(format!("unknown pps {}", slice.pps_id)));
        }
        Ok(slice)
    }

    /// Resolves PTS/DTS of a picture from the transport and from SEI timing,
    /// cross-checking the two when both exist.
    fn resolve_timestamps(&mut self, pic: &Picture, diag: &mut Diagnostics) -> (i64, i64) {
        let pes_dts = pic.pes_dts.or(pic.pes_pts);
        let tick = self.sps.as_ref().and_then(|s| s.tick());

        let mut derived = None;
        if let (Some(tick), Some(timing)) = (tick, pic.timing) {
            if let (Some(cpb), Some(dpb)) = (timing.cpb_removal_delay, timing.dpb_output_delay) {
                let removal = (cpb as f64 * tick).round() as i64;
                let dts = if pic.buffering_period {
                    let anchor =
                        pes_dts.or_else(|| self.buffering_dts.map(|b| b.wrapping_add(removal)));
                    self.buffering_dts = anchor;
                    anchor
                } else {
                    self.buffering_dts.map(|b| b.wrapping_add(removal))
                };
                if let Some(dts) = dts {
                    let pts = dts.wrapping_add((dpb as f64 * tick).round() as i64);
                    derived = Some((pts & PTS_MASK, dts & PTS_MASK));
                }
            }
        } else if pic.buffering_period {
            self.buffering_dts = pes_dts;
        }

        match (pic.pes_pts, derived) {
            (Some(pts), Some((derived_pts, derived_dts))) => {
                if wrapped_diff(pts, derived_pts).abs() > 1 {
                    diag.incr(Counter::PtsMismatch);
                    if !self.mismatch_logged {
                        warn!(
                            "H.264 PTS mismatch: transport {} vs SEI {}",
                            pts, derived_pts
                        );
                        self.mismatch_logged = true;
                    }
                }
                (pts, pic.pes_dts.unwrap_or(derived_dts))
            }
            (Some(pts), None) => (pts, pes_dts.unwrap_or(pts)),
            (None, Some((pts, dts))) => (pts, dts),
            (None, None) => {
                diag.incr(Counter::UnknownPts);
                (-1, -1)
            }
        }
    }

    fn finish_picture(&mut self, pic: Picture, frames: &mut Vec<VideoFrameInfo>, diag: &mut Diagnostics) {
        if pic.slice.field_pic {
            if let Some(first) = self.pending_field.take() {
                if first.picture.slice.bottom_field != pic.slice.bottom_field {
                    // the pair is timed by its first field
                    frames.push(self.emit(&first.picture, Some(&pic), first.pts, first.dts));
                    return;
                }
                diag.incr(Counter::UnpairedField);
                frames.push(self.emit(&first.picture, None, first.pts, first.dts));
            }
            let (pts, dts) = self.resolve_timestamps(&pic, diag);
            self.pending_field = Some(PendingField { picture: pic, pts, dts });
            return;
        }

        if let Some(orphan) = self.pending_field.take() {
            diag.incr(Counter::UnpairedField);
            frames.push(self.emit(&orphan.picture, None, orphan.pts, orphan.dts));
        }
        let (pts, dts) = self.resolve_timestamps(&pic, diag);
        frames.push(self.emit(&pic, None, pts, dts));
    }

    fn emit(&self, first: &Picture, second: Option<&Picture>, pts: i64, dts: i64) -> VideoFrameInfo {
        let frame_mbs_only = self.sps.as_ref().map_or(true, |s| s.frame_mbs_only);
        let pic_struct = match first.timing.and_then(|t| t.pic_struct) {
            Some(0) => PicStruct::Frame,
            Some(1) | Some(3) => PicStruct::Tff,
            Some(2) | Some(4) => PicStruct::Bff,
            Some(5) => PicStruct::TffRff,
            Some(6) => PicStruct::BffRff,
            Some(7) => PicStruct::FrameDoubling,
            Some(8) => PicStruct::FrameTripling,
            _ if first.slice.field_pic && first.slice.bottom_field => PicStruct::Bff,
            _ if first.slice.field_pic || !frame_mbs_only => PicStruct::Tff,
            _ => PicStruct::Frame,
        };

        VideoFrameInfo {
            pts,
            dts,
            pic_struct,
            is_gop_start: first.gop_start || second.map_or(false, |s| s.gop_start),
            frame_type: first.frame_type,
            coded_size: (first.size + second.map_or(0, |s| s.size)) as u32,
            format: self
                .sps
                .as_ref()
                .map(|s| s.to_video_format())
                .unwrap_or_default(),
            file_offset: first.file_offset,
        }
    }
}
