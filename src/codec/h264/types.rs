use crate::av::{VideoCodec, VideoFormat};
use crate::utils::gcd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    Unspecified,
    CodedSliceNonIdr,
    CodedSliceDataPartitionA,
    CodedSliceDataPartitionB,
    CodedSliceDataPartitionC,
    CodedSliceIdr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::CodedSliceNonIdr,
            2 => NalUnitType::CodedSliceDataPartitionA,
            3 => NalUnitType::CodedSliceDataPartitionB,
            4 => NalUnitType::CodedSliceDataPartitionC,
            5 => NalUnitType::CodedSliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            _ => NalUnitType::Unspecified,
        }
    }
}

/// Delay field widths from hrd_parameters().
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HrdInfo {
    pub cpb_cnt: u32,
    pub initial_cpb_removal_delay_length: u32,
    pub cpb_removal_delay_length: u32,
    pub dpb_output_delay_length: u32,
    pub time_offset_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuiInfo {
    pub sar_width: u16,
    pub sar_height: u16,
    pub full_range: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub timing: Option<TimingInfo>,
    pub nal_hrd: Option<HrdInfo>,
    pub vcl_hrd: Option<HrdInfo>,
    pub pic_struct_present: bool,
}

impl Default for VuiInfo {
    fn default() -> Self {
        Self {
            sar_width: 0,
            sar_height: 0,
            full_range: false,
            // 2 = unspecified
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coefficients: 2,
            timing: None,
            nal_hrd: None,
            vcl_hrd: None,
            pic_struct_present: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub frame_mbs_only: bool,
    /// Cropped picture size.
    pub width: u32,
    pub height: u32,
    pub vui: Option<VuiInfo>,
}

impl SpsInfo {
    /// HRD describing the delay fields of picture timing SEI, NAL preferred.
    pub fn hrd(&self) -> Option<&HrdInfo> {
        self.vui
            .as_ref()
            .and_then(|v| v.nal_hrd.as_ref().or(v.vcl_hrd.as_ref()))
    }

    pub fn pic_struct_present(&self) -> bool {
        self.vui.as_ref().map_or(false, |v| v.pic_struct_present)
    }

    /// One clock tick in 90 kHz units.
    pub fn tick(&self) -> Option<f64> {
        let timing = self.vui.as_ref()?.timing?;
        if timing.time_scale == 0 || timing.num_units_in_tick == 0 {
            return None;
        }
        Some(90_000.0 * timing.num_units_in_tick as f64 / timing.time_scale as f64)
    }

    pub fn to_video_format(&self) -> VideoFormat {
        let vui = self.vui.unwrap_or_default();
        let (sar_width, sar_height) = if vui.sar_width > 0 && vui.sar_height > 0 {
            (vui.sar_width, vui.sar_height)
        } else {
            (1, 1)
        };
        let (frame_rate_num, frame_rate_den) = match vui.timing {
            Some(t) if t.time_scale > 0 && t.num_units_in_tick > 0 => {
                let num = t.time_scale as u64;
                let den = 2 * t.num_units_in_tick as u64;
                let g = gcd(num, den);
                ((num / g) as u32, (den / g) as u32)
            }
            _ => (0, 0),
        };
        let display_width =
            (self.width as u64 * sar_width as u64 / sar_height as u64).min(u16::MAX as u64);

        VideoFormat {
            codec: VideoCodec::H264,
            width: self.width as u16,
            height: self.height as u16,
            display_width: display_width as u16,
            display_height: self.height as u16,
            sar_width,
            sar_height,
            frame_rate_num,
            frame_rate_den,
            color_primaries: vui.colour_primaries,
            transfer_characteristics: vui.transfer_characteristics,
            color_space: vui.matrix_coefficients,
            progressive: self.frame_mbs_only,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsInfo {
    pub pps_id: u32,
    pub sps_id: u32,
    pub entropy_coding_mode_flag: bool,
}

/// The leading fields of slice_header() needed for picture boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: u32,
    pub pps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
}

/// Values carried by a pic_timing SEI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicTiming {
    pub cpb_removal_delay: Option<u32>,
    pub dpb_output_delay: Option<u32>,
    pub pic_struct: Option<u8>,
}

/// Sample aspect ratios of Table E-1, indexed by aspect_ratio_idc.
pub const SAR_TABLE: [(u16, u16); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];
