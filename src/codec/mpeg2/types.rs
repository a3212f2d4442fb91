use crate::error::{ReformError, Result};
use crate::utils::BitReader;

pub const PICTURE_START_CODE: u8 = 0x00;
pub const SLICE_START_CODE_MIN: u8 = 0x01;
pub const SLICE_START_CODE_MAX: u8 = 0xAF;
pub const SEQUENCE_HEADER_CODE: u8 = 0xB3;
pub const EXTENSION_START_CODE: u8 = 0xB5;
pub const SEQUENCE_END_CODE: u8 = 0xB7;
pub const GOP_START_CODE: u8 = 0xB8;

pub const SEQUENCE_EXTENSION_ID: u32 = 1;
pub const SEQUENCE_DISPLAY_EXTENSION_ID: u32 = 2;
pub const PICTURE_CODING_EXTENSION_ID: u32 = 8;

/// frame_rate_code to (num, den), index 0 is forbidden.
pub const FRAME_RATE_TABLE: [(u32, u32); 9] = [
    (0, 0),
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceHeader {
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub aspect_ratio_code: u8,
    pub frame_rate_code: u8,
    pub bit_rate: u32,
}

impl SequenceHeader {
    /// Parses the fields following the 0xB3 start code.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        let horizontal_size = reader.read_bits(12)? as u16;
        let vertical_size = reader.read_bits(12)? as u16;
        let aspect_ratio_code = reader.read_bits(4)? as u8;
        let frame_rate_code = reader.read_bits(4)? as u8;
        let bit_rate = reader.read_bits(18)?;
        if horizontal_size == 0 || vertical_size == 0 {
            return Err(ReformError::Codec("sequence header with zero size".into()));
        }
        if frame_rate_code == 0 || frame_rate_code as usize >= FRAME_RATE_TABLE.len() {
            return Err(ReformError::Codec(format!(
                "frame_rate_code {} not allowed",
                frame_rate_code
            )));
        }
        Ok(Self {
            horizontal_size,
            vertical_size,
            aspect_ratio_code,
            frame_rate_code,
            bit_rate,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceExtension {
    pub profile_and_level: u8,
    pub progressive_sequence: bool,
    pub chroma_format: u8,
    pub horizontal_size_extension: u8,
    pub vertical_size_extension: u8,
    pub low_delay: bool,
    pub frame_rate_extension_n: u8,
    pub frame_rate_extension_d: u8,
}

impl SequenceExtension {
    /// Parses the fields following the 4-bit extension id.
    pub fn parse(reader: &mut BitReader) -> Result<Self> {
        let profile_and_level = reader.read_bits(8)? as u8;
        let progressive_sequence = reader.read_bit()?;
        let chroma_format = reader.read_bits(2)? as u8;
        let horizontal_size_extension = reader.read_bits(2)? as u8;
        let vertical_size_extension = reader.read_bits(2)? as u8;
        reader.skip_bits(12 + 1 + 8)?; // bit rate ext, marker, vbv ext
        let low_delay = reader.read_bit()?;
        Ok(Self {
            profile_and_level,
            progressive_sequence,
            chroma_format,
            horizontal_size_extension,
            vertical_size_extension,
            low_delay,
            frame_rate_extension_n: reader.read_bits(2)? as u8,
            frame_rate_extension_d: reader.read_bits(5)? as u8,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceDisplayExtension {
    pub video_format: u8,
    pub colour: Option<(u8, u8, u8)>,
    pub display_horizontal_size: u16,
    pub display_vertical_size: u16,
}

impl SequenceDisplayExtension {
    pub fn parse(reader: &mut BitReader) -> Result<Self> {
        let video_format = reader.read_bits(3)? as u8;
        let colour = if reader.read_bit()? {
            Some((
                reader.read_bits(8)? as u8,
                reader.read_bits(8)? as u8,
                reader.read_bits(8)? as u8,
            ))
        } else {
            None
        };
        let display_horizontal_size = reader.read_bits(14)? as u16;
        reader.skip_bits(1)?;
        let display_vertical_size = reader.read_bits(14)? as u16;
        Ok(Self {
            video_format,
            colour,
            display_horizontal_size,
            display_vertical_size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GopHeader {
    pub drop_frame: bool,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub pictures: u8,
    pub closed_gop: bool,
    pub broken_link: bool,
}

impl GopHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        let drop_frame = reader.read_bit()?;
        let hours = reader.read_bits(5)? as u8;
        let minutes = reader.read_bits(6)? as u8;
        reader.skip_bits(1)?;
        Ok(Self {
            drop_frame,
            hours,
            minutes,
            seconds: reader.read_bits(6)? as u8,
            pictures: reader.read_bits(6)? as u8,
            closed_gop: reader.read_bit()?,
            broken_link: reader.read_bit()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureHeader {
    pub temporal_reference: u16,
    /// 1 = I, 2 = P, 3 = B.
    pub picture_coding_type: u8,
}

impl PictureHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        let temporal_reference = reader.read_bits(10)? as u16;
        let picture_coding_type = reader.read_bits(3)? as u8;
        if !(1..=4).contains(&picture_coding_type) {
            return Err(ReformError::Codec(format!(
                "picture_coding_type {}",
                picture_coding_type
            )));
        }
        Ok(Self {
            temporal_reference,
            picture_coding_type,
        })
    }
}

/// picture_structure values.
pub const TOP_FIELD: u8 = 1;
pub const BOTTOM_FIELD: u8 = 2;
pub const FRAME_PICTURE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureCodingExtension {
    pub intra_dc_precision: u8,
    pub picture_structure: u8,
    pub top_field_first: bool,
    pub repeat_first_field: bool,
    pub progressive_frame: bool,
}

impl Default for PictureCodingExtension {
    fn default() -> Self {
        // MPEG-1 pictures carry no extension and are progressive frames
        Self {
            intra_dc_precision: 0,
            picture_structure: FRAME_PICTURE,
            top_field_first: false,
            repeat_first_field: false,
            progressive_frame: true,
        }
    }
}

impl PictureCodingExtension {
    pub fn parse(reader: &mut BitReader) -> Result<Self> {
        reader.skip_bits(16)?; // f_code
        let intra_dc_precision = reader.read_bits(2)? as u8;
        let picture_structure = reader.read_bits(2)? as u8;
        if picture_structure == 0 {
            return Err(ReformError::Codec("reserved picture_structure".into()));
        }
        let top_field_first = reader.read_bit()?;
        reader.skip_bits(5)?; // frame_pred_frame_dct .. alternate_scan
        let repeat_first_field = reader.read_bit()?;
        reader.skip_bits(1)?; // chroma_420_type
        Ok(Self {
            intra_dc_precision,
            picture_structure,
            top_field_first,
            repeat_first_field,
            progressive_frame: reader.read_bit()?,
        })
    }
}
