use crate::error::{ReformError, Result};
use crate::utils::{BitReader, BitWriter};

/// Largest value the 13-bit ADTS frame_length field can carry.
pub const MAX_FRAME_LENGTH: usize = (1 << 13) - 1;

pub const ADTS_HEADER_SIZE: usize = 7;

pub const SAMPLES_PER_RAW_BLOCK: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    Main = 0,
    LC = 1,
    SSR = 2,
    LTP = 3,
}

impl From<u8> for ProfileType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => ProfileType::Main,
            1 => ProfileType::LC,
            2 => ProfileType::SSR,
            _ => ProfileType::LTP,
        }
    }
}

/// Syntax element ids of an AAC raw_data_block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementId {
    Sce = 0,
    Cpe = 1,
    Cce = 2,
    Lfe = 3,
    Dse = 4,
    Pce = 5,
    Fil = 6,
    End = 7,
}

impl From<u8> for ElementId {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0 => ElementId::Sce,
            1 => ElementId::Cpe,
            2 => ElementId::Cce,
            3 => ElementId::Lfe,
            4 => ElementId::Dse,
            5 => ElementId::Pce,
            6 => ElementId::Fil,
            _ => ElementId::End,
        }
    }
}

/// Bit span of one syntax element inside the raw data following the ADTS
/// header. `start_bit` points at the element's 3-bit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxElement {
    pub id: ElementId,
    pub start_bit: usize,
    pub end_bit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsHeader {
    /// 0 = MPEG-4, 1 = MPEG-2
    pub id: u8,
    pub layer: u8,
    pub protection_absent: bool,
    pub profile: ProfileType,
    pub sample_rate_index: u8,
    pub private_bit: bool,
    pub channel_configuration: u8,
    pub original_copy: bool,
    pub home: bool,
    pub copyright_id_bit: bool,
    pub copyright_id_start: bool,
    /// Whole frame length including the header.
    pub frame_length: u16,
    pub buffer_fullness: u16,
    pub number_of_raw_blocks: u8,
}

impl AdtsHeader {
    /// Parses the fixed and variable header, failing on a bad sync word or
    /// reserved field values.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADTS_HEADER_SIZE {
            return Err(ReformError::Parser("ADTS header too short".into()));
        }

        let mut reader = BitReader::new(data);
        if reader.read_bits(12)? != 0xFFF {
            return Err(ReformError::Parser("Invalid ADTS sync word".into()));
        }

        let header = AdtsHeader {
            id: reader.read_bits(1)? as u8,
            layer: reader.read_bits(2)? as u8,
            protection_absent: reader.read_bit()?,
            profile: ProfileType::from(reader.read_bits(2)? as u8),
            sample_rate_index: reader.read_bits(4)? as u8,
            private_bit: reader.read_bit()?,
            channel_configuration: reader.read_bits(3)? as u8,
            original_copy: reader.read_bit()?,
            home: reader.read_bit()?,
            copyright_id_bit: reader.read_bit()?,
            copyright_id_start: reader.read_bit()?,
            frame_length: reader.read_bits(13)? as u16,
            buffer_fullness: reader.read_bits(11)? as u16,
            number_of_raw_blocks: reader.read_bits(2)? as u8,
        };

        if header.layer != 0 {
            return Err(ReformError::Parser(format!("ADTS layer {}", header.layer)));
        }
        if header.sample_rate().is_none() {
            return Err(ReformError::Parser(format!(
                "ADTS sampling frequency index {}",
                header.sample_rate_index
            )));
        }
        if (header.frame_length as usize) < header.header_len() {
            return Err(ReformError::Parser(format!(
                "ADTS frame length {} shorter than header",
                header.frame_length
            )));
        }
        Ok(header)
    }

    /// Header size in bytes, including the CRC when present.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + 2
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match self.sample_rate_index {
            0 => Some(96000),
            1 => Some(88200),
            2 => Some(64000),
            3 => Some(48000),
            4 => Some(44100),
            5 => Some(32000),
            6 => Some(24000),
            7 => Some(22050),
            8 => Some(16000),
            9 => Some(12000),
            10 => Some(11025),
            11 => Some(8000),
            12 => Some(7350),
            _ => None,
        }
    }

    /// Samples per channel carried by the frame.
    pub fn samples(&self) -> u32 {
        SAMPLES_PER_RAW_BLOCK * (self.number_of_raw_blocks as u32 + 1)
    }

    /// Channel count implied by channel_configuration, if it implies one.
    pub fn configured_channels(&self) -> Option<u32> {
        match self.channel_configuration {
            0 => None,
            7 => Some(8),
            n => Some(n as u32),
        }
    }

    /// Serialises the 7-byte header (CRC words are never written).
    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_bits(0xFFF, 12);
        writer.write_bits(self.id as u32, 1);
        writer.write_bits(self.layer as u32, 2);
        writer.write_bit(self.protection_absent);
        writer.write_bits(self.profile as u32, 2);
        writer.write_bits(self.sample_rate_index as u32, 4);
        writer.write_bit(self.private_bit);
        writer.write_bits(self.channel_configuration as u32, 3);
        writer.write_bit(self.original_copy);
        writer.write_bit(self.home);
        writer.write_bit(self.copyright_id_bit);
        writer.write_bit(self.copyright_id_start);
        writer.write_bits(self.frame_length as u32, 13);
        writer.write_bits(self.buffer_fullness as u32, 11);
        writer.write_bits(self.number_of_raw_blocks as u32, 2);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(ADTS_HEADER_SIZE);
        self.write(&mut writer);
        // 56 bits, always aligned
        writer.finish().unwrap_or_default()
    }
}

/// Finds the next 12-bit ADTS sync word.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    data.windows(2)
        .position(|w| w[0] == 0xFF && (w[1] & 0xF0) == 0xF0)
}
