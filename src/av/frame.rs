use super::MPEG_CLOCK_HZ;

/// Video bitstream family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    #[default]
    Unknown,
    Mpeg2,
    H264,
}

impl VideoCodec {
    pub fn to_u8(self) -> u8 {
        match self {
            VideoCodec::Unknown => 0,
            VideoCodec::Mpeg2 => 1,
            VideoCodec::H264 => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(VideoCodec::Unknown),
            1 => Some(VideoCodec::Mpeg2),
            2 => Some(VideoCodec::H264),
            _ => None,
        }
    }
}

/// How a coded picture maps onto display fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PicStruct {
    /// Progressive frame.
    #[default]
    Frame,
    FrameDoubling,
    FrameTripling,
    /// Interlaced, top field first.
    Tff,
    /// Interlaced, bottom field first.
    Bff,
    /// Top, bottom, repeated top.
    TffRff,
    /// Bottom, top, repeated bottom.
    BffRff,
}

impl PicStruct {
    /// Display duration in fields.
    pub fn field_count(self) -> u32 {
        match self {
            PicStruct::Frame | PicStruct::Tff | PicStruct::Bff => 2,
            PicStruct::TffRff | PicStruct::BffRff => 3,
            PicStruct::FrameDoubling => 4,
            PicStruct::FrameTripling => 6,
        }
    }

    pub fn is_repeat(self) -> bool {
        !matches!(self, PicStruct::Frame | PicStruct::Tff | PicStruct::Bff)
    }

    pub fn to_u8(self) -> u8 {
        match self {
            PicStruct::Frame => 0,
            PicStruct::FrameDoubling => 1,
            PicStruct::FrameTripling => 2,
            PicStruct::Tff => 3,
            PicStruct::Bff => 4,
            PicStruct::TffRff => 5,
            PicStruct::BffRff => 6,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => PicStruct::Frame,
            1 => PicStruct::FrameDoubling,
            2 => PicStruct::FrameTripling,
            3 => PicStruct::Tff,
            4 => PicStruct::Bff,
            5 => PicStruct::TffRff,
            6 => PicStruct::BffRff,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Unknown,
    I,
    P,
    B,
}

impl FrameType {
    pub fn to_u8(self) -> u8 {
        match self {
            FrameType::Unknown => 0,
            FrameType::I => 1,
            FrameType::P => 2,
            FrameType::B => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => FrameType::Unknown,
            1 => FrameType::I,
            2 => FrameType::P,
            3 => FrameType::B,
            _ => return None,
        })
    }
}

/// Snapshot of the video parameters a picture was coded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoFormat {
    pub codec: VideoCodec,
    pub width: u16,
    pub height: u16,
    pub display_width: u16,
    pub display_height: u16,
    pub sar_width: u16,
    pub sar_height: u16,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub color_primaries: u8,
    pub transfer_characteristics: u8,
    pub color_space: u8,
    pub progressive: bool,
}

/// 29.97 fps in 90 kHz ticks, used when a stream never states its rate.
const FALLBACK_FRAME_TICKS: f64 = 3003.0;

impl VideoFormat {
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Nominal frame period in 90 kHz ticks.
    pub fn frame_duration(&self) -> f64 {
        if self.frame_rate_num == 0 || self.frame_rate_den == 0 {
            return FALLBACK_FRAME_TICKS;
        }
        MPEG_CLOCK_HZ as f64 * self.frame_rate_den as f64 / self.frame_rate_num as f64
    }
}

/// One presented picture, as produced by a video parser.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoFrameInfo {
    /// Raw 33-bit PTS, -1 when unknown.
    pub pts: i64,
    /// Raw 33-bit DTS, -1 when unknown.
    pub dts: i64,
    pub pic_struct: PicStruct,
    pub is_gop_start: bool,
    pub frame_type: FrameType,
    pub coded_size: u32,
    pub format: VideoFormat,
    pub file_offset: i64,
}

/// Speaker layout of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioChannels {
    #[default]
    Invalid,
    /// 1/0
    Mono,
    /// 2/0
    Stereo,
    /// 3/0
    C30,
    /// 3/1
    C31,
    /// 3/2
    C32,
    /// 3/2 + LFE
    C32Lfe,
    /// 2/1
    C21,
    /// 2/2
    C22,
    /// Two independent mono programs.
    DualMono,
    /// 5/2 + LFE
    C52Lfe,
    /// 3/3 + LFE
    C33Lfe,
}

impl AudioChannels {
    pub fn channel_count(self) -> u32 {
        match self {
            AudioChannels::Invalid => 0,
            AudioChannels::Mono => 1,
            AudioChannels::Stereo | AudioChannels::DualMono => 2,
            AudioChannels::C30 | AudioChannels::C21 => 3,
            AudioChannels::C31 | AudioChannels::C22 => 4,
            AudioChannels::C32 => 5,
            AudioChannels::C32Lfe => 6,
            AudioChannels::C33Lfe => 7,
            AudioChannels::C52Lfe => 8,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AudioChannels::Invalid => 0,
            AudioChannels::Mono => 1,
            AudioChannels::Stereo => 2,
            AudioChannels::C30 => 3,
            AudioChannels::C31 => 4,
            AudioChannels::C32 => 5,
            AudioChannels::C32Lfe => 6,
            AudioChannels::C21 => 7,
            AudioChannels::C22 => 8,
            AudioChannels::DualMono => 9,
            AudioChannels::C52Lfe => 10,
            AudioChannels::C33Lfe => 11,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => AudioChannels::Invalid,
            1 => AudioChannels::Mono,
            2 => AudioChannels::Stereo,
            3 => AudioChannels::C30,
            4 => AudioChannels::C31,
            5 => AudioChannels::C32,
            6 => AudioChannels::C32Lfe,
            7 => AudioChannels::C21,
            8 => AudioChannels::C22,
            9 => AudioChannels::DualMono,
            10 => AudioChannels::C52Lfe,
            11 => AudioChannels::C33Lfe,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormat {
    pub channels: AudioChannels,
    pub sample_rate: u32,
}

/// One coded audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioFrameInfo {
    /// Raw 33-bit PTS, -1 when unknown.
    pub pts: i64,
    /// Samples per channel.
    pub samples: u32,
    pub format: AudioFormat,
    /// Index of the audio stream within the program.
    pub audio_idx: u32,
    pub codec_size: u32,
    /// Decoded 16-bit PCM size of the frame.
    pub wave_size: u32,
    /// Running PCM byte offset within its audio stream.
    pub wave_offset: i64,
    pub file_offset: i64,
}

impl AudioFrameInfo {
    /// Frame duration in 90 kHz ticks.
    pub fn duration(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.samples as f64 * MPEG_CLOCK_HZ as f64 / self.format.sample_rate as f64
    }
}
