//! Elementary stream frame parsers.
//!
//! Video parsers are selected at runtime from the PMT stream type, so the
//! demuxer holds a [`VideoParser`] value and swaps it when the table changes.

pub mod aac;
pub mod h264;
pub mod mpeg2;

use crate::av::{PayloadUnit, VideoFrameInfo};
use crate::diagnostics::Diagnostics;

pub use aac::AdtsParser;
pub use h264::H264Parser;
pub use mpeg2::Mpeg2Parser;

/// stream_type of ISO/IEC 13818-2 video.
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
/// stream_type of ISO/IEC 13818-7 ADTS audio.
pub const STREAM_TYPE_ADTS_AAC: u8 = 0x0F;
/// stream_type of H.264 video.
pub const STREAM_TYPE_H264: u8 = 0x1B;

#[derive(Debug)]
pub enum VideoParser {
    Mpeg2(Mpeg2Parser),
    H264(H264Parser),
}

impl VideoParser {
    /// Parser for a PMT stream type, if it is a supported video type.
    pub fn for_stream_type(stream_type: u8) -> Option<Self> {
        match stream_type {
            STREAM_TYPE_MPEG2_VIDEO => Some(VideoParser::Mpeg2(Mpeg2Parser::new())),
            STREAM_TYPE_H264 => Some(VideoParser::H264(H264Parser::new())),
            _ => None,
        }
    }

    pub fn stream_type(&self) -> u8 {
        match self {
            VideoParser::Mpeg2(_) => STREAM_TYPE_MPEG2_VIDEO,
            VideoParser::H264(_) => STREAM_TYPE_H264,
        }
    }

    pub fn parse_unit(&mut self, unit: &PayloadUnit, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        match self {
            VideoParser::Mpeg2(p) => p.parse_unit(unit, diag),
            VideoParser::H264(p) => p.parse_unit(unit, diag),
        }
    }

    pub fn flush(&mut self, diag: &mut Diagnostics) -> Vec<VideoFrameInfo> {
        match self {
            VideoParser::Mpeg2(p) => p.flush(diag),
            VideoParser::H264(p) => p.flush(diag),
        }
    }
}

pub fn is_video_stream_type(stream_type: u8) -> bool {
    matches!(stream_type, STREAM_TYPE_MPEG2_VIDEO | STREAM_TYPE_H264)
}
