use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use crate::av::{
    AudioChannels, AudioFormat, AudioFrameInfo, CaptionItem, FrameType, PicStruct, StreamEvent,
    StreamEventKind, TimeAnchor, VideoCodec, VideoFormat, VideoFrameInfo,
};
use crate::error::{ReformError, Result};

/// Everything the reform engine needs about one recording.
///
/// Serialised little-endian as
/// `[source_file_count:i32][video][audio][captions][events][anchors]`,
/// each array an `i64` count followed by its records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReformInput {
    pub source_file_count: i32,
    pub video_frames: Vec<VideoFrameInfo>,
    pub audio_frames: Vec<AudioFrameInfo>,
    pub captions: Vec<CaptionItem>,
    pub events: Vec<StreamEvent>,
    pub time_anchors: Vec<TimeAnchor>,
}

fn need(buf: &impl Buf, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(ReformError::InvalidData("truncated reform state".into()));
    }
    Ok(())
}

fn read_count(buf: &mut impl Buf, record_size: usize) -> Result<usize> {
    need(buf, 8)?;
    let count = buf.get_i64_le();
    if count < 0 {
        return Err(ReformError::InvalidData(format!("negative array count {}", count)));
    }
    let count = count as usize;
    need(buf, count.saturating_mul(record_size))?;
    Ok(count)
}

fn invalid(what: &str, v: impl std::fmt::Display) -> ReformError {
    ReformError::InvalidData(format!("bad {} code {}", what, v))
}

const VIDEO_FORMAT_SIZE: usize = 1 + 2 * 6 + 4 * 2 + 4;
const VIDEO_RECORD_SIZE: usize = 8 + 8 + 3 + 4 + VIDEO_FORMAT_SIZE + 8;
const AUDIO_RECORD_SIZE: usize = 8 + 4 + 1 + 4 + 4 + 4 + 4 + 8 + 8;
const CAPTION_MIN_SIZE: usize = 8 + 8 + 4 + 4;
const EVENT_RECORD_SIZE: usize = 16;
const ANCHOR_RECORD_SIZE: usize = 16;

fn put_video_format(buf: &mut impl BufMut, f: &VideoFormat) {
    buf.put_u8(f.codec.to_u8());
    buf.put_u16_le(f.width);
    buf.put_u16_le(f.height);
    buf.put_u16_le(f.display_width);
    buf.put_u16_le(f.display_height);
    buf.put_u16_le(f.sar_width);
    buf.put_u16_le(f.sar_height);
    buf.put_u32_le(f.frame_rate_num);
    buf.put_u32_le(f.frame_rate_den);
    buf.put_u8(f.color_primaries);
    buf.put_u8(f.transfer_characteristics);
    buf.put_u8(f.color_space);
    buf.put_u8(f.progressive as u8);
}

fn get_video_format(buf: &mut impl Buf) -> Result<VideoFormat> {
    let codec = buf.get_u8();
    Ok(VideoFormat {
        codec: VideoCodec::from_u8(codec).ok_or_else(|| invalid("codec", codec))?,
        width: buf.get_u16_le(),
        height: buf.get_u16_le(),
        display_width: buf.get_u16_le(),
        display_height: buf.get_u16_le(),
        sar_width: buf.get_u16_le(),
        sar_height: buf.get_u16_le(),
        frame_rate_num: buf.get_u32_le(),
        frame_rate_den: buf.get_u32_le(),
        color_primaries: buf.get_u8(),
        transfer_characteristics: buf.get_u8(),
        color_space: buf.get_u8(),
        progressive: buf.get_u8() != 0,
    })
}

fn put_video_frame(buf: &mut impl BufMut, f: &VideoFrameInfo) {
    buf.put_i64_le(f.pts);
    buf.put_i64_le(f.dts);
    buf.put_u8(f.pic_struct.to_u8());
    buf.put_u8(f.is_gop_start as u8);
    buf.put_u8(f.frame_type.to_u8());
    buf.put_u32_le(f.coded_size);
    put_video_format(buf, &f.format);
    buf.put_i64_le(f.file_offset);
}

fn get_video_frame(buf: &mut impl Buf) -> Result<VideoFrameInfo> {
    let pts = buf.get_i64_le();
    let dts = buf.get_i64_le();
    let pic_struct = buf.get_u8();
    let is_gop_start = buf.get_u8() != 0;
    let frame_type = buf.get_u8();
    Ok(VideoFrameInfo {
        pts,
        dts,
        pic_struct: PicStruct::from_u8(pic_struct).ok_or_else(|| invalid("pic_struct", pic_struct))?,
        is_gop_start,
        frame_type: FrameType::from_u8(frame_type).ok_or_else(|| invalid("frame type", frame_type))?,
        coded_size: buf.get_u32_le(),
        format: get_video_format(buf)?,
        file_offset: buf.get_i64_le(),
    })
}

fn put_audio_frame(buf: &mut impl BufMut, f: &AudioFrameInfo) {
    buf.put_i64_le(f.pts);
    buf.put_u32_le(f.samples);
    buf.put_u8(f.format.channels.to_u8());
    buf.put_u32_le(f.format.sample_rate);
    buf.put_u32_le(f.audio_idx);
    buf.put_u32_le(f.codec_size);
    buf.put_u32_le(f.wave_size);
    buf.put_i64_le(f.wave_offset);
    buf.put_i64_le(f.file_offset);
}

fn get_audio_frame(buf: &mut impl Buf) -> Result<AudioFrameInfo> {
    let pts = buf.get_i64_le();
    let samples = buf.get_u32_le();
    let channels = buf.get_u8();
    Ok(AudioFrameInfo {
        pts,
        samples,
        format: AudioFormat {
            channels: AudioChannels::from_u8(channels).ok_or_else(|| invalid("channel layout", channels))?,
            sample_rate: buf.get_u32_le(),
        },
        audio_idx: buf.get_u32_le(),
        codec_size: buf.get_u32_le(),
        wave_size: buf.get_u32_le(),
        wave_offset: buf.get_i64_le(),
        file_offset: buf.get_i64_le(),
    })
}

fn put_caption(buf: &mut impl BufMut, c: &CaptionItem) {
    buf.put_i64_le(c.pts);
    buf.put_i64_le(c.duration);
    buf.put_i32_le(c.lang_index);
    buf.put_i32_le(c.text.len() as i32);
    buf.put_slice(c.text.as_bytes());
}

fn get_caption(buf: &mut impl Buf) -> Result<CaptionItem> {
    need(buf, CAPTION_MIN_SIZE)?;
    let pts = buf.get_i64_le();
    let duration = buf.get_i64_le();
    let lang_index = buf.get_i32_le();
    let len = buf.get_i32_le();
    if len < 0 {
        return Err(ReformError::InvalidData(format!("negative caption length {}", len)));
    }
    need(buf, len as usize)?;
    let mut raw = vec![0u8; len as usize];
    buf.copy_to_slice(&mut raw);
    let text = String::from_utf8(raw)
        .map_err(|e| ReformError::InvalidData(format!("caption text: {}", e)))?;
    Ok(CaptionItem {
        pts,
        duration,
        lang_index,
        text,
    })
}

fn get_event(buf: &mut impl Buf) -> Result<StreamEvent> {
    let kind = buf.get_i32_le();
    Ok(StreamEvent {
        kind: StreamEventKind::from_i32(kind).ok_or_else(|| invalid("event", kind))?,
        frame_idx: buf.get_i32_le(),
        num_audio: buf.get_i32_le(),
        audio_idx: buf.get_i32_le(),
    })
}

impl ReformInput {
    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.source_file_count);

        buf.put_i64_le(self.video_frames.len() as i64);
        for f in &self.video_frames {
            put_video_frame(buf, f);
        }
        buf.put_i64_le(self.audio_frames.len() as i64);
        for f in &self.audio_frames {
            put_audio_frame(buf, f);
        }
        buf.put_i64_le(self.captions.len() as i64);
        for c in &self.captions {
            put_caption(buf, c);
        }
        buf.put_i64_le(self.events.len() as i64);
        for e in &self.events {
            buf.put_i32_le(e.kind.to_i32());
            buf.put_i32_le(e.frame_idx);
            buf.put_i32_le(e.num_audio);
            buf.put_i32_le(e.audio_idx);
        }
        buf.put_i64_le(self.time_anchors.len() as i64);
        for a in &self.time_anchors {
            buf.put_i64_le(a.pts);
            buf.put_i64_le(a.wall_clock_ms);
        }
    }

    pub fn read_from(buf: &mut impl Buf) -> Result<Self> {
        need(buf, 4)?;
        let source_file_count = buf.get_i32_le();

        let count = read_count(buf, VIDEO_RECORD_SIZE)?;
        let video_frames = (0..count)
            .map(|_| get_video_frame(buf))
            .collect::<Result<Vec<_>>>()?;
        let count = read_count(buf, AUDIO_RECORD_SIZE)?;
        let audio_frames = (0..count)
            .map(|_| get_audio_frame(buf))
            .collect::<Result<Vec<_>>>()?;
        let count = read_count(buf, CAPTION_MIN_SIZE)?;
        let captions = (0..count)
            .map(|_| get_caption(buf))
            .collect::<Result<Vec<_>>>()?;
        let count = read_count(buf, EVENT_RECORD_SIZE)?;
        let events = (0..count)
            .map(|_| get_event(buf))
            .collect::<Result<Vec<_>>>()?;
        let count = read_count(buf, ANCHOR_RECORD_SIZE)?;
        let time_anchors = (0..count)
            .map(|_| TimeAnchor {
                pts: buf.get_i64_le(),
                wall_clock_ms: buf.get_i64_le(),
            })
            .collect();

        Ok(Self {
            source_file_count,
            video_frames,
            audio_frames,
            captions,
            events,
            time_anchors,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.to_vec()
    }

    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        Self::read_from(&mut data)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, self.to_bytes()).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Self::from_bytes(&data)
    }
}
