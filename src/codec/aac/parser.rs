use super::channels::{layout_from_configuration, layout_from_count, layout_from_elements};
use super::decoder::{AacDecoder, DecodedFrame, HeaderDecoder};
use super::types::{find_sync, AdtsHeader, ADTS_HEADER_SIZE, MAX_FRAME_LENGTH};
use crate::av::timestamp::PTS_MASK;
use crate::av::{AudioFormat, AudioFrameInfo, PayloadUnit, MPEG_CLOCK_HZ};
use crate::diagnostics::{Counter, Diagnostics};
use bytes::{Buf, BytesMut};
use log::{debug, warn};

/// ADTS frame parser for one audio stream.
///
/// Keeps a rolling buffer across payload units, since ADTS frames straddle
/// PES boundaries freely.
pub struct AdtsParser {
    decoder: Box<dyn AacDecoder>,
    audio_idx: u32,
    buffer: BytesMut,
    /// File offset of the first buffered byte.
    buffer_offset: i64,
    /// A PES PTS not yet given to a frame, with the buffer position from
    /// which frames may take it.
    pending_pts: Option<(i64, usize)>,
    /// Locally extrapolated PTS of the next frame, -1 when unknown.
    next_pts: i64,
    last_channels: Option<u32>,
    wave_offset: i64,
}

impl AdtsParser {
    pub fn new(audio_idx: u32) -> Self {
        Self::with_decoder(audio_idx, Box::new(HeaderDecoder))
    }

    pub fn with_decoder(audio_idx: u32, decoder: Box<dyn AacDecoder>) -> Self {
        Self {
            decoder,
            audio_idx,
            buffer: BytesMut::new(),
            buffer_offset: 0,
            pending_pts: None,
            next_pts: -1,
            last_channels: None,
            wave_offset: 0,
        }
    }

    pub fn audio_idx(&self) -> u32 {
        self.audio_idx
    }

    /// Drops buffered bytes and timing state, e.g. after a stream switch.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_pts = None;
        self.next_pts = -1;
        self.last_channels = None;
        self.decoder.reset();
    }

    /// Appends one PES payload and returns every frame completed by it.
    pub fn parse_unit(&mut self, unit: &PayloadUnit, diag: &mut Diagnostics) -> Vec<AudioFrameInfo> {
        let carry = self.buffer.len();
        if carry == 0 {
            self.buffer_offset = unit.file_offset;
        }
        self.buffer.extend_from_slice(&unit.data);
        if let Some(pts) = unit.pts {
            self.pending_pts = Some((pts, carry));
        }

        let mut frames = Vec::new();
        let mut pos = 0;
        loop {
            match find_sync(&self.buffer[pos..]) {
                Some(skip) => pos += skip,
                // unsynced bytes stay buffered until a sync word shows up or
                // the desync limit below throws them away
                None => break,
            }
            if self.buffer.len() - pos < ADTS_HEADER_SIZE {
                break;
            }
            let header = match AdtsHeader::parse(&self.buffer[pos..]) {
                Ok(h) => h,
                Err(e) => {
                    debug!("audio {}: skipping bad ADTS header: {}", self.audio_idx, e);
                    diag.incr(Counter::MalformedHeader);
                    pos += 1;
                    continue;
                }
            };
            let len = header.frame_length as usize;
            if self.buffer.len() - pos < len {
                break;
            }

            let pts = match self.pending_pts {
                Some((pts, from)) if pos >= from => {
                    self.pending_pts = None;
                    pts
                }
                _ => self.next_pts,
            };
            let file_offset = if pos >= carry {
                unit.file_offset + (pos - carry) as i64
            } else {
                self.buffer_offset + pos as i64
            };

            let frame = self.buffer[pos..pos + len].to_vec();
            let duration_ticks = match self.decode_frame(&frame, &header, diag) {
                Some((samples, format)) => {
                    if pts < 0 {
                        diag.incr(Counter::UnknownPts);
                    }
                    let wave_size = samples * format.channels.channel_count() * 2;
                    frames.push(AudioFrameInfo {
                        pts,
                        samples,
                        format,
                        audio_idx: self.audio_idx,
                        codec_size: len as u32,
                        wave_size,
                        wave_offset: self.wave_offset,
                        file_offset,
                    });
                    self.wave_offset += wave_size as i64;
                    samples as i64 * MPEG_CLOCK_HZ / format.sample_rate as i64
                }
                None => {
                    diag.incr(Counter::DecodeError);
                    let rate = header.sample_rate().unwrap_or(48000) as i64;
                    header.samples() as i64 * MPEG_CLOCK_HZ / rate
                }
            };
            self.next_pts = if pts >= 0 {
                (pts + duration_ticks) & PTS_MASK
            } else {
                -1
            };
            pos += len;
        }

        self.consume(pos);

        if self.buffer.len() > MAX_FRAME_LENGTH {
            warn!(
                "audio {}: {} bytes buffered without a complete frame, dropping",
                self.audio_idx,
                self.buffer.len()
            );
            diag.incr(Counter::AudioDesync);
            self.buffer.clear();
            self.pending_pts = None;
        }
        frames
    }

    fn consume(&mut self, n: usize) {
        self.buffer.advance(n);
        self.buffer_offset += n as i64;
        self.pending_pts = self
            .pending_pts
            .map(|(pts, from)| (pts, from.saturating_sub(n)));
    }

    fn decode_frame(
        &mut self,
        frame: &[u8],
        header: &AdtsHeader,
        diag: &mut Diagnostics,
    ) -> Option<(u32, AudioFormat)> {
        let expected = header.configured_channels().or(self.last_channels);
        let mut out = self.decoder.decode(frame);
        if out.error || expected.map_or(false, |n| n != out.channels) {
            debug!(
                "audio {}: decode error={} channels={} expected={:?}, resetting decoder",
                self.audio_idx, out.error, out.channels, expected
            );
            self.decoder.reset();
            out = self.decoder.decode(frame);
            if out.error || out.channels == 0 {
                return None;
            }
        }

        let channels = resolve_layout(header, &out);
        let channels = match channels {
            Some(c) => c,
            None => {
                diag.incr(Counter::MalformedHeader);
                return None;
            }
        };
        self.last_channels = Some(out.channels);

        let sample_rate = header.sample_rate()?;
        let samples = if out.samples_per_channel > 0 {
            out.samples_per_channel
        } else {
            header.samples()
        };
        Some((
            samples,
            AudioFormat {
                channels,
                sample_rate,
            },
        ))
    }
}

fn resolve_layout(header: &AdtsHeader, out: &DecodedFrame) -> Option<crate::av::AudioChannels> {
    if !out.elements.is_empty() {
        if let Some(layout) = layout_from_elements(&out.elements) {
            return Some(layout);
        }
    }
    layout_from_configuration(header.channel_configuration).or_else(|| layout_from_count(out.channels))
}

#[cfg(test)]
mod tests {
    use super::super::types::test_util;
    use super::*;
    use crate::av::AudioChannels;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn unit(data: Vec<u8>, pts: Option<i64>) -> PayloadUnit {
        let mut u = PayloadUnit::new(data);
        u.pts = pts;
        u
    }

    #[test]
    fn test_frames_get_extrapolated_pts() {
        let mut data = test_util::frame(2, 100);
        data.extend(test_util::frame(2, 120));
        data.extend(test_util::frame(2, 90));

        let mut diag = Diagnostics::new();
        let mut parser = AdtsParser::new(0);
        let frames = parser.parse_unit(&unit(data, Some(9000)), &mut diag);

        assert_eq!(frames.len(), 3);
        let pts: Vec<i64> = frames.iter().map(|f| f.pts).collect();
        assert_eq!(pts, vec![9000, 9000 + 1920, 9000 + 3840]);
        assert_eq!(frames[1].codec_size, 120);
        assert_eq!(frames[1].wave_offset, 1024 * 2 * 2);
        assert_eq!(
            frames[0].format,
            AudioFormat {
                channels: AudioChannels::Stereo,
                sample_rate: 48000
            }
        );
        assert!(diag.is_clean());
    }

    #[test]
    fn test_frame_straddling_units_keeps_previous_timing() {
        let a = test_util::frame(1, 100);
        let b = test_util::frame(1, 100);
        let mut first = a.clone();
        first.extend_from_slice(&b[..40]);
        let mut second = b[40..].to_vec();
        second.extend(test_util::frame(1, 100));

        let mut diag = Diagnostics::new();
        let mut parser = AdtsParser::new(0);
        let frames = parser.parse_unit(&unit(first, Some(0)), &mut diag);
        assert_eq!(frames.len(), 1);

        // frame b started before this unit, so it continues the old timeline
        // and the new PTS goes to the frame after it
        let frames = parser.parse_unit(&unit(second, Some(50_000)), &mut diag);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pts, 1920);
        assert_eq!(frames[1].pts, 50_000);
    }

    #[test]
    fn test_garbage_is_skipped_and_desync_discarded() {
        let mut diag = Diagnostics::new();
        let mut parser = AdtsParser::new(0);
        let mut data = vec![0x12, 0x34, 0x56];
        data.extend(test_util::frame(2, 64));
        let frames = parser.parse_unit(&unit(data, Some(0)), &mut diag);
        assert_eq!(frames.len(), 1);

        // a header promising a long frame that never completes
        let mut data = test_util::header(2, 8000).to_bytes();
        data.resize(5000, 0);
        assert!(parser.parse_unit(&unit(data.clone(), None), &mut diag).is_empty());
        assert_eq!(diag.get(Counter::AudioDesync), 0);
        let filler = vec![0u8; 2000];
        assert!(parser.parse_unit(&unit(filler, None), &mut diag).is_empty());
        assert_eq!(diag.get(Counter::AudioDesync), 0);

        let mut diag = Diagnostics::new();
        let mut parser = AdtsParser::new(0);
        assert!(parser.parse_unit(&unit(vec![0u8; 9000], None), &mut diag).is_empty());
        assert_eq!(diag.get(Counter::AudioDesync), 1);
    }

    struct FlakyDecoder {
        calls: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl AacDecoder for FlakyDecoder {
        fn decode(&mut self, frame: &[u8]) -> DecodedFrame {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return DecodedFrame::failed();
            }
            HeaderDecoder.decode(frame)
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_decoder_reset_and_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));
        let decoder = FlakyDecoder {
            calls: calls.clone(),
            resets: resets.clone(),
        };
        let mut parser = AdtsParser::with_decoder(1, Box::new(decoder));
        let mut diag = Diagnostics::new();
        let frames = parser.parse_unit(&unit(test_util::frame(2, 64), Some(0)), &mut diag);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].audio_idx, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(diag.get(Counter::DecodeError), 0);
    }

    #[test]
    fn test_undecodable_frame_is_counted() {
        let mut parser = AdtsParser::new(0);
        let mut diag = Diagnostics::new();
        let frames = parser.parse_unit(&unit(test_util::frame(0, 64), Some(0)), &mut diag);
        assert!(frames.is_empty());
        assert_eq!(diag.get(Counter::DecodeError), 1);
    }
}
