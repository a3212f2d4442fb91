mod common;

use common::*;
use pretty_assertions::assert_eq;
use tsreform::av::{AudioChannels, FrameType, PicStruct, StreamEvent, VideoCodec};
use tsreform::codec::aac::{
    AacDecoder, AdtsHeader, DecodedFrame, DualMonoSplitter, ElementId, SyntaxElement,
};
use tsreform::format::ts::{demux_reader, DemuxConfig, PacketSize, TsDemuxer};
use tsreform::reform::{RecordingCollector, ReformInput};
use tsreform::utils::BitReader;
use tsreform::{Counter, Diagnostics};

const RECORDING_START_MS: i64 = 1_700_000_000_000;

fn demux(data: &[u8], chunk: usize) -> (ReformInput, TsDemuxer, Diagnostics) {
    let mut demuxer = TsDemuxer::new(DemuxConfig {
        recording_start_ms: RECORDING_START_MS,
        ..Default::default()
    });
    let mut collector = RecordingCollector::new();
    let mut diag = Diagnostics::new();
    for piece in data.chunks(chunk) {
        demuxer.feed(piece, &mut collector, &mut diag);
    }
    demuxer.flush(&mut collector, &mut diag);
    (collector.finish(), demuxer, diag)
}

#[test]
fn test_mpeg2_and_aac_recording() {
    let ts = Recording::default().build();
    let (input, demuxer, diag) = demux(ts.bytes(), 1000);

    assert!(diag.is_clean(), "{}", diag);
    assert_eq!(demuxer.packet_size(), Some(188));
    assert_eq!(demuxer.pid_table().audio_pids, vec![AUDIO_PID]);

    assert_eq!(input.video_frames.len(), 60);
    assert_eq!(input.audio_frames.len(), 100);
    assert_eq!(
        input.events,
        vec![StreamEvent::pid_table(0, 1), StreamEvent::video_format(0)]
    );

    let video = &input.video_frames;
    assert!(video
        .iter()
        .enumerate()
        .all(|(i, f)| f.pts == 90_000 + i as i64 * FRAME_TICKS));
    assert!(video[0].is_gop_start && video[15].is_gop_start && !video[1].is_gop_start);
    assert_eq!(video[0].frame_type, FrameType::I);
    assert_eq!(video[1].frame_type, FrameType::P);
    assert_eq!(video[0].pic_struct, PicStruct::Tff);
    assert_eq!(video[0].format.codec, VideoCodec::Mpeg2);
    assert_eq!((video[0].format.width, video[0].format.height), (1440, 1080));
    // file offsets follow the stream
    assert!(video.windows(2).all(|w| w[0].file_offset < w[1].file_offset));

    let audio = &input.audio_frames;
    assert!(audio
        .iter()
        .enumerate()
        .all(|(i, f)| f.pts == 90_000 + i as i64 * AUDIO_TICKS));
    assert_eq!(audio[0].format.channels, AudioChannels::Stereo);
    assert_eq!(audio[0].format.sample_rate, 48000);
    assert_eq!(audio[0].codec_size, 200);

    // one anchor per 10 s of PCR, starting at the first PCR
    assert_eq!(input.time_anchors.len(), 1);
    assert_eq!(input.time_anchors[0].pts, 81_000);
    assert_eq!(input.time_anchors[0].wall_clock_ms, RECORDING_START_MS);
}

#[test]
fn test_chunking_does_not_matter() {
    let ts = Recording::default().build();
    let (whole, _, _) = demux(ts.bytes(), usize::MAX);
    let (bytewise, _, _) = demux(ts.bytes(), 7);
    assert_eq!(whole, bytewise);
}

#[test]
fn test_format_switch_events() {
    let ts = Recording {
        switch: Some((30, 1920)),
        ..Default::default()
    }
    .build();
    let (input, _, diag) = demux(ts.bytes(), 4096);
    assert!(diag.is_clean(), "{}", diag);
    assert_eq!(
        input.events,
        vec![
            StreamEvent::pid_table(0, 1),
            StreamEvent::video_format(0),
            StreamEvent::video_format(30),
        ]
    );
    assert_eq!(input.video_frames[30].format.width, 1920);
}

#[test]
fn test_lost_packet_drops_unit() {
    let ts = Recording::default().build();
    let mut data = ts.into_bytes();
    // the second packet of the first audio PES
    let audio_start = data
        .chunks(188)
        .position(|p| p[1] & 0x1F == (AUDIO_PID >> 8) as u8 && p[2] == AUDIO_PID as u8)
        .unwrap();
    data.drain((audio_start + 1) * 188..(audio_start + 2) * 188);

    let (input, _, diag) = demux(&data, 4096);
    assert_eq!(diag.get(Counter::ContinuityError), 1);
    assert_eq!(input.audio_frames.len(), 99);
    assert_eq!(input.audio_frames[0].pts, 90_000 + AUDIO_TICKS);
}

#[tokio::test]
async fn test_demux_reader_192_byte_packets() {
    let data = Recording::default().build().to_192();
    let (first, rest) = data.split_at(5000);
    let mut reader = tokio_test::io::Builder::new().read(first).read(rest).build();

    let mut demuxer = TsDemuxer::new(DemuxConfig::default());
    let mut collector = RecordingCollector::new();
    let mut diag = Diagnostics::new();
    let n = demux_reader(&mut reader, &mut demuxer, &mut collector, &mut diag)
        .await
        .unwrap();

    assert_eq!(n, data.len() as u64);
    assert_eq!(demuxer.packet_size(), Some(192));
    let input = collector.finish();
    assert_eq!(input.video_frames.len(), 60);
    assert_eq!(input.audio_frames.len(), 100);
}

#[tokio::test]
async fn test_demux_reader_fixed_size() {
    let data = Recording::default().build().into_bytes();
    let mut demuxer = TsDemuxer::new(DemuxConfig {
        packet_size: PacketSize::Fixed(188),
        ..Default::default()
    });
    let mut collector = RecordingCollector::new();
    let mut diag = Diagnostics::new();
    demux_reader(&mut &data[..], &mut demuxer, &mut collector, &mut diag)
        .await
        .unwrap();
    assert_eq!(collector.input().video_frames.len(), 60);
    assert!(diag.is_clean());
}

/// Walks the raw data of [`dual_mono_frame`] element by element and
/// reports where each one sits.
struct ElementDecoder;

impl AacDecoder for ElementDecoder {
    fn decode(&mut self, frame: &[u8]) -> DecodedFrame {
        let Ok(header) = AdtsHeader::parse(frame) else {
            return DecodedFrame::failed();
        };
        let Some(raw) = frame.get(header.header_len()..header.frame_length as usize) else {
            return DecodedFrame::failed();
        };
        let mut r = BitReader::new(raw);
        let mut spans = Vec::new();
        loop {
            let start_bit = r.position();
            let Ok(id) = r.read_bits(3) else {
                return DecodedFrame::failed();
            };
            let id = ElementId::from(id as u8);
            if id == ElementId::End {
                break;
            }
            if id != ElementId::Sce || r.skip_bits(4 + SCE_PAYLOAD_BITS).is_err() {
                return DecodedFrame::failed();
            }
            spans.push(SyntaxElement {
                id,
                start_bit,
                end_bit: r.position(),
            });
        }
        DecodedFrame {
            samples_per_channel: 1024,
            channels: spans.len() as u32,
            elements: spans.iter().map(|s| s.id).collect(),
            spans,
            consumed: header.frame_length as usize,
            error: false,
        }
    }

    fn reset(&mut self) {}
}

#[test]
fn test_dual_mono_layout_from_decoder_elements() {
    let ts = Recording {
        dual_mono: true,
        ..Default::default()
    }
    .build();

    // the header alone cannot tell what channel_configuration 0 carries
    let (input, _, diag) = demux(ts.bytes(), 4096);
    assert!(input.audio_frames.is_empty());
    assert_eq!(diag.get(Counter::DecodeError), 100);

    let factory = || -> Box<dyn AacDecoder> { Box::new(ElementDecoder) };
    let mut demuxer = TsDemuxer::with_decoder(DemuxConfig::default(), Box::new(factory));
    let mut collector = RecordingCollector::new();
    let mut diag = Diagnostics::new();
    demuxer.feed(ts.bytes(), &mut collector, &mut diag);
    demuxer.flush(&mut collector, &mut diag);
    assert!(diag.is_clean(), "{}", diag);

    let input = collector.finish();
    assert_eq!(input.audio_frames.len(), 100);
    assert!(input
        .audio_frames
        .iter()
        .all(|f| f.format.channels == AudioChannels::DualMono && f.samples == 1024));
    assert_eq!(input.audio_frames[1].pts, 90_000 + AUDIO_TICKS);

    let halves = DualMonoSplitter::new(Box::new(ElementDecoder))
        .split(&dual_mono_frame())
        .unwrap();
    for half in &halves {
        assert_eq!(AdtsHeader::parse(half).unwrap().channel_configuration, 1);
        assert_eq!(half.len(), (3 + 4 + SCE_PAYLOAD_BITS + 3 + 7) / 8 + 7);
    }
}
