mod common;

use chrono::{TimeZone, Utc};
use common::*;
use pretty_assertions::assert_eq;
use tsreform::av::timestamp::PTS_WRAP;
use tsreform::av::{CaptionItem, StreamEvent};
use tsreform::format::ts::{DemuxConfig, TsDemuxer};
use tsreform::reform::{
    CmType, PartitionSpec, RecordingCollector, ReformConfig, ReformInput, StreamReform,
};
use tsreform::{Counter, Diagnostics, ReformError};

const RECORDING_START_MS: i64 = 1_700_000_000_000;

fn collect(recording: &Recording) -> RecordingCollector {
    let ts = recording.build();
    let mut demuxer = TsDemuxer::new(DemuxConfig {
        recording_start_ms: RECORDING_START_MS,
        ..Default::default()
    });
    let mut collector = RecordingCollector::new();
    let mut diag = Diagnostics::new();
    demuxer.feed(ts.bytes(), &mut collector, &mut diag);
    demuxer.flush(&mut collector, &mut diag);
    assert!(diag.is_clean(), "{}", diag);
    collector
}

fn input(recording: &Recording) -> ReformInput {
    collect(recording).finish()
}

#[test]
fn test_recording_plan() {
    let mut diag = Diagnostics::new();
    let plan = StreamReform::default()
        .reform(input(&Recording::default()), &mut diag)
        .unwrap();
    assert!(diag.is_clean(), "{}", diag);

    assert_eq!(plan.sections().sections.len(), 1);
    assert_eq!(plan.sections().file_count, 1);
    let frames = plan.frames();
    assert_eq!(frames.total_frames(), 60);
    assert!(!frames.is_vfr);
    assert!(!frames.has_rff);
    assert!((frames.out_total_duration - 60.0 * FRAME_TICKS as f64).abs() < 1e-6);

    let stats = &plan.audio_stats()[0];
    assert_eq!(stats.source_frames, 100);
    assert_eq!(stats.output_frames, 94);
    assert_eq!(stats.unique_output_frames, 94);
    assert_eq!((stats.inserted, stats.skipped, stats.underfilled), (0, 0, 0));
    assert_eq!(stats.max_diff, 0.0);

    let outputs = plan.partition(&PartitionSpec::default()).unwrap();
    assert_eq!(outputs.len(), 1);
    let output = outputs.values().next().unwrap();
    assert_eq!(output.key.cm, CmType::Both);
    assert_eq!(output.video_frames, (0..60).collect::<Vec<_>>());
    assert_eq!(output.audio_frames[0], (0..94).collect::<Vec<_>>());
    assert!((output.duration - 180_180.0).abs() < 1e-6);
    // 9000 ticks after the anchor taken at the first PCR
    assert_eq!(
        output.start_time,
        Utc.timestamp_millis_opt(RECORDING_START_MS + 100).single()
    );
}

#[test]
fn test_persisted_state_replays_identically() {
    let original = input(&Recording {
        switch: Some((30, 1920)),
        ..Default::default()
    });
    let restored = ReformInput::from_bytes(&original.to_bytes()).unwrap();
    assert_eq!(restored, original);

    let reform = StreamReform::default();
    let (mut d1, mut d2) = (Diagnostics::new(), Diagnostics::new());
    let a = reform.reform(original, &mut d1).unwrap();
    let b = reform.reform(restored, &mut d2).unwrap();
    assert_eq!(d1, d2);
    assert_eq!(a.sections(), b.sections());
    assert_eq!(a.frames(), b.frames());
    assert_eq!(a.audio_stats(), b.audio_stats());
    let spec = PartitionSpec {
        cm_zones: Vec::new(),
        divisions: vec![10, 45],
    };
    assert_eq!(a.partition(&spec).unwrap(), b.partition(&spec).unwrap());
}

#[test]
fn test_format_switch_splits_files() {
    let mut diag = Diagnostics::new();
    let plan = StreamReform::default()
        .reform(
            input(&Recording {
                switch: Some((30, 1920)),
                ..Default::default()
            }),
            &mut diag,
        )
        .unwrap();
    assert_eq!(diag.get(Counter::FrameFileMismatch), 0);

    let sections = plan.sections();
    assert_eq!(sections.file_count, 2);
    assert_eq!(sections.sections.len(), 2);
    assert_eq!(sections.sections[1].start, 90_000 + 30 * FRAME_TICKS);
    assert_eq!(sections.formats[1].video.width, 1920);

    let outputs = plan.partition(&PartitionSpec::default()).unwrap();
    let files: Vec<(usize, usize)> = outputs
        .values()
        .map(|o| (o.key.video_file_id, o.video_frames.len()))
        .collect();
    assert_eq!(files, vec![(0, 30), (1, 30)]);

    let first = &outputs.values().next().unwrap().audio_frames[0];
    let second = &outputs.values().nth(1).unwrap().audio_frames[0];
    assert_eq!(first.last(), Some(&46));
    assert_eq!(second.first(), Some(&47));
}

#[test]
fn test_timestamps_across_wrap() {
    let mut diag = Diagnostics::new();
    let plan = StreamReform::default()
        .reform(
            input(&Recording {
                first_pts: PTS_WRAP - 90_000,
                ..Default::default()
            }),
            &mut diag,
        )
        .unwrap();
    assert_eq!(diag.get(Counter::NonContinuousPts), 0);

    let video = &plan.timeline().video_pts;
    assert_eq!(video[0], PTS_WRAP - 90_000);
    assert!(video.windows(2).all(|w| w[1] - w[0] == FRAME_TICKS));
    assert!(*video.last().unwrap() > PTS_WRAP);
    assert_eq!(plan.sections().sections.len(), 1);
    assert_eq!(plan.frames().total_frames(), 60);
    assert_eq!(plan.audio_stats()[0].inserted, 0);
    assert_eq!(plan.audio_stats()[0].skipped, 0);
}

#[test]
fn test_captions_follow_output_time() {
    let mut collector = collect(&Recording::default());
    let at = |frame: i64| 90_000 + frame * FRAME_TICKS;
    for (pts, duration, text) in [
        (at(10), -1, "a"),
        (at(20), 5 * FRAME_TICKS, "b"),
        (at(40), -1, "c"),
    ] {
        collector.add_caption(CaptionItem {
            pts,
            duration,
            lang_index: 0,
            text: text.into(),
        });
    }

    let config = ReformConfig {
        split_cm: true,
        min_zone_frames: 10,
        ..Default::default()
    };
    let mut diag = Diagnostics::new();
    let plan = StreamReform::new(config).reform(collector.finish(), &mut diag).unwrap();
    let outputs = plan
        .partition(&PartitionSpec {
            cm_zones: vec![30..60],
            divisions: Vec::new(),
        })
        .unwrap();

    let lines = |cm: CmType| -> Vec<(f64, f64, String)> {
        outputs
            .values()
            .find(|o| o.key.cm == cm)
            .unwrap()
            .captions
            .iter()
            .map(|l| (l.start, l.end, l.text.clone()))
            .collect()
    };
    let d = FRAME_TICKS as f64;
    assert_eq!(
        lines(CmType::NonCm),
        vec![(10.0 * d, 20.0 * d, "a".to_string()), (20.0 * d, 25.0 * d, "b".to_string())]
    );
    assert_eq!(lines(CmType::Cm), vec![(10.0 * d, 30.0 * d, "c".to_string())]);
}

#[test]
fn test_bitrate_zones_follow_commercials() {
    let mut diag = Diagnostics::new();
    let plan = StreamReform::default()
        .reform(input(&Recording::default()), &mut diag)
        .unwrap();
    let zones = plan
        .bitrate_zones(&PartitionSpec {
            cm_zones: vec![30..60],
            divisions: Vec::new(),
        })
        .unwrap();
    let got: Vec<(usize, usize, f64)> = zones
        .iter()
        .map(|z| (z.start_frame, z.end_frame, z.bitrate))
        .collect();
    assert_eq!(got, vec![(0, 32, 1.5), (32, 60, 0.75)]);
}

#[test]
fn test_bad_partition_and_event_order_are_fatal() {
    let mut diag = Diagnostics::new();
    let plan = StreamReform::default()
        .reform(input(&Recording::default()), &mut diag)
        .unwrap();
    let err = plan
        .partition(&PartitionSpec {
            cm_zones: Vec::new(),
            divisions: vec![40, 20],
        })
        .unwrap_err();
    assert!(matches!(err, ReformError::Format(_)));

    let mut bad = input(&Recording::default());
    bad.events.insert(0, StreamEvent::video_format(0));
    let err = StreamReform::default().reform(bad, &mut diag).unwrap_err();
    assert!(err.is_fatal());
}
