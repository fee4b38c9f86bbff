// Batch execution: ordering, failure isolation, outputs and cleanup

use crate::common::helpers::*;
use mediabatch::engine::{
    Backend, BatchOptions, BatchPipeline, CapabilitySnapshot, CodecFamily, EncodeIntent, ErrorKind,
    ImageFormat, ImageIntent, Job, JobResult, Operation, QualityTier, ResolutionTier, Timestamp,
    TrimWindow,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn encode_job(input: PathBuf) -> Job {
    let intent = EncodeIntent::new(QualityTier::Balanced, CodecFamily::H264)
        .with_resolution(ResolutionTier::P720);
    Job::new(input, Operation::Transcode(intent))
}

fn options(pattern: &str) -> BatchOptions {
    BatchOptions {
        filename_pattern: pattern.to_string(),
        ..BatchOptions::default()
    }
}

#[test]
fn test_one_failing_job_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let jobs: Vec<Job> = (1..=5)
        .map(|i| encode_job(touch(dir.path(), &format!("clip_{}.mp4", i))))
        .collect();

    let runner = ScriptedRunner::new().failing_on("clip_3");
    let pipeline = BatchPipeline::new(
        Arc::new(software_snapshot()),
        &runner,
        options("scaled-{basename}_720p"),
    );

    let mut progress = Vec::new();
    let report = pipeline
        .run(&jobs, |current, total, label| {
            progress.push((current, total, label.to_string()))
        })
        .unwrap();

    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.records.len(), 5);
    assert_eq!(
        progress,
        (1..=5)
            .map(|i| (i, 5, format!("clip_{}.mp4", i)))
            .collect::<Vec<_>>()
    );

    for (i, record) in report.records.iter().enumerate() {
        assert_eq!(record.index, i);
        assert_eq!(record.input, jobs[i].input);
    }
    match &report.records[2].result {
        JobResult::Failure { kind, message } => {
            assert_eq!(*kind, ErrorKind::ProcessFailure);
            assert!(message.contains("Conversion failed!"), "{}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    match &report.records[0].result {
        JobResult::Success { output_path, .. } => {
            assert_eq!(output_path, &dir.path().join("scaled-clip_1_720p.mp4"))
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert!(report.messages.iter().any(|m| m.starts_with("✗ clip_3.mp4:")));
    assert!(report.messages.contains(&"✓ clip_1.mp4 → scaled-clip_1_720p.mp4".to_string()));
    assert!(!report.all_succeeded());
    assert_eq!(runner.calls_to("ffmpeg").len(), 5);
}

#[test]
fn test_missing_tool_aborts_before_any_job() {
    let dir = TempDir::new().unwrap();
    let jobs = vec![encode_job(touch(dir.path(), "a.mp4"))];
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(
        Arc::new(CapabilitySnapshot::new(Backend::Software, true)),
        &runner,
        BatchOptions::default(),
    );

    let mut started = 0;
    let err = pipeline.run(&jobs, |_, _, _| started += 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    assert_eq!(started, 0);
    assert!(runner.calls().is_empty());
}

#[test]
fn test_unsupported_codec_aborts_before_any_job() {
    let dir = TempDir::new().unwrap();
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H265);
    let jobs = vec![Job::new(touch(dir.path(), "a.mp4"), Operation::Transcode(intent))];
    let runner = ScriptedRunner::new();
    let caps = CapabilitySnapshot::new(Backend::Amf, false).with_ffmpeg("ffmpeg");
    let pipeline = BatchPipeline::new(Arc::new(caps), &runner, BatchOptions::default());

    let err = pipeline.run(&jobs, |_, _, _| {}).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedIntent);
    assert!(runner.calls().is_empty());
}

#[test]
fn test_in_place_conversion_keeps_the_input() {
    let dir = TempDir::new().unwrap();
    let input = touch(dir.path(), "photo.png");
    let intent = ImageIntent::new(ImageFormat::Png, 90, None).unwrap();
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, options("{basename}"));

    let report = pipeline
        .run(&[Job::new(input.clone(), Operation::Image(intent))], |_, _, _| {})
        .unwrap();

    match &report.records[0].result {
        JobResult::Success { output_path, .. } => {
            assert_eq!(output_path, &dir.path().join("photo_converted.png"))
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(input.exists());
    let magick = runner.calls_to("magick");
    assert_eq!(magick.len(), 1);
    assert_eq!(magick[0].args.last().unwrap(), &dir.path().join("photo_converted.png").display().to_string());
}

#[test]
fn test_delete_originals_only_after_success() {
    let dir = TempDir::new().unwrap();
    let good = touch(dir.path(), "good_input.bmp");
    let bad = touch(dir.path(), "bad_input.bmp");
    let intent = ImageIntent::new(ImageFormat::Jpg, 80, Some(1280)).unwrap();
    let jobs = vec![
        Job::new(good.clone(), Operation::Image(intent)),
        Job::new(bad.clone(), Operation::Image(intent)),
    ];

    let runner = ScriptedRunner::new().failing_on("bad_input");
    let pipeline = BatchPipeline::new(
        Arc::new(software_snapshot()),
        &runner,
        BatchOptions {
            delete_originals: true,
            ..BatchOptions::default()
        },
    );
    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();

    assert!(!good.exists());
    assert!(bad.exists());
    assert!(report.messages.contains(&"  Deleted: good_input.bmp".to_string()));
    assert_eq!(report.succeeded, 1);
}

#[test]
fn test_missing_input_is_a_filesystem_failure() {
    let dir = TempDir::new().unwrap();
    let present = touch(dir.path(), "present.mp4");
    let jobs = vec![
        encode_job(dir.path().join("gone.mp4")),
        encode_job(present),
    ];
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, options("{basename}_small"));

    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();
    assert!(matches!(
        report.records[0].result,
        JobResult::Failure {
            kind: ErrorKind::Filesystem,
            ..
        }
    ));
    assert!(report.records[1].result.is_success());
    assert_eq!(runner.calls_to("ffmpeg").len(), 1);
}

#[test]
fn test_output_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out").join("nested");
    let window = TrimWindow::new(Some(Timestamp::from_secs(5)), None).unwrap();
    let input = touch(dir.path(), "a.mkv");
    let jobs = vec![Job::new(input.clone(), Operation::LosslessTrim(window))];
    let runner =
        ScriptedRunner::new().with_probe(input, probe_json("h264", 1920, 1080, "30/1", 60.0));
    let pipeline = BatchPipeline::new(
        Arc::new(software_snapshot()),
        &runner,
        BatchOptions {
            output_dir: Some(out.clone()),
            filename_pattern: "trimmed-{basename}".into(),
            ..BatchOptions::default()
        },
    );

    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();
    assert!(out.is_dir());
    match &report.records[0].result {
        JobResult::Success { output_path, .. } => assert_eq!(output_path, &out.join("trimmed-a.mkv")),
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_report_serializes() {
    let dir = TempDir::new().unwrap();
    let runner = ScriptedRunner::new().failing_on("broken_clip");
    let jobs = vec![
        encode_job(touch(dir.path(), "fine.mp4")),
        encode_job(touch(dir.path(), "broken_clip.mp4")),
    ];
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, options("{basename}_x"));
    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["succeeded"], 1);
    assert_eq!(json["records"][0]["result"]["status"], "success");
    assert_eq!(json["records"][1]["result"]["status"], "failure");
    assert_eq!(json["records"][1]["result"]["kind"], "process_failure");
}

#[test]
fn test_failed_delete_is_a_warning_on_success() {
    let dir = TempDir::new().unwrap();
    let input = touch(dir.path(), "moved_away.mp4");
    let runner = ScriptedRunner::new().consuming_inputs();
    let pipeline = BatchPipeline::new(
        Arc::new(software_snapshot()),
        &runner,
        BatchOptions {
            filename_pattern: "{basename}_small".into(),
            delete_originals: true,
            ..BatchOptions::default()
        },
    );

    let report = pipeline.run(&[encode_job(input.clone())], |_, _, _| {}).unwrap();
    assert_eq!(report.succeeded, 1);
    match &report.records[0].result {
        JobResult::Success { warnings, .. } => {
            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].starts_with("Could not delete moved_away.mp4:"), "{}", warnings[0]);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(
        report
            .messages
            .iter()
            .any(|m| m.starts_with("  Warning: Could not delete moved_away.mp4:"))
    );
    assert!(!report.messages.iter().any(|m| m.starts_with("  Deleted:")));
}

#[test]
fn test_timeout_and_metadata_failures_are_recorded() {
    let dir = TempDir::new().unwrap();
    let stalled = touch(dir.path(), "stalled_clip.mp4");
    let short = touch(dir.path(), "short.mp4");
    let fine = touch(dir.path(), "fine.mp4");

    let late_start = TrimWindow::new(Some(Timestamp::from_secs(90)), None).unwrap();
    let jobs = vec![
        encode_job(stalled),
        Job::new(short.clone(), Operation::LosslessTrim(late_start)),
        encode_job(fine),
    ];
    let runner = ScriptedRunner::new()
        .timing_out_on("stalled_clip")
        .with_probe(short, probe_json("h264", 1920, 1080, "30/1", 30.0));
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, options("{basename}_out"));

    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);

    match &report.records[0].result {
        JobResult::Failure { kind, message } => {
            assert_eq!(*kind, ErrorKind::Timeout);
            assert!(message.contains("frame=  480"), "{}", message);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    match &report.records[1].result {
        JobResult::Failure { kind, message } => {
            assert_eq!(*kind, ErrorKind::Metadata);
            assert!(message.contains("past the end of the input"), "{}", message);
        }
        other => panic!("expected metadata failure, got {:?}", other),
    }
    assert!(report.records[2].result.is_success());
    // the out-of-range trim never reached ffmpeg
    assert_eq!(runner.calls_to("ffmpeg").len(), 2);
}

#[test]
fn test_unreadable_trim_input_is_recorded() {
    let dir = TempDir::new().unwrap();
    let window = TrimWindow::new(Some(Timestamp::from_secs(1)), None).unwrap();
    let jobs = vec![
        Job::new(touch(dir.path(), "garbage.mkv"), Operation::LosslessTrim(window)),
        encode_job(touch(dir.path(), "ok.mp4")),
    ];
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, options("{basename}_cut"));

    let report = pipeline.run(&jobs, |_, _, _| {}).unwrap();
    assert!(matches!(
        report.records[0].result,
        JobResult::Failure {
            kind: ErrorKind::Metadata,
            ..
        }
    ));
    assert!(report.records[1].result.is_success());
}
