// Lossless join and frame extraction

use crate::common::helpers::*;
use mediabatch::engine::{
    BatchOptions, BatchPipeline, EngineError, FrameSize, Mismatch, Timestamp,
};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_incompatible_join_never_starts_ffmpeg() {
    let dir = TempDir::new().unwrap();
    let a = touch(dir.path(), "a.mp4");
    let b = touch(dir.path(), "b.mp4");
    let c = touch(dir.path(), "c.mp4");
    let runner = ScriptedRunner::new()
        .with_probe(&a, probe_json("h264", 1920, 1080, "30/1", 10.0))
        .with_probe(&b, probe_json("h264", 1920, 1080, "30/1", 10.0))
        .with_probe(&c, probe_json("h264", 1280, 720, "30/1", 10.0));
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, BatchOptions::default());

    let err = pipeline.join(&[a, b, c], None).unwrap_err();
    match err {
        EngineError::IncompatibleInputs(Mismatch::Resolution { position, .. }) => {
            assert_eq!(position, 3)
        }
        other => panic!("expected resolution mismatch, got {:?}", other),
    }
    assert_eq!(runner.calls_to("ffprobe").len(), 3);
    assert!(runner.calls_to("ffmpeg").is_empty());
}

#[test]
fn test_join_writes_absolute_concat_list() {
    let dir = TempDir::new().unwrap();
    let a = touch(dir.path(), "part one.mp4");
    let b = touch(dir.path(), "it's two.mp4");
    let runner = ScriptedRunner::new()
        .with_probe(&a, probe_json("hevc", 1280, 720, "24000/1001", 3.0))
        .with_probe(&b, probe_json("hevc", 1280, 720, "24000/1001", 4.0));
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, BatchOptions::default());

    let output = pipeline.join(&[a.clone(), b.clone()], None).unwrap();
    assert_eq!(output, dir.path().join("joined-part one.mp4"));

    let lists = runner.concat_lists();
    assert_eq!(lists.len(), 1);
    let lines: Vec<&str> = lists[0].lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("file '/") || lines[0].contains(":/"));
    assert!(lines[0].ends_with("part one.mp4'"));
    assert!(lines[1].ends_with("it'\\''s two.mp4'"));

    let ffmpeg = runner.calls_to("ffmpeg");
    assert_eq!(ffmpeg.len(), 1);
    let args = &ffmpeg[0].args;
    assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    assert_eq!(args.last().unwrap(), &output.display().to_string());

    // the list file is gone once the join returns
    let list_arg = &args[args.iter().position(|x| x == "-i").unwrap() + 1];
    assert!(!std::path::Path::new(list_arg).exists());
}

#[test]
fn test_join_needs_ffmpeg_and_two_inputs() {
    let runner = ScriptedRunner::new();
    let caps = mediabatch::engine::CapabilitySnapshot::new(mediabatch::engine::Backend::Software, true)
        .with_ffprobe("ffprobe");
    let pipeline = BatchPipeline::new(Arc::new(caps), &runner, BatchOptions::default());
    let err = pipeline
        .join(&["a.mp4".into(), "b.mp4".into()], None)
        .unwrap_err();
    assert!(err.is_fatal());

    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, BatchOptions::default());
    let err = pipeline.join(&["a.mp4".into()], None).unwrap_err();
    assert!(matches!(
        err,
        EngineError::IncompatibleInputs(Mismatch::TooFewItems { count: 1 })
    ));
    assert!(runner.calls().is_empty());
}

#[test]
fn test_preview_frame_is_scratch() {
    let dir = TempDir::new().unwrap();
    let input = touch(dir.path(), "clip.mp4");
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, BatchOptions::default());

    let first = pipeline
        .preview_frame(&input, Timestamp::from_secs(3), FrameSize::Width(320))
        .unwrap();
    let second = pipeline
        .preview_frame(&input, Timestamp::from_secs(3), FrameSize::Width(320))
        .unwrap();
    assert_ne!(first.to_path_buf(), second.to_path_buf());

    let path = first.to_path_buf();
    assert!(path.exists());
    drop(first);
    assert!(!path.exists());

    let calls = runner.calls_to("ffmpeg");
    assert_eq!(calls.len(), 2);
    assert!(calls[0].args.windows(2).any(|w| w[0] == "-ss" && w[1] == "00:00:03.000"));
    assert!(calls[0].args.windows(2).any(|w| w[0] == "-vf" && w[1] == "scale=320:-1"));
}

#[test]
fn test_thumbnail_of_missing_input() {
    let dir = TempDir::new().unwrap();
    let runner = ScriptedRunner::new();
    let pipeline = BatchPipeline::new(Arc::new(software_snapshot()), &runner, BatchOptions::default());
    let err = pipeline
        .extract_thumbnail(
            &dir.path().join("nope.mp4"),
            &dir.path().join("nope.jpg"),
            Timestamp::from_secs(1),
            FrameSize::Source,
        )
        .unwrap_err();
    assert_eq!(err.kind(), mediabatch::engine::ErrorKind::Filesystem);
    assert!(runner.calls().is_empty());
}
