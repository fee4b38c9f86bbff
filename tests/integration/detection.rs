// Capability detection against a scripted ffmpeg

use crate::common::helpers::*;
use mediabatch::engine::hardware::{backend_from_listing, hevc_from_listing};
use mediabatch::engine::{Backend, CapabilityDetector, ToolOverrides};
use std::path::PathBuf;

const NVENC_LISTING: &str = "Encoders:
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)
 V....D h264_qsv             H.264 / AVC / MPEG-4 AVC (Intel Quick Sync Video acceleration)
";

#[test]
fn test_backend_priority() {
    assert_eq!(backend_from_listing(NVENC_LISTING), Backend::Nvenc);
    assert_eq!(backend_from_listing(" V....D h264_amf\n V....D h264_qsv"), Backend::Amf);
    assert_eq!(backend_from_listing(" V....D h264_qsv"), Backend::Qsv);
    assert_eq!(backend_from_listing(" V....D libx264"), Backend::Software);
    assert!(hevc_from_listing(NVENC_LISTING));
    assert!(!hevc_from_listing(" V....D libx264\n V....D h264_amf"));
}

#[test]
fn test_detect_with_configured_tools() {
    let runner = ScriptedRunner::new().with_encoders(NVENC_LISTING);
    let overrides = ToolOverrides {
        ffmpeg: Some(PathBuf::from("/opt/media/ffmpeg")),
        ffprobe: Some(PathBuf::from("/opt/media/ffprobe")),
        ..ToolOverrides::default()
    };
    let snapshot = CapabilityDetector::new(&runner)
        .with_overrides(overrides)
        .detect();

    assert_eq!(snapshot.backend, Backend::Nvenc);
    assert!(snapshot.hevc_available);
    assert_eq!(
        snapshot.require_ffmpeg().unwrap(),
        PathBuf::from("/opt/media/ffmpeg").as_path()
    );
    assert_eq!(
        snapshot.require_ffprobe().unwrap(),
        PathBuf::from("/opt/media/ffprobe").as_path()
    );

    // one -version per configured tool, one encoder listing
    let ffmpeg_calls = runner.calls_to("ffmpeg");
    assert!(ffmpeg_calls.iter().any(|c| c.args == ["-version"]));
    assert_eq!(
        ffmpeg_calls.iter().filter(|c| c.args.contains(&"-encoders".to_string())).count(),
        1
    );
}

#[test]
fn test_listing_failure_means_software_without_hevc() {
    let runner = ScriptedRunner::new().failing_on("-encoders");
    let detector = CapabilityDetector::new(&runner);
    let ffmpeg = PathBuf::from("/opt/media/ffmpeg");
    assert_eq!(detector.detect_encoder_backend(&ffmpeg), Backend::Software);
    assert!(!detector.has_secondary_codec(&ffmpeg));
}
