// Parameter resolution across backends, tiers and trims

use crate::common::helpers::*;
use mediabatch::engine::{
    AudioPolicy, Backend, CapabilitySnapshot, CodecFamily, EncodeIntent, ErrorKind, QualityTier,
    ResolutionTier, Timestamp, TrimWindow, effective_backend, quality_value, resolve,
};
use std::path::Path;

fn args_of(intent: &EncodeIntent, caps: &CapabilitySnapshot, output: &str) -> Vec<String> {
    resolve(intent, caps, Path::new("/in/clip.mov"), Path::new(output))
        .unwrap()
        .args_lossy()
}

fn value_after(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[test]
fn test_each_backend_uses_its_encoder() {
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H264)
        .with_resolution(ResolutionTier::P1080);
    let expected = [
        (Backend::Nvenc, "h264_nvenc", "-cq"),
        (Backend::Amf, "h264_amf", "-qp_i"),
        (Backend::Qsv, "h264_qsv", "-global_quality"),
        (Backend::Software, "libx264", "-crf"),
    ];
    for (backend, encoder, rate_flag) in expected {
        let args = args_of(&intent, &snapshot_for(backend), "/out/clip.mp4");
        assert_eq!(value_after(&args, "-c:v").as_deref(), Some(encoder), "{:?}", backend);
        assert_eq!(value_after(&args, rate_flag).as_deref(), Some("18"), "{:?}", backend);
        assert_eq!(value_after(&args, "-profile:v").as_deref(), Some("high"));
    }
}

#[test]
fn test_quality_tiers_map_to_table_values() {
    let caps = software_snapshot();
    for tier in QualityTier::ALL {
        for codec in CodecFamily::ALL {
            let args = args_of(&EncodeIntent::new(tier, codec), &caps, "/out/clip.mp4");
            assert_eq!(
                value_after(&args, "-crf"),
                Some(quality_value(tier, codec).to_string())
            );
        }
    }
    assert_eq!(quality_value(QualityTier::Archival, CodecFamily::H265), 18);
    assert_eq!(quality_value(QualityTier::Compact, CodecFamily::H264), 28);
}

#[test]
fn test_nvenc_keeps_frames_on_gpu() {
    let intent = EncodeIntent::new(QualityTier::Balanced, CodecFamily::H265)
        .with_resolution(ResolutionTier::P1440);
    let args = args_of(&intent, &snapshot_for(Backend::Nvenc), "/out/clip.mp4");
    assert_eq!(value_after(&args, "-hwaccel").as_deref(), Some("cuda"));
    assert!(value_after(&args, "-vf").unwrap().starts_with("scale_cuda=-2:1440,hwdownload"));
    assert!(!args.contains(&"-pix_fmt".to_string()));
    assert!(!args.contains(&"-profile:v".to_string()));
}

#[test]
fn test_8k_on_nvenc_falls_back_to_software() {
    let caps = snapshot_for(Backend::Nvenc);
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H265)
        .with_resolution(ResolutionTier::P4320);
    assert_eq!(effective_backend(&intent, &caps), Backend::Software);

    let args = args_of(&intent, &caps, "/out/clip.mp4");
    assert_eq!(value_after(&args, "-c:v").as_deref(), Some("libx265"));
    assert!(!args.contains(&"-hwaccel".to_string()));
    assert!(value_after(&args, "-vf").unwrap().starts_with("scale=-2:4320:flags=lanczos"));

    // 4K stays on the GPU
    let intent_4k = EncodeIntent::new(QualityTier::High, CodecFamily::H265)
        .with_resolution(ResolutionTier::P2160);
    assert_eq!(effective_backend(&intent_4k, &caps), Backend::Nvenc);
}

#[test]
fn test_hevc_without_encoder_is_unsupported() {
    let caps = CapabilitySnapshot::new(Backend::Qsv, false).with_ffmpeg("ffmpeg");
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H265);
    let err = resolve(&intent, &caps, Path::new("a.mp4"), Path::new("b.mp4")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedIntent);

    let h264 = EncodeIntent::new(QualityTier::High, CodecFamily::H264);
    assert!(resolve(&h264, &caps, Path::new("a.mp4"), Path::new("b.mp4")).is_ok());
}

#[test]
fn test_missing_ffmpeg_is_dependency_error() {
    let caps = CapabilitySnapshot::new(Backend::Software, true);
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H264);
    let err = resolve(&intent, &caps, Path::new("a.mp4"), Path::new("b.mp4")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    assert!(err.is_fatal());
}

#[test]
fn test_trim_seeks_before_input_and_end_is_relative() {
    let window = TrimWindow::new(
        Some("00:01:30".parse::<Timestamp>().unwrap()),
        Some("00:02:00".parse::<Timestamp>().unwrap()),
    )
    .unwrap();
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H264).with_trim(window);
    let args = args_of(&intent, &software_snapshot(), "/out/clip.mp4");

    let ss = args.iter().position(|a| a == "-ss").unwrap();
    let input = args.iter().position(|a| a == "-i").unwrap();
    let to = args.iter().position(|a| a == "-to").unwrap();
    assert!(ss < input && input < to);
    assert_eq!(args[ss + 1], "00:01:30.000");
    assert_eq!(args[to + 1], "00:00:30.000");
}

#[test]
fn test_container_specific_flags() {
    let caps = software_snapshot();
    let intent = EncodeIntent::new(QualityTier::High, CodecFamily::H265);

    let mp4 = args_of(&intent, &caps, "/out/clip.mp4");
    assert_eq!(value_after(&mp4, "-tag:v").as_deref(), Some("hvc1"));
    assert_eq!(value_after(&mp4, "-movflags").as_deref(), Some("+faststart"));

    let mkv = args_of(&intent, &caps, "/out/clip.mkv");
    assert!(!mkv.contains(&"-tag:v".to_string()));
    assert!(!mkv.contains(&"-movflags".to_string()));
}

#[test]
fn test_audio_policies() {
    let caps = software_snapshot();
    let base = EncodeIntent::new(QualityTier::High, CodecFamily::H264);

    let aac = args_of(&base.clone().with_audio("aac192".parse().unwrap()), &caps, "/o.mp4");
    assert_eq!(value_after(&aac, "-b:a").as_deref(), Some("192k"));

    let copy = args_of(&base.clone().with_audio(AudioPolicy::Copy), &caps, "/o.mp4");
    assert_eq!(value_after(&copy, "-c:a").as_deref(), Some("copy"));

    let mute = args_of(&base.with_audio(AudioPolicy::Mute), &caps, "/o.mp4");
    assert!(mute.contains(&"-an".to_string()));
    assert!(!mute.contains(&"-c:a".to_string()));
}

#[test]
fn test_extra_args_precede_output() {
    let caps = software_snapshot();
    let mut intent = EncodeIntent::new(QualityTier::High, CodecFamily::H264);
    intent.extra_args = mediabatch::engine::split_extra_args("-metadata title='My Clip'");
    let args = args_of(&intent, &caps, "/out/clip.mp4");
    let n = args.len();
    assert_eq!(args[n - 4..], ["-metadata", "title=My Clip", "-y", "/out/clip.mp4"]);
}
