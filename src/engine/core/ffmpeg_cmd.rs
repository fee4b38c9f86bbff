use super::profile::{OUTPUT_PIX_FMT, SHARPEN_FILTER, is_mp4_family, quality_value};
use super::types::{
    AudioPolicy, CodecFamily, EncodeIntent, ResolvedCommand, Timestamp, TrimWindow,
};
use crate::engine::error::EngineError;
use crate::engine::hardware::{Backend, CapabilitySnapshot};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeout for encodes and stream copies unless the caller overrides it
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Timeout for single-frame extraction
pub const DEFAULT_THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend actually used for an intent: the detected one, unless the target
/// height exceeds its ceiling, in which case the job falls back to software.
pub fn effective_backend(intent: &EncodeIntent, caps: &CapabilitySnapshot) -> Backend {
    match (intent.resolution, caps.backend.max_height()) {
        (Some(res), Some(limit)) if res.height() > limit => Backend::Software,
        _ => caps.backend,
    }
}

/// Check an intent against the capability snapshot without building anything.
pub fn validate_intent(intent: &EncodeIntent, caps: &CapabilitySnapshot) -> Result<(), EngineError> {
    caps.require_ffmpeg()?;
    if intent.codec == CodecFamily::H265 && !caps.hevc_available {
        return Err(EngineError::UnsupportedIntent(
            "H.265 was requested but no HEVC encoder is available in this ffmpeg build"
                .to_string(),
        ));
    }
    Ok(())
}

fn scale_filter(backend: Backend, height: u32) -> String {
    match backend {
        Backend::Nvenc => format!(
            "scale_cuda=-2:{},hwdownload,format=nv12,{}",
            height, SHARPEN_FILTER
        ),
        Backend::Amf | Backend::Qsv | Backend::Software => format!(
            "scale=-2:{}:flags=lanczos:param0=3,{}",
            height, SHARPEN_FILTER
        ),
    }
}

fn apply_nvenc_encoder(cmd: &mut ResolvedCommand, codec: CodecFamily, quality: u32) {
    cmd.arg("-c:v").arg(Backend::Nvenc.encoder_name(codec));
    cmd.arg("-preset").arg("p7");
    cmd.arg("-tune").arg("hq");
    cmd.arg("-rc").arg("vbr");
    cmd.arg("-cq").arg(quality.to_string());
    cmd.arg("-b:v").arg("0");
    if codec == CodecFamily::H264 {
        // 5.2 covers 2160p60
        cmd.arg("-level").arg("5.2");
    }
}

fn apply_amf_encoder(cmd: &mut ResolvedCommand, codec: CodecFamily, quality: u32) {
    cmd.arg("-c:v").arg(Backend::Amf.encoder_name(codec));
    cmd.arg("-quality").arg("quality");
    cmd.arg("-rc").arg("cqp");
    cmd.arg("-qp_i").arg(quality.to_string());
    cmd.arg("-qp_p").arg(quality.to_string());
}

fn apply_qsv_encoder(cmd: &mut ResolvedCommand, codec: CodecFamily, quality: u32) {
    cmd.arg("-c:v").arg(Backend::Qsv.encoder_name(codec));
    cmd.arg("-preset").arg("veryslow");
    cmd.arg("-global_quality").arg(quality.to_string());
    cmd.arg("-look_ahead").arg("1");
}

fn apply_software_encoder(cmd: &mut ResolvedCommand, codec: CodecFamily, quality: u32) {
    cmd.arg("-c:v").arg(Backend::Software.encoder_name(codec));
    cmd.arg("-preset").arg("medium");
    cmd.arg("-crf").arg(quality.to_string());
    if codec == CodecFamily::H265 {
        cmd.arg("-x265-params").arg("log-level=error");
    }
}

fn apply_audio(cmd: &mut ResolvedCommand, audio: AudioPolicy) {
    match audio {
        AudioPolicy::Aac { kbps } => {
            cmd.arg("-c:a").arg("aac");
            cmd.arg("-b:a").arg(format!("{}k", kbps));
        }
        AudioPolicy::Copy => {
            cmd.arg("-c:a").arg("copy");
        }
        AudioPolicy::Mute => {
            cmd.arg("-an");
        }
    }
}

/// `-ss` goes before `-i` (fast input seek); `-to` goes after it. Input
/// seeking restarts output timestamps at zero, so the end is made relative
/// to the start.
fn apply_trim_start(cmd: &mut ResolvedCommand, trim: Option<&TrimWindow>) {
    if let Some(start) = trim.and_then(|t| t.start()) {
        cmd.arg("-ss").arg(start.to_string());
    }
}

fn apply_trim_end(cmd: &mut ResolvedCommand, trim: Option<&TrimWindow>) {
    if let Some(window) = trim {
        if let Some(end) = window.end() {
            let relative = match window.start() {
                Some(start) => end.saturating_sub(start),
                None => end,
            };
            cmd.arg("-to").arg(relative.to_string());
        }
    }
}

fn output_extension(output: &Path) -> String {
    output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Map an encode intent to a complete ffmpeg invocation.
///
/// Pure: identical inputs always produce identical argument vectors.
pub fn resolve(
    intent: &EncodeIntent,
    caps: &CapabilitySnapshot,
    input: &Path,
    output: &Path,
) -> Result<ResolvedCommand, EngineError> {
    validate_intent(intent, caps)?;
    let ffmpeg = caps.require_ffmpeg()?;

    let backend = effective_backend(intent, caps);
    let quality = quality_value(intent.quality, intent.codec);
    let extension = output_extension(output);

    let mut cmd = ResolvedCommand::new(ffmpeg, DEFAULT_ENCODE_TIMEOUT);
    cmd.arg("-hide_banner");

    // NVENC decodes on the GPU; frames stay in CUDA memory until hwdownload
    if backend == Backend::Nvenc {
        cmd.arg("-hwaccel").arg("cuda");
        cmd.arg("-hwaccel_output_format").arg("cuda");
    }

    apply_trim_start(&mut cmd, intent.trim.as_ref());
    cmd.arg("-i").arg(input);
    apply_trim_end(&mut cmd, intent.trim.as_ref());

    if let Some(resolution) = intent.resolution {
        cmd.arg("-vf").arg(scale_filter(backend, resolution.height()));
    }

    match backend {
        Backend::Nvenc => apply_nvenc_encoder(&mut cmd, intent.codec, quality),
        Backend::Amf => apply_amf_encoder(&mut cmd, intent.codec, quality),
        Backend::Qsv => apply_qsv_encoder(&mut cmd, intent.codec, quality),
        Backend::Software => apply_software_encoder(&mut cmd, intent.codec, quality),
    }

    if intent.codec == CodecFamily::H264 {
        cmd.arg("-profile:v").arg("high");
    }
    if backend != Backend::Nvenc {
        cmd.arg("-pix_fmt").arg(OUTPUT_PIX_FMT);
    }
    // Apple players only recognise HEVC in MP4 with the hvc1 tag
    if intent.codec == CodecFamily::H265 && is_mp4_family(&extension) {
        cmd.arg("-tag:v").arg("hvc1");
    }

    apply_audio(&mut cmd, intent.audio);

    if is_mp4_family(&extension) {
        cmd.arg("-movflags").arg("+faststart");
    }

    cmd.args(intent.extra_args.iter());
    cmd.arg("-y").arg(output);

    Ok(cmd)
}

/// Cut without re-encoding. Cuts snap to keyframes.
pub fn resolve_trim_copy(
    window: &TrimWindow,
    caps: &CapabilitySnapshot,
    input: &Path,
    output: &Path,
) -> Result<ResolvedCommand, EngineError> {
    let ffmpeg = caps.require_ffmpeg()?;
    let mut cmd = ResolvedCommand::new(ffmpeg, DEFAULT_ENCODE_TIMEOUT);
    cmd.arg("-hide_banner");
    apply_trim_start(&mut cmd, Some(window));
    cmd.arg("-i").arg(input);
    apply_trim_end(&mut cmd, Some(window));
    cmd.arg("-c").arg("copy");
    cmd.arg("-avoid_negative_ts").arg("make_zero");
    cmd.arg("-y").arg(output);
    Ok(cmd)
}

/// Stream-copy concatenation driven by a concat list file
pub fn resolve_concat(
    caps: &CapabilitySnapshot,
    list_file: &Path,
    output: &Path,
) -> Result<ResolvedCommand, EngineError> {
    let ffmpeg = caps.require_ffmpeg()?;
    let mut cmd = ResolvedCommand::new(ffmpeg, DEFAULT_ENCODE_TIMEOUT);
    cmd.arg("-hide_banner");
    cmd.arg("-f").arg("concat");
    cmd.arg("-safe").arg("0");
    cmd.arg("-i").arg(list_file);
    cmd.arg("-c").arg("copy");
    cmd.arg("-y").arg(output);
    Ok(cmd)
}

/// Contents of an ffmpeg concat list. Paths should be absolute; backslashes
/// become forward slashes and single quotes are escaped for the demuxer.
pub fn concat_list_contents(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let normalized = p.to_string_lossy().replace('\\', "/");
            format!("file '{}'\n", normalized.replace('\'', "'\\''"))
        })
        .collect()
}

/// Requested thumbnail dimensions. A single bound keeps the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSize {
    #[default]
    Source,
    Width(u32),
    Height(u32),
    Exact(u32, u32),
}

impl FrameSize {
    pub fn from_bounds(width: Option<u32>, height: Option<u32>) -> Self {
        match (width, height) {
            (Some(w), Some(h)) => Self::Exact(w, h),
            (Some(w), None) => Self::Width(w),
            (None, Some(h)) => Self::Height(h),
            (None, None) => Self::Source,
        }
    }
}

/// Extract one frame at `at` as a high-quality still
pub fn resolve_thumbnail(
    caps: &CapabilitySnapshot,
    input: &Path,
    output: &Path,
    at: Timestamp,
    size: FrameSize,
) -> Result<ResolvedCommand, EngineError> {
    let ffmpeg = caps.require_ffmpeg()?;
    let mut cmd = ResolvedCommand::new(ffmpeg, DEFAULT_THUMBNAIL_TIMEOUT);
    cmd.arg("-hide_banner");
    cmd.arg("-ss").arg(at.to_string());
    cmd.arg("-i").arg(input);
    cmd.arg("-frames:v").arg("1");
    match size {
        FrameSize::Source => {}
        FrameSize::Exact(w, h) => {
            cmd.arg("-s").arg(format!("{}x{}", w, h));
        }
        FrameSize::Width(w) => {
            cmd.arg("-vf").arg(format!("scale={}:-1", w));
        }
        FrameSize::Height(h) => {
            cmd.arg("-vf").arg(format!("scale=-1:{}", h));
        }
    }
    cmd.arg("-q:v").arg("2");
    cmd.arg("-y").arg(output);
    Ok(cmd)
}

/// Split user-provided extra arguments shell-style so quoted values survive.
/// Unbalanced quotes fall back to whitespace splitting.
pub fn split_extra_args(additional_args: &str) -> Vec<String> {
    if additional_args.trim().is_empty() {
        return Vec::new();
    }
    shlex::split(additional_args).unwrap_or_else(|| {
        additional_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    })
}

/// Format a command plan as shell-safe text for display
pub fn format_commands(cmds: &[ResolvedCommand]) -> String {
    cmds.iter()
        .map(ResolvedCommand::display)
        .collect::<Vec<_>>()
        .join("\n&& \\\n")
}
