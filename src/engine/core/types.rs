use chrono::{DateTime, Local};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::engine::error::{EngineError, ErrorKind};

// ============================================================================
// Intent tokens
// ============================================================================

/// Target output height tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResolutionTier {
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "4k")]
    P2160,
    #[serde(rename = "8k")]
    P4320,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 5] = [
        Self::P720,
        Self::P1080,
        Self::P1440,
        Self::P2160,
        Self::P4320,
    ];

    pub fn height(self) -> u32 {
        match self {
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P1440 => 1440,
            Self::P2160 => 2160,
            Self::P4320 => 4320,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "4k",
            Self::P4320 => "8k",
        }
    }

    /// Parse an optional resolution token. `source`/`original` keep the input size.
    pub fn parse_optional(s: &str) -> Result<Option<Self>, EngineError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "source" | "original" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl FromStr for ResolutionTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            "1440p" => Ok(Self::P1440),
            "4k" | "2160p" => Ok(Self::P2160),
            "8k" | "4320p" => Ok(Self::P4320),
            _ => Err(EngineError::UnsupportedIntent(format!(
                "unknown resolution '{}' (expected 720p, 1080p, 1440p, 4k or 8k)",
                s
            ))),
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Archival,
    High,
    Balanced,
    Compact,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [Self::Archival, Self::High, Self::Balanced, Self::Compact];

    pub fn label(self) -> &'static str {
        match self {
            Self::Archival => "archival",
            Self::High => "high",
            Self::Balanced => "balanced",
            Self::Compact => "compact",
        }
    }
}

impl FromStr for QualityTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "archival" => Ok(Self::Archival),
            "high" => Ok(Self::High),
            "balanced" => Ok(Self::Balanced),
            // "max" is max compression
            "compact" | "max" => Ok(Self::Compact),
            _ => Err(EngineError::UnsupportedIntent(format!(
                "unknown quality tier '{}' (expected archival, high, balanced or compact)",
                s
            ))),
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    H264,
    H265,
}

impl CodecFamily {
    pub const ALL: [CodecFamily; 2] = [Self::H264, Self::H265];

    pub fn label(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }
}

impl FromStr for CodecFamily {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Ok(Self::H264),
            "h265" | "hevc" | "x265" => Ok(Self::H265),
            _ => Err(EngineError::UnsupportedIntent(format!(
                "unknown codec '{}' (expected h264 or h265)",
                s
            ))),
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioPolicy {
    Aac { kbps: u32 },
    Copy,
    Mute,
}

impl FromStr for AudioPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        match token.as_str() {
            "copy" => return Ok(Self::Copy),
            "none" | "mute" => return Ok(Self::Mute),
            "aac" => return Ok(Self::Aac { kbps: 128 }),
            _ => {}
        }
        token
            .strip_prefix("aac")
            .and_then(|rate| rate.parse::<u32>().ok())
            .filter(|kbps| (32..=512).contains(kbps))
            .map(|kbps| Self::Aac { kbps })
            .ok_or_else(|| {
                EngineError::UnsupportedIntent(format!(
                    "unknown audio policy '{}' (expected aac320, aac128, aac96, copy or none)",
                    s
                ))
            })
    }
}

impl fmt::Display for AudioPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aac { kbps } => write!(f, "aac{}", kbps),
            Self::Copy => f.write_str("copy"),
            Self::Mute => f.write_str("none"),
        }
    }
}

// ============================================================================
// Timestamps and trim windows
// ============================================================================

/// A media position with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp {
    millis: u64,
}

impl Timestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self {
            millis: secs.saturating_mul(1000),
        }
    }

    pub fn as_millis(self) -> u64 {
        self.millis
    }

    pub fn as_secs_f64(self) -> f64 {
        self.millis as f64 / 1000.0
    }

    pub fn saturating_sub(self, other: Timestamp) -> Timestamp {
        Timestamp::from_millis(self.millis.saturating_sub(other.millis))
    }
}

/// Accepts `SS[.fff]`, `MM:SS[.fff]` and `HH:MM:SS[.fff]`.
impl FromStr for Timestamp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            EngineError::UnsupportedIntent(format!(
                "invalid timestamp '{}' (expected SS, MM:SS or HH:MM:SS)",
                s
            ))
        };

        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        let (whole, secs_part) = parts.split_at(parts.len() - 1);
        let seconds: f64 = secs_part[0].parse().map_err(|_| invalid())?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(invalid());
        }
        if !whole.is_empty() && seconds >= 60.0 {
            return Err(invalid());
        }

        let mut total_minutes: u64 = 0;
        for (i, part) in whole.iter().enumerate() {
            let value: u64 = part.parse().map_err(|_| invalid())?;
            // minutes are bounded when hours are present
            if whole.len() == 2 && i == 1 && value >= 60 {
                return Err(invalid());
            }
            total_minutes = total_minutes
                .checked_mul(60)
                .and_then(|m| m.checked_add(value))
                .ok_or_else(invalid)?;
        }

        let fraction_millis = (seconds * 1000.0).round();
        if fraction_millis >= u64::MAX as f64 {
            return Err(invalid());
        }
        total_minutes
            .checked_mul(60_000)
            .and_then(|m| m.checked_add(fraction_millis as u64))
            .map(|millis| Self { millis })
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.millis / 1000;
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            self.millis % 1000
        )
    }
}

/// Portion of the input to keep. At least one bound is set and `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrimWindow {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl TrimWindow {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<Self, EngineError> {
        match (start, end) {
            (None, None) => Err(EngineError::UnsupportedIntent(
                "trim needs a start or an end time".to_string(),
            )),
            (Some(s), Some(e)) if e <= s => Err(EngineError::UnsupportedIntent(format!(
                "trim end {} must be after start {}",
                e, s
            ))),
            _ => Ok(Self { start, end }),
        }
    }

    /// Build from optional CLI/config strings. Both absent means no trim.
    pub fn parse_bounds(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>, EngineError> {
        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        let start = start.map(str::parse).transpose()?;
        let end = end.map(str::parse).transpose()?;
        Self::new(start, end).map(Some)
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }
}

// ============================================================================
// Intents and operations
// ============================================================================

/// Caller's abstract request for a video encode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EncodeIntent {
    /// `None` keeps the source dimensions.
    pub resolution: Option<ResolutionTier>,
    pub quality: QualityTier,
    pub codec: CodecFamily,
    pub audio: AudioPolicy,
    pub trim: Option<TrimWindow>,
    /// Extra ffmpeg arguments inserted before the output.
    pub extra_args: Vec<String>,
}

impl EncodeIntent {
    pub fn new(quality: QualityTier, codec: CodecFamily) -> Self {
        Self {
            resolution: None,
            quality,
            codec,
            audio: AudioPolicy::Aac { kbps: 128 },
            trim: None,
            extra_args: Vec::new(),
        }
    }

    pub fn with_resolution(mut self, resolution: ResolutionTier) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_audio(mut self, audio: AudioPolicy) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_trim(mut self, trim: TrimWindow) -> Self {
        self.trim = Some(trim);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
    Webp,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// Formats where magick's `-quality` controls lossy compression.
    pub fn supports_quality(self) -> bool {
        matches!(self, Self::Jpg | Self::Webp)
    }
}

impl FromStr for ImageFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(EngineError::UnsupportedIntent(format!(
                "unsupported image format '{}' (expected jpg, png, webp, bmp or tiff)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ImageIntent {
    pub format: ImageFormat,
    quality: u8,
    /// Shrink to this width when the source is wider.
    pub resize_width: Option<u32>,
}

impl ImageIntent {
    pub fn new(format: ImageFormat, quality: u8, resize_width: Option<u32>) -> Result<Self, EngineError> {
        if !(1..=100).contains(&quality) {
            return Err(EngineError::UnsupportedIntent(format!(
                "image quality {} out of range 1-100",
                quality
            )));
        }
        if resize_width == Some(0) {
            return Err(EngineError::UnsupportedIntent(
                "resize width must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            format,
            quality,
            resize_width,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

/// What a job does to its input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Transcode(EncodeIntent),
    LosslessTrim(TrimWindow),
    Image(ImageIntent),
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transcode(_) => "transcode",
            Self::LosslessTrim(_) => "trim",
            Self::Image(_) => "image",
        }
    }

    /// Extension used when the batch does not force one.
    pub fn default_extension(&self, input: &Path) -> String {
        match self {
            Self::Transcode(_) => "mp4".to_string(),
            Self::LosslessTrim(_) => input
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_else(|| "mp4".to_string()),
            Self::Image(intent) => intent.format.extension().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub input: PathBuf,
    pub operation: Operation,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>, operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            operation,
        }
    }

    /// Short label for progress reporting.
    pub fn label(&self) -> String {
        file_label(&self.input)
    }
}

// ============================================================================
// Resolved commands
// ============================================================================

/// A fully resolved external invocation. Consumed once by a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl ResolvedCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Shell-quoted rendering for logs and dry runs.
    pub fn display(&self) -> String {
        display_command(&self.program, &self.args)
    }
}

pub fn display_command(program: &Path, args: &[OsString]) -> String {
    let words: Vec<String> = std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect();
    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success {
        output_path: PathBuf,
        warnings: Vec<String>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// 0-based position in the submitted batch.
    pub index: usize,
    pub input: PathBuf,
    pub result: JobResult,
    pub elapsed_ms: u64,
}

/// Outcome of a whole batch, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub records: Vec<JobRecord>,
    pub succeeded: usize,
    pub failed: usize,
    pub messages: Vec<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter().filter(|r| !r.result.is_success())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
