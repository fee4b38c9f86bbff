// Input probing using ffprobe and magick identify

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::EngineError;
use super::hardware::CapabilitySnapshot;
use super::process::CommandRunner;

/// Normalized technical description of a video file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaDescriptor {
    pub path: PathBuf,
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub frame_rate: f64,
    /// Bits per second, when the container reports one
    pub bitrate: Option<u64>,
    pub byte_size: u64,
}

impl MediaDescriptor {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn duration_display(&self) -> String {
        format_duration(self.duration_s)
    }

    pub fn bitrate_display(&self) -> String {
        format_bitrate(self.bitrate)
    }

    pub fn size_display(&self) -> String {
        format_size(self.byte_size)
    }

    pub fn frame_rate_display(&self) -> String {
        format!("{:.2} fps", self.frame_rate)
    }
}

/// Still image description from `magick identify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub byte_size: u64,
}

pub struct MetadataExtractor<R> {
    runner: R,
    ffprobe: Option<PathBuf>,
    magick: Option<PathBuf>,
    timeout: Duration,
}

impl<R: CommandRunner> MetadataExtractor<R> {
    pub fn new(runner: R, ffprobe: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            ffprobe,
            magick: None,
            timeout,
        }
    }

    pub fn from_snapshot(runner: R, snapshot: &CapabilitySnapshot, timeout: Duration) -> Self {
        Self {
            runner,
            ffprobe: snapshot.ffprobe.as_ref().map(|t| t.path.clone()),
            magick: snapshot.magick.as_ref().map(|t| t.path.clone()),
            timeout,
        }
    }

    pub fn with_magick(mut self, magick: PathBuf) -> Self {
        self.magick = Some(magick);
        self
    }

    /// Probe a video file. Every failure (missing tool, spawn, timeout,
    /// non-zero exit, unparseable output) is reported as a metadata error.
    pub fn describe(&self, path: &Path) -> Result<MediaDescriptor, EngineError> {
        let ffprobe = self
            .ffprobe
            .as_deref()
            .ok_or_else(|| EngineError::metadata(path, "ffprobe is not available"))?;

        let args: Vec<OsString> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ]
        .iter()
        .map(OsString::from)
        .chain(std::iter::once(path.as_os_str().to_os_string()))
        .collect();

        let output = self
            .runner
            .run(ffprobe, &args, self.timeout)
            .into_output(ffprobe)
            .map_err(|e| EngineError::metadata(path, e.to_string()))?;

        let mut descriptor = parse_probe_json(path, &output.stdout)?;
        if descriptor.byte_size == 0 {
            if let Ok(meta) = std::fs::metadata(path) {
                descriptor.byte_size = meta.len();
            }
        }
        debug!(
            path = %path.display(),
            codec = %descriptor.codec,
            resolution = %descriptor.resolution(),
            fps = descriptor.frame_rate,
            "probed"
        );
        Ok(descriptor)
    }

    /// Probe a still image through ImageMagick.
    pub fn describe_image(&self, path: &Path) -> Result<ImageDescriptor, EngineError> {
        let magick = self
            .magick
            .as_deref()
            .ok_or_else(|| EngineError::metadata(path, "ImageMagick is not available"))?;

        let args = vec![
            OsString::from("identify"),
            OsString::from("-format"),
            OsString::from("%w|%h|%m|%B\\n"),
            path.as_os_str().to_os_string(),
        ];
        let output = self
            .runner
            .run(magick, &args, self.timeout)
            .into_output(magick)
            .map_err(|e| EngineError::metadata(path, e.to_string()))?;

        parse_identify(path, &output.stdout)
    }
}

/// Parse `ffprobe -print_format json -show_streams -show_format` output
pub fn parse_probe_json(path: &Path, json_str: &str) -> Result<MediaDescriptor, EngineError> {
    let json: Value = serde_json::from_str(json_str)
        .map_err(|e| EngineError::metadata(path, format!("failed to parse ffprobe JSON: {}", e)))?;

    let video = json["streams"]
        .as_array()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s["codec_type"].as_str() == Some("video"))
        })
        .ok_or_else(|| EngineError::metadata(path, "no video stream found"))?;

    let width = positive_dimension(&video["width"])
        .ok_or_else(|| EngineError::metadata(path, "missing or zero video width"))?;
    let height = positive_dimension(&video["height"])
        .ok_or_else(|| EngineError::metadata(path, "missing or zero video height"))?;

    let codec = video["codec_name"]
        .as_str()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| EngineError::metadata(path, "missing codec name"))?
        .to_string();

    // r_frame_rate first, avg_frame_rate as fallback
    let frame_rate = video["r_frame_rate"]
        .as_str()
        .or_else(|| video["avg_frame_rate"].as_str())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let format = &json["format"];
    let duration_s = number(&format["duration"])
        .or_else(|| number(&video["duration"]))
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let bitrate = number(&format["bit_rate"])
        .map(|b| b as u64)
        .filter(|b| *b > 0);
    let byte_size = number(&format["size"]).map(|s| s as u64).unwrap_or(0);

    Ok(MediaDescriptor {
        path: path.to_path_buf(),
        duration_s,
        width,
        height,
        codec,
        frame_rate,
        bitrate,
        byte_size,
    })
}

/// Parse `%w|%h|%m|%B` lines; multi-frame images report one line per frame.
pub fn parse_identify(path: &Path, output: &str) -> Result<ImageDescriptor, EngineError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| EngineError::metadata(path, "empty identify output"))?;

    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 4 {
        return Err(EngineError::metadata(
            path,
            format!("unexpected identify output: {}", line),
        ));
    }

    let parse = |s: &str, what: &str| {
        s.trim_end_matches('B')
            .parse::<u64>()
            .map_err(|_| EngineError::metadata(path, format!("invalid {}: {}", what, s)))
    };

    Ok(ImageDescriptor {
        path: path.to_path_buf(),
        width: parse(fields[0], "width")? as u32,
        height: parse(fields[1], "height")? as u32,
        format: fields[2].to_string(),
        byte_size: parse(fields[3], "size")?,
    })
}

fn positive_dimension(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}

/// ffprobe reports most format numbers as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a frame rate like "30000/1001", "30/1" or "25".
/// A zero denominator ("0/0" on still streams) yields 0.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let numerator: f64 = num.trim().parse().ok()?;
            let denominator: f64 = den.trim().parse().ok()?;
            if denominator == 0.0 {
                Some(0.0)
            } else {
                Some(numerator / denominator)
            }
        }
        None => s.trim().parse().ok(),
    }
}

/// `HH:MM:SS`, truncating fractional seconds
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub fn format_bitrate(bitrate: Option<u64>) -> String {
    match bitrate {
        Some(b) if b > 0 => format!("{} kb/s", b / 1000),
        _ => "unknown".to_string(),
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b > GB {
        format!("{:.1} GB", b / GB)
    } else if b > MB {
        format!("{:.1} MB", b / MB)
    } else if b > KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Descriptors keyed by path, so one operation never probes a file twice.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: HashMap<PathBuf, MediaDescriptor>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_describe<R: CommandRunner>(
        &mut self,
        extractor: &MetadataExtractor<R>,
        path: &Path,
    ) -> Result<MediaDescriptor, EngineError> {
        if let Some(found) = self.entries.get(path) {
            return Ok(found.clone());
        }
        let descriptor = extractor.describe(path)?;
        self.entries.insert(path.to_path_buf(), descriptor.clone());
        Ok(descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
