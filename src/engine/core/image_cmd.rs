// ImageMagick command construction and the JPEG XR decode adapter

use super::scan::is_jpeg_xr;
use super::types::{ImageIntent, ResolvedCommand};
use crate::engine::error::EngineError;
use crate::engine::hardware::CapabilitySnapshot;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;

/// Timeout for a magick conversion
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for the JPEG XR decode step
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(120);

/// Ordered commands for one job plus the scratch files they share.
/// Scratch files are removed when the plan is dropped.
#[derive(Debug)]
pub struct JobPlan {
    pub steps: Vec<ResolvedCommand>,
    pub output: PathBuf,
    pub scratch: Vec<TempPath>,
}

impl JobPlan {
    pub fn single(step: ResolvedCommand, output: PathBuf) -> Self {
        Self {
            steps: vec![step],
            output,
            scratch: Vec::new(),
        }
    }
}

/// `magick <in> [-resize Wx>] [-quality Q] -strip <out>`
pub fn resolve_image(
    intent: &ImageIntent,
    magick: &Path,
    input: &Path,
    output: &Path,
) -> ResolvedCommand {
    let mut cmd = ResolvedCommand::new(magick, DEFAULT_IMAGE_TIMEOUT);
    cmd.arg(input);
    if let Some(width) = intent.resize_width {
        // '>' only shrinks
        cmd.arg("-resize").arg(format!("{}x>", width));
    }
    if intent.format.supports_quality() {
        cmd.arg("-quality").arg(intent.quality().to_string());
    }
    cmd.arg("-strip");
    cmd.arg(output);
    cmd
}

/// Turns a format magick cannot read into one it can.
pub trait IntermediateDecoder: Send + Sync {
    /// Extension of the intermediate file, without the dot
    fn intermediate_extension(&self) -> &'static str;

    /// Command that decodes `input` into `intermediate`, plus any scratch
    /// files the command needs to stay alive while it runs.
    fn decode(
        &self,
        input: &Path,
        intermediate: &Path,
    ) -> Result<(ResolvedCommand, Vec<TempPath>), EngineError>;
}

/// Windows Imaging Component decode through PowerShell. The script takes
/// its paths as parameters; nothing is interpolated into script text.
pub struct WicDecoder {
    powershell: PathBuf,
}

const WIC_SCRIPT: &str = r#"param([Parameter(Mandatory)][string]$InputPath, [Parameter(Mandatory)][string]$OutputPath)
$ErrorActionPreference = 'Stop'
Add-Type -AssemblyName PresentationCore
try {
    $stream = [System.IO.File]::OpenRead($InputPath)
    try {
        $decoder = [System.Windows.Media.Imaging.BitmapDecoder]::Create(
            $stream,
            [System.Windows.Media.Imaging.BitmapCreateOptions]::PreservePixelFormat,
            [System.Windows.Media.Imaging.BitmapCacheOption]::OnLoad)
        $encoder = New-Object System.Windows.Media.Imaging.PngBitmapEncoder
        $encoder.Frames.Add([System.Windows.Media.Imaging.BitmapFrame]::Create($decoder.Frames[0]))
        $out = [System.IO.File]::Create($OutputPath)
        try { $encoder.Save($out) } finally { $out.Close() }
    } finally {
        $stream.Close()
    }
} catch {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 1
}
exit 0
"#;

impl WicDecoder {
    pub fn new(powershell: impl Into<PathBuf>) -> Self {
        Self {
            powershell: powershell.into(),
        }
    }
}

impl IntermediateDecoder for WicDecoder {
    fn intermediate_extension(&self) -> &'static str {
        "png"
    }

    fn decode(
        &self,
        input: &Path,
        intermediate: &Path,
    ) -> Result<(ResolvedCommand, Vec<TempPath>), EngineError> {
        let mut script = tempfile::Builder::new()
            .prefix("mediabatch-wic-")
            .suffix(".ps1")
            .tempfile()
            .map_err(|e| EngineError::filesystem("Failed to create decode script", e))?;
        script
            .write_all(WIC_SCRIPT.as_bytes())
            .and_then(|_| script.flush())
            .map_err(|e| EngineError::filesystem("Failed to write decode script", e))?;
        let script = script.into_temp_path();

        let mut cmd = ResolvedCommand::new(&self.powershell, DEFAULT_DECODE_TIMEOUT);
        cmd.args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"]);
        cmd.arg(script.as_os_str());
        cmd.arg("-InputPath").arg(input);
        cmd.arg("-OutputPath").arg(intermediate);
        Ok((cmd, vec![script]))
    }
}

/// jxrlib's reference decoder
pub struct JxrLibDecoder {
    program: PathBuf,
}

impl JxrLibDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl IntermediateDecoder for JxrLibDecoder {
    fn intermediate_extension(&self) -> &'static str {
        "tif"
    }

    fn decode(
        &self,
        input: &Path,
        intermediate: &Path,
    ) -> Result<(ResolvedCommand, Vec<TempPath>), EngineError> {
        let mut cmd = ResolvedCommand::new(&self.program, DEFAULT_DECODE_TIMEOUT);
        cmd.arg("-i").arg(input);
        cmd.arg("-o").arg(intermediate);
        Ok((cmd, Vec::new()))
    }
}

/// The decoder for this platform, built from the detected tool
pub fn platform_decoder(program: &Path) -> Box<dyn IntermediateDecoder> {
    if cfg!(windows) {
        Box::new(WicDecoder::new(program))
    } else {
        Box::new(JxrLibDecoder::new(program))
    }
}

/// Plan an image conversion: one magick step, or decode + magick for JPEG XR.
pub fn plan_image_job(
    intent: &ImageIntent,
    caps: &CapabilitySnapshot,
    input: &Path,
    output: &Path,
) -> Result<JobPlan, EngineError> {
    let magick = caps.require_magick()?;

    if !is_jpeg_xr(input) {
        return Ok(JobPlan::single(
            resolve_image(intent, magick, input, output),
            output.to_path_buf(),
        ));
    }

    let decoder = platform_decoder(caps.require_jxr_decoder()?);
    plan_with_decoder(intent, magick, decoder.as_ref(), input, output)
}

pub fn plan_with_decoder(
    intent: &ImageIntent,
    magick: &Path,
    decoder: &dyn IntermediateDecoder,
    input: &Path,
    output: &Path,
) -> Result<JobPlan, EngineError> {
    let intermediate = tempfile::Builder::new()
        .prefix("mediabatch-decoded-")
        .suffix(&format!(".{}", decoder.intermediate_extension()))
        .tempfile()
        .map_err(|e| EngineError::filesystem("Failed to create intermediate file", e))?
        .into_temp_path();

    let (decode, mut scratch) = decoder.decode(input, &intermediate)?;
    let convert = resolve_image(intent, magick, &intermediate, output);
    scratch.push(intermediate);

    Ok(JobPlan {
        steps: vec![decode, convert],
        output: output.to_path_buf(),
        scratch,
    })
}
