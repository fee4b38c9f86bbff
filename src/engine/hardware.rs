//! Tool discovery and hardware encoder detection

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use walkdir::WalkDir;

use super::core::CodecFamily;
use super::error::EngineError;
use super::process::{CommandRunner, Outcome, ProcessRunner};

// ============================================================================
// Encoder backends
// ============================================================================

/// Encoder implementation family targeted by resolved commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Nvenc,
    Amf,
    Qsv,
    Software,
}

impl Backend {
    /// FFmpeg encoder name for a codec family on this backend
    pub fn encoder_name(self, codec: CodecFamily) -> &'static str {
        match (self, codec) {
            (Self::Nvenc, CodecFamily::H264) => "h264_nvenc",
            (Self::Nvenc, CodecFamily::H265) => "hevc_nvenc",
            (Self::Amf, CodecFamily::H264) => "h264_amf",
            (Self::Amf, CodecFamily::H265) => "hevc_amf",
            (Self::Qsv, CodecFamily::H264) => "h264_qsv",
            (Self::Qsv, CodecFamily::H265) => "hevc_qsv",
            (Self::Software, CodecFamily::H264) => "libx264",
            (Self::Software, CodecFamily::H265) => "libx265",
        }
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, Self::Software)
    }

    /// Tallest frame the backend will encode, if it has a ceiling
    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::Nvenc => Some(4096),
            Self::Amf | Self::Qsv | Self::Software => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Nvenc => "NVIDIA NVENC",
            Self::Amf => "AMD AMF",
            Self::Qsv => "Intel Quick Sync",
            Self::Software => "Software (CPU)",
        }
    }
}

/// Encoder markers in priority order; the first backend with a listed marker wins.
const BACKEND_MARKERS: &[(&[&str], Backend)] = &[
    (&["h264_nvenc", "hevc_nvenc"], Backend::Nvenc),
    (&["h264_amf"], Backend::Amf),
    (&["h264_qsv"], Backend::Qsv),
];

/// Any of these means HEVC output is possible.
const HEVC_MARKERS: &[&str] = &["hevc_nvenc", "hevc_amf", "hevc_qsv", "libx265"];

/// Pick a backend from `ffmpeg -hide_banner -encoders` output
pub fn backend_from_listing(listing: &str) -> Backend {
    let listing = listing.to_ascii_lowercase();
    BACKEND_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| listing.contains(m)))
        .map(|(_, backend)| *backend)
        .unwrap_or(Backend::Software)
}

pub fn hevc_from_listing(listing: &str) -> bool {
    let listing = listing.to_ascii_lowercase();
    HEVC_MARKERS.iter().any(|m| listing.contains(m))
}

// ============================================================================
// Tool specifications
// ============================================================================

/// How to find and validate one external tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Bare executable name, resolved through PATH
    pub name: &'static str,
    /// Lowercase product name matched against vendor subfolder names
    pub product: &'static str,
    /// Arguments that must exit 0 on a working install. `None` means existence is enough.
    pub version_args: Option<&'static [&'static str]>,
    /// Absolute candidates; may contain `*` globs
    pub known_locations: Vec<PathBuf>,
    /// Parents whose product-named subfolders are searched
    pub vendor_dirs: Vec<PathBuf>,
    /// Executable paths tried inside each vendor subfolder before walking it
    pub relative_paths: Vec<PathBuf>,
}

const VERSION_FLAG: &[&str] = &["-version"];
#[cfg(windows)]
const POWERSHELL_CHECK: &[&str] = &["-NoProfile", "-NonInteractive", "-Command", "exit 0"];

/// Depth limit for vendor folder walks
const VENDOR_WALK_DEPTH: usize = 4;

impl ToolSpec {
    pub fn executable_name(&self) -> String {
        exe_name(self.name)
    }

    pub fn ffmpeg() -> Self {
        Self::ffmpeg_family("ffmpeg")
    }

    pub fn ffprobe() -> Self {
        Self::ffmpeg_family("ffprobe")
    }

    fn ffmpeg_family(name: &'static str) -> Self {
        let exe = exe_name(name);
        let mut known = Vec::new();
        let mut vendor_dirs = Vec::new();

        if cfg!(windows) {
            if let Some(local) = env_path("LOCALAPPDATA") {
                known.push(local.join("Microsoft").join("WinGet").join("Links").join(&exe));
                vendor_dirs.push(local.join("Microsoft").join("WinGet").join("Packages"));
            }
            known.push(PathBuf::from(r"C:\ffmpeg\bin").join(&exe));
            known.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin").join(&exe));
            known.push(PathBuf::from(r"C:\Program Files (x86)\ffmpeg\bin").join(&exe));
            if let Some(home) = dirs::home_dir() {
                known.push(home.join("scoop").join("shims").join(&exe));
            }
            known.push(PathBuf::from(r"C:\ProgramData\chocolatey\bin").join(&exe));
        } else {
            for dir in ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin", "/snap/bin"] {
                known.push(Path::new(dir).join(&exe));
            }
        }

        Self {
            name,
            product: "ffmpeg",
            version_args: Some(VERSION_FLAG),
            known_locations: known,
            vendor_dirs,
            relative_paths: vec![Path::new("bin").join(&exe)],
        }
    }

    pub fn imagemagick() -> Self {
        let exe = exe_name("magick");
        let mut known = Vec::new();
        let mut vendor_dirs = Vec::new();

        if cfg!(windows) {
            known.push(PathBuf::from(r"C:\Program Files\ImageMagick*").join(&exe));
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Some(dir) = env_path(var) {
                    vendor_dirs.push(dir);
                }
            }
            if let Some(local) = env_path("LOCALAPPDATA") {
                vendor_dirs.push(local.join("Programs"));
            }
        } else {
            for dir in ["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"] {
                known.push(Path::new(dir).join(&exe));
            }
        }

        Self {
            name: "magick",
            product: "imagemagick",
            version_args: Some(VERSION_FLAG),
            known_locations: known,
            vendor_dirs,
            relative_paths: vec![PathBuf::from(&exe)],
        }
    }

    /// Decoder for JPEG XR inputs: PowerShell (WIC) on Windows, jxrlib elsewhere.
    #[cfg(windows)]
    pub fn jxr_decoder() -> Self {
        let mut known = Vec::new();
        if let Some(root) = env_path("SystemRoot") {
            known.push(
                root.join("System32")
                    .join("WindowsPowerShell")
                    .join("v1.0")
                    .join("powershell.exe"),
            );
        }
        Self {
            name: "powershell",
            product: "powershell",
            version_args: Some(POWERSHELL_CHECK),
            known_locations: known,
            vendor_dirs: Vec::new(),
            relative_paths: Vec::new(),
        }
    }

    #[cfg(not(windows))]
    pub fn jxr_decoder() -> Self {
        Self {
            name: "JxrDecApp",
            product: "jxrlib",
            // JxrDecApp has no version flag and exits non-zero without arguments
            version_args: None,
            known_locations: ["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"]
                .iter()
                .map(|dir| Path::new(dir).join("JxrDecApp"))
                .collect(),
            vendor_dirs: Vec::new(),
            relative_paths: Vec::new(),
        }
    }

    /// Add user-configured directories as known locations.
    pub fn with_search_dirs(mut self, dirs: &[PathBuf]) -> Self {
        let exe = self.executable_name();
        let extra = dirs.iter().map(|d| d.join(&exe));
        self.known_locations.splice(0..0, extra);
        self
    }
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Expand one known location; glob patterns yield every match in sorted order.
fn expand_location(location: &Path) -> Vec<PathBuf> {
    let pattern = location.to_string_lossy();
    if !pattern.contains(['*', '?', '[']) {
        return vec![location.to_path_buf()];
    }
    let mut matches: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            debug!(pattern = %pattern, error = %e, "invalid search pattern");
            Vec::new()
        }
    };
    matches.sort();
    matches
}

/// Subfolders of `parent` whose lowercase name contains `product`, sorted.
fn vendor_subfolders(parent: &Path, product: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };
    let mut folders: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .to_ascii_lowercase()
                .contains(product)
        })
        .map(|e| e.path())
        .collect();
    folders.sort();
    folders
}

fn find_in_tree(root: &Path, exe: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(VENDOR_WALK_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_file() && e.file_name().to_string_lossy().eq_ignore_ascii_case(exe)
        })
        .map(|e| e.into_path())
}

// ============================================================================
// Capability snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    pub path: PathBuf,
    /// First line of the version output, when the tool has one
    pub version: Option<String>,
}

impl ResolvedTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: None,
        }
    }
}

/// Everything the engine knows about the machine, detected once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySnapshot {
    pub backend: Backend,
    pub hevc_available: bool,
    pub ffmpeg: Option<ResolvedTool>,
    pub ffprobe: Option<ResolvedTool>,
    pub magick: Option<ResolvedTool>,
    pub jxr_decoder: Option<ResolvedTool>,
    pub gpu_name: Option<String>,
}

impl CapabilitySnapshot {
    /// A snapshot with no tools; fill in with the `with_*` builders.
    pub fn new(backend: Backend, hevc_available: bool) -> Self {
        Self {
            backend,
            hevc_available,
            ffmpeg: None,
            ffprobe: None,
            magick: None,
            jxr_decoder: None,
            gpu_name: None,
        }
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg = Some(ResolvedTool::new(path));
        self
    }

    pub fn with_ffprobe(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe = Some(ResolvedTool::new(path));
        self
    }

    pub fn with_magick(mut self, path: impl Into<PathBuf>) -> Self {
        self.magick = Some(ResolvedTool::new(path));
        self
    }

    pub fn with_jxr_decoder(mut self, path: impl Into<PathBuf>) -> Self {
        self.jxr_decoder = Some(ResolvedTool::new(path));
        self
    }

    pub fn require_ffmpeg(&self) -> Result<&Path, EngineError> {
        require(&self.ffmpeg, "ffmpeg")
    }

    pub fn require_ffprobe(&self) -> Result<&Path, EngineError> {
        require(&self.ffprobe, "ffprobe")
    }

    pub fn require_magick(&self) -> Result<&Path, EngineError> {
        require(&self.magick, "ImageMagick (magick)")
    }

    pub fn require_jxr_decoder(&self) -> Result<&Path, EngineError> {
        require(&self.jxr_decoder, "JPEG XR decoder")
    }
}

fn require<'a>(tool: &'a Option<ResolvedTool>, name: &str) -> Result<&'a Path, EngineError> {
    tool.as_ref()
        .map(|t| t.path.as_path())
        .ok_or_else(|| EngineError::dependency(name, "not found on PATH or in known install locations"))
}

// ============================================================================
// Detection
// ============================================================================

/// Explicit tool paths that bypass discovery.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub magick: Option<PathBuf>,
    pub jxr_decoder: Option<PathBuf>,
    pub extra_search_dirs: Vec<PathBuf>,
}

pub struct CapabilityDetector<R = ProcessRunner> {
    runner: R,
    timeout: Duration,
    overrides: ToolOverrides,
}

impl CapabilityDetector<ProcessRunner> {
    pub fn system() -> Self {
        Self::new(ProcessRunner::new())
    }
}

impl<R: CommandRunner> CapabilityDetector<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            timeout: Duration::from_secs(10),
            overrides: ToolOverrides::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_overrides(mut self, overrides: ToolOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Run the tool's version check; `Some(first line)` when it exits 0.
    pub fn version(&self, program: &Path, args: &[&str]) -> Option<String> {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        match self.runner.run(program, &args, self.timeout) {
            Outcome::Completed {
                exit_code: Some(0),
                stdout,
                ..
            } => Some(stdout.lines().next().unwrap_or_default().trim().to_string()),
            _ => None,
        }
    }

    fn validate(&self, spec: &ToolSpec, candidate: &Path) -> Option<ResolvedTool> {
        match spec.version_args {
            Some(args) => self.version(candidate, args).map(|version| ResolvedTool {
                path: candidate.to_path_buf(),
                version: Some(version).filter(|v| !v.is_empty()),
            }),
            None => candidate.is_file().then(|| ResolvedTool::new(candidate)),
        }
    }

    /// Find a working install: PATH, then known locations, then vendor folders.
    /// The first candidate that validates wins.
    pub fn locate(&self, spec: &ToolSpec) -> Option<ResolvedTool> {
        let exe = spec.executable_name();

        if let Ok(path) = which::which(spec.name) {
            if let Some(tool) = self.validate(spec, &path) {
                debug!(tool = spec.name, path = %tool.path.display(), "found on PATH");
                return Some(tool);
            }
        }

        for location in &spec.known_locations {
            for candidate in expand_location(location) {
                if candidate.is_file() {
                    if let Some(tool) = self.validate(spec, &candidate) {
                        debug!(tool = spec.name, path = %tool.path.display(), "found in known location");
                        return Some(tool);
                    }
                }
            }
        }

        for parent in &spec.vendor_dirs {
            for folder in vendor_subfolders(parent, spec.product) {
                let direct = spec
                    .relative_paths
                    .iter()
                    .map(|rel| folder.join(rel))
                    .filter(|p| p.is_file());
                let walked = find_in_tree(&folder, &exe);
                for candidate in direct.chain(walked) {
                    if let Some(tool) = self.validate(spec, &candidate) {
                        debug!(tool = spec.name, path = %tool.path.display(), "found in vendor folder");
                        return Some(tool);
                    }
                }
            }
        }

        debug!(tool = spec.name, "not found");
        None
    }

    pub fn is_available(&self, spec: &ToolSpec) -> bool {
        self.locate(spec).is_some()
    }

    fn locate_with_override(&self, spec: &ToolSpec, explicit: Option<&Path>) -> Option<ResolvedTool> {
        if let Some(path) = explicit {
            if let Some(tool) = self.validate(spec, path) {
                return Some(tool);
            }
            debug!(tool = spec.name, path = %path.display(), "configured path failed validation");
        }
        self.locate(&spec.clone().with_search_dirs(&self.overrides.extra_search_dirs))
    }

    /// Lowercased `ffmpeg -hide_banner -encoders` output, or `None` when the listing fails
    pub fn list_encoders(&self, ffmpeg: &Path) -> Option<String> {
        let args = [OsString::from("-hide_banner"), OsString::from("-encoders")];
        match self.runner.run(ffmpeg, &args, self.timeout) {
            Outcome::Completed {
                exit_code: Some(0),
                stdout,
                ..
            } => Some(stdout.to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn detect_encoder_backend(&self, ffmpeg: &Path) -> Backend {
        self.list_encoders(ffmpeg)
            .map(|listing| backend_from_listing(&listing))
            .unwrap_or(Backend::Software)
    }

    /// Whether the secondary codec family (HEVC) can be encoded
    pub fn has_secondary_codec(&self, ffmpeg: &Path) -> bool {
        self.list_encoders(ffmpeg)
            .map(|listing| hevc_from_listing(&listing))
            .unwrap_or(false)
    }

    /// GPU model name for display. Tries nvidia-smi, then the platform's device listing.
    pub fn gpu_name(&self) -> Option<String> {
        let probe = |program: &str, args: &[&str]| -> Option<String> {
            let args: Vec<OsString> = args.iter().map(OsString::from).collect();
            match self.runner.run(Path::new(program), &args, self.timeout) {
                Outcome::Completed {
                    exit_code: Some(0),
                    stdout,
                    ..
                } => Some(stdout),
                _ => None,
            }
        };

        if let Some(name) = probe("nvidia-smi", &["-L"]).and_then(|o| parse_nvidia_smi(&o)) {
            return Some(name);
        }

        if cfg!(windows) {
            probe("wmic", &["path", "win32_videocontroller", "get", "name"])
                .and_then(|o| parse_wmic_names(&o))
        } else if cfg!(target_os = "macos") {
            probe("system_profiler", &["SPDisplaysDataType"])
                .and_then(|o| parse_system_profiler(&o))
        } else {
            probe("lspci", &[]).and_then(|o| parse_lspci(&o))
        }
    }

    /// Probe the machine once. Missing tools leave their slot empty.
    pub fn detect(&self) -> CapabilitySnapshot {
        let ffmpeg = self.locate_with_override(&ToolSpec::ffmpeg(), self.overrides.ffmpeg.as_deref());

        let ffprobe = {
            let spec = ToolSpec::ffprobe();
            let sibling = ffmpeg
                .as_ref()
                .map(|t| t.path.with_file_name(spec.executable_name()))
                .filter(|p| p.is_file());
            let explicit = self.overrides.ffprobe.clone().or(sibling);
            self.locate_with_override(&spec, explicit.as_deref())
        };

        let magick =
            self.locate_with_override(&ToolSpec::imagemagick(), self.overrides.magick.as_deref());
        let jxr_decoder = self
            .locate_with_override(&ToolSpec::jxr_decoder(), self.overrides.jxr_decoder.as_deref());

        let listing = ffmpeg
            .as_ref()
            .and_then(|tool| self.list_encoders(&tool.path))
            .unwrap_or_default();
        let backend = backend_from_listing(&listing);
        let hevc_available = hevc_from_listing(&listing);
        let gpu_name = self.gpu_name();

        info!(
            backend = backend.display_name(),
            hevc = hevc_available,
            ffmpeg = ffmpeg.is_some(),
            ffprobe = ffprobe.is_some(),
            magick = magick.is_some(),
            gpu = gpu_name.as_deref().unwrap_or("unknown"),
            "capabilities detected"
        );

        CapabilitySnapshot {
            backend,
            hevc_available,
            ffmpeg,
            ffprobe,
            magick,
            jxr_decoder,
            gpu_name,
        }
    }
}

// ============================================================================
// GPU name parsing
// ============================================================================

/// `GPU 0: NVIDIA GeForce RTX 3080 (UUID: GPU-...)` -> `NVIDIA GeForce RTX 3080`
fn parse_nvidia_smi(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.trim_start().starts_with("GPU "))
        .and_then(|l| l.split_once(": "))
        .map(|(_, rest)| rest.split(" (UUID").next().unwrap_or(rest).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_wmic_names(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("name"))
        .map(str::to_string)
        .next()
}

fn parse_system_profiler(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("Chipset Model:"))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn parse_lspci(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|l| l.contains("VGA compatible controller") || l.contains("3D controller"))
        .filter_map(|l| l.split_once(": ").map(|(_, name)| name))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}
