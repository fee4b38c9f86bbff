// Global configuration management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{Timeouts, ToolOverrides, split_extra_args};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Explicit tool locations. Anything unset is located automatically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe: Option<PathBuf>,

    #[serde(default)]
    pub magick: Option<PathBuf>,

    /// JxrDecApp, or powershell on Windows
    #[serde(default)]
    pub jxr_decoder: Option<PathBuf>,

    /// Extra directories searched for bundled tools
    #[serde(default)]
    pub extra_search_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Target resolution token ("720p".."8k", or "source")
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Quality tier token (archival, high, balanced, compact)
    #[serde(default = "default_quality")]
    pub quality: String,

    #[serde(default = "default_codec")]
    pub codec: String,

    /// Audio policy token (aacN, copy, none)
    #[serde(default = "default_audio")]
    pub audio: String,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Filename pattern for output files; each command has its own default.
    /// Supports: {filename}, {basename}, {ext}
    #[serde(default)]
    pub filename_pattern: Option<String>,

    /// Forced output extension
    #[serde(default)]
    pub extension: Option<String>,

    #[serde(default)]
    pub delete_originals: bool,

    #[serde(default = "default_image_format")]
    pub image_format: String,

    #[serde(default = "default_image_quality")]
    pub image_quality: u8,

    /// Appended to every transcode command
    #[serde(default)]
    pub extra_ffmpeg_args: String,

    /// Default log filter when RUST_LOG and -v are absent
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Process timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_encode_secs")]
    pub encode: u64,

    #[serde(default = "default_image_secs")]
    pub image: u64,

    #[serde(default = "default_probe_secs")]
    pub probe: u64,

    #[serde(default = "default_detect_secs")]
    pub detect: u64,
}

fn default_resolution() -> String {
    "1080p".to_string()
}

fn default_quality() -> String {
    "high".to_string()
}

fn default_codec() -> String {
    "h265".to_string()
}

fn default_audio() -> String {
    "aac128".to_string()
}

fn default_image_format() -> String {
    "jpg".to_string()
}

fn default_image_quality() -> u8 {
    85
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_encode_secs() -> u64 {
    6 * 60 * 60
}

fn default_image_secs() -> u64 {
    300
}

fn default_probe_secs() -> u64 {
    30
}

fn default_detect_secs() -> u64 {
    10
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            quality: default_quality(),
            codec: default_codec(),
            audio: default_audio(),
            output_dir: None,
            filename_pattern: None,
            extension: None,
            delete_originals: false,
            image_format: default_image_format(),
            image_quality: default_image_quality(),
            extra_ffmpeg_args: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl TimeoutsConfig {
    /// A zero timeout would make every tool look missing
    pub fn validate(&self) -> Result<()> {
        let entries = [
            ("encode", self.encode),
            ("image", self.image),
            ("probe", self.probe),
            ("detect", self.detect),
        ];
        for (key, secs) in entries {
            if secs == 0 {
                bail!("timeouts.{} must be greater than zero", key);
            }
        }
        Ok(())
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            encode: default_encode_secs(),
            image: default_image_secs(),
            probe: default_probe_secs(),
            detect: default_detect_secs(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("mediabatch")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("mediabatch")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Try to save the default config, but don't fail if we can't
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {}", e);
                eprintln!(
                    "Using built-in defaults. Run 'mediabatch init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .timeouts
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            Config::default().save()?;
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            encode: Duration::from_secs(self.timeouts.encode),
            image: Duration::from_secs(self.timeouts.image),
            probe: Duration::from_secs(self.timeouts.probe),
            ..Timeouts::default()
        }
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.detect)
    }

    pub fn tool_overrides(&self) -> ToolOverrides {
        ToolOverrides {
            ffmpeg: self.tools.ffmpeg.clone(),
            ffprobe: self.tools.ffprobe.clone(),
            magick: self.tools.magick.clone(),
            jxr_decoder: self.tools.jxr_decoder.clone(),
            extra_search_dirs: self.tools.extra_search_dirs.clone(),
        }
    }

    /// Configured extra ffmpeg arguments, split shell-style
    pub fn extra_args(&self) -> Vec<String> {
        split_extra_args(&self.defaults.extra_ffmpeg_args)
    }
}
