use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediabatch")]
#[command(about = "Batch video and image conversion on top of ffmpeg and ImageMagick", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use this config file instead of the default location
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

/// Flags shared by every batch command
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Files or directories (scanned recursively)
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Write outputs here instead of next to each input
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output file name pattern. Supports: {filename}, {basename}, {ext}
    #[arg(long)]
    pub pattern: Option<String>,

    /// Force the output extension
    #[arg(long)]
    pub ext: Option<String>,

    /// Delete each input after it converts successfully
    #[arg(long)]
    pub delete_originals: bool,

    /// Print the resolved commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Encoding flags shared by convert and compress
#[derive(Args, Debug, Clone)]
pub struct EncodeArgs {
    /// archival, high, balanced or compact
    #[arg(long)]
    pub quality: Option<String>,

    /// h264 or h265
    #[arg(long)]
    pub codec: Option<String>,

    /// aacN (e.g. aac192), copy, or none
    #[arg(long)]
    pub audio: Option<String>,

    /// Extra ffmpeg arguments, shell-quoted
    #[arg(long, allow_hyphen_values = true)]
    pub extra_args: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect ffmpeg, ffprobe, ImageMagick, the JPEG XR decoder and the encoder backend
    CheckTools {
        #[arg(long)]
        json: bool,
    },

    /// Show the technical details of a video or image
    Probe {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Check whether videos can be joined without re-encoding
    CheckJoin {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
    },

    /// Re-encode videos at a target resolution
    Convert {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        encode: EncodeArgs,

        /// 720p, 1080p, 1440p, 4k, 8k, or source
        #[arg(long)]
        resolution: Option<String>,

        /// Trim start (SS, MM:SS or HH:MM:SS)
        #[arg(long)]
        start: Option<String>,

        /// Trim end (SS, MM:SS or HH:MM:SS)
        #[arg(long)]
        end: Option<String>,
    },

    /// Re-encode videos at their source resolution
    Compress {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Cut videos without re-encoding
    Trim {
        #[command(flatten)]
        batch: BatchArgs,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,
    },

    /// Concatenate videos without re-encoding
    Join {
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,

        /// Output file (defaults to joined-<first>.<ext> next to the first input)
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Convert images with ImageMagick
    Images {
        #[command(flatten)]
        batch: BatchArgs,

        /// jpg, png, webp, bmp or tiff
        #[arg(long)]
        format: Option<String>,

        /// 1-100, used by jpg and webp
        #[arg(long)]
        quality: Option<u8>,

        /// Shrink to at most this width
        #[arg(long, value_name = "WIDTH")]
        resize: Option<u32>,
    },

    /// Extract one frame from a video
    Thumbnail {
        file: PathBuf,

        /// Position of the frame
        #[arg(long, default_value = "00:00:01")]
        at: String,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Output image (defaults to <basename>.jpg next to the input)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
