// Fixed encoding tables: rate-control values, filters and file-type lists

use super::types::{CodecFamily, QualityTier};

/// Rate-control value per quality tier as `[h264, h265]`.
/// Lower is better quality for every backend (crf, cq, qp, global_quality).
const QUALITY_TABLE: [(QualityTier, [u32; 2]); 4] = [
    (QualityTier::Archival, [15, 18]),
    (QualityTier::High, [18, 20]),
    (QualityTier::Balanced, [23, 24]),
    (QualityTier::Compact, [28, 28]),
];

pub fn quality_value(tier: QualityTier, codec: CodecFamily) -> u32 {
    let column = match codec {
        CodecFamily::H264 => 0,
        CodecFamily::H265 => 1,
    };
    QUALITY_TABLE
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, values)| values[column])
        .unwrap_or(23)
}

/// Light sharpening applied after every scale.
pub const SHARPEN_FILTER: &str = "unsharp=5:5:1.0:5:5:0.0";

/// Pixel format for system-memory encoders.
pub const OUTPUT_PIX_FMT: &str = "yuv420p";

/// Containers that take `-movflags +faststart` and `-tag:v hvc1`.
const MP4_FAMILY: &[&str] = &["mp4", "mov", "m4v"];

pub fn is_mp4_family(extension: &str) -> bool {
    MP4_FAMILY.contains(&extension.to_ascii_lowercase().as_str())
}

/// Video file extensions picked up by directory scans.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "wmv", "ts", "mts", "m2ts", "mpg", "mpeg",
];

/// Image inputs magick (or the JPEG XR adapter) can read.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jxr", "hdp", "wdp", "jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp", "gif", "heic", "heif",
];

/// JPEG XR family, decoded to an intermediate before magick sees it.
pub const JPEG_XR_EXTENSIONS: &[&str] = &["jxr", "hdp", "wdp"];
