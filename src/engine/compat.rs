//! Lossless-join compatibility.
//!
//! Stream-copy concatenation only works when every input shares the codec,
//! the exact frame size and (within a small tolerance) the frame rate of the
//! first input.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::error::EngineError;
use super::probe::{DescriptorCache, MediaDescriptor, MetadataExtractor};
use super::process::CommandRunner;

/// Largest frame rate difference still treated as equal.
pub const FRAME_RATE_TOLERANCE: f64 = 0.1;

/// First reason a set of inputs cannot be joined. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    TooFewItems {
        count: usize,
    },
    Codec {
        position: usize,
        expected: String,
        found: String,
    },
    Resolution {
        position: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },
    FrameRate {
        position: usize,
        expected: f64,
        found: f64,
    },
}

impl Mismatch {
    /// 1-based position of the offending item, if any
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::TooFewItems { .. } => None,
            Self::Codec { position, .. }
            | Self::Resolution { position, .. }
            | Self::FrameRate { position, .. } => Some(*position),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewItems { count } => {
                write!(f, "Need at least 2 videos to join (got {})", count)
            }
            Self::Codec {
                position,
                expected,
                found,
            } => write!(
                f,
                "Codec mismatch on item {}: {} vs {}. All videos must use the same codec.",
                position, expected, found
            ),
            Self::Resolution {
                position,
                expected,
                found,
            } => write!(
                f,
                "Resolution mismatch on item {}: {}x{} vs {}x{}. All videos must have the same resolution.",
                position, expected.0, expected.1, found.0, found.1
            ),
            Self::FrameRate {
                position,
                expected,
                found,
            } => write!(
                f,
                "Frame rate mismatch on item {}: {:.2} vs {:.2} fps. All videos must have the same frame rate.",
                position, expected, found
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Compatibility {
    Compatible { summary: String },
    Incompatible { mismatch: Mismatch },
}

impl Compatibility {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible { .. })
    }

    pub fn into_result(self) -> Result<String, EngineError> {
        match self {
            Self::Compatible { summary } => Ok(summary),
            Self::Incompatible { mismatch } => Err(EngineError::IncompatibleInputs(mismatch)),
        }
    }
}

/// Compare every item against the first. Codec is checked before resolution
/// before frame rate, and the first offending item is reported. Each frame
/// rate must lie within [`FRAME_RATE_TOLERANCE`] of the first item's.
pub fn check(descriptors: &[MediaDescriptor]) -> Compatibility {
    if descriptors.len() < 2 {
        return too_few(descriptors.len());
    }

    let reference = &descriptors[0];
    for (offset, item) in descriptors[1..].iter().enumerate() {
        let position = offset + 2;

        if item.codec != reference.codec {
            return Compatibility::Incompatible {
                mismatch: Mismatch::Codec {
                    position,
                    expected: reference.codec.clone(),
                    found: item.codec.clone(),
                },
            };
        }

        if (item.width, item.height) != (reference.width, reference.height) {
            return Compatibility::Incompatible {
                mismatch: Mismatch::Resolution {
                    position,
                    expected: (reference.width, reference.height),
                    found: (item.width, item.height),
                },
            };
        }

        if (item.frame_rate - reference.frame_rate).abs() > FRAME_RATE_TOLERANCE {
            return Compatibility::Incompatible {
                mismatch: Mismatch::FrameRate {
                    position,
                    expected: reference.frame_rate,
                    found: item.frame_rate,
                },
            };
        }
    }

    Compatibility::Compatible {
        summary: format!(
            "All {} videos compatible ({}, {}, {:.2}fps)",
            descriptors.len(),
            reference.codec,
            reference.resolution(),
            reference.frame_rate
        ),
    }
}

/// Describe each path (through the cache) and check the set.
pub fn check_paths<R: CommandRunner>(
    extractor: &MetadataExtractor<R>,
    paths: &[PathBuf],
    cache: &mut DescriptorCache,
) -> Result<Compatibility, EngineError> {
    if paths.len() < 2 {
        return Ok(too_few(paths.len()));
    }
    let descriptors = paths
        .iter()
        .map(|p| cache.get_or_describe(extractor, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(check(&descriptors))
}

fn too_few(count: usize) -> Compatibility {
    Compatibility::Incompatible {
        mismatch: Mismatch::TooFewItems { count },
    }
}
