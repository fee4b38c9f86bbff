//! Engine error taxonomy.
//!
//! Every fallible engine operation returns [`EngineError`]. The batch pipeline
//! records per-item failures by [`ErrorKind`] and only lets the fatal kinds
//! abort a whole batch.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::compat::Mismatch;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} is not available: {reason}")]
    DependencyUnavailable { tool: String, reason: String },

    #[error("unsupported request: {0}")]
    UnsupportedIntent(String),

    #[error("could not read metadata from {}: {reason}", .path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("inputs cannot be joined losslessly: {0}")]
    IncompatibleInputs(Mismatch),

    #[error("{program} failed ({}): {stderr_tail}", exit_label(.exit_code))]
    ProcessFailure {
        program: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{program} timed out after {}s{}", .elapsed.as_secs(), tail_suffix(.stderr_tail))]
    Timeout {
        program: String,
        elapsed: Duration,
        stderr_tail: String,
    },

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Serializable tag for an [`EngineError`], used in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DependencyUnavailable,
    UnsupportedIntent,
    Metadata,
    IncompatibleInputs,
    ProcessFailure,
    Timeout,
    Filesystem,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::UnsupportedIntent(_) => ErrorKind::UnsupportedIntent,
            Self::Metadata { .. } => ErrorKind::Metadata,
            Self::IncompatibleInputs(_) => ErrorKind::IncompatibleInputs,
            Self::ProcessFailure { .. } => ErrorKind::ProcessFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    /// Errors that stop a batch instead of being recorded against one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DependencyUnavailable { .. } | Self::UnsupportedIntent(_)
        )
    }

    pub fn dependency(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn filesystem(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }
}

fn tail_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail)
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
