//! Error taxonomy shared across the scanning pipeline.
//!
//! Most of the crate uses `anyhow` at I/O and orchestration boundaries, the
//! same way the rest of this codebase always has. `ScanError` exists only
//! for the handful of call sites where a caller needs to match on *kind*
//! (configuration-missing vs. parse vs. I/O vs. external-tool vs.
//! cancellation) per the taxonomy in the design notes.

use std::path::PathBuf;

use thiserror::Error;

/// Error kinds a single log or file can fail with. None of these abort a
/// batch: the Batch Scheduler records them against `ScanStatistics` and
/// continues with the next item.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration key missing or wrong type: {key}")]
    ConfigMissing { key: String },

    #[error("failed to parse {what} in {path}: {reason}")]
    Parse {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external tool failed: {tool}: {reason}")]
    ExternalTool { tool: &'static str, reason: String },

    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
