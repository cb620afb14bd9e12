use std::path::PathBuf;

use thiserror::Error;

/// Central error type for the stem-refinery-core crate.
#[derive(Debug, Error)]
pub enum RefineryError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("Slice start sample {start} is beyond the end of the buffer ({total} samples)")]
    Range { start: usize, total: usize },

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Missing required session input: {0}")]
    MissingSessionInput(&'static str),

    #[error("Export session is {state}, cannot {action}")]
    SessionState {
        state: &'static str,
        action: &'static str,
    },

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scan root is not a directory: {}", .0.display())]
    ScanRoot(PathBuf),
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for RefineryError {
    fn from(e: std::io::Error) -> Self {
        RefineryError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for RefineryError {
    fn from(e: serde_json::Error) -> Self {
        RefineryError::Anyhow(e.into())
    }
}

impl From<hound::Error> for RefineryError {
    fn from(e: hound::Error) -> Self {
        RefineryError::Anyhow(e.into())
    }
}

impl From<midly::Error> for RefineryError {
    fn from(e: midly::Error) -> Self {
        RefineryError::Midi(e.to_string())
    }
}

impl From<toml::de::Error> for RefineryError {
    fn from(e: toml::de::Error) -> Self {
        RefineryError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RefineryError>;
