//! Error types for configuration layers and settings stores.
//!
//! Reads are tolerant and never surface these (they log instead); writes and
//! permission violations on read-only layers always do.

use crate::config::LayerOrigin;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by mutating or persisting configuration state.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mutating operation was attempted on a read-only layer.
    #[error("{origin} layer is read-only{}", display_path(.path))]
    NotWritable {
        origin: LayerOrigin,
        path: Option<PathBuf>,
    },

    /// Underlying filesystem failure while reading or writing.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON in a configuration file.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A store was redirected to the USER layer but the stack has none.
    #[error("no user layer available to receive redirected write")]
    NoUserLayer,

    #[error("invalid skill id: {0:?}")]
    InvalidSkillId(String),
}

impl ConfigError {
    pub fn not_writable(origin: LayerOrigin, path: Option<PathBuf>) -> Self {
        Self::NotWritable { origin, path }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the permission error raised by read-only layers.
    pub fn is_not_writable(&self) -> bool {
        matches!(self, Self::NotWritable { .. })
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

/// Result type for configuration and settings operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
