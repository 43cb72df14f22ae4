use std::path::PathBuf;

use thiserror::Error;

/// Discriminated error kinds for the engine and the embedded cache store.
///
/// Per-entry errors encountered while walking the filesystem or fingerprinting
/// a single file are logged and turned into a skip by the caller; they do not
/// have to be propagated as `EngineError`. Variants here are the ones that can
/// legitimately abort a run or a cache transaction.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error in {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("cache file is corrupt: {0}")]
    CacheCorrupt(String),

    #[error("cache writer lock busy")]
    CacheBusy,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }
}
