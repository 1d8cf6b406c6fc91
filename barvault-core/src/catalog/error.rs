//! Structured error types for the local store.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    /// The file vanished between listing and reading (e.g. quarantined by a concurrent reader).
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    /// The file exists but cannot be decoded as a bar file. Recovered by quarantine.
    #[error("corrupt bar file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A corrupt file could not be moved aside. Fatal: it would otherwise be
    /// rescanned and fail again on every read.
    #[error("failed to quarantine {path}: {reason}")]
    Quarantine { path: PathBuf, reason: String },

    #[error("parquet write error at {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("no bars to write")]
    EmptyWrite,

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl std::fmt::Display) -> Self {
        StoreError::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
