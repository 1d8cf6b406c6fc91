//! Error taxonomy for fetch-or-load.
//!
//! Every variant carries the [`BarRequest`] (instrument, granularity, range)
//! so an operator can reproduce the call from the message alone.

use barvault_core::catalog::StoreError;
use barvault_core::domain::{BarKey, Granularity, TimeRange};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRequest {
    pub instrument_id: String,
    pub granularity: Granularity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BarRequest {
    pub fn key(&self) -> BarKey {
        BarKey::new(self.instrument_id.clone(), self.granularity)
    }

    /// `None` when `end < start`.
    pub fn range(&self) -> Option<TimeRange> {
        TimeRange::new(self.start, self.end)
    }
}

impl fmt::Display for BarRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}, {}]",
            self.instrument_id,
            self.granularity,
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Remote unreachable after a connect attempt. No partial local answer is offered.
    #[error("provider unavailable for {request}: {reason}")]
    ProviderUnavailable { request: BarRequest, reason: String },

    /// Every attempt failed.
    #[error("no data found for {request} after {attempts} attempts: {last_error}")]
    FetchExhausted {
        request: BarRequest,
        attempts: u32,
        last_error: String,
    },

    #[error("local write failed for {request}: {reason}")]
    LocalWriteFailed { request: BarRequest, reason: String },

    /// Decode failure on a local read. Recovered by quarantine + remote fetch
    /// inside `fetch_or_load`; surfaced only by offline reads.
    #[error("corrupt local file {} for {request}: {reason}", path.display())]
    CorruptionDetected {
        request: BarRequest,
        path: PathBuf,
        reason: String,
    },

    /// A corrupt file could not be moved aside. Fatal.
    #[error("failed to quarantine {} for {request}: {reason}", path.display())]
    QuarantineFailed {
        request: BarRequest,
        path: PathBuf,
        reason: String,
    },

    /// Remote succeeded but returned zero bars.
    #[error("provider returned no bars for {request}")]
    EmptyResult { request: BarRequest },

    #[error("invalid range for {request}: end is before start")]
    InvalidRange { request: BarRequest },

    /// Directory-level I/O failure outside the write path (listing, rebuilding).
    #[error("local store error for {request}: {reason}")]
    Store { request: BarRequest, reason: String },

    /// A blocking store task panicked or was cancelled by the runtime.
    #[error("background task failed for {request}: {reason}")]
    Internal { request: BarRequest, reason: String },
}

impl CatalogError {
    pub fn request(&self) -> &BarRequest {
        match self {
            CatalogError::ProviderUnavailable { request, .. }
            | CatalogError::FetchExhausted { request, .. }
            | CatalogError::LocalWriteFailed { request, .. }
            | CatalogError::CorruptionDetected { request, .. }
            | CatalogError::QuarantineFailed { request, .. }
            | CatalogError::EmptyResult { request }
            | CatalogError::InvalidRange { request }
            | CatalogError::Store { request, .. }
            | CatalogError::Internal { request, .. } => request,
        }
    }
}

/// Failure to start a [`Catalog`](crate::Catalog).
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("initial index build failed: {0}")]
    Index(#[from] StoreError),
}
