//! Remote market-data client trait and structured error types.
//!
//! `MarketDataClient` abstracts over remote sources so the orchestrator can
//! be driven by a real endpoint or a test double. The local store sits above
//! this trait; clients know nothing about it.

use async_trait::async_trait;
use barvault_core::domain::{Bar, Granularity, Instrument};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("unsupported granularity: {0}")]
    UnsupportedGranularity(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::UnsupportedGranularity(_)
                | ProviderError::SymbolNotFound { .. }
                | ProviderError::ResponseFormatChanged(_)
        )
    }
}

/// One successful remote call: the bars plus whatever instrument metadata the
/// provider returned alongside them.
#[derive(Debug, Clone, Default)]
pub struct FetchedBars {
    pub bars: Vec<Bar>,
    pub instrument: Option<Instrument>,
}

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Establish (or probe) the connection. `Ok(false)` means the provider
    /// answered but is not usable; `Err` means it could not be reached.
    async fn connect(&self, timeout: Duration) -> Result<bool, ProviderError>;

    fn is_connected(&self) -> bool;

    /// Fetch bars in `[start, end]`. Metadata is optional.
    async fn fetch_bars(
        &self,
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: &Granularity,
    ) -> Result<FetchedBars, ProviderError>;
}
