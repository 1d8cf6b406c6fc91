//! barvault fetch: fetch-or-load orchestration over the local bar catalog.
//!
//! This crate builds on `barvault-core` to provide:
//! - The `Catalog` orchestrator: serve from the local store or fetch remotely
//! - A remote market-data client trait and a chart-API implementation
//! - Bounded retry with exponential backoff and an injectable sleeper
//! - Write-back, full index rebuild and corrupt-file quarantine on read
//! - Configuration, tracing setup and the backtest data hand-off

pub mod chart;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod retry;

pub use chart::{chart_interval, ChartApiClient, DEFAULT_BASE_URL};
pub use config::{CatalogConfig, ConfigError, MAX_RETRIES_LIMIT};
pub use dataset::{dataset_hash, BacktestData};
pub use error::{BarRequest, CatalogError, OpenError};
pub use logging::init_tracing;
pub use orchestrator::Catalog;
pub use provider::{FetchedBars, MarketDataClient, ProviderError};
pub use retry::{fetch_with_retry, FetchAttempt, FetchStatus, RetryPolicy, Sleeper, TokioSleeper};
