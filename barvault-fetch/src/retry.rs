//! Bounded retry with exponential backoff for remote fetches.
//!
//! A request gets `max_retries + 1` attempts. After failed attempt `n`
//! (counted from 1) the loop sleeps `base_delay * 2^n` unless that was the
//! last attempt, so the defaults sleep 2 s, 4 s and 8 s before giving up.
//!
//! Sleeping goes through [`Sleeper`] so tests can record the schedule
//! instead of waiting on it. Dropping the returned future cancels any
//! remaining attempts; nothing here touches the local store.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BarRequest, CatalogError};
use crate::provider::{FetchedBars, MarketDataClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every sleep taken when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|n| self.delay_after(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// The sleep primitive used between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchStatus::Pending => "pending",
            FetchStatus::InProgress => "in_progress",
            FetchStatus::Succeeded => "succeeded",
            FetchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of one remote fetch. Lives for the duration of the retry loop only.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub request: BarRequest,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub status: FetchStatus,
}

impl FetchAttempt {
    pub fn new(request: BarRequest, max_retries: u32) -> Self {
        Self {
            request,
            retry_count: 0,
            max_retries,
            last_error: None,
            status: FetchStatus::Pending,
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        match self.status {
            FetchStatus::Pending => 0,
            _ => self.retry_count + 1,
        }
    }

    fn begin(&mut self) {
        self.status = FetchStatus::InProgress;
        debug!(
            request = %self.request,
            attempt = self.attempts(),
            status = %self.status,
            "fetch attempt started"
        );
    }

    fn succeed(&mut self) {
        self.status = FetchStatus::Succeeded;
    }

    /// Record a failure. Returns `true` when another attempt is allowed.
    fn fail(&mut self, error: String, retryable: bool) -> bool {
        self.last_error = Some(error);
        if retryable && self.retry_count < self.max_retries {
            self.retry_count += 1;
            true
        } else {
            self.status = FetchStatus::Failed;
            false
        }
    }

    fn into_exhausted(self) -> CatalogError {
        let attempts = self.attempts();
        CatalogError::FetchExhausted {
            request: self.request,
            attempts,
            last_error: self.last_error.unwrap_or_else(|| "unknown error".into()),
        }
    }
}

/// Fetch `request` from `client`, retrying per `policy`.
///
/// A granularity the provider cannot serve fails on the first attempt:
/// retrying cannot change the answer.
pub async fn fetch_with_retry(
    client: &dyn MarketDataClient,
    request: &BarRequest,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<FetchedBars, CatalogError> {
    let mut attempt = FetchAttempt::new(request.clone(), policy.max_retries);

    loop {
        attempt.begin();
        let result = client
            .fetch_bars(
                &request.instrument_id,
                request.start,
                request.end,
                &request.granularity,
            )
            .await;

        match result {
            Ok(fetched) => {
                attempt.succeed();
                info!(
                    request = %request,
                    provider = client.name(),
                    attempts = attempt.attempts(),
                    bars = fetched.bars.len(),
                    "remote fetch succeeded"
                );
                return Ok(fetched);
            }
            Err(e) => {
                let failed_attempt = attempt.attempts();
                if !attempt.fail(e.to_string(), e.is_retryable()) {
                    warn!(
                        request = %request,
                        provider = client.name(),
                        attempts = failed_attempt,
                        error = %e,
                        "remote fetch exhausted"
                    );
                    return Err(attempt.into_exhausted());
                }
                let delay = policy.delay_after(failed_attempt);
                warn!(
                    request = %request,
                    provider = client.name(),
                    attempt = failed_attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "remote fetch failed, backing off"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
