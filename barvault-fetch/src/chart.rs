//! Chart-API market-data client.
//!
//! Fetches OHLCV bars from a Yahoo-style v8 chart endpoint. The response's
//! `meta` block supplies instrument metadata (currency, instrument type,
//! name) in the same call.
//!
//! The endpoint has no official contract and changes without notice; parse
//! failures surface as [`ProviderError::ResponseFormatChanged`].

use async_trait::async_trait;
use barvault_core::domain::{AssetClass, Bar, BarUnit, Granularity, Instrument, PriceType};
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::{FetchedBars, MarketDataClient, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const CHART_PATH: [&str; 3] = ["v8", "finance", "chart"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    instrument_type: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    price_hint: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// Map a granularity onto the endpoint's `interval` parameter.
///
/// Only trade prices are served, so anything but `LAST` is unsupported.
pub fn chart_interval(granularity: &Granularity) -> Result<&'static str, ProviderError> {
    let unsupported = || ProviderError::UnsupportedGranularity(granularity.to_string());
    if granularity.price_type != PriceType::Last {
        return Err(unsupported());
    }
    let interval = match (granularity.unit, granularity.step) {
        (BarUnit::Minute, 1) => "1m",
        (BarUnit::Minute, 2) => "2m",
        (BarUnit::Minute, 5) => "5m",
        (BarUnit::Minute, 15) => "15m",
        (BarUnit::Minute, 30) => "30m",
        (BarUnit::Minute, 60) => "60m",
        (BarUnit::Hour, 1) => "1h",
        (BarUnit::Day, 1) => "1d",
        (BarUnit::Day, 5) => "5d",
        (BarUnit::Week, 1) => "1wk",
        (BarUnit::Month, 1) => "1mo",
        (BarUnit::Month, 3) => "3mo",
        _ => return Err(unsupported()),
    };
    Ok(interval)
}

pub struct ChartApiClient {
    client: reqwest::Client,
    base_url: Url,
    connected: AtomicBool,
}

impl ChartApiClient {
    /// Client against the public endpoint.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against a mirror or test server.
    pub fn with_base_url(base_url: &str) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::Other(format!("invalid base url '{base_url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            connected: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the chart URL for a symbol, range and interval.
    ///
    /// Day-or-coarser requests are widened to whole days.
    fn chart_url(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: &Granularity,
    ) -> Result<Url, ProviderError> {
        let interval = chart_interval(granularity)?;
        let (period1, period2) = if granularity.is_daily_or_coarser() {
            let first = start.date_naive().and_hms_opt(0, 0, 0).map(|t| t.and_utc());
            let last = end.date_naive().and_hms_opt(23, 59, 59).map(|t| t.and_utc());
            (
                first.unwrap_or(start).timestamp(),
                last.unwrap_or(end).timestamp(),
            )
        } else {
            (start.timestamp(), end.timestamp())
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Other(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(CHART_PATH)
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", interval)
            .append_pair("includePrePost", "false");
        Ok(url)
    }

    fn network_error(&self, e: reqwest::Error) -> ProviderError {
        self.connected.store(false, Ordering::SeqCst);
        ProviderError::NetworkUnreachable(e.to_string())
    }
}

/// Turn a decoded chart response into bars and optional metadata.
///
/// An empty `timestamp` array (no trading in the range) yields no bars rather
/// than an error; the caller decides what an empty result means. Rows with
/// any missing price are dropped.
fn parse_response(
    instrument_id: &str,
    granularity: &Granularity,
    resp: ChartResponse,
) -> Result<FetchedBars, ProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
            symbol: instrument_id.to_string(),
        },
        Some(err) => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

    let instrument = data.meta.and_then(|meta| instrument_from_meta(instrument_id, meta));
    let timestamps = data.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return Ok(FetchedBars {
            bars: Vec::new(),
            instrument,
        });
    }

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("no quote data".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());
    let mut skipped = 0usize;
    for (i, &secs) in timestamps.iter().enumerate() {
        let ts = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
            ProviderError::ResponseFormatChanged(format!("invalid timestamp: {secs}"))
        })?;
        let price = |column: &[Option<f64>]| column.get(i).copied().flatten().unwrap_or(f64::NAN);
        let bar = Bar {
            instrument_id: instrument_id.to_string(),
            granularity: *granularity,
            ts,
            open: price(&quote.open),
            high: price(&quote.high),
            low: price(&quote.low),
            close: price(&quote.close),
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        };
        // Holidays and halted sessions come back as null rows.
        if bar.is_void() {
            skipped += 1;
            continue;
        }
        bars.push(bar);
    }
    if skipped > 0 {
        debug!(instrument_id, skipped, "dropped bars with missing prices");
    }

    Ok(FetchedBars { bars, instrument })
}

fn instrument_from_meta(instrument_id: &str, meta: ChartMeta) -> Option<Instrument> {
    let currency = meta.currency?;
    let asset_class = meta
        .instrument_type
        .as_deref()
        .map(AssetClass::from_provider_type)
        .unwrap_or(AssetClass::Other);
    let tick_size = 10f64.powi(-(meta.price_hint.unwrap_or(2) as i32));
    let instrument = Instrument::new(instrument_id, currency, asset_class, tick_size, 1.0);
    Some(match meta.long_name.or(meta.short_name) {
        Some(name) => instrument.with_description(name),
        None => instrument,
    })
}

#[async_trait]
impl MarketDataClient for ChartApiClient {
    fn name(&self) -> &str {
        "chart_api"
    }

    /// Probe the base URL. Any HTTP answer below 500 counts as reachable.
    async fn connect(&self, timeout: Duration) -> Result<bool, ProviderError> {
        let resp = self
            .client
            .get(self.base_url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;
        let up = !resp.status().is_server_error();
        self.connected.store(up, Ordering::SeqCst);
        if !up {
            warn!(status = %resp.status(), url = %self.base_url, "chart api probe failed");
        }
        Ok(up)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch_bars(
        &self,
        instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: &Granularity,
    ) -> Result<FetchedBars, ProviderError> {
        let url = self.chart_url(instrument_id, start, end, granularity)?;
        debug!(%url, "requesting chart");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::SymbolNotFound {
                symbol: instrument_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Other(format!("HTTP {status} for {instrument_id}")));
        }

        let chart: ChartResponse = resp.json().await.map_err(|e| {
            ProviderError::ResponseFormatChanged(format!(
                "failed to parse response for {instrument_id}: {e}"
            ))
        })?;
        parse_response(instrument_id, granularity, chart)
    }
}
