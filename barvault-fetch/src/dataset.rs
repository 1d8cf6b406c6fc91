//! Hand-off to the backtest engine: bars, instrument and a dataset hash.

use barvault_core::domain::{Bar, BarKey, Granularity, Instrument, IntoUtc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CatalogError;
use crate::orchestrator::Catalog;

/// Everything a simulation needs from the catalog for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestData {
    /// Ascending, de-duplicated.
    pub bars: Vec<Bar>,
    /// `None` when the provider never supplied metadata.
    pub instrument: Option<Instrument>,
    /// BLAKE3 over the key and every bar.
    pub dataset_hash: String,
}

/// Compute a deterministic BLAKE3 hash over a bar series.
///
/// Covers the key, then each bar's timestamp (nanoseconds) and OHLCV in
/// order, so identical data always hashes identically.
pub fn dataset_hash(key: &BarKey, bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.to_string().as_bytes());
    for bar in bars {
        let ts = bar.ts.timestamp_nanos_opt().unwrap_or(i64::MAX);
        hasher.update(&ts.to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

impl Catalog {
    /// [`fetch_or_load`](Catalog::fetch_or_load) plus persisted metadata and
    /// the dataset hash.
    pub async fn load_for_backtest(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<BacktestData, CatalogError> {
        let bars = self
            .fetch_or_load(instrument_id, granularity, start, end)
            .await?;

        // Metadata is informational here; a bad sidecar must not block a run.
        let instrument = match self.instrument(instrument_id) {
            Ok(instrument) => instrument,
            Err(e) => {
                warn!(instrument_id, error = %e, "instrument metadata unreadable");
                None
            }
        };

        let key = BarKey::new(instrument_id, *granularity);
        let dataset_hash = dataset_hash(&key, &bars);
        Ok(BacktestData {
            bars,
            instrument,
            dataset_hash,
        })
    }
}
