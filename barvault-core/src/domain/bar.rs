//! One OHLCV observation for an instrument at a point in time.

use super::granularity::{BarKey, Granularity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar tagged with its instrument and granularity.
///
/// Opaque payload as far as the catalog is concerned: it is stored, clipped
/// to ranges and ordered by `ts`, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: String,
    pub granularity: Granularity,
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn key(&self) -> BarKey {
        BarKey::new(self.instrument_id.clone(), self.granularity)
    }

    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }
}

/// Sort ascending by timestamp and drop repeated timestamps, keeping the first.
///
/// Overlapping files and overlapping provider pages both produce duplicates.
pub fn sort_and_dedup(bars: &mut Vec<Bar>) {
    bars.sort_by_key(|b| b.ts);
    bars.dedup_by_key(|b| b.ts);
}
