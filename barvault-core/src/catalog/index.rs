//! In-memory availability index: what the local store holds per (instrument, granularity).
//!
//! The index is immutable once built. Writers build a fresh one and swap it in;
//! they never patch records in place.

use crate::domain::{BarKey, Granularity, IntoUtc, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What is known to be present locally for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub instrument_id: String,
    pub granularity: Granularity,
    /// Inclusive lower bound of stored data (UTC).
    pub start_date: DateTime<Utc>,
    /// Inclusive upper bound of stored data (UTC). Always `>= start_date`.
    pub end_date: DateTime<Utc>,
    pub file_count: usize,
    /// Coarse estimate from file sizes; informational only.
    pub approx_row_count: u64,
    /// Newest modification time among the key's files.
    pub last_updated: DateTime<Utc>,
}

impl AvailabilityRecord {
    pub fn key(&self) -> BarKey {
        BarKey::new(self.instrument_id.clone(), self.granularity)
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Whether `[start, end]` is locally satisfiable.
    ///
    /// Day-or-coarser granularities compare calendar dates only, so an
    /// end-of-day bound never misses a start-of-day record. Finer granularities
    /// compare full timestamps.
    pub fn covers(&self, start: impl IntoUtc, end: impl IntoUtc) -> bool {
        self.range()
            .covers_for(&self.granularity, start.into_utc(), end.into_utc())
    }

    /// `NOT (record.end < start OR record.start > end)`
    pub fn overlaps(&self, start: impl IntoUtc, end: impl IntoUtc) -> bool {
        self.range().overlaps(start.into_utc(), end.into_utc())
    }
}

/// Map from key to availability record. Absence is a normal state, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityIndex {
    records: HashMap<BarKey, AvailabilityRecord>,
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = AvailabilityRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }

    pub fn get(&self, instrument_id: &str, granularity: &Granularity) -> Option<&AvailabilityRecord> {
        self.get_key(&BarKey::new(instrument_id, *granularity))
    }

    pub fn get_key(&self, key: &BarKey) -> Option<&AvailabilityRecord> {
        self.records.get(key)
    }

    /// `get` + `covers` in one step; false when there is no record.
    pub fn covers(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> bool {
        self.get(instrument_id, granularity)
            .is_some_and(|r| r.covers(start, end))
    }

    /// A copy of this index without `key`.
    pub fn without(&self, key: &BarKey) -> Self {
        let mut records = self.records.clone();
        records.remove(key);
        Self { records }
    }

    /// All records sorted by key, for display.
    pub fn records(&self) -> Vec<&AvailabilityRecord> {
        let mut out: Vec<_> = self.records.values().collect();
        out.sort_by(|a, b| {
            a.instrument_id
                .cmp(&b.instrument_id)
                .then(a.granularity.cmp(&b.granularity))
        });
        out
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
