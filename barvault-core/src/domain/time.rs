//! UTC normalization, inclusive time ranges and filename-safe timestamp stamps.

use super::granularity::{Granularity, ParseError};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that can be pinned to a UTC instant.
///
/// Naive timestamps carry no zone and are treated as UTC; a bare date is
/// midnight UTC.
pub trait IntoUtc {
    fn into_utc(self) -> DateTime<Utc>;
}

impl IntoUtc for DateTime<Utc> {
    fn into_utc(self) -> DateTime<Utc> {
        self
    }
}

impl IntoUtc for DateTime<FixedOffset> {
    fn into_utc(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoUtc for NaiveDateTime {
    fn into_utc(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self)
    }
}

impl IntoUtc for NaiveDate {
    fn into_utc(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.and_time(chrono::NaiveTime::MIN))
    }
}

/// Inclusive UTC time range. `end >= start` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Returns `None` when `end < start`.
    pub fn new(start: impl IntoUtc, end: impl IntoUtc) -> Option<Self> {
        let (start, end) = (start.into_utc(), end.into_utc());
        (end >= start).then_some(Self { start, end })
    }

    /// True if this range fully contains `[start, end]` at full timestamp precision.
    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && self.end >= end
    }

    /// True if this range fully contains `[start, end]` comparing calendar dates only.
    pub fn covers_dates(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.date_naive() <= start.date_naive() && self.end.date_naive() >= end.date_naive()
    }

    /// Dispatch on granularity: date comparison for day-or-coarser bars.
    pub fn covers_for(
        &self,
        granularity: &Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        if granularity.is_daily_or_coarser() {
            self.covers_dates(start, end)
        } else {
            self.covers(start, end)
        }
    }

    /// `NOT (self.end < start OR self.start > end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(self.end < start || self.start > end)
    }

    /// Overlap test used when selecting files; date-level for day-or-coarser bars.
    pub fn overlaps_for(
        &self,
        granularity: &Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        if granularity.is_daily_or_coarser() {
            !(self.end.date_naive() < start.date_naive()
                || self.start.date_naive() > end.date_naive())
        } else {
            self.overlaps(start, end)
        }
    }

    /// Whether a single bar timestamp belongs to this range.
    pub fn contains_for(&self, granularity: &Granularity, ts: DateTime<Utc>) -> bool {
        if granularity.is_daily_or_coarser() {
            let d = ts.date_naive();
            self.start.date_naive() <= d && d <= self.end.date_naive()
        } else {
            self.start <= ts && ts <= self.end
        }
    }

    /// Smallest range containing both.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Encode a timestamp as a sortable, filename-safe stamp:
/// `YYYY-MM-DDTHH-MM-SS-nnnnnnnnnZ`.
pub fn encode_stamp(ts: DateTime<Utc>) -> String {
    format!("{}-{:09}Z", ts.format(STAMP_FORMAT), ts.nanosecond() % 1_000_000_000)
}

/// Inverse of [`encode_stamp`].
pub fn decode_stamp(s: &str) -> Result<DateTime<Utc>, ParseError> {
    let err = || ParseError::Stamp(s.to_string());
    let body = s.strip_suffix('Z').ok_or_else(err)?;
    let (secs, nanos) = body.rsplit_once('-').ok_or_else(err)?;
    if nanos.len() != 9 {
        return Err(err());
    }
    let nanos: u32 = nanos.parse().map_err(|_| err())?;
    let naive = NaiveDateTime::parse_from_str(secs, STAMP_FORMAT)
        .map_err(|_| err())?
        .with_nanosecond(nanos)
        .ok_or_else(err)?;
    Ok(naive.into_utc())
}

/// Data file name for a range: `<start>_<end>.parquet`.
pub fn range_file_name(range: &TimeRange) -> String {
    format!(
        "{}_{}.parquet",
        encode_stamp(range.start),
        encode_stamp(range.end)
    )
}

/// Inverse of [`range_file_name`].
pub fn parse_range_file_name(name: &str) -> Result<TimeRange, ParseError> {
    let err = || ParseError::FileName(name.to_string());
    let stem = name.strip_suffix(".parquet").ok_or_else(err)?;
    let (start, end) = stem.split_once('_').ok_or_else(err)?;
    let start = decode_stamp(start).map_err(|_| err())?;
    let end = decode_stamp(end).map_err(|_| err())?;
    TimeRange::new(start, end).ok_or_else(err)
}
