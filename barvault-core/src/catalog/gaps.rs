//! Gap detection against the availability index.
//!
//! Records only track outer bounds, so at most two gaps come back: one before
//! the record and one after it. Holes inside a record are invisible here.
//!
//! Day-or-coarser granularities compare calendar dates, matching
//! [`AvailabilityRecord::covers`](super::index::AvailabilityRecord::covers):
//! a range the index covers never reports a gap.

use super::index::AvailabilityIndex;
use crate::domain::{Granularity, TimeRange};

/// Sub-ranges of `requested` that the index does not cover.
pub fn detect_gaps(
    index: &AvailabilityIndex,
    instrument_id: &str,
    granularity: &Granularity,
    requested: &TimeRange,
) -> Vec<TimeRange> {
    let (start, end) = (requested.start, requested.end);
    let Some(record) = index.get(instrument_id, granularity) else {
        return vec![*requested];
    };

    let daily = granularity.is_daily_or_coarser();
    let starts_late = if daily {
        record.start_date.date_naive() > start.date_naive()
    } else {
        record.start_date > start
    };
    let ends_early = if daily {
        record.end_date.date_naive() < end.date_naive()
    } else {
        record.end_date < end
    };

    let mut gaps = Vec::with_capacity(2);
    if starts_late {
        gaps.push(TimeRange {
            start,
            end: record.start_date.min(end),
        });
    }
    if ends_early {
        gaps.push(TimeRange {
            start: record.end_date.max(start),
            end,
        });
    }
    gaps
}
