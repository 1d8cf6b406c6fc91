//! barvault core: bar domain types and the local Parquet catalog.
//!
//! This crate holds the synchronous half of the bar catalog:
//! - Domain types (bars, granularities, instruments, UTC time ranges)
//! - Parquet store with range-named files and atomic writes
//! - Availability index and the full-rescan index builder
//! - Quarantine for files that fail to decode
//! - Gap detection against the index

pub mod catalog;
pub mod domain;
