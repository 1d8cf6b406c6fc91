//! Full index rebuild by scanning the store.
//!
//! Every rebuild starts from the directory tree, never from a previous index,
//! so the index cannot drift from what is on disk.

use super::error::StoreError;
use super::index::{AvailabilityIndex, AvailabilityRecord};
use super::schema::APPROX_ROW_BYTES;
use super::store::list_data_files;
use crate::domain::BarKey;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scans a store root and produces a fresh [`AvailabilityIndex`].
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    root: PathBuf,
}

impl IndexBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan every key directory under the root.
    ///
    /// A missing root is created and yields an empty index. Unparseable
    /// directory or file names are logged and skipped; a directory with no
    /// parseable files contributes no record.
    pub fn build(&self) -> Result<AvailabilityIndex, StoreError> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        let key_dirs = self.key_dirs()?;
        let records = key_dirs
            .par_iter()
            .map(|(key, dir)| scan_key_dir(key, dir))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let index = AvailabilityIndex::from_records(records.into_iter().flatten());
        info!(root = %self.root.display(), records = index.len(), "availability index rebuilt");
        Ok(index)
    }

    fn key_dirs(&self) -> Result<Vec<(BarKey, PathBuf)>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Hidden directories hold quarantined files
            if name.starts_with('.') {
                continue;
            }
            match BarKey::from_dir_name(name) {
                Ok(key) => dirs.push((key, path)),
                Err(e) => debug!(dir = %path.display(), error = %e, "skipping non-bar directory"),
            }
        }
        Ok(dirs)
    }
}

fn scan_key_dir(key: &BarKey, dir: &Path) -> Result<Option<AvailabilityRecord>, StoreError> {
    let files = list_data_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "key directory has no parseable bar files");
        return Ok(None);
    }

    let start_date = files.iter().map(|f| f.range.start).min();
    let end_date = files.iter().map(|f| f.range.end).max();
    let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
        return Ok(None);
    };
    let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
    let last_updated = files
        .iter()
        .filter_map(|f| f.modified)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Ok(Some(AvailabilityRecord {
        instrument_id: key.instrument_id.clone(),
        granularity: key.granularity,
        start_date,
        end_date,
        file_count: files.len(),
        approx_row_count: total_bytes / APPROX_ROW_BYTES,
        last_updated,
    }))
}
