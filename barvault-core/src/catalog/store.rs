//! Parquet bar store.
//!
//! Layout:
//! ```text
//! {root}/{instrument_id}-{granularity}-EXTERNAL/{start}_{end}.parquet
//! {root}/instruments/{instrument_id}.json
//! {root}/.corrupt/...                                  (quarantine)
//! ```
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - File names embed the range they cover, so rewriting a range is idempotent
//! - Integrity validation on load (schema, types, row count > 0)
//! - Per-file decode failures are reported, not swallowed, so the caller can
//!   quarantine exactly the offending files

use super::error::StoreError;
use super::schema::{
    BarSchema, CLOSE_COLUMN, HIGH_COLUMN, LOW_COLUMN, OPEN_COLUMN, TS_COLUMN, VOLUME_COLUMN,
};
use crate::domain::{
    parse_range_file_name, range_file_name, sort_and_dedup, Bar, BarKey, Granularity, Instrument,
    TimeRange,
};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub const INSTRUMENTS_DIR: &str = "instruments";
const TMP_SUFFIX: &str = "tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A data file found on disk, with the range its name claims.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub range: TimeRange,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// A file that failed to decode during a range read.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of reading a range from the store.
///
/// `bars` is only trustworthy when both `corrupt` and `missing` are empty.
/// `files_read` holds the encoded ranges of the files that overlapped the
/// range and decoded.
#[derive(Debug, Default)]
pub struct RangeRead {
    pub bars: Vec<Bar>,
    pub files_read: Vec<TimeRange>,
    pub corrupt: Vec<CorruptFile>,
    pub missing: Vec<PathBuf>,
}

impl RangeRead {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.missing.is_empty()
    }

    /// Whether the files read chain from `range.start` to `range.end` with no
    /// hole between them.
    ///
    /// Day-or-coarser granularities compare calendar dates, and a file starting
    /// the day after the previous one ends counts as adjacent.
    pub fn spans(&self, granularity: &Granularity, range: &TimeRange) -> bool {
        let daily = granularity.is_daily_or_coarser();
        let mut files = self.files_read.clone();
        files.sort_by_key(|r| r.start);

        let mut reached: Option<DateTime<Utc>> = None;
        for file in &files {
            let joins = match reached {
                None if daily => file.start.date_naive() <= range.start.date_naive(),
                None => file.start <= range.start,
                Some(end) if daily => (file.start.date_naive() - end.date_naive()).num_days() <= 1,
                Some(end) => file.start <= end,
            };
            if !joins {
                break;
            }
            reached = Some(reached.map_or(file.end, |end| end.max(file.end)));
        }

        reached.is_some_and(|end| {
            if daily {
                end.date_naive() >= range.end.date_naive()
            } else {
                end >= range.end
            }
        })
    }
}

/// The on-disk columnar store.
#[derive(Debug, Clone)]
pub struct BarStore {
    root: PathBuf,
}

impl BarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a key: `{root}/{instrument_id}-{granularity}-EXTERNAL/`
    pub fn key_dir(&self, key: &BarKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    /// Path to the metadata file for an instrument.
    pub fn instrument_path(&self, instrument_id: &str) -> PathBuf {
        let file_name: String = instrument_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root
            .join(INSTRUMENTS_DIR)
            .join(format!("{file_name}.json"))
    }

    /// Write bars for a key as a single file.
    ///
    /// The file name claims `requested` widened to the span of the bars, so the
    /// file always covers at least the range that was asked for. Returns the
    /// final path.
    pub fn write_bars(
        &self,
        key: &BarKey,
        requested: &TimeRange,
        bars: &[Bar],
    ) -> Result<PathBuf, StoreError> {
        if bars.is_empty() {
            return Err(StoreError::EmptyWrite);
        }

        let mut bars = bars.to_vec();
        sort_and_dedup(&mut bars);
        let span = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => TimeRange {
                start: first.ts,
                end: last.ts,
            },
            _ => return Err(StoreError::EmptyWrite),
        };
        let file_range = requested.union(&span);

        let dir = self.key_dir(key);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = dir.join(range_file_name(&file_range));
        let tmp_path = tmp_path_for(&path);

        let mut df = bars_to_dataframe(&bars).map_err(|e| StoreError::write(&path, e))?;
        write_parquet(&mut df, &tmp_path)?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::write(&path, format!("atomic rename failed: {e}"))
        })?;

        debug!(path = %path.display(), rows = bars.len(), "wrote bar file");
        Ok(path)
    }

    /// List the data files of a key, sorted by range start.
    ///
    /// A missing directory is an empty list. Names that don't parse are skipped.
    pub fn list_files(&self, key: &BarKey) -> Result<Vec<StoredFile>, StoreError> {
        list_data_files(&self.key_dir(key))
    }

    /// Decode one data file into bars tagged with `key`.
    pub fn read_file(&self, key: &BarKey, path: &Path) -> Result<Vec<Bar>, StoreError> {
        let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| StoreError::corrupt(path, format!("read: {e}")))?;
        BarSchema::validate(&df).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
        dataframe_to_bars(key, &df).map_err(|reason| StoreError::corrupt(path, reason))
    }

    /// Read every stored bar of `key` inside `range`, ascending and de-duplicated.
    ///
    /// Files that fail to decode or have disappeared are reported in the result
    /// rather than failing the whole read; other I/O errors are returned.
    pub fn read_range(&self, key: &BarKey, range: &TimeRange) -> Result<RangeRead, StoreError> {
        let granularity = key.granularity;
        let mut out = RangeRead::default();

        for file in self.list_files(key)? {
            if !file.range.overlaps_for(&granularity, range.start, range.end) {
                continue;
            }
            match self.read_file(key, &file.path) {
                Ok(bars) => {
                    out.files_read.push(file.range);
                    out.bars.extend(
                        bars.into_iter()
                            .filter(|b| range.contains_for(&granularity, b.ts)),
                    );
                }
                Err(StoreError::Corrupt { path, reason }) => {
                    warn!(path = %path.display(), %reason, "bar file failed to decode");
                    out.corrupt.push(CorruptFile { path, reason });
                }
                Err(StoreError::NotFound { path }) => out.missing.push(path),
                Err(e) => return Err(e),
            }
        }

        sort_and_dedup(&mut out.bars);
        Ok(out)
    }

    pub fn has_instrument(&self, instrument_id: &str) -> bool {
        self.instrument_path(instrument_id).is_file()
    }

    /// Persist instrument metadata (atomic).
    pub fn write_instrument(&self, instrument: &Instrument) -> Result<PathBuf, StoreError> {
        let path = self.instrument_path(&instrument.instrument_id);
        let json = serde_json::to_string_pretty(instrument)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Load instrument metadata; `None` if never persisted.
    pub fn read_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError> {
        let path = self.instrument_path(instrument_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::corrupt(&path, e.to_string()))
    }
}

/// List `<start>_<end>.parquet` files in `dir`, sorted by range start.
pub(crate) fn list_data_files(dir: &Path) -> Result<Vec<StoredFile>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();

        // Skip non-parquet files (.tmp, sidecars, etc)
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let range = match parse_range_file_name(name) {
            Ok(range) => range,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable bar file name");
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        files.push(StoredFile {
            range,
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            path,
        });
    }

    files.sort_by(|a, b| a.range.start.cmp(&b.range.start).then(a.path.cmp(&b.path)));
    Ok(files)
}

/// Unique sibling temp path, so concurrent writers of the same range never
/// share a temp file. The `.tmp` extension keeps it out of listings.
fn tmp_path_for(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}-{n}.{TMP_SUFFIX}", std::process::id()));
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, bytes).map_err(|e| StoreError::write(path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::write(path, format!("atomic rename failed: {e}"))
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame, String> {
    let ts = bars
        .iter()
        .map(|b| {
            b.ts.timestamp_nanos_opt()
                .ok_or_else(|| format!("timestamp out of range: {}", b.ts))
        })
        .collect::<Result<Vec<i64>, String>>()?;
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new(TS_COLUMN.into(), ts),
        Column::new(OPEN_COLUMN.into(), opens),
        Column::new(HIGH_COLUMN.into(), highs),
        Column::new(LOW_COLUMN.into(), lows),
        Column::new(CLOSE_COLUMN.into(), closes),
        Column::new(VOLUME_COLUMN.into(), volumes),
    ])
    .map_err(|e| format!("dataframe creation: {e}"))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(|e| StoreError::write(path, e))?;
    ParquetWriter::new(file).finish(df).map_err(|e| {
        let _ = fs::remove_file(path);
        StoreError::write(path, e)
    })?;
    Ok(())
}

fn dataframe_to_bars(key: &BarKey, df: &DataFrame) -> Result<Vec<Bar>, String> {
    let column = |name: &str| df.column(name).map_err(|e| format!("column read: {e}"));
    let f64_column = |name: &str| -> Result<Float64Chunked, String> {
        column(name)?
            .f64()
            .cloned()
            .map_err(|e| format!("{name} column type: {e}"))
    };

    let ts_ca = column(TS_COLUMN)?
        .i64()
        .cloned()
        .map_err(|e| format!("{TS_COLUMN} column type: {e}"))?;
    let open_ca = f64_column(OPEN_COLUMN)?;
    let high_ca = f64_column(HIGH_COLUMN)?;
    let low_ca = f64_column(LOW_COLUMN)?;
    let close_ca = f64_column(CLOSE_COLUMN)?;
    let vol_ca = column(VOLUME_COLUMN)?
        .u64()
        .cloned()
        .map_err(|e| format!("{VOLUME_COLUMN} column type: {e}"))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let nanos = ts_ca
            .get(i)
            .ok_or_else(|| format!("null {TS_COLUMN} at row {i}"))?;
        bars.push(Bar {
            instrument_id: key.instrument_id.clone(),
            granularity: key.granularity,
            ts: DateTime::from_timestamp_nanos(nanos),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }

    Ok(bars)
}
