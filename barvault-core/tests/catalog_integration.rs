//! Store → builder → quarantine → gaps, against a real directory tree.

use barvault_core::catalog::{
    detect_gaps, BarStore, IndexBuilder, Quarantine, StoreError, QUARANTINE_DIR,
};
use barvault_core::domain::{range_file_name, Bar, BarKey, Granularity, TimeRange};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use tempfile::TempDir;

fn day(m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
}

fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange {
    TimeRange::new(start, end).unwrap()
}

fn daily_bars(id: &str, start: DateTime<Utc>, count: i64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let px = 100.0 + i as f64;
            Bar {
                instrument_id: id.to_string(),
                granularity: Granularity::daily(),
                ts: start + Duration::days(i),
                open: px,
                high: px + 1.0,
                low: px - 1.0,
                close: px + 0.5,
                volume: 1_000 + i as u64,
            }
        })
        .collect()
}

fn daily_key(id: &str) -> BarKey {
    BarKey::new(id, Granularity::daily())
}

// ── Index builder ────────────────────────────────────────────────────

#[test]
fn builder_on_missing_root_creates_it_and_is_empty() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("catalog");

    let index = IndexBuilder::new(&root).build().unwrap();

    assert!(index.is_empty());
    assert!(root.is_dir());
}

#[test]
fn builder_merges_files_into_outer_bounds() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");

    store
        .write_bars(&key, &range(day(1, 1), day(1, 10)), &daily_bars("AAPL.X", day(1, 1), 10))
        .unwrap();
    store
        .write_bars(&key, &range(day(3, 1), day(3, 5)), &daily_bars("AAPL.X", day(3, 1), 5))
        .unwrap();

    let index = IndexBuilder::new(dir.path()).build().unwrap();
    let record = index.get_key(&key).unwrap();

    assert_eq!(record.start_date, day(1, 1));
    assert_eq!(record.end_date, day(3, 5));
    assert_eq!(record.file_count, 2);
    assert!(record.approx_row_count > 0);
    // Outer bounds only: February is reported as covered.
    assert!(index.covers("AAPL.X", &Granularity::daily(), day(2, 1), day(2, 10)));
}

#[test]
fn builder_keeps_keys_apart() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let minute = Granularity::minute();

    store
        .write_bars(&daily_key("AAPL.X"), &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();
    store
        .write_bars(&daily_key("MSFT.X"), &range(day(2, 1), day(2, 5)), &daily_bars("MSFT.X", day(2, 1), 5))
        .unwrap();

    let index = IndexBuilder::new(dir.path()).build().unwrap();

    assert_eq!(index.len(), 2);
    assert!(index.get("AAPL.X", &minute).is_none());
    assert_eq!(index.get("MSFT.X", &Granularity::daily()).unwrap().start_date, day(2, 1));
}

#[test]
fn builder_skips_junk_and_quarantine() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    store
        .write_bars(&key, &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();

    fs::create_dir_all(dir.path().join("not-a-key")).unwrap();
    fs::write(store.key_dir(&key).join("notes.txt"), "hello").unwrap();
    fs::write(store.key_dir(&key).join("garbage.parquet"), "x").unwrap();
    let hidden = dir.path().join(QUARANTINE_DIR).join(key.dir_name());
    fs::create_dir_all(&hidden).unwrap();
    fs::write(hidden.join(range_file_name(&range(day(6, 1), day(6, 30)))), "x").unwrap();

    let index = IndexBuilder::new(dir.path()).build().unwrap();

    assert_eq!(index.len(), 1);
    let record = index.get_key(&key).unwrap();
    assert_eq!(record.file_count, 1);
    assert_eq!(record.end_date, day(1, 5));
}

#[test]
fn empty_key_directory_contributes_no_record() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    fs::create_dir_all(store.key_dir(&daily_key("AAPL.X"))).unwrap();

    let index = IndexBuilder::new(dir.path()).build().unwrap();

    assert!(index.is_empty());
}

// ── Store ────────────────────────────────────────────────────────────

#[test]
fn file_name_claims_request_widened_to_bars() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");

    // Asked for Jan 3..Jan 4, provider sent Jan 2..Jan 6.
    let path = store
        .write_bars(&key, &range(day(1, 3), day(1, 4)), &daily_bars("AAPL.X", day(1, 2), 5))
        .unwrap();

    let expected = range_file_name(&range(day(1, 2), day(1, 6)));
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected);
}

#[test]
fn rewriting_a_range_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    let requested = range(day(1, 1), day(1, 5));
    let bars = daily_bars("AAPL.X", day(1, 1), 5);

    let first = store.write_bars(&key, &requested, &bars).unwrap();
    let second = store.write_bars(&key, &requested, &bars).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.list_files(&key).unwrap().len(), 1);
    let leftovers: Vec<_> = fs::read_dir(store.key_dir(&key))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn empty_write_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());

    let err = store
        .write_bars(&daily_key("AAPL.X"), &range(day(1, 1), day(1, 5)), &[])
        .unwrap_err();

    assert!(matches!(err, StoreError::EmptyWrite));
}

#[test]
fn range_read_merges_files_in_order() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    store
        .write_bars(&key, &range(day(1, 6), day(1, 10)), &daily_bars("AAPL.X", day(1, 6), 5))
        .unwrap();
    store
        .write_bars(&key, &range(day(1, 1), day(1, 7)), &daily_bars("AAPL.X", day(1, 1), 7))
        .unwrap();

    let read = store.read_range(&key, &range(day(1, 3), day(1, 8))).unwrap();

    assert!(read.is_clean());
    assert_eq!(read.files_read.len(), 2);
    assert!(read.spans(&Granularity::daily(), &range(day(1, 3), day(1, 8))));
    let days: Vec<_> = read.bars.iter().map(|b| b.ts).collect();
    assert_eq!(days, (3..=8).map(|d| day(1, d)).collect::<Vec<_>>());
}

#[test]
fn range_read_spans_only_without_holes() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    let daily = Granularity::daily();
    store
        .write_bars(&key, &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();
    store
        .write_bars(&key, &range(day(1, 22), day(1, 31)), &daily_bars("AAPL.X", day(1, 22), 10))
        .unwrap();

    let straddle = range(day(1, 4), day(1, 23));
    let read = store.read_range(&key, &straddle).unwrap();
    assert!(read.is_clean());
    assert_eq!(read.files_read.len(), 2);
    assert_eq!(read.bars.len(), 4);
    assert!(!read.spans(&daily, &straddle));

    // Jan 6 starts the day after Jan 5 ends: adjacent, not a hole.
    store
        .write_bars(&key, &range(day(1, 6), day(1, 21)), &daily_bars("AAPL.X", day(1, 6), 16))
        .unwrap();
    let read = store.read_range(&key, &straddle).unwrap();
    assert!(read.spans(&daily, &straddle));
    assert_eq!(read.bars.len(), 20);
}

#[test]
fn daily_read_ignores_time_of_day_in_bounds() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    store
        .write_bars(&key, &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();

    let late_start = day(1, 2) + Duration::hours(16);
    let read = store.read_range(&key, &range(late_start, day(1, 4))).unwrap();

    assert_eq!(read.bars.len(), 3);
    assert_eq!(read.bars[0].ts, day(1, 2));
}

// ── Quarantine ───────────────────────────────────────────────────────

#[test]
fn corrupt_file_is_reported_then_quarantined_out_of_the_index() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let quarantine = Quarantine::new(dir.path());
    let key = daily_key("AAPL.X");

    store
        .write_bars(&key, &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();
    let bad = store
        .key_dir(&key)
        .join(range_file_name(&range(day(2, 1), day(2, 5))));
    fs::write(&bad, b"PAR1 definitely not parquet").unwrap();

    let read = store.read_range(&key, &range(day(1, 1), day(2, 5))).unwrap();
    assert!(!read.is_clean());
    assert_eq!(read.corrupt.len(), 1);
    assert_eq!(read.corrupt[0].path, bad);
    assert_eq!(read.bars.len(), 5);

    let moved = quarantine.quarantine(&bad, &read.corrupt[0].reason).unwrap();
    assert!(!bad.exists());
    assert!(moved.quarantine_path.starts_with(quarantine.root()));
    assert!(moved.quarantine_path.ends_with(
        std::path::Path::new(&key.dir_name()).join(bad.file_name().unwrap())
    ));

    let listed = quarantine.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].original_path, bad);

    let index = IndexBuilder::new(dir.path()).build().unwrap();
    assert_eq!(index.get_key(&key).unwrap().end_date, day(1, 5));
}

#[test]
fn quarantine_keeps_earlier_evidence() {
    let dir = TempDir::new().unwrap();
    let quarantine = Quarantine::new(dir.path());
    let key_dir = dir.path().join(daily_key("AAPL.X").dir_name());
    fs::create_dir_all(&key_dir).unwrap();
    let path = key_dir.join(range_file_name(&range(day(1, 1), day(1, 5))));

    fs::write(&path, "first").unwrap();
    let first = quarantine.quarantine(&path, "bad magic").unwrap();
    fs::write(&path, "second").unwrap();
    let second = quarantine.quarantine(&path, "bad magic again").unwrap();

    assert_ne!(first.quarantine_path, second.quarantine_path);
    assert_eq!(fs::read_to_string(&first.quarantine_path).unwrap(), "first");
    assert_eq!(fs::read_to_string(&second.quarantine_path).unwrap(), "second");
    assert_eq!(quarantine.list().unwrap().len(), 2);
}

#[test]
fn quarantine_outside_store_root_fails() {
    let store_dir = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let stray = elsewhere.path().join("stray.parquet");
    fs::write(&stray, "x").unwrap();

    let err = Quarantine::new(store_dir.path())
        .quarantine(&stray, "bad")
        .unwrap_err();

    assert!(matches!(err, StoreError::Quarantine { .. }));
    assert!(stray.exists());
}

#[test]
fn vanished_file_is_reported_missing() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    let path = store
        .write_bars(&key, &range(day(1, 1), day(1, 5)), &daily_bars("AAPL.X", day(1, 1), 5))
        .unwrap();

    let index = IndexBuilder::new(dir.path()).build().unwrap();
    fs::remove_file(&path).unwrap();

    assert!(index.covers("AAPL.X", &Granularity::daily(), day(1, 2), day(1, 3)));
    let read = store.read_range(&key, &range(day(1, 2), day(1, 3))).unwrap();
    assert!(read.files_read.is_empty());
    assert!(read.bars.is_empty());
}

// ── Gaps ─────────────────────────────────────────────────────────────

#[test]
fn gaps_follow_the_rebuilt_index() {
    let dir = TempDir::new().unwrap();
    let store = BarStore::new(dir.path());
    let key = daily_key("AAPL.X");
    let daily = Granularity::daily();
    let wanted = range(day(1, 1), day(1, 31));

    let index = IndexBuilder::new(dir.path()).build().unwrap();
    assert_eq!(detect_gaps(&index, "AAPL.X", &daily, &wanted), vec![wanted]);

    store
        .write_bars(&key, &range(day(1, 10), day(1, 20)), &daily_bars("AAPL.X", day(1, 10), 11))
        .unwrap();
    let index = IndexBuilder::new(dir.path()).build().unwrap();
    assert_eq!(
        detect_gaps(&index, "AAPL.X", &daily, &wanted),
        vec![range(day(1, 1), day(1, 10)), range(day(1, 20), day(1, 31))]
    );

    store
        .write_bars(&key, &range(day(1, 1), day(1, 31)), &daily_bars("AAPL.X", day(1, 1), 31))
        .unwrap();
    let index = IndexBuilder::new(dir.path()).build().unwrap();
    assert!(detect_gaps(&index, "AAPL.X", &daily, &wanted).is_empty());
}
