//! Fetch-or-load orchestration.
//!
//! [`Catalog::fetch_or_load`] is the single entry point: serve a range from the
//! local store when the availability index covers it, otherwise fetch it from
//! the remote provider (with retry), write it back, rebuild the index and
//! return it.
//!
//! Ordering within one call: store writes happen before the index rebuild,
//! which happens before bars are returned. The index is swapped wholesale, so
//! concurrent readers see either the old or the new snapshot.
//!
//! There is no per-key de-duplication: two concurrent calls for the same
//! uncovered range both go remote and both write. The second write replaces
//! the first file under the same range-derived name.

use barvault_core::catalog::{
    detect_gaps, AvailabilityIndex, AvailabilityRecord, BarStore, IndexBuilder, Quarantine,
    QuarantinedFile, StoreError,
};
use barvault_core::domain::{
    sort_and_dedup, Bar, BarKey, Granularity, Instrument, IntoUtc, TimeRange,
};
use std::sync::{Arc, RwLock};
use tokio::task;
use tracing::{debug, info, instrument, warn};

use crate::config::CatalogConfig;
use crate::error::{BarRequest, CatalogError, OpenError};
use crate::provider::{FetchedBars, MarketDataClient};
use crate::retry::{fetch_with_retry, RetryPolicy, Sleeper, TokioSleeper};

/// Outcome of trying the local store for a request.
enum LocalRead {
    /// The index does not cover the range.
    NotCovered,
    Hit(Vec<Bar>),
    /// A file listed for the key has gone; the record was dropped.
    Stale,
    /// Corrupt files were moved aside and the record dropped.
    Quarantined(Vec<QuarantinedFile>),
}

/// Bar catalog backed by a local Parquet store and a remote provider.
pub struct Catalog {
    config: CatalogConfig,
    store: Arc<BarStore>,
    quarantine: Arc<Quarantine>,
    builder: Arc<IndexBuilder>,
    index: RwLock<Arc<AvailabilityIndex>>,
    client: Arc<dyn MarketDataClient>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
}

impl Catalog {
    /// Validate `config` and build the initial index.
    ///
    /// Scans the store synchronously; call it before serving requests.
    pub fn open(
        config: CatalogConfig,
        client: Arc<dyn MarketDataClient>,
    ) -> Result<Self, OpenError> {
        config.validate()?;
        let root = config.store_root.clone();
        let builder = IndexBuilder::new(&root);
        let index = builder.build()?;
        info!(
            root = %root.display(),
            provider = client.name(),
            records = index.len(),
            "catalog opened"
        );

        Ok(Self {
            retry: config.retry_policy(),
            store: Arc::new(BarStore::new(&root)),
            quarantine: Arc::new(Quarantine::new(&root)),
            builder: Arc::new(builder),
            index: RwLock::new(Arc::new(index)),
            client,
            sleeper: Arc::new(TokioSleeper),
            config,
        })
    }

    /// Replace the sleep primitive used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn store(&self) -> &BarStore {
        &self.store
    }

    pub fn quarantine(&self) -> &Quarantine {
        &self.quarantine
    }

    /// Current index snapshot. Never blocks on a rebuild in progress.
    pub fn index(&self) -> Arc<AvailabilityIndex> {
        match self.index.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap_index(&self, index: AvailabilityIndex) {
        let index = Arc::new(index);
        match self.index.write() {
            Ok(mut guard) => *guard = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
    }

    /// Remove `key` from the live index. Read and replace happen under one
    /// write guard, so a concurrent swap is never undone.
    fn drop_record(&self, key: &BarKey) {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(guard.without(key));
    }

    /// Bars for `[start, end]`, from the local store or the remote provider.
    ///
    /// Returned bars are ascending and de-duplicated by timestamp.
    #[instrument(skip(self, granularity, start, end), fields(granularity = %granularity))]
    pub async fn fetch_or_load(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<Vec<Bar>, CatalogError> {
        let (request, range) = make_request(instrument_id, granularity, start, end)?;

        match self.read_local(&request, &range).await? {
            LocalRead::Hit(bars) => {
                debug!(request = %request, bars = bars.len(), "served from local store");
                return Ok(bars);
            }
            LocalRead::NotCovered => debug!(request = %request, "not covered locally"),
            LocalRead::Stale => info!(request = %request, "index was stale, going remote"),
            LocalRead::Quarantined(files) => {
                info!(request = %request, quarantined = files.len(), "local data corrupt, going remote")
            }
        }

        self.ensure_connected(&request).await?;
        let fetched =
            fetch_with_retry(self.client.as_ref(), &request, &self.retry, self.sleeper.as_ref())
                .await?;
        let FetchedBars { bars, instrument } = fetched;

        let mut bars: Vec<Bar> = bars
            .into_iter()
            .filter(|b| range.contains_for(granularity, b.ts))
            .collect();
        sort_and_dedup(&mut bars);
        if bars.is_empty() {
            warn!(request = %request, "provider returned no bars in range");
            return Err(CatalogError::EmptyResult { request });
        }

        self.write_back(&request, &range, &bars, instrument).await?;
        self.rebuild_for(&request).await?;

        info!(request = %request, bars = bars.len(), "fetched and stored");
        Ok(bars)
    }

    /// Offline read: bars when the index covers the range, `None` otherwise.
    ///
    /// Never calls the provider. A corrupt file is still quarantined, and is
    /// then reported as [`CatalogError::CorruptionDetected`] since there is
    /// nothing to fall back to.
    #[instrument(skip(self, granularity, start, end), fields(granularity = %granularity))]
    pub async fn load_local(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<Option<Vec<Bar>>, CatalogError> {
        let (request, range) = make_request(instrument_id, granularity, start, end)?;

        match self.read_local(&request, &range).await? {
            LocalRead::Hit(bars) => Ok(Some(bars)),
            LocalRead::NotCovered | LocalRead::Stale => Ok(None),
            LocalRead::Quarantined(files) => {
                let (path, reason) = files
                    .into_iter()
                    .next()
                    .map(|q| (q.original_path, q.error))
                    .unwrap_or_default();
                Err(CatalogError::CorruptionDetected {
                    request,
                    path,
                    reason,
                })
            }
        }
    }

    /// Sub-ranges of `[start, end]` the current index does not cover.
    pub fn detect_gaps(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
        start: impl IntoUtc,
        end: impl IntoUtc,
    ) -> Result<Vec<TimeRange>, CatalogError> {
        let (request, range) = make_request(instrument_id, granularity, start, end)?;
        let gaps = detect_gaps(&self.index(), instrument_id, granularity, &range);
        debug!(request = %request, gaps = gaps.len(), "gap report");
        Ok(gaps)
    }

    pub fn availability(
        &self,
        instrument_id: &str,
        granularity: &Granularity,
    ) -> Option<AvailabilityRecord> {
        self.index().get(instrument_id, granularity).cloned()
    }

    /// Every record in the current index, sorted by key.
    pub fn records(&self) -> Vec<AvailabilityRecord> {
        self.index().records().into_iter().cloned().collect()
    }

    /// Rescan the store and swap in the result. Returns the record count.
    pub async fn rebuild_index(&self) -> Result<usize, StoreError> {
        let builder = Arc::clone(&self.builder);
        let index = task::spawn_blocking(move || builder.build())
            .await
            .map_err(|e| StoreError::Io {
                path: self.config.store_root.clone(),
                reason: format!("rebuild task failed: {e}"),
            })??;
        let count = index.len();
        self.swap_index(index);
        Ok(count)
    }

    /// Locally persisted metadata for `instrument_id`, if any.
    pub fn instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, StoreError> {
        self.store.read_instrument(instrument_id)
    }

    /// Files moved aside so far, oldest first.
    pub fn list_quarantined(&self) -> Result<Vec<QuarantinedFile>, StoreError> {
        self.quarantine.list()
    }

    async fn read_local(
        &self,
        request: &BarRequest,
        range: &TimeRange,
    ) -> Result<LocalRead, CatalogError> {
        let index = self.index();
        let key = request.key();
        if !index.covers(&request.instrument_id, &request.granularity, range.start, range.end) {
            return Ok(LocalRead::NotCovered);
        }

        let store = Arc::clone(&self.store);
        let (read_key, read_range) = (key.clone(), *range);
        let read = blocking(request, move || store.read_range(&read_key, &read_range))
            .await?
            .map_err(|e| CatalogError::Store {
                request: request.clone(),
                reason: e.to_string(),
            })?;

        if read.is_clean() {
            if !read.spans(&request.granularity, range) {
                // Record bounds span a hole, or the files went away under us.
                debug!(request = %request, files = read.files_read.len(), "stored files leave a hole in the range");
                return Ok(LocalRead::NotCovered);
            }
            return Ok(LocalRead::Hit(read.bars));
        }

        if !read.corrupt.is_empty() {
            let quarantine = Arc::clone(&self.quarantine);
            let corrupt = read.corrupt;
            let moved = blocking(request, move || {
                corrupt
                    .iter()
                    .map(|c| quarantine.quarantine(&c.path, &c.reason))
                    .collect::<Result<Vec<_>, StoreError>>()
            })
            .await?
            .map_err(|e| {
                let (path, reason) = match e {
                    StoreError::Quarantine { path, reason } => (path, reason),
                    other => (self.store.key_dir(&key), other.to_string()),
                };
                CatalogError::QuarantineFailed {
                    request: request.clone(),
                    path,
                    reason,
                }
            })?;
            self.drop_record(&key);
            return Ok(LocalRead::Quarantined(moved));
        }

        for path in &read.missing {
            warn!(path = %path.display(), key = %key, "indexed file is gone");
        }
        self.drop_record(&key);
        Ok(LocalRead::Stale)
    }

    async fn ensure_connected(&self, request: &BarRequest) -> Result<(), CatalogError> {
        if self.client.is_connected() {
            return Ok(());
        }
        let timeout = self.config.connect_timeout();
        let unavailable = |reason: String| {
            warn!(request = %request, provider = self.client.name(), %reason, "provider unavailable");
            CatalogError::ProviderUnavailable {
                request: request.clone(),
                reason,
            }
        };

        match tokio::time::timeout(timeout, self.client.connect(timeout)).await {
            Ok(Ok(true)) => {
                debug!(provider = self.client.name(), "connected");
                Ok(())
            }
            Ok(Ok(false)) => Err(unavailable("provider refused connection".into())),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) => Err(unavailable(format!(
                "connect timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Persist metadata (when new) and bars. Nothing is indexed yet.
    async fn write_back(
        &self,
        request: &BarRequest,
        range: &TimeRange,
        bars: &[Bar],
        instrument: Option<Instrument>,
    ) -> Result<(), CatalogError> {
        let store = Arc::clone(&self.store);
        let key = request.key();
        let range = *range;
        let bars = bars.to_vec();

        let written = blocking(request, move || {
            if let Some(instrument) = instrument.as_ref() {
                if !store.has_instrument(&instrument.instrument_id) {
                    store.write_instrument(instrument)?;
                    debug!(instrument_id = %instrument.instrument_id, "stored instrument metadata");
                }
            }
            store.write_bars(&key, &range, &bars)
        })
        .await?;

        match written {
            Ok(path) => {
                debug!(path = %path.display(), "bar file written");
                Ok(())
            }
            Err(e) => {
                warn!(request = %request, error = %e, "local write failed");
                Err(CatalogError::LocalWriteFailed {
                    request: request.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn rebuild_for(&self, request: &BarRequest) -> Result<(), CatalogError> {
        let builder = Arc::clone(&self.builder);
        let index = blocking(request, move || builder.build())
            .await?
            .map_err(|e| CatalogError::Store {
                request: request.clone(),
                reason: format!("index rebuild failed: {e}"),
            })?;
        self.swap_index(index);
        Ok(())
    }
}

fn make_request(
    instrument_id: &str,
    granularity: &Granularity,
    start: impl IntoUtc,
    end: impl IntoUtc,
) -> Result<(BarRequest, TimeRange), CatalogError> {
    let request = BarRequest {
        instrument_id: instrument_id.to_string(),
        granularity: *granularity,
        start: start.into_utc(),
        end: end.into_utc(),
    };
    match request.range() {
        Some(range) => Ok((request, range)),
        None => Err(CatalogError::InvalidRange { request }),
    }
}

/// Run store I/O on the blocking pool.
async fn blocking<T, F>(request: &BarRequest, f: F) -> Result<T, CatalogError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| CatalogError::Internal {
            request: request.clone(),
            reason: e.to_string(),
        })
}
