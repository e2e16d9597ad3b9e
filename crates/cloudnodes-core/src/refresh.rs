//! Refresh Orchestrator
//!
//! Serves the current [`NodeSet`] with stale-while-revalidate semantics:
//!
//! - no node set yet: run a cycle and make the caller wait for it
//! - fresh: return the current node set
//! - stale: return the current node set and start one background cycle,
//!   unless one is still running, in which case the request is counted as
//!   skipped
//!
//! A cycle runs the cache loader and then the population pipeline while
//! holding the cache lock, so two cycles never overlap. The finished node set
//! replaces the previous one with a single pointer swap.

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::Instant as ClockInstant;
use tracing::{debug, info, warn};

use crate::cache::ResourceCache;
use crate::error::RefreshError;
use crate::fetcher::ResourceFetcher;
use crate::loader::{loader_for, CacheLoader};
use crate::metrics::{Phase, RefreshMetrics};
use crate::node::NodeSet;
use crate::populate::{Pipeline, PipelineSettings};

/// Whether a node set last refreshed `elapsed` ago is stale.
///
/// Always stale when `interval_secs <= 0` or nothing has completed yet;
/// otherwise stale only once the whole seconds elapsed are strictly greater
/// than the interval.
pub fn needs_refresh(interval_secs: i64, elapsed: Option<Duration>) -> bool {
    if interval_secs <= 0 {
        return true;
    }
    match elapsed {
        None => true,
        Some(elapsed) => elapsed.as_secs() > interval_secs.unsigned_abs(),
    }
}

/// Settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Staleness threshold in seconds
    pub interval_secs: i64,
    /// Resource cache TTL in milliseconds
    pub cache_ttl_ms: i64,
    /// Use the full loader instead of the minimal one
    pub full_fetch: bool,
    /// Population settings
    pub pipeline: PipelineSettings,
}

struct Shared {
    settings: RefreshSettings,
    fetcher: Arc<dyn ResourceFetcher>,
    metrics: Arc<RefreshMetrics>,
    loader: OnceCell<Arc<dyn CacheLoader>>,

    /// Held for a whole cycle
    cache: tokio::sync::Mutex<ResourceCache>,

    current: RwLock<Option<Arc<NodeSet>>>,
    /// Measured on the tokio clock
    last_refresh: Mutex<Option<ClockInstant>>,
    last_error: RwLock<Option<Arc<RefreshError>>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn snapshot(&self) -> Option<Arc<NodeSet>> {
        self.current.read().clone()
    }

    fn last_refresh_age(&self) -> Option<Duration> {
        self.last_refresh.lock().map(|at| at.elapsed())
    }

    fn is_stale(&self) -> bool {
        needs_refresh(self.settings.interval_secs, self.last_refresh_age())
    }

    fn loader(&self) -> Arc<dyn CacheLoader> {
        Arc::clone(
            self.loader
                .get_or_init(|| loader_for(self.settings.full_fetch)),
        )
    }

    /// Load, populate and publish. Caller holds the cache lock.
    async fn run_cycle(&self, cache: &mut ResourceCache) -> Result<Arc<NodeSet>, RefreshError> {
        self.metrics.record_refresh_start();
        let started = Instant::now();
        let _timer = self.metrics.time(Phase::Refresh);

        let loader = self.loader();
        debug!(loader = loader.name(), "Loading resource cache");
        loader.load(cache, self.fetcher.as_ref()).await?;

        let nodes = Pipeline::new(&self.settings.pipeline, cache, &self.metrics, Utc::now())
            .populate()?;
        let nodes = Arc::new(nodes);

        *self.current.write() = Some(Arc::clone(&nodes));
        *self.last_refresh.lock() = Some(ClockInstant::now());
        *self.last_error.write() = None;

        let duration = started.elapsed();
        self.metrics.record_refresh_complete(nodes.len(), duration);
        info!(
            node_count = nodes.len(),
            duration_ms = duration.as_millis() as u64,
            "Refresh completed"
        );
        Ok(nodes)
    }

    async fn background_cycle(self: Arc<Self>) {
        let mut cache = self.cache.lock().await;
        // a forced refresh may have completed while we waited for the lock
        if !self.is_stale() {
            return;
        }

        if let Err(err) = self.run_cycle(&mut cache).await {
            warn!(error = %err, "Background refresh failed, serving previous node set");
            *self.last_error.write() = Some(Arc::new(err));
        }
    }
}

/// Owns the resource cache, the current node set and the background task.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    shared: Arc<Shared>,
}

impl RefreshOrchestrator {
    /// Create an orchestrator; the loader is chosen from `full_fetch` on first use.
    pub fn new(
        settings: RefreshSettings,
        fetcher: Arc<dyn ResourceFetcher>,
        metrics: Arc<RefreshMetrics>,
    ) -> Self {
        metrics.set_refresh_interval(settings.interval_secs);
        let cache = ResourceCache::new(settings.cache_ttl_ms);

        Self {
            shared: Arc::new(Shared {
                settings,
                fetcher,
                metrics,
                loader: OnceCell::new(),
                cache: tokio::sync::Mutex::new(cache),
                current: RwLock::new(None),
                last_refresh: Mutex::new(None),
                last_error: RwLock::new(None),
                background: Mutex::new(None),
            }),
        }
    }

    /// Use a specific loader instead of the configured strategy.
    ///
    /// Has no effect once a cycle has picked a loader.
    pub fn with_loader(self, loader: Arc<dyn CacheLoader>) -> Self {
        if let Err(rejected) = self.shared.loader.set(loader) {
            warn!(
                loader = rejected.name(),
                current = self.shared.loader().name(),
                "Loader already chosen by an earlier cycle, ignoring injected loader"
            );
        }
        self
    }

    /// Name of the loader cycles use, choosing it if none was picked yet.
    pub fn loader_name(&self) -> &'static str {
        self.shared.loader().name()
    }

    /// The current node set, refreshing as needed.
    ///
    /// Waits only when no node set exists yet; that first cycle's error is
    /// returned to the caller. Later failures happen in the background and
    /// are reported through [`Self::last_error`].
    pub async fn nodes(&self) -> Result<Arc<NodeSet>, RefreshError> {
        let Some(current) = self.shared.snapshot() else {
            return self.cold_start().await;
        };

        if !self.shared.is_stale() {
            return Ok(current);
        }

        let mut background = self.shared.background.lock();
        if background.as_ref().is_some_and(|task| !task.is_finished()) {
            self.shared.metrics.record_skipped();
            debug!("Refresh already in flight, serving stale node set");
            return Ok(current);
        }

        debug!("Node set is stale, refreshing in background");
        let shared = Arc::clone(&self.shared);
        *background = Some(tokio::spawn(shared.background_cycle()));
        Ok(current)
    }

    async fn cold_start(&self) -> Result<Arc<NodeSet>, RefreshError> {
        let mut cache = self.shared.cache.lock().await;
        // another caller may have finished the first cycle while we waited
        if let Some(current) = self.shared.snapshot() {
            return Ok(current);
        }
        self.shared.run_cycle(&mut cache).await
    }

    /// Run a cycle now and wait for it, regardless of staleness.
    pub async fn refresh_now(&self) -> Result<Arc<NodeSet>, RefreshError> {
        let mut cache = self.shared.cache.lock().await;
        self.shared.run_cycle(&mut cache).await
    }

    /// Wait for the background cycle, if one was started.
    pub async fn join_background(&self) {
        let task = self.shared.background.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "Background refresh task ended abnormally");
            }
        }
    }

    /// Whether a background cycle is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.shared
            .background
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// The current node set without triggering a refresh.
    pub fn snapshot(&self) -> Option<Arc<NodeSet>> {
        self.shared.snapshot()
    }

    /// The error of the last failed background cycle, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<Arc<RefreshError>> {
        self.shared.last_error.read().clone()
    }

    /// Time since the last completed cycle.
    pub fn last_refresh_age(&self) -> Option<Duration> {
        self.shared.last_refresh_age()
    }

    pub fn metrics(&self) -> &Arc<RefreshMetrics> {
        &self.shared.metrics
    }
}
