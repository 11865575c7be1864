//! # Chart Fetch Orchestrator
//!
//! Drives one weekly chart load end to end:
//!
//! ```text
//! period list ──> select period ──> cache? ──> chart ──> artwork lookups ──> cache
//!  (coalesced       (clock-anchored)   │       (coalesced per user + period,
//!   per user)                          │        lookups bounded by a semaphore)
//!                                      └──> hit: filter and return
//! ```
//!
//! The period list and the chart are fatal stages; artwork lookups are not.
//! A failed lookup leaves its entry on the page without an image and is
//! reported as a [`PartialFailure`].
//!
//! ## Cancellation
//!
//! Each call takes its own [`CancellationToken`]. A cancelled caller returns
//! [`ChartResult::Cancelled`] without waiting, while other callers sharing the
//! same fetch keep going. When nobody is left waiting, the fetch is dropped,
//! which aborts its outstanding lookups.
//!
//! ## Invalidation
//!
//! A load captures the user's cache generation when it starts. Invalidating
//! the user bumps the generation, so a fetch already in flight can still
//! answer its own callers but cannot write to the cache, and later loads
//! start a fresh fetch instead of joining it.
//!
//! ## Precaching
//!
//! After a successful load, the chart one year further back is loaded in the
//! background through the same coalesced fetch path. At most one precache job
//! runs per user; starting another, calling
//! [`ChartOrchestrator::cancel_precache`] or invalidating the user cancels it.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = ChartOrchestrator::new(gateway, cache, clock, events, &settings);
//! let token = CancellationToken::new();
//! match orchestrator.get_chart("rj", 1, 2, &token).await {
//!     ChartResult::Success(page) => println!("{} albums", page.entries.len()),
//!     other => println!("{:?}", other),
//! }
//! ```

use crate::cache::ChartCache;
use crate::coalesce::Coalescer;
use crate::error::{ChartError, ChartFailure, FetchStage};
use crate::gateway::ChartGateway;
use crate::models::{Album, ChartEntry, ChartPeriod, PeriodKey, WeekInfo, YearRange};
use crate::page::{ChartPage, ChartResult, EmptyReason, PartialFailure};
use crate::period;
use bridge_traits::time::Clock;
use core_runtime::config::ChartSettings;
use core_runtime::events::{ChartEvent, CoreEvent, EventBus};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type PeriodListOutcome = Result<Vec<ChartPeriod>, ChartError>;
type ChartOutcome = Result<ChartPage, ChartFailure>;

/// In-flight keys carry the cache generation they were started under.
type PeriodFetchKey = (String, u64);
type ChartFetchKey = (String, PeriodKey, u64);

/// Why a chart load stopped before producing a page.
enum Interrupt {
    Failed(ChartFailure),
    Cancelled,
}

impl From<Interrupt> for ChartResult {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Failed(failure) => ChartResult::Failed(failure),
            Interrupt::Cancelled => ChartResult::Cancelled,
        }
    }
}

pub struct ChartOrchestrator {
    pipeline: Pipeline,
    events: EventBus,
    precache_previous_year: bool,
    period_fetches: Coalescer<PeriodFetchKey, PeriodListOutcome>,
    precaches: Arc<PrecacheJobs>,
}

impl ChartOrchestrator {
    pub fn new(
        gateway: Arc<dyn ChartGateway>,
        cache: Arc<ChartCache>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        settings: &ChartSettings,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                gateway,
                cache,
                clock,
                max_concurrent_lookups: settings.max_concurrent_image_lookups.max(1),
                chart_fetches: Coalescer::new(),
            },
            events,
            precache_previous_year: settings.precache_previous_year,
            period_fetches: Coalescer::new(),
            precaches: Arc::new(PrecacheJobs::default()),
        }
    }

    pub fn cache(&self) -> &Arc<ChartCache> {
        &self.pipeline.cache
    }

    /// Loads the chart for "this week, `years_back` years ago" and drops
    /// entries played fewer than `min_play_count` times.
    ///
    /// On success, the chart for `years_back + 1` is precached in the
    /// background when that year is navigable.
    #[instrument(skip(self, cancel))]
    pub async fn get_chart(
        &self,
        user_name: &str,
        years_back: u32,
        min_play_count: u32,
        cancel: &CancellationToken,
    ) -> ChartResult {
        let result = self
            .load_chart(user_name, years_back, min_play_count, cancel)
            .await
            .unwrap_or_else(ChartResult::from);
        self.publish_outcome(user_name, &result);

        if self.precache_previous_year && matches!(result, ChartResult::Success(_)) {
            if let Some(previous_year) = years_back.checked_add(1) {
                let _ = self.precache(user_name, previous_year);
            }
        }
        result
    }

    async fn load_chart(
        &self,
        user_name: &str,
        years_back: u32,
        min_play_count: u32,
        cancel: &CancellationToken,
    ) -> Result<ChartResult, Interrupt> {
        let generation = self.pipeline.cache.generation(user_name).await;
        let periods = self.period_list(user_name, generation, cancel).await?;
        if periods.is_empty() {
            return Ok(ChartResult::Empty(EmptyReason::NoPeriodsAvailable));
        }

        let anchor = self.pipeline.clock.now();
        let Some(selected) = period::select_period(&periods, anchor, years_back) else {
            debug!(%anchor, "No period for requested year");
            return Ok(ChartResult::Empty(EmptyReason::PeriodNotFound));
        };

        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let key = selected.key();
        if let Some(cached) = self.pipeline.cache.chart(user_name, key).await {
            debug!(from = key.from, to = key.to, "Chart cache hit");
            let mut page = cached.page.filtered(min_play_count);
            page.from_cache = true;
            return Ok(ChartResult::Success(page));
        }

        let page = self
            .pipeline
            .chart(user_name, selected, generation, cancel)
            .await
            .ok_or(Interrupt::Cancelled)?
            .map_err(Interrupt::Failed)?;
        Ok(ChartResult::Success(page.filtered(min_play_count)))
    }

    /// The user's period list, from cache or a coalesced fetch.
    async fn period_list(
        &self,
        user_name: &str,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChartPeriod>, Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let cache = Arc::clone(&self.pipeline.cache);
        if let Some(cached) = cache.periods(user_name, self.pipeline.clock.now()).await {
            return Ok(cached.periods.clone());
        }

        let gateway = Arc::clone(&self.pipeline.gateway);
        let clock = Arc::clone(&self.pipeline.clock);
        let events = self.events.clone();
        let owner = user_name.to_string();

        let outcome = self
            .period_fetches
            .run(
                (user_name.to_string(), generation),
                cancel,
                move |_token| async move {
                    let periods = gateway.fetch_period_list(&owner).await?;
                    cache
                        .store_periods(&owner, periods.clone(), clock.now(), generation)
                        .await;
                    let _ = events.emit(CoreEvent::Chart(ChartEvent::PeriodListRefreshed {
                        user_name: owner,
                        period_count: periods.len(),
                    }));
                    Ok::<_, ChartError>(periods)
                },
            )
            .await
            .ok_or(Interrupt::Cancelled)?;

        outcome.map_err(|error| {
            warn!(user_name, %error, "Failed to fetch chart periods");
            Interrupt::Failed(ChartFailure::new(FetchStage::PeriodList, error))
        })
    }

    /// Calendar years covered by the user's charts.
    #[instrument(skip(self, cancel))]
    pub async fn available_years(
        &self,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<YearRange>, ChartFailure> {
        let generation = self.pipeline.cache.generation(user_name).await;
        match self.period_list(user_name, generation, cancel).await {
            Ok(periods) => Ok(period::year_range(&periods)),
            Err(Interrupt::Failed(failure)) => Err(failure),
            Err(Interrupt::Cancelled) => Err(ChartFailure::new(
                FetchStage::PeriodList,
                ChartError::Cancelled,
            )),
        }
    }

    /// Whether a chart `years_back` years ago can exist for the user.
    pub async fn can_navigate(
        &self,
        user_name: &str,
        years_back: u32,
        cancel: &CancellationToken,
    ) -> bool {
        match self.available_years(user_name, cancel).await {
            Ok(range) => period::can_navigate(range, self.pipeline.clock.now(), years_back),
            Err(_) => false,
        }
    }

    pub fn week_info(&self, period: &ChartPeriod, user_name: &str) -> WeekInfo {
        period::week_info(period, user_name)
    }

    /// Fetches description, release date and play counts for one album.
    ///
    /// Failures are returned rather than reported as a chart failure; the
    /// caller keeps showing the stub it already has.
    #[instrument(skip(self, album), fields(album = %album.name))]
    pub async fn album_detail(
        &self,
        album: &Album,
        user_name: Option<&str>,
    ) -> Result<Album, ChartError> {
        self.pipeline
            .gateway
            .fetch_album_detail(album, user_name)
            .await
            .inspect_err(|error| {
                warn!(stage = %FetchStage::AlbumDetail, %error, "Album detail lookup failed");
            })
    }

    /// Loads the chart `years_back` years ago into the cache in the
    /// background.
    ///
    /// Uses the cached period list only; nothing is fetched when the user has
    /// none, when the year is not navigable or when the chart is already
    /// cached. Replaces any precache job already running for the user.
    pub fn precache(&self, user_name: &str, years_back: u32) -> JoinHandle<()> {
        let (id, token) = self.precaches.start(user_name);
        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        let jobs = Arc::clone(&self.precaches);
        let user_name = user_name.to_string();
        debug!(user_name = %user_name, years_back, "Starting chart precache");

        tokio::spawn(async move {
            if let Some(period) = pipeline.precache(&user_name, years_back, &token).await {
                info!(user_name = %user_name, years_back, "Chart precached");
                let _ = events.emit(CoreEvent::Chart(ChartEvent::ChartPrecached {
                    user_name: user_name.clone(),
                    period_from: period.from.timestamp(),
                    period_to: period.to.timestamp(),
                }));
            }
            jobs.finish(&user_name, id);
        })
    }

    /// Cancels the user's running precache job. Returns whether one was
    /// running.
    pub fn cancel_precache(&self, user_name: &str) -> bool {
        let cancelled = self.precaches.cancel(user_name);
        if cancelled {
            debug!(user_name, "Cancelled chart precache");
        }
        cancelled
    }

    /// Cancels every running precache job and returns how many there were.
    pub fn cancel_all_precaching(&self) -> usize {
        self.precaches.cancel_all()
    }

    /// Number of precache jobs still running.
    pub fn active_precaches(&self) -> usize {
        self.precaches.active()
    }

    /// Drops cached periods and pages for `user_name` and stops its precache.
    ///
    /// Fetches already in flight for the user keep answering their callers
    /// but no longer write to the cache.
    pub async fn invalidate(&self, user_name: &str) {
        self.cancel_precache(user_name);
        self.pipeline.cache.invalidate(user_name).await;
        let _ = self
            .events
            .emit(CoreEvent::Chart(ChartEvent::CacheInvalidated {
                user_name: user_name.to_string(),
            }));
    }

    fn publish_outcome(&self, user_name: &str, result: &ChartResult) {
        let user_name = user_name.to_string();
        let event = match result {
            ChartResult::Success(page) => {
                info!(
                    entries = page.entries.len(),
                    partial_failures = page.partial_failures.len(),
                    from_cache = page.from_cache,
                    "Chart loaded"
                );
                ChartEvent::ChartLoaded {
                    user_name,
                    period_from: page.period.from.timestamp(),
                    period_to: page.period.to.timestamp(),
                    entry_count: page.entries.len(),
                    partial_failures: page.partial_failures.len(),
                    from_cache: page.from_cache,
                }
            }
            ChartResult::Empty(reason) => ChartEvent::ChartEmpty {
                user_name,
                reason: reason.as_str().to_string(),
            },
            ChartResult::Failed(failure) => {
                warn!(stage = %failure.stage, error = %failure.error, "Chart load failed");
                ChartEvent::ChartFailed {
                    user_name,
                    stage: failure.stage.to_string(),
                    message: failure.error.to_string(),
                }
            }
            ChartResult::Cancelled => {
                debug!("Chart load cancelled");
                ChartEvent::ChartCancelled { user_name }
            }
        };
        let _ = self.events.emit(CoreEvent::Chart(event));
    }
}

/// Everything a chart fetch needs, shareable with background tasks.
#[derive(Clone)]
struct Pipeline {
    gateway: Arc<dyn ChartGateway>,
    cache: Arc<ChartCache>,
    clock: Arc<dyn Clock>,
    max_concurrent_lookups: usize,
    chart_fetches: Coalescer<ChartFetchKey, ChartOutcome>,
}

impl Pipeline {
    /// Joins or starts the shared fetch of `period` for `user_name`. `None`
    /// when `cancel` fires first.
    async fn chart(
        &self,
        user_name: &str,
        period: ChartPeriod,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Option<ChartOutcome> {
        let fetch = ChartFetch {
            gateway: Arc::clone(&self.gateway),
            cache: Arc::clone(&self.cache),
            clock: Arc::clone(&self.clock),
            max_concurrent_lookups: self.max_concurrent_lookups,
            user_name: user_name.to_string(),
            period,
            generation,
        };
        self.chart_fetches
            .run(
                (user_name.to_string(), period.key(), generation),
                cancel,
                move |token| fetch.run(token),
            )
            .await
    }

    /// Returns the period that was newly cached, if any.
    async fn precache(
        &self,
        user_name: &str,
        years_back: u32,
        cancel: &CancellationToken,
    ) -> Option<ChartPeriod> {
        let generation = self.cache.generation(user_name).await;
        let now = self.clock.now();
        let Some(cached) = self.cache.periods(user_name, now).await else {
            debug!(user_name, "No cached period list, skipping precache");
            return None;
        };
        if !period::can_navigate(period::year_range(&cached.periods), now, years_back) {
            return None;
        }
        let selected = period::select_period(&cached.periods, now, years_back)?;
        let key = selected.key();
        if cancel.is_cancelled() || self.cache.chart(user_name, key).await.is_some() {
            return None;
        }

        match self.chart(user_name, selected, generation, cancel).await {
            Some(Ok(_)) => self
                .cache
                .chart(user_name, key)
                .await
                .map(|_| selected),
            Some(Err(failure)) => {
                debug!(user_name, %failure, "Chart precache failed");
                None
            }
            None => {
                debug!(user_name, "Chart precache cancelled");
                None
            }
        }
    }
}

/// Background precache jobs, at most one per user.
#[derive(Default)]
struct PrecacheJobs {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<String, (u64, CancellationToken)>>,
}

impl PrecacheJobs {
    fn jobs(&self) -> MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(&self, user_name: &str) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self
            .jobs()
            .insert(user_name.to_string(), (id, token.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        (id, token)
    }

    /// Forgets job `id` unless a newer job for the user replaced it.
    fn finish(&self, user_name: &str, id: u64) {
        let mut jobs = self.jobs();
        if jobs.get(user_name).is_some_and(|(current, _)| *current == id) {
            jobs.remove(user_name);
        }
    }

    fn cancel(&self, user_name: &str) -> bool {
        let removed = self.jobs().remove(user_name);
        match removed {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.jobs().drain().collect();
        for (_, (_, token)) in &drained {
            token.cancel();
        }
        drained.len()
    }

    fn active(&self) -> usize {
        self.jobs().len()
    }
}

/// The shared part of a chart load: fetch, enrich, cache.
struct ChartFetch {
    gateway: Arc<dyn ChartGateway>,
    cache: Arc<ChartCache>,
    clock: Arc<dyn Clock>,
    max_concurrent_lookups: usize,
    user_name: String,
    period: ChartPeriod,
    generation: u64,
}

impl ChartFetch {
    async fn run(self, token: CancellationToken) -> ChartOutcome {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ChartError::Cancelled),
            result = self.gateway.fetch_chart(&self.user_name, &self.period) => result,
        };
        let entries = fetched.map_err(|error| ChartFailure::new(FetchStage::Chart, error))?;
        debug!(count = entries.len(), "Fetched chart entries");

        let (entries, partial_failures) = self
            .enrich(entries, &token)
            .await
            .map_err(|error| ChartFailure::new(FetchStage::ImageLookup, error))?;

        let page = ChartPage {
            user_name: self.user_name.clone(),
            week: WeekInfo::for_period(&self.period, &self.user_name),
            period: self.period,
            entries,
            partial_failures,
            from_cache: false,
        };
        self.cache
            .store_chart(page.clone(), self.clock.now(), self.generation)
            .await;
        Ok(page)
    }

    /// Resolves artwork for every entry without an image.
    ///
    /// Errors only with `ChartError::Cancelled`; lookup failures are collected
    /// as partial failures.
    async fn enrich(
        &self,
        mut entries: Vec<ChartEntry>,
        token: &CancellationToken,
    ) -> Result<(Vec<ChartEntry>, Vec<PartialFailure>), ChartError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_lookups));
        let mut lookups = JoinSet::new();
        let mut pending = vec![false; entries.len()];

        for (index, entry) in entries.iter().enumerate() {
            if !entry.album.needs_image() {
                continue;
            }
            pending[index] = true;

            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let artist_name = entry.album.artist.name.clone();
            let album_name = entry.album.name.clone();

            lookups.spawn(async move {
                let lookup = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| ChartError::Cancelled)?;
                    gateway.resolve_album_image(&artist_name, &album_name).await
                };
                let outcome = AssertUnwindSafe(lookup)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(ChartError::other(0, "image lookup panicked")));
                (index, outcome)
            });
        }

        if lookups.is_empty() {
            return Ok((entries, Vec::new()));
        }
        debug!(lookups = lookups.len(), "Resolving missing artwork");

        let mut failures = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    lookups.abort_all();
                    return Err(ChartError::Cancelled);
                }
                next = lookups.join_next() => next,
            };
            let Some(joined) = next else {
                break;
            };

            match joined {
                Ok((index, Ok(image_url))) => {
                    pending[index] = false;
                    if let Some(url) = image_url {
                        entries[index].album.image_url = Some(url);
                    }
                }
                Ok((index, Err(error))) => {
                    pending[index] = false;
                    failures.push(partial_failure(&entries[index], error));
                }
                Err(join_error) => {
                    warn!(error = %join_error, "Image lookup task did not finish");
                }
            }
        }

        // Tasks that died without reporting back.
        for (index, _) in pending.iter().enumerate().filter(|(_, p)| **p) {
            failures.push(partial_failure(
                &entries[index],
                ChartError::other(0, "image lookup did not complete"),
            ));
        }

        if !failures.is_empty() {
            warn!(failed = failures.len(), "Some artwork lookups failed");
        }
        failures.sort_by_key(|failure| failure.rank);
        Ok((entries, failures))
    }
}

fn partial_failure(entry: &ChartEntry, error: ChartError) -> PartialFailure {
    PartialFailure {
        rank: entry.rank,
        artist_name: entry.album.artist.name.clone(),
        album_name: entry.album.name.clone(),
        error,
    }
}
