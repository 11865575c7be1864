//! Process-lifetime store of period lists and fully enriched chart pages.
//!
//! Entries are replaced whole under a write lock and handed out as `Arc`
//! snapshots, so a reader never sees a half-written page. There is no
//! eviction; [`ChartCache::invalidate`] drops everything for one user.
//!
//! Each user has a generation counter that `invalidate` bumps. Writers read
//! the generation before they start fetching and pass it back when storing;
//! a write from before the latest invalidation is discarded.

use crate::models::{ChartPeriod, PeriodKey};
use crate::page::ChartPage;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type ChartKey = (String, PeriodKey);

/// A cached chart page, unfiltered, with its artwork enrichment applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChart {
    pub page: ChartPage,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPeriods {
    pub periods: Vec<ChartPeriod>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedPeriods {
    /// When the list should next be checked for a newly published period.
    ///
    /// Normally one period length after the end of the latest period. A list
    /// fetched at or past that point still lacked the new period, so the
    /// boundary moves forward in whole period lengths until it lies after
    /// `fetched_at`.
    pub fn next_boundary(&self) -> Option<DateTime<Utc>> {
        let last = self.periods.iter().max_by_key(|p| p.to)?;
        let length = last.length();
        let expected = last.to + length;
        if self.fetched_at < expected {
            return Some(expected);
        }

        let step = length.num_seconds().max(1);
        let behind = (self.fetched_at - expected).num_seconds() / step + 1;
        Some(expected + Duration::seconds(step * behind))
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.next_boundary() {
            Some(boundary) => now >= boundary,
            None => true,
        }
    }
}

// Lock order: charts, periods, generations.
#[derive(Debug, Default)]
pub struct ChartCache {
    charts: RwLock<HashMap<ChartKey, Arc<CachedChart>>>,
    periods: RwLock<HashMap<String, Arc<CachedPeriods>>>,
    generations: RwLock<HashMap<String, u64>>,
}

impl ChartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn chart(&self, user_name: &str, period: PeriodKey) -> Option<Arc<CachedChart>> {
        let charts = self.charts.read().await;
        charts.get(&(user_name.to_string(), period)).cloned()
    }

    /// Current generation for `user_name`; starts at 0.
    pub async fn generation(&self, user_name: &str) -> u64 {
        self.generations
            .read()
            .await
            .get(user_name)
            .copied()
            .unwrap_or(0)
    }

    /// Stores `page` unless its user was invalidated after `generation` was
    /// read. Returns whether the page was stored.
    pub async fn store_chart(
        &self,
        page: ChartPage,
        captured_at: DateTime<Utc>,
        generation: u64,
    ) -> bool {
        let mut charts = self.charts.write().await;
        if !self.is_current(&page.user_name, generation).await {
            debug!(user_name = %page.user_name, "Discarding chart fetched before invalidation");
            return false;
        }
        let key = (page.user_name.clone(), page.period.key());
        charts.insert(key, Arc::new(CachedChart { page, captured_at }));
        true
    }

    /// The user's period list, unless missing or stale at `now`.
    pub async fn periods(&self, user_name: &str, now: DateTime<Utc>) -> Option<Arc<CachedPeriods>> {
        let periods = self.periods.read().await;
        let cached = periods.get(user_name)?;
        if cached.is_stale(now) {
            debug!(user_name, "Cached period list is stale");
            return None;
        }
        Some(Arc::clone(cached))
    }

    /// Like [`ChartCache::store_chart`] for the period list. Empty lists are
    /// not stored, so a user with no history is asked again next time.
    pub async fn store_periods(
        &self,
        user_name: &str,
        periods: Vec<ChartPeriod>,
        fetched_at: DateTime<Utc>,
        generation: u64,
    ) -> bool {
        if periods.is_empty() {
            return false;
        }
        let mut cached = self.periods.write().await;
        if !self.is_current(user_name, generation).await {
            debug!(user_name, "Discarding period list fetched before invalidation");
            return false;
        }
        let entry = Arc::new(CachedPeriods {
            periods,
            fetched_at,
        });
        cached.insert(user_name.to_string(), entry);
        true
    }

    /// Drops every chart page and the period list for `user_name`, and
    /// rejects writes from fetches that started before this call.
    pub async fn invalidate(&self, user_name: &str) {
        let mut charts = self.charts.write().await;
        let mut periods = self.periods.write().await;
        let mut generations = self.generations.write().await;

        *generations.entry(user_name.to_string()).or_insert(0) += 1;
        let before = charts.len();
        charts.retain(|(user, _), _| user != user_name);
        periods.remove(user_name);
        debug!(
            user_name,
            removed = before - charts.len(),
            "Invalidated cached charts"
        );
    }

    async fn is_current(&self, user_name: &str, generation: u64) -> bool {
        self.generation(user_name).await == generation
    }

    /// Number of cached chart pages.
    pub async fn len(&self) -> usize {
        self.charts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
