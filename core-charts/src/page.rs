//! What a chart load hands back to its caller.

use crate::error::{ChartError, ChartFailure};
use crate::models::{ChartEntry, ChartPeriod, WeekInfo};
use serde::{Deserialize, Serialize};

/// An entry whose artwork lookup failed. The entry itself is still on the
/// page, without an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub rank: u32,
    pub artist_name: String,
    pub album_name: String,
    pub error: ChartError,
}

/// A resolved weekly chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPage {
    pub user_name: String,
    pub period: ChartPeriod,
    pub week: WeekInfo,
    /// Ascending rank
    pub entries: Vec<ChartEntry>,
    pub partial_failures: Vec<PartialFailure>,
    pub from_cache: bool,
}

impl ChartPage {
    /// Copy of this page without entries below `min_play_count`.
    ///
    /// Rank order is preserved; ranks are not renumbered.
    pub fn filtered(&self, min_play_count: u32) -> ChartPage {
        let entries: Vec<ChartEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.play_count >= min_play_count)
            .cloned()
            .collect();

        ChartPage {
            entries,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyReason {
    /// The user has no reporting periods at all.
    NoPeriodsAvailable,
    /// The requested year lies before the user's history.
    PeriodNotFound,
}

impl EmptyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmptyReason::NoPeriodsAvailable => "no_periods_available",
            EmptyReason::PeriodNotFound => "period_not_found",
        }
    }
}

/// Outcome of `ChartOrchestrator::get_chart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartResult {
    Success(ChartPage),
    Empty(EmptyReason),
    Failed(ChartFailure),
    Cancelled,
}

impl ChartResult {
    pub fn page(&self) -> Option<&ChartPage> {
        match self {
            ChartResult::Success(page) => Some(page),
            _ => None,
        }
    }

    pub fn into_page(self) -> Option<ChartPage> {
        match self {
            ChartResult::Success(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChartResult::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Album, Artist};

    fn page_with_counts(counts: &[u32]) -> ChartPage {
        let period = ChartPeriod::from_unix(1_104_580_800, 1_105_185_600).unwrap();
        let entries = counts
            .iter()
            .enumerate()
            .map(|(i, &play_count)| ChartEntry {
                rank: i as u32 + 1,
                play_count,
                album: Album::new(format!("Album {}", i + 1), Artist::new("Artist")),
                period: period.key(),
                user_name: "rj".to_string(),
            })
            .collect();

        ChartPage {
            user_name: "rj".to_string(),
            week: WeekInfo::for_period(&period, "rj"),
            period,
            entries,
            partial_failures: Vec::new(),
            from_cache: false,
        }
    }

    #[test]
    fn test_filter_keeps_rank_order() {
        let page = page_with_counts(&[9, 1, 5, 1, 3]);
        let filtered = page.filtered(3);

        let ranks: Vec<u32> = filtered.entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 3, 5]);
        // The source page is untouched.
        assert_eq!(page.entries.len(), 5);
    }

    #[test]
    fn test_filter_zero_keeps_everything() {
        let page = page_with_counts(&[0, 0, 2]);
        assert_eq!(page.filtered(0).entries.len(), 3);
        assert!(page.filtered(10).entries.is_empty());
    }
}
