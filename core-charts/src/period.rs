//! Picks the reporting period for "this week, N years ago".

use crate::models::{ChartPeriod, WeekInfo, YearRange};
use chrono::{DateTime, Datelike, Months, Utc};

/// Shifts `anchor` back by whole calendar years.
///
/// Month arithmetic clamps the day, so Feb 29 lands on Feb 28.
pub fn target_instant(anchor: DateTime<Utc>, years_back: u32) -> Option<DateTime<Utc>> {
    let months = years_back.checked_mul(12)?;
    anchor.checked_sub_months(Months::new(months))
}

/// Selects the period matching `anchor` shifted back `years_back` years.
///
/// The first period containing the target wins. Failing that, the latest
/// period starting at or before the target is used, so a missing week falls
/// back to the nearest earlier one. Returns `None` for an empty list or a
/// target before the user's first period.
///
/// The result is always a copy of one of `periods`.
pub fn select_period(
    periods: &[ChartPeriod],
    anchor: DateTime<Utc>,
    years_back: u32,
) -> Option<ChartPeriod> {
    let target = target_instant(anchor, years_back)?;
    let earliest = periods.iter().map(|p| p.from).min()?;
    if target < earliest {
        return None;
    }

    if let Some(containing) = periods.iter().find(|p| p.contains(target)) {
        return Some(*containing);
    }

    // Strict comparison keeps the first of equal starts.
    periods
        .iter()
        .filter(|p| p.from <= target)
        .fold(None::<&ChartPeriod>, |best, candidate| match best {
            Some(current) if candidate.from <= current.from => Some(current),
            _ => Some(candidate),
        })
        .copied()
}

/// Earliest and latest calendar year (UTC) spanned by `periods`.
pub fn year_range(periods: &[ChartPeriod]) -> Option<YearRange> {
    let earliest = periods.iter().map(|p| p.from).min()?;
    let latest = periods.iter().map(|p| p.to).max()?;
    Some(YearRange {
        earliest: earliest.year(),
        latest: latest.year(),
    })
}

/// Whether a chart `years_back` years before `anchor` can exist.
///
/// Offset 0 is the current week, which is never navigable.
pub fn can_navigate(range: Option<YearRange>, anchor: DateTime<Utc>, years_back: u32) -> bool {
    if years_back == 0 {
        return false;
    }

    match (range, target_instant(anchor, years_back)) {
        (Some(range), Some(target)) => range.contains(target.year()),
        _ => false,
    }
}

pub fn week_info(period: &ChartPeriod, user_name: &str) -> WeekInfo {
    WeekInfo::for_period(period, user_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn period(from: DateTime<Utc>, to: DateTime<Utc>) -> ChartPeriod {
        ChartPeriod::new(from, to).unwrap()
    }

    fn weekly_periods(year: i32) -> Vec<ChartPeriod> {
        vec![
            period(at(year, 1, 1), at(year, 1, 8)),
            period(at(year, 1, 8), at(year, 1, 15)),
        ]
    }

    #[test]
    fn test_jan_tenth_one_year_back() {
        let periods = weekly_periods(2023);
        let selected = select_period(&periods, at(2024, 1, 10), 1).unwrap();
        assert_eq!(selected, periods[1]);
    }

    #[test]
    fn test_empty_list_is_not_available() {
        assert_eq!(select_period(&[], at(2024, 1, 10), 1), None);
    }

    #[test]
    fn test_target_before_history_is_not_available() {
        let periods = weekly_periods(2023);
        assert_eq!(select_period(&periods, at(2024, 1, 10), 5), None);
    }

    #[test]
    fn test_gap_falls_back_to_nearest_earlier() {
        let periods = vec![
            period(at(2020, 3, 1), at(2020, 3, 8)),
            period(at(2020, 3, 8), at(2020, 3, 15)),
            // Nothing recorded until April
            period(at(2020, 4, 5), at(2020, 4, 12)),
        ];
        let selected = select_period(&periods, at(2021, 3, 25), 1).unwrap();
        assert_eq!(selected, periods[1]);
    }

    #[test]
    fn test_target_after_last_period_uses_last() {
        let periods = weekly_periods(2023);
        let selected = select_period(&periods, at(2024, 6, 1), 1).unwrap();
        assert_eq!(selected, periods[1]);
    }

    #[test]
    fn test_boundary_belongs_to_later_period() {
        let periods = weekly_periods(2023);
        let boundary = at(2024, 1, 8);
        assert_eq!(select_period(&periods, boundary, 1), Some(periods[1]));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let first = period(at(2023, 1, 1), at(2023, 1, 3));
        let second = period(at(2023, 1, 1), at(2023, 1, 4));
        // Target after both ends, so neither contains it.
        let selected = select_period(&[first, second], at(2024, 1, 10), 1).unwrap();
        assert_eq!(selected, first);
    }

    #[test]
    fn test_leap_day_anchor_clamps() {
        let anchor = at(2024, 2, 29);
        let target = target_instant(anchor, 1).unwrap();
        assert_eq!((target.month(), target.day()), (2, 28));
        assert_eq!(target.year(), 2023);
    }

    #[test]
    fn test_selection_never_synthesises() {
        let periods = vec![
            period(at(2019, 5, 5), at(2019, 5, 12)),
            period(at(2019, 5, 12), at(2019, 5, 19)),
            period(at(2020, 1, 5), at(2020, 1, 12)),
        ];
        for years_back in 0..6 {
            for month in 1..=12 {
                let anchor = at(2024, month, 15);
                if let Some(selected) = select_period(&periods, anchor, years_back) {
                    assert!(periods.contains(&selected));
                }
            }
        }
    }

    #[test]
    fn test_year_range_and_navigation() {
        let periods = vec![
            period(at(2015, 6, 7), at(2015, 6, 14)),
            period(at(2023, 12, 31), at(2024, 1, 7)),
        ];
        let range = year_range(&periods);
        assert_eq!(
            range,
            Some(YearRange {
                earliest: 2015,
                latest: 2024
            })
        );

        let anchor = at(2024, 3, 1);
        assert!(!can_navigate(range, anchor, 0));
        assert!(can_navigate(range, anchor, 1));
        assert!(can_navigate(range, anchor, 9));
        assert!(!can_navigate(range, anchor, 10));
        assert!(!can_navigate(None, anchor, 1));
    }
}
