//! Chart domain records
//!
//! Every record is an immutable value snapshot. A refetch produces a new
//! value; nothing handed out by the pipeline is mutated afterwards.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scrobbling-service account.
///
/// `user_name` is the identity and is compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Lifetime scrobble count. Derived from the service; never persisted.
    #[serde(skip)]
    pub total_play_count: Option<u64>,
}

impl User {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            real_name: None,
            image_url: None,
            url: None,
            total_play_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub mbid: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub detail_loaded: bool,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            mbid: None,
            name: name.into(),
            url: None,
            detail_loaded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub image_thumb_url: Option<String>,
    pub mbid: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub artist: Artist,
    pub total_play_count: Option<u64>,
    pub user_play_count: Option<u64>,
    pub about: Option<String>,
    pub detail_loaded: bool,
}

impl Album {
    pub fn new(name: impl Into<String>, artist: Artist) -> Self {
        Self {
            name: name.into(),
            url: None,
            image_url: None,
            image_thumb_url: None,
            mbid: None,
            release_date: None,
            artist,
            total_play_count: None,
            user_play_count: None,
            about: None,
            detail_loaded: false,
        }
    }

    /// True when the album still needs an artwork lookup.
    pub fn needs_image(&self) -> bool {
        self.image_url.as_deref().map_or(true, str::is_empty)
    }
}

/// Parses the service's loosely formatted release date, e.g.
/// `"    6 Apr 1999, 00:00"`.
///
/// Anything unparseable is `None`; a bad date never fails a lookup.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(trimmed, "%e %b %Y, %H:%M")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d %b %Y"))
        .ok()
}

/// Identity of a chart period: its bounds as unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub from: i64,
    pub to: i64,
}

/// One reporting interval. Containment is half-open: `[from, to)`.
///
/// Deserializing rejects bounds that [`ChartPeriod::new`] would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PeriodBounds")]
pub struct ChartPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PeriodBounds {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TryFrom<PeriodBounds> for ChartPeriod {
    type Error = String;

    fn try_from(bounds: PeriodBounds) -> Result<Self, Self::Error> {
        ChartPeriod::new(bounds.from, bounds.to).ok_or_else(|| {
            format!(
                "chart period must end after it starts: {} .. {}",
                bounds.from, bounds.to
            )
        })
    }
}

impl ChartPeriod {
    /// Returns `None` unless `from < to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

    pub fn from_unix(from: i64, to: i64) -> Option<Self> {
        let from = Utc.timestamp_opt(from, 0).single()?;
        let to = Utc.timestamp_opt(to, 0).single()?;
        Self::new(from, to)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }

    pub fn key(&self) -> PeriodKey {
        PeriodKey {
            from: self.from.timestamp(),
            to: self.to.timestamp(),
        }
    }

    pub fn length(&self) -> chrono::Duration {
        self.to - self.from
    }
}

/// One ranked album within a fetched period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry {
    /// 1-based; strictly increasing within one fetch
    pub rank: u32,
    pub play_count: u32,
    pub album: Album,
    pub period: PeriodKey,
    pub user_name: String,
}

/// ISO week label for a period start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekInfo {
    pub week_number: u32,
    pub year: i32,
    pub user_name: String,
}

impl WeekInfo {
    pub fn for_period(period: &ChartPeriod, user_name: impl Into<String>) -> Self {
        let iso = period.from.iso_week();
        Self {
            week_number: iso.week(),
            year: iso.year(),
            user_name: user_name.into(),
        }
    }
}

impl fmt::Display for WeekInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WEEK {} of {}", self.week_number, self.year)
    }
}

/// Calendar years covered by a user's period list, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub earliest: i32,
    pub latest: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.earliest <= year && year <= self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_deserialization_checks_bounds() {
        let valid = ChartPeriod::from_unix(0, 604_800).unwrap();
        let json = serde_json::to_string(&valid).unwrap();
        assert_eq!(serde_json::from_str::<ChartPeriod>(&json).unwrap(), valid);

        let reversed = r#"{"from":"2023-01-08T00:00:00Z","to":"2023-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ChartPeriod>(reversed).is_err());

        let empty = r#"{"from":"2023-01-08T00:00:00Z","to":"2023-01-08T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ChartPeriod>(empty).is_err());
    }

    #[test]
    fn test_parse_release_date_variants() {
        let expected = NaiveDate::from_ymd_opt(1999, 4, 6);
        assert_eq!(parse_release_date("    6 Apr 1999, 00:00"), expected);
        assert_eq!(parse_release_date("06 Apr 1999"), expected);
        assert_eq!(parse_release_date(""), None);
        assert_eq!(parse_release_date("   "), None);
        assert_eq!(parse_release_date("sometime in 1999"), None);
    }

    #[test]
    fn test_period_is_half_open() {
        let period = ChartPeriod::from_unix(1_000, 2_000).unwrap();
        assert!(period.contains(Utc.timestamp_opt(1_000, 0).unwrap()));
        assert!(period.contains(Utc.timestamp_opt(1_999, 0).unwrap()));
        assert!(!period.contains(Utc.timestamp_opt(2_000, 0).unwrap()));
        assert_eq!(period.key(), PeriodKey { from: 1_000, to: 2_000 });
    }

    #[test]
    fn test_period_requires_from_before_to() {
        assert!(ChartPeriod::from_unix(2_000, 2_000).is_none());
        assert!(ChartPeriod::from_unix(2_000, 1_000).is_none());
    }

    #[test]
    fn test_week_info_label() {
        // Sunday 2 Jan 2005 belongs to ISO week 53 of 2004.
        let from = Utc.with_ymd_and_hms(2005, 1, 2, 12, 0, 0).unwrap();
        let period = ChartPeriod::new(from, from + chrono::Duration::days(7)).unwrap();
        let week = WeekInfo::for_period(&period, "rj");
        assert_eq!(week.to_string(), "WEEK 53 of 2004");

        let from = Utc.with_ymd_and_hms(2005, 1, 9, 12, 0, 0).unwrap();
        let period = ChartPeriod::new(from, from + chrono::Duration::days(7)).unwrap();
        assert_eq!(WeekInfo::for_period(&period, "rj").to_string(), "WEEK 1 of 2005");
    }

    #[test]
    fn test_user_play_count_is_not_persisted() {
        let mut user = User::new("ctrott");
        user.total_play_count = Some(12_345);
        user.real_name = Some("Chris".to_string());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("12345"));

        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_name, "ctrott");
        assert_eq!(back.real_name.as_deref(), Some("Chris"));
        assert_eq!(back.total_play_count, None);
    }

    #[test]
    fn test_needs_image() {
        let mut album = Album::new("OK Computer", Artist::new("Radiohead"));
        assert!(album.needs_image());
        album.image_url = Some(String::new());
        assert!(album.needs_image());
        album.image_url = Some("https://img/x.png".to_string());
        assert!(!album.needs_image());
    }
}
