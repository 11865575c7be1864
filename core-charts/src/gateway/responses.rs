//! Wire shapes of the Last.fm JSON API.
//!
//! These never leave the gateway. Last.fm sends numbers as strings, empty
//! strings for missing values, and collapses one-element arrays into a bare
//! object; the helpers here absorb all three.

use crate::models::{parse_release_date, Album, Artist, ChartEntry, ChartPeriod, PeriodKey, User};
use serde::{Deserialize, Deserializer};

/// `{"error": 6, "message": "User not found"}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: i32,
    #[serde(default)]
    pub message: String,
}

/// A number that may arrive as a JSON number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Lenient {
    Number(i64),
    Text(String),
}

impl Lenient {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Lenient::Number(n) => Some(*n),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|n| u64::try_from(n).ok())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
        None => Vec::new(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawImage {
    #[serde(rename = "#text", default)]
    pub url: String,
    #[serde(default)]
    pub size: String,
}

/// Largest image: the last non-empty entry.
pub(crate) fn largest_image(images: &[RawImage]) -> Option<String> {
    images
        .iter()
        .rev()
        .map(|image| image.url.trim())
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

/// The "large" entry when present, otherwise the first non-empty one.
pub(crate) fn thumbnail_image(images: &[RawImage]) -> Option<String> {
    images
        .iter()
        .find(|image| image.size == "large" && !image.url.trim().is_empty())
        .or_else(|| images.iter().find(|image| !image.url.trim().is_empty()))
        .map(|image| image.url.trim().to_string())
}

// ============================================================================
// user.getweeklychartlist
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct WeeklyChartListResponse {
    pub weeklychartlist: WeeklyChartList,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WeeklyChartList {
    #[serde(default, deserialize_with = "one_or_many")]
    pub chart: Vec<RawPeriod>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPeriod {
    pub from: Lenient,
    pub to: Lenient,
}

impl WeeklyChartListResponse {
    /// Periods with unreadable or inverted bounds are dropped.
    pub fn into_periods(self) -> Vec<ChartPeriod> {
        self.weeklychartlist
            .chart
            .into_iter()
            .filter_map(|raw| ChartPeriod::from_unix(raw.from.as_i64()?, raw.to.as_i64()?))
            .collect()
    }
}

// ============================================================================
// user.getweeklyalbumchart
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct WeeklyAlbumChartResponse {
    pub weeklyalbumchart: WeeklyAlbumChart,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WeeklyAlbumChart {
    #[serde(default, deserialize_with = "one_or_many")]
    pub album: Vec<RawChartAlbum>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawChartArtist {
    #[serde(rename = "#text", alias = "name", default)]
    pub name: String,
    #[serde(default)]
    pub mbid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RankAttr {
    pub rank: Lenient,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawChartAlbum {
    pub artist: RawChartArtist,
    #[serde(default)]
    pub mbid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub playcount: Option<Lenient>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rank: Option<Lenient>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<RankAttr>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub image: Vec<RawImage>,
}

impl WeeklyAlbumChartResponse {
    /// Entries in delivered order. A missing rank falls back to position.
    pub fn into_entries(self, user_name: &str, period: PeriodKey) -> Vec<ChartEntry> {
        self.weeklyalbumchart
            .album
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let rank = raw
                    .attr
                    .as_ref()
                    .map(|attr| &attr.rank)
                    .or(raw.rank.as_ref())
                    .and_then(Lenient::as_u64)
                    .and_then(|rank| u32::try_from(rank).ok())
                    .unwrap_or(index as u32 + 1);

                let play_count = raw
                    .playcount
                    .as_ref()
                    .and_then(Lenient::as_u64)
                    .map(|count| count.min(u32::MAX as u64) as u32)
                    .unwrap_or(0);

                let artist = Artist {
                    mbid: non_empty(raw.artist.mbid),
                    name: raw.artist.name,
                    url: non_empty(raw.artist.url),
                    detail_loaded: false,
                };

                let mut album = Album::new(raw.name, artist);
                album.url = non_empty(raw.url);
                album.mbid = non_empty(raw.mbid);
                album.image_url = largest_image(&raw.image);
                album.image_thumb_url = thumbnail_image(&raw.image);

                ChartEntry {
                    rank,
                    play_count,
                    album,
                    period,
                    user_name: user_name.to_string(),
                }
            })
            .collect()
    }
}

// ============================================================================
// album.getinfo
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct AlbumInfoResponse {
    pub album: RawAlbumInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawWiki {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbumInfo {
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub mbid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub image: Vec<RawImage>,
    #[serde(default)]
    pub playcount: Option<Lenient>,
    #[serde(default)]
    pub userplaycount: Option<Lenient>,
    #[serde(default)]
    pub releasedate: Option<String>,
    #[serde(default)]
    pub wiki: Option<RawWiki>,
}

impl RawAlbumInfo {
    pub fn image_url(&self) -> Option<String> {
        largest_image(&self.image)
    }

    /// Merges the detail into `stub`, keeping what the stub already knew
    /// when the service leaves a field blank.
    pub fn merge_into(self, stub: &Album) -> Album {
        let mut album = stub.clone();
        album.image_url = largest_image(&self.image).or(album.image_url);
        album.image_thumb_url = thumbnail_image(&self.image).or(album.image_thumb_url);
        album.url = non_empty(self.url).or(album.url);
        album.mbid = non_empty(self.mbid).or(album.mbid);
        album.release_date = self
            .releasedate
            .as_deref()
            .and_then(parse_release_date)
            .or(album.release_date);
        album.total_play_count = self
            .playcount
            .as_ref()
            .and_then(Lenient::as_u64)
            .or(album.total_play_count);
        album.user_play_count = self
            .userplaycount
            .as_ref()
            .and_then(Lenient::as_u64)
            .or(album.user_play_count);
        album.about = self
            .wiki
            .and_then(|wiki| non_empty(wiki.content).or(non_empty(wiki.summary)))
            .or(album.about);
        if album.name.is_empty() {
            album.name = self.name;
        }
        if album.artist.name.is_empty() {
            album.artist.name = self.artist;
        }
        album.detail_loaded = true;
        album
    }
}

// ============================================================================
// user.getinfo / user.getfriends
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoResponse {
    pub user: RawUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FriendsResponse {
    pub friends: RawFriends,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFriends {
    #[serde(default, deserialize_with = "one_or_many")]
    pub user: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub name: String,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub image: Vec<RawImage>,
    #[serde(default)]
    pub playcount: Option<Lenient>,
}

impl From<RawUser> for User {
    fn from(raw: RawUser) -> Self {
        User {
            image_url: largest_image(&raw.image),
            user_name: raw.name,
            real_name: non_empty(raw.realname),
            url: non_empty(raw.url),
            total_play_count: raw.playcount.as_ref().and_then(Lenient::as_u64),
        }
    }
}
