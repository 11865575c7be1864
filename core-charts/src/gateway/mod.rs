//! Remote chart service boundary
//!
//! [`ChartGateway`] is the only way the pipeline talks to the scrobbling
//! service. JSON is parsed into the domain model inside the implementation;
//! nothing untyped crosses this trait.

mod lastfm;
mod responses;

pub use lastfm::LastFmGateway;

use crate::error::Result;
use crate::models::{Album, ChartEntry, ChartPeriod, User};
use async_trait::async_trait;

/// Default page size for friend imports.
pub const DEFAULT_FRIENDS_LIMIT: u32 = 500;

#[async_trait]
pub trait ChartGateway: Send + Sync {
    /// Reporting periods for a user, oldest first.
    async fn fetch_period_list(&self, user_name: &str) -> Result<Vec<ChartPeriod>>;

    /// Ranked albums for one period, in delivered order.
    async fn fetch_chart(&self, user_name: &str, period: &ChartPeriod) -> Result<Vec<ChartEntry>>;

    /// Artwork URL for an album. "Not found" is `Ok(None)`, not an error.
    async fn resolve_album_image(
        &self,
        artist_name: &str,
        album_name: &str,
    ) -> Result<Option<String>>;

    /// Profile for a user name. Unknown users are `ServiceError::NotFound`.
    async fn fetch_user(&self, user_name: &str) -> Result<User>;

    /// `album` with description, release date, play counts and images filled
    /// in. Play counts are personalised when `user_name` is given.
    async fn fetch_album_detail(&self, album: &Album, user_name: Option<&str>) -> Result<Album>;

    async fn fetch_friends(&self, user_name: &str, limit: u32) -> Result<Vec<User>>;
}
