//! Imports a user's Last.fm friends as candidates for the favorites list.

use core_charts::{ChartError, ChartGateway, User, DEFAULT_FRIENDS_LIMIT};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct FriendsImporter {
    gateway: Arc<dyn ChartGateway>,
    limit: u32,
}

impl FriendsImporter {
    pub fn new(gateway: Arc<dyn ChartGateway>) -> Self {
        Self {
            gateway,
            limit: DEFAULT_FRIENDS_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Friends of `user_name`, sorted case-insensitively by name.
    #[instrument(skip(self))]
    pub async fn import(&self, user_name: &str) -> Result<Vec<User>, ChartError> {
        let mut friends = self.gateway.fetch_friends(user_name, self.limit).await?;
        friends.sort_by_cached_key(|user| user.user_name.to_lowercase());
        debug!(count = friends.len(), "Imported friends");
        Ok(friends)
    }
}

/// The imported users not already curated, compared case-insensitively.
pub fn new_friends(imported: &[User], curated: &[User]) -> Vec<User> {
    let known: HashSet<String> = curated
        .iter()
        .map(|user| user.user_name.to_lowercase())
        .collect();
    imported
        .iter()
        .filter(|user| !known.contains(&user.user_name.to_lowercase()))
        .cloned()
        .collect()
}
