//! Durable storage for the favorites list and the user's preferences.
//!
//! The store never talks to disk itself; it goes through
//! [`FavoritesPersistence`]. [`SettingsPersistence`] implements it on top of
//! the host's key-value [`SettingsStore`]:
//!
//! | Key | Type | Content |
//! |---|---|---|
//! | `curated_friends` | string | JSON array of users |
//! | `preferences` | string | JSON object: `current_user`, `min_play_count` |
//!
//! Preferences live under one key so a save lands whole or not at all.

use crate::error::{FavoritesError, Result};
use async_trait::async_trait;
use bridge_traits::storage::SettingsStore;
use core_charts::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const FAVORITES_KEY: &str = "curated_friends";
pub const PREFERENCES_KEY: &str = "preferences";

pub const DEFAULT_MIN_PLAY_COUNT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub current_user: Option<String>,
    pub min_play_count: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            current_user: None,
            min_play_count: DEFAULT_MIN_PLAY_COUNT,
        }
    }
}

#[async_trait]
pub trait FavoritesPersistence: Send + Sync {
    /// Persisted favorites in stored order. Nothing stored yet is an empty
    /// list.
    async fn load_favorites(&self) -> Result<Vec<User>>;

    /// Replaces the stored list with `users`.
    async fn save_favorites(&self, users: &[User]) -> Result<()>;

    async fn load_preferences(&self) -> Result<Preferences>;

    async fn save_preferences(&self, preferences: &Preferences) -> Result<()>;
}

/// Stored form of [`Preferences`], lenient about values written by hand or by
/// older builds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredPreferences {
    #[serde(default)]
    current_user: Option<String>,
    #[serde(default)]
    min_play_count: Option<i64>,
}

impl From<StoredPreferences> for Preferences {
    fn from(stored: StoredPreferences) -> Self {
        let min_play_count = match stored.min_play_count {
            Some(value) => u32::try_from(value).unwrap_or_else(|_| {
                warn!(value, "Ignoring out-of-range play count filter");
                DEFAULT_MIN_PLAY_COUNT
            }),
            None => DEFAULT_MIN_PLAY_COUNT,
        };
        Preferences {
            current_user: stored
                .current_user
                .filter(|name| !name.trim().is_empty()),
            min_play_count,
        }
    }
}

impl From<&Preferences> for StoredPreferences {
    fn from(preferences: &Preferences) -> Self {
        StoredPreferences {
            current_user: preferences.current_user.clone(),
            min_play_count: Some(i64::from(preferences.min_play_count)),
        }
    }
}

/// [`FavoritesPersistence`] backed by a [`SettingsStore`].
pub struct SettingsPersistence {
    store: Arc<dyn SettingsStore>,
}

impl SettingsPersistence {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FavoritesPersistence for SettingsPersistence {
    async fn load_favorites(&self) -> Result<Vec<User>> {
        let Some(raw) = self.store.get_string(FAVORITES_KEY).await? else {
            return Ok(Vec::new());
        };
        let users: Vec<User> = serde_json::from_str(&raw)?;
        debug!(count = users.len(), "Loaded favorites");
        Ok(users)
    }

    async fn save_favorites(&self, users: &[User]) -> Result<()> {
        let raw = serde_json::to_string(users)?;
        self.store.set_string(FAVORITES_KEY, &raw).await?;
        Ok(())
    }

    /// Unreadable stored preferences fall back to the defaults.
    async fn load_preferences(&self) -> Result<Preferences> {
        let Some(raw) = self.store.get_string(PREFERENCES_KEY).await? else {
            return Ok(Preferences::default());
        };
        let stored = serde_json::from_str::<StoredPreferences>(&raw).unwrap_or_else(|error| {
            warn!(%error, "Ignoring unreadable stored preferences");
            StoredPreferences::default()
        });
        Ok(stored.into())
    }

    async fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let raw = serde_json::to_string(&StoredPreferences::from(preferences))?;
        self.store
            .set_string(PREFERENCES_KEY, &raw)
            .await
            .map_err(FavoritesError::from)
    }
}
