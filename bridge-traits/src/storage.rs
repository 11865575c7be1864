//! Key-value settings storage
//!
//! The favorites list and the user preferences are persisted through this
//! trait. The core only relies on values round-tripping; the medium is up to
//! the host.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences/settings storage:
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: JSON file in the user data directory
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("current_user", "ctrott").await?;
///     store.set_i64("play_count_filter", 2).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}
