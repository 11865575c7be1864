//! # Favorites
//!
//! The curated list of Last.fm users whose charts can be browsed, the stored
//! preferences, and importing friends as candidates.
//!
//! - [`FavoritesStore`] - ordered, de-duplicated list with change notification
//! - [`FavoritesPersistence`] - where the list and preferences are kept;
//!   [`SettingsPersistence`] stores them in the host [`SettingsStore`](bridge_traits::SettingsStore)
//! - [`FriendsImporter`] - fetches friends through the chart gateway

pub mod error;
pub mod friends;
pub mod persistence;
pub mod store;

pub use error::{FavoritesError, Result};
pub use friends::{new_friends, FriendsImporter};
pub use persistence::{FavoritesPersistence, Preferences, SettingsPersistence};
pub use store::{FavoritesChanges, FavoritesStore};
