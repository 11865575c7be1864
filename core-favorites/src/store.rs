//! # Favorites Store
//!
//! Ordered list of followed users, plus the stored preferences.
//!
//! Every mutation follows the same sequence while holding the write lock:
//!
//! 1. compute the new list on a copy;
//! 2. persist the full list;
//! 3. commit it in memory;
//! 4. publish the new content on the `watch` channel and the event bus.
//!
//! A failed save returns [`FavoritesError::Persistence`] and leaves the
//! in-memory list as it was.
//!
//! User names are compared exactly; `"RJ"` and `"rj"` are different users.

use crate::error::{FavoritesError, Result};
use crate::persistence::{FavoritesPersistence, Preferences};
use core_charts::User;
use core_runtime::events::{CoreEvent, EventBus, FavoritesEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

/// Receiver for the full favorites list after each change.
pub type FavoritesChanges = watch::Receiver<Arc<Vec<User>>>;

pub struct FavoritesStore {
    users: RwLock<Vec<User>>,
    preferences: RwLock<Preferences>,
    persistence: Arc<dyn FavoritesPersistence>,
    changes: watch::Sender<Arc<Vec<User>>>,
    events: EventBus,
}

impl FavoritesStore {
    /// Loads favorites and preferences from `persistence`.
    ///
    /// Duplicate names in stored data are dropped, keeping the first
    /// occurrence.
    #[instrument(skip_all)]
    pub async fn load(
        persistence: Arc<dyn FavoritesPersistence>,
        events: EventBus,
    ) -> Result<Self> {
        let stored = persistence.load_favorites().await?;
        let stored_len = stored.len();
        let users = dedup_by_name(stored);
        if users.len() != stored_len {
            warn!(
                dropped = stored_len - users.len(),
                "Dropped duplicate favorites from stored data"
            );
        }

        let preferences = persistence.load_preferences().await?;
        info!(count = users.len(), "Favorites loaded");

        let (changes, _) = watch::channel(Arc::new(users.clone()));
        let _ = events.emit(CoreEvent::Favorites(FavoritesEvent::Loaded {
            count: users.len(),
        }));

        Ok(Self {
            users: RwLock::new(users),
            preferences: RwLock::new(preferences),
            persistence,
            changes,
            events,
        })
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn at(&self, index: usize) -> Result<User> {
        let users = self.users.read().await;
        users
            .get(index)
            .cloned()
            .ok_or(FavoritesError::IndexOutOfBounds {
                index,
                len: users.len(),
            })
    }

    pub async fn all(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn contains(&self, user_name: &str) -> bool {
        self.users
            .read()
            .await
            .iter()
            .any(|user| user.user_name == user_name)
    }

    /// Current list without waiting on the lock.
    pub fn snapshot(&self) -> Arc<Vec<User>> {
        self.changes.borrow().clone()
    }

    /// Receives the full list after every committed change.
    pub fn subscribe(&self) -> FavoritesChanges {
        self.changes.subscribe()
    }

    /// Appends `user`. Returns its index.
    pub async fn add(&self, user: User) -> Result<usize> {
        self.mutate(|users| {
            ensure_unique(users, &user.user_name, None)?;
            let index = users.len();
            let event = FavoritesEvent::UserAdded {
                user_name: user.user_name.clone(),
                index,
            };
            users.push(user);
            Ok((index, event))
        })
        .await
    }

    /// Removes and returns the user at `index`.
    pub async fn remove_at(&self, index: usize) -> Result<User> {
        self.mutate(|users| {
            check_index(users, index)?;
            let removed = users.remove(index);
            let event = FavoritesEvent::UserRemoved {
                user_name: removed.user_name.clone(),
                index,
            };
            Ok((removed, event))
        })
        .await
    }

    /// Puts `user` at `index` and returns the user it replaced.
    ///
    /// Replacing a user with itself is allowed; taking the name of another
    /// slot is not.
    pub async fn replace_at(&self, index: usize, user: User) -> Result<User> {
        self.mutate(|users| {
            check_index(users, index)?;
            ensure_unique(users, &user.user_name, Some(index))?;
            let event = FavoritesEvent::UserReplaced {
                index,
                old_user_name: users[index].user_name.clone(),
                new_user_name: user.user_name.clone(),
            };
            let old = std::mem::replace(&mut users[index], user);
            Ok((old, event))
        })
        .await
    }

    /// Removes the user at `from` and inserts it at `to`.
    pub async fn move_at(&self, from: usize, to: usize) -> Result<()> {
        self.mutate(|users| {
            check_index(users, from)?;
            check_index(users, to)?;
            let user = users.remove(from);
            let event = FavoritesEvent::UserMoved {
                user_name: user.user_name.clone(),
                from,
                to,
            };
            users.insert(to, user);
            Ok(((), event))
        })
        .await
    }

    pub async fn preferences(&self) -> Preferences {
        self.preferences.read().await.clone()
    }

    /// Persists `preferences`, then makes them current.
    pub async fn update_preferences(&self, preferences: Preferences) -> Result<()> {
        let mut current = self.preferences.write().await;
        self.persistence.save_preferences(&preferences).await?;
        debug!(?preferences, "Preferences saved");

        let _ = self
            .events
            .emit(CoreEvent::Favorites(FavoritesEvent::PreferencesChanged {
                current_user: preferences.current_user.clone(),
                min_play_count: preferences.min_play_count,
            }));
        *current = preferences;
        Ok(())
    }

    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<User>) -> Result<(T, FavoritesEvent)>,
    {
        let mut users = self.users.write().await;
        let mut next = users.clone();
        let (output, event) = change(&mut next)?;

        if let Err(error) = self.persistence.save_favorites(&next).await {
            warn!(%error, "Failed to save favorites, keeping previous list");
            return Err(error);
        }

        *users = next;
        self.changes.send_replace(Arc::new(users.clone()));
        debug!(?event, "Favorites changed");
        let _ = self.events.emit(CoreEvent::Favorites(event));
        Ok(output)
    }
}

fn check_index(users: &[User], index: usize) -> Result<()> {
    if index < users.len() {
        Ok(())
    } else {
        Err(FavoritesError::IndexOutOfBounds {
            index,
            len: users.len(),
        })
    }
}

/// Rejects `user_name` if any slot other than `except` already holds it.
fn ensure_unique(users: &[User], user_name: &str, except: Option<usize>) -> Result<()> {
    let taken = users
        .iter()
        .enumerate()
        .any(|(i, user)| Some(i) != except && user.user_name == user_name);
    if taken {
        Err(FavoritesError::DuplicateUser(user_name.to_string()))
    } else {
        Ok(())
    }
}

fn dedup_by_name(users: Vec<User>) -> Vec<User> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|user| seen.insert(user.user_name.clone()))
        .collect()
}
