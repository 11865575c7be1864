//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (HTTP, settings, clock) into the
//! chart pipeline and the favorites store. Desktop apps typically enable the
//! `desktop-shims` feature, which lets [`CoreConfig`] fall back to
//! `bridge-desktop` adapters for anything not injected.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .lastfm(LastFmApiConfig::from_env()?)
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! let chart = core.load_chart("rj", 1, &CancellationToken::new()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_charts::{CancellationToken, ChartResult};
pub use core_runtime::config::{CoreConfig, LastFmApiConfig};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{FileSettingsStore, ReqwestHttpClient};

use core_charts::{
    Album, ChartCache, ChartGateway, ChartOrchestrator, LastFmGateway, User, YearRange,
};
use core_favorites::{
    new_friends, FavoritesChanges, FavoritesStore, FriendsImporter, Preferences,
    SettingsPersistence,
};
use core_runtime::events::{EventBus, EventStream};
use std::sync::Arc;
use tracing::{info, instrument};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    gateway: Arc<dyn ChartGateway>,
    orchestrator: Arc<ChartOrchestrator>,
    favorites: Arc<FavoritesStore>,
    importer: Arc<FriendsImporter>,
    events: EventBus,
}

impl CoreService {
    /// Builds every component from `config`, talking to Last.fm through the
    /// configured HTTP client.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let gateway: Arc<dyn ChartGateway> = Arc::new(LastFmGateway::new(
            Arc::clone(&config.http_client),
            config.lastfm.clone(),
        ));
        Self::bootstrap_with_gateway(config, gateway).await
    }

    /// Like [`CoreService::bootstrap`], with a caller-supplied gateway.
    #[instrument(skip_all)]
    pub async fn bootstrap_with_gateway(
        config: CoreConfig,
        gateway: Arc<dyn ChartGateway>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.charts.event_buffer_size);
        let orchestrator = ChartOrchestrator::new(
            Arc::clone(&gateway),
            Arc::new(ChartCache::new()),
            Arc::clone(&config.clock),
            events.clone(),
            &config.charts,
        );

        let persistence = Arc::new(SettingsPersistence::new(Arc::clone(
            &config.settings_store,
        )));
        let favorites = FavoritesStore::load(persistence, events.clone()).await?;
        let importer = FriendsImporter::new(Arc::clone(&gateway));

        info!(
            favorites = favorites.count().await,
            max_lookups = config.charts.max_concurrent_image_lookups,
            "Core service ready"
        );

        Ok(Self {
            gateway,
            orchestrator: Arc::new(orchestrator),
            favorites: Arc::new(favorites),
            importer: Arc::new(importer),
            events,
        })
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn orchestrator(&self) -> &Arc<ChartOrchestrator> {
        &self.orchestrator
    }

    // ------------------------------------------------------------------
    // Charts
    // ------------------------------------------------------------------

    /// Chart for `user_name`, filtered by the stored minimum play count.
    pub async fn load_chart(
        &self,
        user_name: &str,
        years_back: u32,
        cancel: &CancellationToken,
    ) -> Result<ChartResult> {
        let min_play_count = self.favorites.preferences().await.min_play_count;
        Ok(self
            .orchestrator
            .get_chart(user_name, years_back, min_play_count, cancel)
            .await)
    }

    /// Chart for the stored current user.
    pub async fn load_current_user_chart(
        &self,
        years_back: u32,
        cancel: &CancellationToken,
    ) -> Result<ChartResult> {
        let user_name = self.current_user().await?;
        self.load_chart(&user_name, years_back, cancel).await
    }

    pub async fn available_years(
        &self,
        user_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<YearRange>> {
        Ok(self.orchestrator.available_years(user_name, cancel).await?)
    }

    pub async fn can_navigate(
        &self,
        user_name: &str,
        years_back: u32,
        cancel: &CancellationToken,
    ) -> bool {
        self.orchestrator
            .can_navigate(user_name, years_back, cancel)
            .await
    }

    pub async fn album_detail(&self, album: &Album, user_name: Option<&str>) -> Result<Album> {
        Ok(self.orchestrator.album_detail(album, user_name).await?)
    }

    // ------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------

    pub async fn favorites(&self) -> Vec<User> {
        self.favorites.all().await
    }

    pub fn subscribe_favorites(&self) -> FavoritesChanges {
        self.favorites.subscribe()
    }

    /// Looks `user_name` up on Last.fm and appends the returned profile.
    #[instrument(skip(self))]
    pub async fn add_favorite(&self, user_name: &str) -> Result<User> {
        let user = self.gateway.fetch_user(user_name).await?;
        self.favorites.add(user.clone()).await?;
        Ok(user)
    }

    /// Removes the favorite at `index` and drops its cached charts.
    #[instrument(skip(self))]
    pub async fn remove_favorite(&self, index: usize) -> Result<User> {
        let removed = self.favorites.remove_at(index).await?;
        self.orchestrator.invalidate(&removed.user_name).await;
        Ok(removed)
    }

    /// Replaces the favorite at `index` with the Last.fm profile for
    /// `user_name`.
    pub async fn replace_favorite(&self, index: usize, user_name: &str) -> Result<User> {
        let user = self.gateway.fetch_user(user_name).await?;
        let old = self.favorites.replace_at(index, user.clone()).await?;
        if old.user_name != user.user_name {
            self.orchestrator.invalidate(&old.user_name).await;
        }
        Ok(user)
    }

    pub async fn move_favorite(&self, from: usize, to: usize) -> Result<()> {
        Ok(self.favorites.move_at(from, to).await?)
    }

    /// Friends of `user_name` that are not curated yet.
    pub async fn import_friends(&self, user_name: &str) -> Result<Vec<User>> {
        let imported = self.importer.import(user_name).await?;
        let curated = self.favorites.all().await;
        Ok(new_friends(&imported, &curated))
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    pub async fn preferences(&self) -> Preferences {
        self.favorites.preferences().await
    }

    pub async fn current_user(&self) -> Result<String> {
        self.favorites
            .preferences()
            .await
            .current_user
            .ok_or(CoreError::NoCurrentUser)
    }

    /// Validates `user_name` against Last.fm and stores it as the current
    /// user.
    pub async fn set_current_user(&self, user_name: &str) -> Result<User> {
        let user = self.gateway.fetch_user(user_name).await?;
        let mut preferences = self.favorites.preferences().await;
        preferences.current_user = Some(user.user_name.clone());
        self.favorites.update_preferences(preferences).await?;
        Ok(user)
    }

    pub async fn set_min_play_count(&self, min_play_count: u32) -> Result<()> {
        let mut preferences = self.favorites.preferences().await;
        preferences.min_play_count = min_play_count;
        Ok(self.favorites.update_preferences(preferences).await?)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Reads the API key from `LASTFM_API_KEY`, stores settings in the platform
/// data directory and talks to Last.fm through reqwest.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop() -> Result<CoreService> {
    let config = CoreConfig::builder()
        .lastfm(LastFmApiConfig::from_env()?)
        .build()?;
    CoreService::bootstrap(config).await
}
