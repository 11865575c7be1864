use async_trait::async_trait;
use bridge_desktop::FileSettingsStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::FixedClock;
use chrono::{TimeZone, Utc};
use core_charts::{
    Album, Artist, ChartEntry, ChartError, ChartGateway, ChartPeriod, ChartResult, User,
};
use core_runtime::config::ChartSettings;
use core_runtime::events::{ChartEvent, CoreEvent};
use core_service::{CancellationToken, CoreConfig, CoreError, CoreService, LastFmApiConfig};
use mockall::mock;
use std::sync::Arc;

mock! {
    pub Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn execute_with_retry(
            &self,
            request: HttpRequest,
            policy: RetryPolicy,
        ) -> BridgeResult<HttpResponse>;
    }
}

/// Knows a fixed set of users, each with the same one-week chart.
struct FakeGateway {
    known_users: Vec<&'static str>,
    friends: Vec<&'static str>,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            known_users: vec!["rj", "ex", "ana", "bob"],
            friends: vec!["bob", "ex", "Zed"],
        }
    }

    fn period() -> ChartPeriod {
        ChartPeriod::new(
            Utc.with_ymd_and_hms(2023, 1, 8, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }
}

#[async_trait]
impl ChartGateway for FakeGateway {
    async fn fetch_period_list(&self, _user_name: &str) -> core_charts::Result<Vec<ChartPeriod>> {
        Ok(vec![Self::period()])
    }

    async fn fetch_chart(
        &self,
        user_name: &str,
        period: &ChartPeriod,
    ) -> core_charts::Result<Vec<ChartEntry>> {
        Ok([9u32, 4, 1]
            .iter()
            .enumerate()
            .map(|(i, &play_count)| {
                let mut album = Album::new(format!("Album {}", i + 1), Artist::new("Artist"));
                album.image_url = Some("https://img.example/a.png".to_string());
                ChartEntry {
                    rank: i as u32 + 1,
                    play_count,
                    album,
                    period: period.key(),
                    user_name: user_name.to_string(),
                }
            })
            .collect())
    }

    async fn resolve_album_image(
        &self,
        _artist_name: &str,
        _album_name: &str,
    ) -> core_charts::Result<Option<String>> {
        Ok(None)
    }

    async fn fetch_user(&self, user_name: &str) -> core_charts::Result<User> {
        if !self.known_users.contains(&user_name) {
            return Err(ChartError::not_found("User not found"));
        }
        let mut user = User::new(user_name);
        user.real_name = Some(format!("{} (real)", user_name));
        Ok(user)
    }

    async fn fetch_album_detail(
        &self,
        album: &Album,
        _user_name: Option<&str>,
    ) -> core_charts::Result<Album> {
        Ok(album.clone())
    }

    async fn fetch_friends(&self, _user_name: &str, _limit: u32) -> core_charts::Result<Vec<User>> {
        Ok(self.friends.iter().map(|name| User::new(*name)).collect())
    }
}

fn config(store: Arc<dyn SettingsStore>) -> CoreConfig {
    CoreConfig::builder()
        .http_client(Arc::new(MockHttp::new()))
        .settings_store(store)
        .clock(Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap(),
        )))
        .lastfm(LastFmApiConfig::new("test-key"))
        .charts(ChartSettings::default())
        .build()
        .unwrap()
}

async fn service_with(store: Arc<dyn SettingsStore>) -> CoreService {
    CoreService::bootstrap_with_gateway(config(store), Arc::new(FakeGateway::new()))
        .await
        .unwrap()
}

async fn service() -> CoreService {
    service_with(Arc::new(FileSettingsStore::in_memory())).await
}

#[tokio::test]
async fn test_fresh_bootstrap() {
    let core = service().await;
    assert!(core.favorites().await.is_empty());
    assert_eq!(core.preferences().await.min_play_count, 1);
    assert!(matches!(
        core.current_user().await,
        Err(CoreError::NoCurrentUser)
    ));
}

#[tokio::test]
async fn test_invalid_api_key_fails_bootstrap() {
    let mut config = config(Arc::new(FileSettingsStore::in_memory()));
    config.lastfm.api_key = String::new();

    let result = CoreService::bootstrap_with_gateway(config, Arc::new(FakeGateway::new())).await;
    assert!(matches!(result, Err(CoreError::Runtime(_))));
}

#[tokio::test]
async fn test_add_favorite_validates_user() {
    let core = service().await;

    let err = core.add_favorite("ghost").await.unwrap_err();
    assert!(matches!(err, CoreError::Chart(ref e) if e.is_not_found()));
    assert!(core.favorites().await.is_empty());

    let added = core.add_favorite("ex").await.unwrap();
    assert_eq!(added.real_name.as_deref(), Some("ex (real)"));

    let duplicate = core.add_favorite("ex").await.unwrap_err();
    assert!(matches!(duplicate, CoreError::Favorites(_)));
    assert_eq!(core.favorites().await.len(), 1);
}

#[tokio::test]
async fn test_favorites_survive_restart() {
    let store: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::in_memory());

    let core = service_with(Arc::clone(&store)).await;
    core.add_favorite("ex").await.unwrap();
    core.add_favorite("ana").await.unwrap();
    core.move_favorite(1, 0).await.unwrap();
    core.set_current_user("rj").await.unwrap();
    core.set_min_play_count(3).await.unwrap();
    drop(core);

    let restarted = service_with(store).await;
    let names: Vec<String> = restarted
        .favorites()
        .await
        .into_iter()
        .map(|u| u.user_name)
        .collect();
    assert_eq!(names, vec!["ana", "ex"]);
    assert_eq!(restarted.current_user().await.unwrap(), "rj");
    assert_eq!(restarted.preferences().await.min_play_count, 3);
}

#[tokio::test]
async fn test_chart_uses_stored_play_count_filter() {
    let core = service().await;
    let token = CancellationToken::new();

    core.set_min_play_count(4).await.unwrap();
    let result = core.load_chart("rj", 1, &token).await.unwrap();

    let page = result.page().expect("chart page");
    let counts: Vec<u32> = page.entries.iter().map(|e| e.play_count).collect();
    assert_eq!(counts, vec![9, 4]);
}

#[tokio::test]
async fn test_current_user_chart() {
    let core = service().await;
    let token = CancellationToken::new();

    assert!(matches!(
        core.load_current_user_chart(1, &token).await,
        Err(CoreError::NoCurrentUser)
    ));

    core.set_current_user("rj").await.unwrap();
    let result = core.load_current_user_chart(1, &token).await.unwrap();
    assert!(matches!(result, ChartResult::Success(_)));
    assert!(core.can_navigate("rj", 1, &token).await);
    assert!(!core.can_navigate("rj", 2, &token).await);
}

#[tokio::test]
async fn test_remove_favorite_invalidates_cached_charts() {
    let core = service().await;
    let token = CancellationToken::new();
    core.add_favorite("ex").await.unwrap();
    core.load_chart("ex", 1, &token).await.unwrap();
    assert_eq!(core.orchestrator().cache().len().await, 1);

    let mut events = core
        .subscribe_events()
        .filter(|event| matches!(event, CoreEvent::Chart(_)));
    let removed = core.remove_favorite(0).await.unwrap();

    assert_eq!(removed.user_name, "ex");
    assert!(core.orchestrator().cache().is_empty().await);
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Chart(ChartEvent::CacheInvalidated {
            user_name: "ex".to_string()
        })
    );
}

#[tokio::test]
async fn test_import_friends_skips_curated() {
    let core = service().await;
    core.add_favorite("bob").await.unwrap();

    let candidates = core.import_friends("rj").await.unwrap();

    let names: Vec<&str> = candidates.iter().map(|u| u.user_name.as_str()).collect();
    assert_eq!(names, vec!["ex", "Zed"]);
}
