//! Last.fm gateway against a mocked HTTP bridge.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::BridgeError;
use core_charts::{
    Album, Artist, ChartError, ChartGateway, ChartPeriod, LastFmGateway, ServiceError,
};
use core_runtime::config::LastFmApiConfig;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

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

const PERIODS: &str = r##"{"weeklychartlist":{"chart":[
    {"#text":"","from":"1104580800","to":"1105185600"},
    {"#text":"","from":"1105185600","to":"1105790400"}
],"@attr":{"user":"rj"}}}"##;

const CHART: &str = r##"{"weeklyalbumchart":{"album":
    {"artist":{"mbid":"","#text":"Sigur Rós"},"name":"( )","@attr":{"rank":"1"},"playcount":"12"},
"@attr":{"user":"rj","from":"1104580800","to":"1105185600"}}}"##;

const ALBUM_INFO: &str = r##"{"album":{"name":"Kid A","artist":"Radiohead","mbid":"b1392450",
    "image":[{"#text":"m.png","size":"medium"},{"#text":"xl.png","size":"extralarge"}],
    "playcount":"900","userplaycount":"31","releasedate":"    2 Oct 2000, 00:00",
    "wiki":{"summary":"Fourth album."}}}"##;

const NOT_FOUND: &str = r#"{"error":6,"message":"Album not found"}"#;

fn config() -> LastFmApiConfig {
    LastFmApiConfig::new("test-key").with_rate_limit_delay_ms(0)
}

fn gateway(http: MockHttp) -> LastFmGateway {
    LastFmGateway::new(Arc::new(http), config())
}

#[tokio::test]
async fn test_period_list_request_and_parse() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .withf(|request, policy| {
            request.url.contains("method=user.getweeklychartlist")
                && request.url.contains("user=rj")
                && request.url.contains("api_key=test-key")
                && request.url.contains("format=json")
                && request.timeout == Some(Duration::from_secs(15))
                && policy.max_attempts == 1
        })
        .times(1)
        .returning(|_, _| Ok(HttpResponse::new(200, PERIODS)));

    let periods = gateway(http).fetch_period_list("rj").await.unwrap();

    assert_eq!(periods.len(), 2);
    assert_eq!(periods[0].key().from, 1_104_580_800);
    assert_eq!(periods[1].key().to, 1_105_790_400);
}

#[tokio::test]
async fn test_chart_accepts_single_album_object() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .withf(|request, _| {
            request.url.contains("method=user.getweeklyalbumchart")
                && request.url.contains("from=1104580800")
                && request.url.contains("to=1105185600")
        })
        .times(1)
        .returning(|_, _| Ok(HttpResponse::new(200, CHART)));

    let period = ChartPeriod::from_unix(1_104_580_800, 1_105_185_600).unwrap();
    let entries = gateway(http).fetch_chart("rj", &period).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].rank, 1);
    assert_eq!(entries[0].play_count, 12);
    assert_eq!(entries[0].album.artist.name, "Sigur Rós");
    assert_eq!(entries[0].album.name, "( )");
    assert!(entries[0].album.needs_image());
}

#[tokio::test]
async fn test_unknown_album_image_is_none() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .returning(|_, _| Ok(HttpResponse::new(200, NOT_FOUND)));

    let image = gateway(http)
        .resolve_album_image("Nobody", "Nothing")
        .await
        .unwrap();
    assert_eq!(image, None);
}

#[tokio::test]
async fn test_album_image_resolves_largest() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .withf(|request, _| {
            request.url.contains("method=album.getinfo")
                && request.url.contains("artist=Radiohead")
                && request.url.contains("album=Kid%20A")
        })
        .returning(|_, _| Ok(HttpResponse::new(200, ALBUM_INFO)));

    let image = gateway(http)
        .resolve_album_image("Radiohead", "Kid A")
        .await
        .unwrap();
    assert_eq!(image.as_deref(), Some("xl.png"));
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry().returning(|_, _| {
        Ok(HttpResponse::new(
            200,
            r#"{"error":6,"message":"User not found"}"#,
        ))
    });

    let err = gateway(http).fetch_user("ghost").await.unwrap_err();
    assert_eq!(err, ChartError::not_found("User not found"));
}

#[tokio::test]
async fn test_rate_limit_code_maps_to_rate_limited() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry().returning(|_, _| {
        Ok(HttpResponse::new(
            200,
            r#"{"error":29,"message":"Rate limit exceeded"}"#,
        ))
    });

    let err = gateway(http).fetch_user("rj").await.unwrap_err();
    assert!(matches!(
        err,
        ChartError::Service(ServiceError::RateLimited { .. })
    ));
}

#[tokio::test]
async fn test_connection_failure_is_transport() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .returning(|_, _| Err(BridgeError::ConnectionFailed("refused".to_string())));

    let err = gateway(http).fetch_period_list("rj").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_album_detail_falls_back_from_stale_mbid() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .withf(|request, _| request.url.contains("mbid=stale"))
        .times(1)
        .returning(|_, _| Ok(HttpResponse::new(200, NOT_FOUND)));
    http.expect_execute_with_retry()
        .withf(|request, _| {
            !request.url.contains("mbid=")
                && request.url.contains("artist=Radiohead")
                && request.url.contains("username=rj")
        })
        .times(1)
        .returning(|_, _| Ok(HttpResponse::new(200, ALBUM_INFO)));

    let mut stub = Album::new("Kid A", Artist::new("Radiohead"));
    stub.mbid = Some("stale".to_string());

    let album = gateway(http)
        .fetch_album_detail(&stub, Some("rj"))
        .await
        .unwrap();

    assert!(album.detail_loaded);
    assert_eq!(album.user_play_count, Some(31));
    assert_eq!(album.about.as_deref(), Some("Fourth album."));
    assert_eq!(album.mbid.as_deref(), Some("b1392450"));
}

#[tokio::test]
async fn test_friends_list() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .withf(|request, _| {
            request.url.contains("method=user.getfriends") && request.url.contains("limit=500")
        })
        .returning(|_, _| {
            Ok(HttpResponse::new(
                200,
                r##"{"friends":{"user":[{"name":"ex"},{"name":"Ana","realname":"Ana M"}]}}"##,
            ))
        });

    let friends = gateway(http)
        .fetch_friends("rj", core_charts::DEFAULT_FRIENDS_LIMIT)
        .await
        .unwrap();

    let names: Vec<&str> = friends.iter().map(|u| u.user_name.as_str()).collect();
    assert_eq!(names, vec!["ex", "Ana"]);
    assert_eq!(friends[1].real_name.as_deref(), Some("Ana M"));
}

/// Never answers, regardless of the request's own timeout.
struct HangingClient;

#[async_trait]
impl HttpClient for HangingClient {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(HttpResponse::new(200, "{}"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_backstop_reports_transport() {
    let config = config().with_request_timeout(Duration::from_millis(200));
    let gateway = LastFmGateway::new(Arc::new(HangingClient), config);

    let err = gateway.fetch_user("rj").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_spaced_out() {
    let mut http = MockHttp::new();
    http.expect_execute_with_retry()
        .times(2)
        .returning(|_, _| Ok(HttpResponse::new(200, PERIODS)));
    let gateway = LastFmGateway::new(
        Arc::new(http),
        LastFmApiConfig::new("test-key").with_rate_limit_delay_ms(250),
    );

    let started = tokio::time::Instant::now();
    gateway.fetch_period_list("rj").await.unwrap();
    gateway.fetch_period_list("rj").await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(250));
}
