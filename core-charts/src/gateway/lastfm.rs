//! Last.fm API Client
//!
//! ## API Methods
//!
//! | Operation | Method |
//! |---|---|
//! | period list | `user.getweeklychartlist` |
//! | weekly chart | `user.getweeklyalbumchart` (`from`/`to` in unix seconds) |
//! | artwork, album detail | `album.getinfo` |
//! | user profile | `user.getinfo` |
//! | friends | `user.getfriends` |
//!
//! ## Errors
//!
//! Last.fm reports failures as `{"error": <code>, "message": ...}`, sometimes
//! with HTTP 200. Code 6 maps to `NotFound`, code 29 (and HTTP 429) to
//! `RateLimited`, every other code to `ServiceError::Other`. A request that
//! never gets an answer, including one that outlives the configured timeout,
//! is `ChartError::Transport`.
//!
//! Nothing is retried here; requests go out with `RetryPolicy::no_retry()`.

use super::responses::{
    AlbumInfoResponse, ErrorResponse, FriendsResponse, UserInfoResponse,
    WeeklyAlbumChartResponse, WeeklyChartListResponse,
};
use super::ChartGateway;
use crate::error::{ChartError, Result, ServiceError};
use crate::models::{Album, ChartEntry, ChartPeriod, User};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::LastFmApiConfig;
use core_runtime::logging::redact_if_sensitive;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

const ERROR_NOT_FOUND: i32 = 6;
const ERROR_RATE_LIMITED: i32 = 29;

/// Code reported for responses that are not valid JSON of the expected shape.
pub const MALFORMED_RESPONSE_CODE: i32 = 0;

/// Simple rate limiter to enforce delay between request starts
struct RateLimiter {
    last_request: Option<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(delay_ms: u64) -> Self {
        Self {
            last_request: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

/// [`ChartGateway`] backed by the Last.fm web service.
pub struct LastFmGateway {
    http_client: Arc<dyn HttpClient>,
    config: LastFmApiConfig,
    rate_limiter: Mutex<RateLimiter>,
}

impl LastFmGateway {
    pub fn new(http_client: Arc<dyn HttpClient>, config: LastFmApiConfig) -> Self {
        let rate_limiter = Mutex::new(RateLimiter::new(config.rate_limit_delay_ms));
        Self {
            http_client,
            config,
            rate_limiter,
        }
    }

    fn build_url(&self, method: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}?method={}&api_key={}&format=json",
            self.config.base_url,
            method,
            urlencoding::encode(&self.config.api_key)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[(&str, String)],
    ) -> Result<T> {
        if self.config.rate_limit_delay_ms > 0 {
            self.rate_limiter.lock().await.wait_if_needed().await;
        }

        let url = self.build_url(method, params);
        let timeout = self.config.request_timeout;
        debug!(method, url = %redact_if_sensitive("url", &url), "Calling Last.fm");

        let request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .header("User-Agent", self.config.user_agent.clone())
            .timeout(timeout);

        // The request carries the deadline too; this backstops clients that
        // ignore it.
        let response = match tokio::time::timeout(
            timeout,
            self.http_client
                .execute_with_retry(request, RetryPolicy::no_retry()),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(method, error = %e, "Last.fm request failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(method, timeout_ms = timeout.as_millis() as u64, "Last.fm request timed out");
                return Err(ChartError::Transport(format!(
                    "{} timed out after {:?}",
                    method, timeout
                )));
            }
        };

        decode_response(method, &response)
    }
}

fn retry_after_seconds(response: &HttpResponse) -> Option<u64> {
    response
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn map_service_error(error: ErrorResponse) -> ChartError {
    let service_error = match error.error {
        ERROR_NOT_FOUND => ServiceError::NotFound(error.message),
        ERROR_RATE_LIMITED => ServiceError::RateLimited {
            retry_after_seconds: None,
        },
        code => ServiceError::Other {
            code,
            message: error.message,
        },
    };
    ChartError::Service(service_error)
}

fn decode_response<T: DeserializeOwned>(method: &str, response: &HttpResponse) -> Result<T> {
    if response.status == 429 {
        return Err(ChartError::Service(ServiceError::RateLimited {
            retry_after_seconds: retry_after_seconds(response),
        }));
    }

    // Error envelopes arrive with 200 as well as 4xx/5xx.
    if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&response.body) {
        debug!(method, code = error.error, message = %error.message, "Last.fm error response");
        return Err(map_service_error(error));
    }

    if !response.is_success() {
        return Err(ChartError::other(
            i32::from(response.status),
            format!("{} returned HTTP {}", method, response.status),
        ));
    }

    serde_json::from_slice(&response.body).map_err(|e| {
        warn!(method, error = %e, "Malformed Last.fm response");
        ChartError::other(
            MALFORMED_RESPONSE_CODE,
            format!("Malformed {} response: {}", method, e),
        )
    })
}

fn album_lookup_params(album: &Album, by_mbid: bool) -> Vec<(&'static str, String)> {
    match album.mbid.as_deref() {
        Some(mbid) if by_mbid && !mbid.is_empty() => vec![("mbid", mbid.to_string())],
        _ => vec![
            ("artist", album.artist.name.clone()),
            ("album", album.name.clone()),
        ],
    }
}

#[async_trait]
impl ChartGateway for LastFmGateway {
    #[instrument(skip(self))]
    async fn fetch_period_list(&self, user_name: &str) -> Result<Vec<ChartPeriod>> {
        let response: WeeklyChartListResponse = self
            .call("user.getweeklychartlist", &[("user", user_name.to_string())])
            .await?;
        let periods = response.into_periods();
        debug!(count = periods.len(), "Fetched chart periods");
        Ok(periods)
    }

    #[instrument(skip(self, period), fields(from = period.from.timestamp(), to = period.to.timestamp()))]
    async fn fetch_chart(&self, user_name: &str, period: &ChartPeriod) -> Result<Vec<ChartEntry>> {
        let key = period.key();
        let response: WeeklyAlbumChartResponse = self
            .call(
                "user.getweeklyalbumchart",
                &[
                    ("user", user_name.to_string()),
                    ("from", key.from.to_string()),
                    ("to", key.to.to_string()),
                ],
            )
            .await?;
        let entries = response.into_entries(user_name, key);
        debug!(count = entries.len(), "Fetched weekly album chart");
        Ok(entries)
    }

    async fn resolve_album_image(
        &self,
        artist_name: &str,
        album_name: &str,
    ) -> Result<Option<String>> {
        let result: Result<AlbumInfoResponse> = self
            .call(
                "album.getinfo",
                &[
                    ("artist", artist_name.to_string()),
                    ("album", album_name.to_string()),
                ],
            )
            .await;

        match result {
            Ok(response) => Ok(response.album.image_url()),
            Err(e) if e.is_not_found() => {
                debug!(artist = artist_name, album = album_name, "Album not found on Last.fm");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_user(&self, user_name: &str) -> Result<User> {
        let response: UserInfoResponse = self
            .call("user.getinfo", &[("user", user_name.to_string())])
            .await?;
        Ok(response.user.into())
    }

    #[instrument(skip(self, album), fields(album = %album.name, artist = %album.artist.name))]
    async fn fetch_album_detail(&self, album: &Album, user_name: Option<&str>) -> Result<Album> {
        let with_user = |mut params: Vec<(&'static str, String)>| {
            if let Some(user_name) = user_name {
                params.push(("username", user_name.to_string()));
            }
            params
        };

        let has_mbid = album.mbid.as_deref().is_some_and(|mbid| !mbid.is_empty());
        let first: Result<AlbumInfoResponse> = self
            .call("album.getinfo", &with_user(album_lookup_params(album, true)))
            .await;

        let response = match first {
            // Stale MusicBrainz ids are common; retry by name.
            Err(e) if has_mbid && e.is_not_found() => {
                debug!("Album mbid unknown, retrying by artist and title");
                self.call("album.getinfo", &with_user(album_lookup_params(album, false)))
                    .await?
            }
            other => other?,
        };

        Ok(response.album.merge_into(album))
    }

    #[instrument(skip(self))]
    async fn fetch_friends(&self, user_name: &str, limit: u32) -> Result<Vec<User>> {
        let response: FriendsResponse = self
            .call(
                "user.getfriends",
                &[
                    ("user", user_name.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.friends.user.into_iter().map(User::from).collect())
    }
}
