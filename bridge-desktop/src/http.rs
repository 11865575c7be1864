//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("vinylogue-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// One instance is shared by every chart fetch; reqwest pools connections
/// per host so concurrent artwork lookups reuse sockets.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(15))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn classify_error(error: &reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            BridgeError::ConnectionFailed(error.to_string())
        } else {
            BridgeError::OperationFailed(error.to_string())
        }
    }

    /// Execute request with retry logic
    ///
    /// Server errors and 429s are retried while attempts remain; the last
    /// such response is handed back to the caller so it can read the status.
    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                attempt,
                max_attempts,
                url = %redact_query(&request.url),
                "Executing HTTP request"
            );

            let outcome = match self.build_request(request.clone()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers: HashMap<String, String> = response
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| {
                            v.to_str().ok().map(|s| (k.to_string(), s.to_string()))
                        })
                        .collect();

                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| Self::classify_error(&e))?;

                    let retryable = status >= 500 || status == 429;
                    if !retryable || attempt >= max_attempts {
                        return Ok(HttpResponse {
                            status,
                            headers,
                            body,
                        });
                    }

                    warn!(status, attempt, "HTTP request failed with retryable status");
                    Err(BridgeError::OperationFailed(format!("HTTP {} error", status)))
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    Err(Self::classify_error(&e))
                }
            };

            if attempt >= max_attempts {
                return outcome;
            }

            let delay = if policy.use_exponential_backoff {
                let exponential_delay = policy.base_delay * 2u32.pow(attempt - 1);
                exponential_delay.min(policy.max_delay)
            } else {
                policy.base_delay
            };

            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

/// Drops the query string so API keys never reach the logs.
fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }
}
