//! # Core Configuration Module
//!
//! The configuration system uses a builder to construct a [`CoreConfig`]
//! holding every bridge and setting the Vinylogue core needs. Validation is
//! fail-fast: a missing capability or out-of-range setting is reported when
//! `build()` is called, never later during a chart load.
//!
//! ## Required
//!
//! - [`LastFmApiConfig`] with a real API key
//! - `HttpClient` and `SettingsStore` (injected, or desktop defaults when the
//!   `desktop-shims` feature is enabled)
//!
//! ## Optional
//!
//! - `Clock` (default: [`SystemClock`])
//! - [`ChartSettings`] (default: 6 concurrent artwork lookups)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, LastFmApiConfig};
//!
//! let config = CoreConfig::builder()
//!     .lastfm(LastFmApiConfig::from_env()?)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, HttpClient, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Public Last.fm web service endpoint.
pub const DEFAULT_LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Environment variable read by [`LastFmApiConfig::from_env`].
pub const LASTFM_API_KEY_ENV: &str = "LASTFM_API_KEY";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 100;
const DEFAULT_MAX_CONCURRENT_IMAGE_LOOKUPS: usize = 6;
const MAX_CONCURRENT_IMAGE_LOOKUPS: usize = 16;

/// Keys shipped in sample configs that are never valid.
const PLACEHOLDER_API_KEYS: &[&str] = &[
    "your_api_key",
    "your_lastfm_api_key",
    "api_key",
    "changeme",
    "xxx",
];

/// Core configuration for the Vinylogue core.
#[derive(Clone)]
pub struct CoreConfig {
    /// HTTP client used by the Last.fm gateway
    pub http_client: Arc<dyn HttpClient>,

    /// Key-value store backing favorites and preferences
    pub settings_store: Arc<dyn SettingsStore>,

    /// Anchor for "this week, N years ago"
    pub clock: Arc<dyn Clock>,

    pub lastfm: LastFmApiConfig,

    pub charts: ChartSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("lastfm", &self.lastfm)
            .field("charts", &self.charts)
            .finish()
    }
}

/// Connection settings for the Last.fm web service.
///
/// The API key should never be hardcoded; load it with
/// [`LastFmApiConfig::from_env`] or from the host's secure configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct LastFmApiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Per-request deadline, applied to every gateway call
    pub request_timeout: Duration,
    /// Minimum spacing between request starts
    pub rate_limit_delay_ms: u64,
    pub user_agent: String,
}

impl std::fmt::Debug for LastFmApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastFmApiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl LastFmApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_LASTFM_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit_delay_ms: DEFAULT_RATE_LIMIT_DELAY_MS,
            user_agent: concat!("vinylogue-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Reads the API key from `LASTFM_API_KEY` and validates it.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(LASTFM_API_KEY_ENV).map_err(|_| {
            Error::Config(format!(
                "{} is not set. Obtain a key at https://www.last.fm/api/account/create",
                LASTFM_API_KEY_ENV
            ))
        })?;

        let config = Self::new(api_key.trim());
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the rate limit delay in milliseconds. Zero disables spacing.
    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(Error::Config("Last.fm API key cannot be empty".to_string()));
        }

        if PLACEHOLDER_API_KEYS
            .iter()
            .any(|placeholder| key.eq_ignore_ascii_case(placeholder))
        {
            return Err(Error::Config(
                "Last.fm API key is a placeholder; configure a real key".to_string(),
            ));
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Last.fm base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout > Duration::from_secs(120) {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 120 seconds".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60_000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::Config("User agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Tuning for the chart pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSettings {
    /// Upper bound on artwork lookups in flight for one chart (1..=16)
    pub max_concurrent_image_lookups: usize,
    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
    /// Load the previous year's chart in the background after a successful
    /// load
    pub precache_previous_year: bool,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            max_concurrent_image_lookups: DEFAULT_MAX_CONCURRENT_IMAGE_LOOKUPS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            precache_previous_year: true,
        }
    }
}

impl ChartSettings {
    pub fn with_max_concurrent_image_lookups(mut self, max: usize) -> Self {
        self.max_concurrent_image_lookups = max;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_precache_previous_year(mut self, enabled: bool) -> Self {
        self.precache_previous_year = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENT_IMAGE_LOOKUPS).contains(&self.max_concurrent_image_lookups) {
            return Err(Error::Config(format!(
                "max_concurrent_image_lookups must be between 1 and {}, got {}",
                MAX_CONCURRENT_IMAGE_LOOKUPS, self.max_concurrent_image_lookups
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.lastfm.validate()?;
        self.charts.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach Last.fm. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform networking stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for favorites and preferences. \
                 Desktop: enable the 'desktop-shims' feature to use FileSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(lastfm: &LastFmApiConfig) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(lastfm.request_timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_lastfm: &LastFmApiConfig) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::FileSettingsStore;

    let path = match path {
        Some(path) => path,
        None => FileSettingsStore::default_path().map_err(|e| Error::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: format!("No location for the default settings file: {}", e),
        })?,
    };

    let store = FileSettingsStore::open_blocking(path).map_err(|e| {
        Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
    })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_path: Option<PathBuf>) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    settings_path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    lastfm: Option<LastFmApiConfig>,
    charts: ChartSettings,
}

impl CoreConfigBuilder {
    /// Sets the HTTP client implementation.
    ///
    /// If not provided, `ReqwestHttpClient` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the settings store implementation.
    ///
    /// If not provided, a `FileSettingsStore` is opened when the
    /// `desktop-shims` feature is enabled.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Location of the default desktop settings file. Ignored when a
    /// settings store is injected.
    pub fn settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn lastfm(mut self, config: LastFmApiConfig) -> Self {
        self.lastfm = Some(config);
        self
    }

    pub fn charts(mut self, settings: ChartSettings) -> Self {
        self.charts = settings;
        self
    }

    pub fn max_concurrent_image_lookups(mut self, max: usize) -> Self {
        self.charts.max_concurrent_image_lookups = max;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the Last.fm configuration is missing or any
    ///   setting is out of range
    /// - [`Error::CapabilityMissing`] when a bridge was not injected and no
    ///   desktop default is available
    pub fn build(self) -> Result<CoreConfig> {
        let lastfm = self.lastfm.ok_or_else(|| {
            Error::Config(
                "Last.fm API configuration is required. \
                 Use LastFmApiConfig::from_env() or LastFmApiConfig::new(key)."
                    .to_string(),
            )
        })?;
        lastfm.validate()?;
        self.charts.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&lastfm)?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.settings_path)?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            http_client,
            settings_store,
            clock,
            lastfm,
            charts: self.charts,
        };
        config.validate()?;
        Ok(config)
    }
}
