//! # Host Bridge Traits
//!
//! Capability contracts the Vinylogue core needs from its host.
//!
//! ## Overview
//!
//! The chart pipeline and the favorites store never talk to the network, the
//! disk or the wall clock directly. Each of those is a trait defined here and
//! implemented per platform (`bridge-desktop` for macOS/Windows/Linux, native
//! adapters on mobile).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests to the scrobbling service
//! - [`SettingsStore`](storage::SettingsStore) - Key-value storage for favorites and preferences
//! - [`Clock`](time::Clock) - Time source, injectable for deterministic tests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map timeouts to [`BridgeError::Timeout`] and connection problems to
//! [`BridgeError::ConnectionFailed`] so the core can tell transport failures
//! apart from service errors.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; one instance is shared by every
//! concurrent chart fetch.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::SettingsStore;
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
