//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls
//! - `SettingsStore` as a JSON file in the user data directory
//!
//! `Clock` and `LoggerSink` need nothing platform specific; the defaults in
//! `bridge-traits` (`SystemClock`, `ConsoleLogger`) are used as-is.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileSettingsStore, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = FileSettingsStore::open_default().await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod http;
mod settings;

pub use http::ReqwestHttpClient;
pub use settings::FileSettingsStore;
