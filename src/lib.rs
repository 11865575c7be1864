//! Umbrella crate for the Vinylogue core.
//!
//! Hosts that only need the desktop build depend on `vinylogue-workspace`
//! and get the service façade with the reqwest HTTP client and file-backed
//! settings wired in. Mobile hosts depend on `core-service` directly and
//! inject their own bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap_desktop, CoreError, CoreService};
