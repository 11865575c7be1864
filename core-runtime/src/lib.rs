//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the Vinylogue core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its logging conventions,
//! its configuration types and the broadcast channel that carries chart and
//! favorites events to the UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
