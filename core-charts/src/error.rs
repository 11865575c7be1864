use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure reported by the scrobbling service itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by the service")]
    RateLimited { retry_after_seconds: Option<u64> },

    #[error("Service error {code}: {message}")]
    Other { code: i32, message: String },
}

/// Error produced by a gateway call or a chart load.
///
/// `Clone + PartialEq` because one outcome is handed to every caller that
/// joined the same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartError {
    /// The request never got an answer: connection failure or timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ChartError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ChartError::Service(ServiceError::NotFound(what.into()))
    }

    pub fn other(code: i32, message: impl Into<String>) -> Self {
        ChartError::Service(ServiceError::Other {
            code,
            message: message.into(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ChartError::Service(ServiceError::NotFound(_)))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ChartError::Transport(_))
    }
}

impl From<BridgeError> for ChartError {
    fn from(error: BridgeError) -> Self {
        // Every bridge failure happens before a service answer is parsed.
        ChartError::Transport(error.to_string())
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    PeriodList,
    Chart,
    ImageLookup,
    AlbumDetail,
}

impl FetchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStage::PeriodList => "period_list",
            FetchStage::Chart => "chart",
            FetchStage::ImageLookup => "image_lookup",
            FetchStage::AlbumDetail => "album_detail",
        }
    }

    /// Only the period list and the chart itself abort a chart load.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchStage::PeriodList | FetchStage::Chart)
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal stage failure, as carried by `ChartResult::Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed: {error}")]
pub struct ChartFailure {
    pub stage: FetchStage,
    pub error: ChartError,
}

impl ChartFailure {
    pub fn new(stage: FetchStage, error: ChartError) -> Self {
        Self { stage, error }
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;
