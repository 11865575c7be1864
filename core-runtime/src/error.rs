use thiserror::Error;

/// Runtime-level failures: configuration, missing host capabilities and
/// logging setup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bridge was neither injected nor available as a platform default.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
