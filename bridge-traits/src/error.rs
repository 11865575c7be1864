use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True for failures caused by the network path rather than by the remote
    /// side answering with an error.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::ConnectionFailed(_) | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
