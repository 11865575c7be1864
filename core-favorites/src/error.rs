use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FavoritesError {
    #[error("User already in favorites: {0}")]
    DuplicateUser(String),

    #[error("Index {index} out of bounds for {len} favorites")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Saving or loading through the persistence collaborator failed. The
    /// in-memory list is unchanged.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<BridgeError> for FavoritesError {
    fn from(error: BridgeError) -> Self {
        FavoritesError::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for FavoritesError {
    fn from(error: serde_json::Error) -> Self {
        FavoritesError::Persistence(format!("Invalid favorites data: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, FavoritesError>;
