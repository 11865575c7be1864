use core_charts::{ChartError, ChartFailure};
use core_favorites::FavoritesError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::error::Error),

    #[error("Last.fm error: {0}")]
    Chart(#[from] ChartError),

    #[error("Chart load failed: {0}")]
    ChartLoad(#[from] ChartFailure),

    #[error("Favorites error: {0}")]
    Favorites(#[from] FavoritesError),

    #[error("No current user selected")]
    NoCurrentUser,
}

pub type Result<T> = std::result::Result<T, CoreError>;
