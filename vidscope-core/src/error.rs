use thiserror::Error;

use crate::gemini::GenerationError;
use crate::media::MediaError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum VidscopeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Other error: {0}")]
    Other(String),
}
