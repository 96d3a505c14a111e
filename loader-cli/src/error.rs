use std::io;

use remote_loader::LoaderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not load configuration: {0}")]
    ConfigError(String),

    #[error("Nothing to offer for {0}")]
    NothingToOffer(String),

    #[error("Cache item not found: {0}")]
    ItemNotFound(String),

    #[error("Could not render output: {0}")]
    OutputError(String),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    LoaderError(#[from] LoaderError),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::OutputError(e.to_string())
    }
}
