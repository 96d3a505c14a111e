use std::{str::Utf8Error, time::SystemTimeError};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Path error: {0}")]
    Path(String),
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    #[error("No response for correlation {correlation} within {millis}ms")]
    Timeout { correlation: String, millis: u64 },
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Dependency provider {provider} of {unit} failed: {reason}")]
    Provider {
        unit: String,
        provider: String,
        reason: String,
    },
    #[error("Cache error: {0} {1}")]
    Cache(String, String),
    #[error("Failed to define {unit}: {reason}")]
    Definition { unit: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoaderError {
    /// Whether this error means "the unit could not be located", as opposed
    /// to a failure while applying something that was located.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnitNotFound(_))
    }
}

impl From<Utf8Error> for LoaderError {
    fn from(e: Utf8Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<bincode::Error> for LoaderError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<zip::result::ZipError> for LoaderError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl From<SystemTimeError> for LoaderError {
    fn from(value: SystemTimeError) -> Self {
        Self::Other(anyhow::anyhow!(value.to_string()))
    }
}

impl From<walkdir::Error> for LoaderError {
    fn from(e: walkdir::Error) -> Self {
        Self::Path(e.to_string())
    }
}
