//! Error types for gpushare

use thiserror::Error;

/// Main error type for gpushare
#[derive(Error, Debug)]
pub enum GpushareError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workload or topology source error
    #[error("Source error: {0}")]
    Source(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kubernetes(String),

    /// Decision file error
    #[error("Storage error: {0}")]
    Storage(String),

    /// GPU error
    #[error("GPU error: {0}")]
    Gpu(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for gpushare operations
pub type GpushareResult<T> = Result<T, GpushareError>;

impl From<serde_json::Error> for GpushareError {
    fn from(err: serde_json::Error) -> Self {
        GpushareError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GpushareError {
    fn from(err: toml::de::Error) -> Self {
        GpushareError::Config(format!("Failed to parse config: {}", err))
    }
}
