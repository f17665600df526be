//! Configuration errors

/// Errors raised while obtaining or decoding configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration transport failed: {0}")]
    Transport(String),
    #[error("Configuration fetch timed out after {0}ms")]
    Timeout(u64),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
