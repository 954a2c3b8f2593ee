//! Error types for the correlation engine
//!
//! Data conditions (small samples, flat series, malformed readings) are not
//! errors here. They surface through the quality report. Only programming
//! errors and collaborator failures end up in `EngineError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid analysis window: {0}")]
    InvalidWindow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Analysis timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;
