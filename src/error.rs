use std::io::Error as IoError;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Poll interval {0}s is not one of 1, 2, 3, 5, 10")]
    InvalidPollInterval(u64),
    #[error("Invalid host address: {0:?}")]
    InvalidHost(String),
    #[error("Unknown host id {0}")]
    HostNotFound(Uuid),
    #[error("Webhook delivery failed: {0}")]
    Webhook(#[from] reqwest::Error),
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
