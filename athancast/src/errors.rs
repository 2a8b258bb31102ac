use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CastError {
    #[error("connect to {0} timed out after {1:?}")]
    ConnectTimeout(String, Duration),
    #[error("invalid device address: {0}")]
    InvalidAddress(String),
    #[error("Chromecast error: {0}")]
    Chromecast(String),
    #[error("no active media session on {0}")]
    NoSession(String),
}

impl CastError {
    pub fn chromecast(error: impl std::fmt::Display) -> Self {
        CastError::Chromecast(error.to_string())
    }
}
