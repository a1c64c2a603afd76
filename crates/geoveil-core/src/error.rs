//! Core error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionId;

/// Errors returned synchronously from the service API.
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Storage error: {0}")]
    Storage(#[from] geoveil_storage::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Too many outstanding geolocation requests in session {0}")]
    TooManyRequests(SessionId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session closed: {0}")]
    SessionClosed(SessionId),

    #[error("Geolocation service has shut down")]
    ServiceShutdown,

    #[error("Geolocation runtime is no longer running")]
    RuntimeClosed,
}

/// Failures of the location provider itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Geolocation is disabled or not yet initialized")]
    ServiceDisabled,

    #[error("No location provider available")]
    NoProvider,

    #[error("Provider failed to start: {0}")]
    Startup(String),

    #[error("Provider refused the watch: {0}")]
    Watch(String),
}

/// Error delivered to a consumer's error callback.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionError {
    #[error("User denied geolocation prompt")]
    PermissionDenied,

    #[error("Unknown error acquiring position")]
    PositionUnavailable,

    #[error("Position acquisition timed out")]
    Timeout,
}

impl PositionError {
    /// Conventional numeric code (1, 2, 3).
    pub fn code(&self) -> u16 {
        match self {
            PositionError::PermissionDenied => 1,
            PositionError::PositionUnavailable => 2,
            PositionError::Timeout => 3,
        }
    }
}
