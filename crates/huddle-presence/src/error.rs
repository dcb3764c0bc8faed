//! Error types for the presence engine

use std::future::Future;
use std::time::Duration;

use huddle_core::{AuthError, BackendError, ConfigError, GeoError};
use thiserror::Error;

/// Errors surfaced by a presence session
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("Geolocation error: {0}")]
    Geo(#[from] GeoError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The session task has stopped
    #[error("Presence session is closed")]
    SessionClosed,

    /// The session task panicked or was aborted
    #[error("Presence session task failed: {0}")]
    Task(String),
}

/// Result type alias for presence operations
pub type PresenceResult<T> = Result<T, PresenceError>;

/// Run a backend call with an upper bound on how long it may take
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit.as_millis() as u64)),
    }
}
