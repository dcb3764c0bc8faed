//! Error types for Huddle

use thiserror::Error;

/// Top-level error type for Huddle
#[derive(Debug, Error)]
pub enum HuddleError {
    #[error("Geolocation error: {0}")]
    Geo(#[from] GeoError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by the device position API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Position request timed out")]
    Timeout,

    #[error("Geolocation not supported on this device")]
    Unsupported,

    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

impl GeoError {
    /// Text shown to the user when a fix could not be obtained
    pub fn user_message(&self) -> String {
        let detail = match self {
            Self::PermissionDenied => "Please enable location permissions.",
            Self::PositionUnavailable => "Location information unavailable.",
            Self::Timeout => "Location request timed out.",
            Self::Unsupported => "Geolocation is not supported.",
            Self::InvalidCoordinate { .. } => "The device reported an invalid position.",
        };
        format!("Unable to get your location. {}", detail)
    }

    /// Whether monitoring can continue after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PositionUnavailable | Self::Timeout)
    }
}

/// Errors from the hosted backend (CRUD and change feed)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Conflicting row: {0}")]
    Conflict(String),

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("Change feed closed")]
    SubscriptionClosed,
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

/// Errors related to the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No user is signed in")]
    NotSignedIn,
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Config parse error: {0}")]
    Parse(String),
}

/// Result type alias for Huddle operations
pub type HuddleResult<T> = Result<T, HuddleError>;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
