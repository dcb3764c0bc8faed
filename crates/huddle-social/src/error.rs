//! Error types for huddle-social

use huddle_core::{AuthError, BackendError, ConfigError};
use thiserror::Error;

/// Errors that can occur in the social layer
#[derive(Debug, Error)]
pub enum SocialError {
    /// Backend call failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Nobody is signed in
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// No profile with that email
    #[error("User not found")]
    UserNotFound(String),

    #[error("Cannot add yourself as a friend")]
    CannotFriendSelf,

    /// A friendship row exists in either direction
    #[error("Friendship already exists or pending")]
    FriendshipExists,

    /// No pending request from that user
    #[error("No pending friend request from {0}")]
    RequestNotFound(String),

    /// No unexpired group with that code
    #[error("Invalid or expired group code")]
    InvalidGroupCode,

    #[error("Group name must not be empty")]
    EmptyGroupName,
}

impl SocialError {
    /// Text shown to the user when the operation fails
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(_) | Self::Auth(_) | Self::Config(_) => "Something went wrong".into(),
            other => other.to_string(),
        }
    }
}

/// Result type for social operations
pub type SocialResult<T> = Result<T, SocialError>;
