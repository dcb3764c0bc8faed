//! User identity and the signed-in user
//!
//! User ids are opaque strings issued by the auth provider. The same id
//! keys profiles, friendships and location rows.

use std::fmt::{self, Display};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::traits::AuthProvider;

/// Opaque user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a short display form (for logging)
    pub fn short_id(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<UserId> for serde_json::Value {
    fn from(id: UserId) -> Self {
        serde_json::Value::String(id.0)
    }
}

impl From<&UserId> for serde_json::Value {
    fn from(id: &UserId) -> Self {
        serde_json::Value::String(id.0.clone())
    }
}

/// The signed-in user as exposed by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

impl AuthUser {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Auth provider with a fixed, swappable session
///
/// Used in tests and the demo binary in place of the hosted auth service.
#[derive(Debug, Default)]
pub struct StaticAuth {
    user: RwLock<Option<AuthUser>>,
}

impl StaticAuth {
    /// Create a provider with `user` signed in
    pub fn signed_in(user: AuthUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    /// Create a provider with nobody signed in
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: AuthUser) {
        *self.user.write() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.user.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display_and_short_id() {
        let id = UserId::new("5f2c9a10-aaaa-bbbb");
        assert_eq!(id.to_string(), "5f2c9a10-aaaa-bbbb");
        assert_eq!(id.short_id(), "5f2c9a10");
        assert_eq!(UserId::from("ab").short_id(), "ab");
    }

    #[test]
    fn test_user_id_serializes_transparently() {
        let id = UserId::new("alice");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
        let back: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_static_auth_sign_in_out() {
        let auth = StaticAuth::signed_out();
        assert!(auth.current_user().is_none());

        auth.sign_in(AuthUser::new("alice", "alice@example.com"));
        assert_eq!(auth.current_user().unwrap().id, UserId::new("alice"));

        auth.sign_out();
        assert!(auth.current_user().is_none());
    }
}
