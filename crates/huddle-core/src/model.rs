//! Domain records
//!
//! Row types mirror the backend collections column for column so they can be
//! moved through the generic [`Store`](crate::store::Store) as JSON rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, PositionSample};
use crate::identity::UserId;

/// A row of the `profiles` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Profile {
    /// Patch flipping the online flag and stamping `last_seen`
    pub fn presence_patch(is_online: bool, at: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "is_online": is_online,
            "last_seen": at,
        })
    }
}

/// Friendship lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

/// A row of the `friendships` collection (directed: `user_id` sees `friend_id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friendship {
    pub user_id: UserId,
    pub friend_id: UserId,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

/// What the roster knows about a friend, cached from their profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendIdentity {
    pub id: UserId,
    pub display_name: String,
    pub avatar_ref: String,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<Profile> for FriendIdentity {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.username,
            avatar_ref: profile.avatar_url.unwrap_or_default(),
            is_online: profile.is_online,
            last_seen_at: profile.last_seen,
        }
    }
}

/// A friend and their last known position, if any
///
/// A missing location means "not on the map", never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub identity: FriendIdentity,
    pub location: Option<PositionSample>,
}

impl FriendRecord {
    pub fn new(identity: FriendIdentity) -> Self {
        Self {
            identity,
            location: None,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.identity.id
    }
}

/// A row of the `user_locations` collection: one live row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPresence {
    pub user_id: UserId,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
}

impl LocalPresence {
    /// Build the row published for `sample`
    pub fn from_sample(user_id: UserId, sample: &PositionSample) -> Self {
        Self {
            user_id,
            coordinate: sample.coordinate,
            updated_at: sample.captured_at,
            accuracy_meters: sample.accuracy_meters,
        }
    }

    /// The row as a position sample, stamped with its update time
    pub fn to_sample(&self) -> PositionSample {
        PositionSample {
            coordinate: self.coordinate,
            captured_at: self.updated_at,
            accuracy_meters: self.accuracy_meters,
        }
    }
}

/// Raised when the nearest friend is farther than the alert threshold
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub distance_meters: f64,
    pub nearest_friend: FriendIdentity,
}

/// A row of the `groups` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub code: String,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Group {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A row of the `group_members` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

/// A row of the `pings` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub id: String,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub created_at: DateTime<Utc>,
}
