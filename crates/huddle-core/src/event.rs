//! Change-feed events

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BackendError;
use crate::geo::PositionSample;
use crate::identity::UserId;
use crate::model::LocalPresence;
use crate::store::{Row, Table};

/// Kind of row change reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Which change kinds a subscription wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: Self = Self {
        insert: true,
        update: true,
        delete: true,
    };

    pub fn only(kind: ChangeKind) -> Self {
        Self {
            insert: kind == ChangeKind::Insert,
            update: kind == ChangeKind::Update,
            delete: kind == ChangeKind::Delete,
        }
    }

    pub fn contains(&self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// A single change as delivered by the feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub table: Table,
    pub kind: ChangeKind,
    /// Row after the change (absent for deletes)
    pub new: Option<Row>,
    /// Row before the change; for deletes this may only carry the key columns
    pub old: Option<Row>,
}

/// A friend location change, decoded from a `user_locations` record
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub user_id: UserId,
    pub kind: ChangeKind,
    /// The new position; `None` for deletes
    pub sample: Option<PositionSample>,
}

impl LocationEvent {
    pub fn upsert(user_id: UserId, sample: PositionSample) -> Self {
        Self {
            user_id,
            kind: ChangeKind::Update,
            sample: Some(sample),
        }
    }

    pub fn delete(user_id: UserId) -> Self {
        Self {
            user_id,
            kind: ChangeKind::Delete,
            sample: None,
        }
    }

    /// Decode a feed record
    ///
    /// Returns `Ok(None)` for records of other tables or records that carry
    /// no usable row (an insert/update without `new`, a delete without a key,
    /// or a row whose coordinate is out of range).
    pub fn from_change(record: &ChangeRecord) -> Result<Option<Self>, BackendError> {
        if record.table != Table::UserLocations {
            return Ok(None);
        }

        match record.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = &record.new else {
                    return Ok(None);
                };
                let presence: LocalPresence = serde_json::from_value(row.clone())?;
                if !presence.coordinate.is_valid() {
                    warn!(
                        user = %presence.user_id,
                        latitude = presence.coordinate.latitude,
                        longitude = presence.coordinate.longitude,
                        "Dropping location change with out-of-range coordinate"
                    );
                    return Ok(None);
                }
                Ok(Some(Self {
                    user_id: presence.user_id.clone(),
                    kind: record.kind,
                    sample: Some(presence.to_sample()),
                }))
            }
            ChangeKind::Delete => {
                let user_id = record
                    .old
                    .as_ref()
                    .and_then(|row| row.get("user_id"))
                    .and_then(|v| v.as_str())
                    .map(UserId::new);
                Ok(user_id.map(Self::delete))
            }
        }
    }
}
