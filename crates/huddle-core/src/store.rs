//! Backend storage abstraction
//!
//! The hosted backend is consumed as generic CRUD over named collections plus
//! a real-time change feed. Rows travel as JSON objects; typed callers use
//! [`encode_row`] and [`decode_rows`] at the edges.
//!
//! ## Implementations
//!
//! - [`MemoryStore`](crate::memory_store::MemoryStore): in-memory backend for
//!   tests and the demo binary

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::BackendError;
use crate::event::{ChangeRecord, EventMask};

/// A row as stored by the backend (a JSON object)
pub type Row = Value;

/// Named backend collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Profiles,
    Friendships,
    UserLocations,
    Groups,
    GroupMembers,
    Pings,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Profiles,
        Table::Friendships,
        Table::UserLocations,
        Table::Groups,
        Table::GroupMembers,
        Table::Pings,
    ];

    /// Collection name on the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Friendships => "friendships",
            Self::UserLocations => "user_locations",
            Self::Groups => "groups",
            Self::GroupMembers => "group_members",
            Self::Pings => "pings",
        }
    }

    /// Columns that identify a row for upserts
    pub fn primary_key(&self) -> &'static [&'static str] {
        match self {
            Self::Profiles => &["id"],
            Self::Friendships => &["user_id", "friend_id"],
            Self::UserLocations => &["user_id"],
            Self::Groups => &["id"],
            Self::GroupMembers => &["group_id", "user_id"],
            Self::Pings => &["id"],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate of a [`Filter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
    Gt(String, Value),
    Lt(String, Value),
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(col, expected) => row.get(col) == Some(expected),
            Self::In(col, options) => row.get(col).is_some_and(|v| options.contains(v)),
            Self::Gt(col, bound) => row
                .get(col)
                .and_then(|v| compare_values(v, bound))
                .is_some_and(|ord| ord == Ordering::Greater),
            Self::Lt(col, bound) => row
                .get(col)
                .and_then(|v| compare_values(v, bound))
                .is_some_and(|ord| ord == Ordering::Less),
        }
    }
}

/// Conjunction of column predicates; the empty filter matches every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn in_list<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::In(column.into(), values));
        self
    }

    pub fn gt(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gt(column.into(), value.into()));
        self
    }

    pub fn lt(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt(column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether `row` satisfies every condition
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Order two JSON scalars: numbers numerically, timestamps chronologically,
/// other strings lexically. Mixed types are unordered.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serialize a typed record into a row
pub fn encode_row<T: Serialize>(value: &T) -> Result<Row, BackendError> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize rows into typed records
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

/// Generic CRUD and change-feed access to the hosted backend
///
/// Every call may suspend; none of them block other event sources.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the rows of `table` matching `filter`
    async fn query(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, BackendError>;

    /// Insert a new row; fails with `Conflict` if the key already exists
    async fn insert(&self, table: Table, row: Row) -> Result<Row, BackendError>;

    /// Insert or replace the row with the same primary key (last write wins)
    async fn upsert(&self, table: Table, row: Row) -> Result<Row, BackendError>;

    /// Merge `patch` into every matching row, returning how many changed
    async fn update(&self, table: Table, filter: &Filter, patch: Row)
    -> Result<usize, BackendError>;

    /// Delete every matching row, returning how many were removed
    async fn delete(&self, table: Table, filter: &Filter) -> Result<usize, BackendError>;

    /// Open a change feed on `table`
    async fn subscribe(&self, table: Table, mask: EventMask) -> Result<ChangeFeed, BackendError>;
}

/// An owned, cancellable change-feed subscription
///
/// Dropping the feed unsubscribes. [`ChangeFeed::cancel`] does the same
/// eagerly and may be called any number of times.
pub struct ChangeFeed {
    table: Table,
    mask: EventMask,
    rx: Option<broadcast::Receiver<ChangeRecord>>,
}

impl ChangeFeed {
    /// Wrap a broadcast receiver carrying changes of all tables
    pub fn new(table: Table, mask: EventMask, rx: broadcast::Receiver<ChangeRecord>) -> Self {
        Self {
            table,
            mask,
            rx: Some(rx),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.is_none()
    }

    /// Stop receiving changes. No-op if already cancelled.
    pub fn cancel(&mut self) {
        self.rx = None;
    }

    /// Wait for the next change matching this feed's table and mask
    ///
    /// A lagging receiver reports `Unavailable` so the caller can resync;
    /// the feed stays usable afterwards. A cancelled or closed feed reports
    /// `SubscriptionClosed`.
    pub async fn recv(&mut self) -> Result<ChangeRecord, BackendError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(BackendError::SubscriptionClosed);
        };

        loop {
            match rx.recv().await {
                Ok(record) => {
                    if record.table == self.table && self.mask.contains(record.kind) {
                        return Ok(record);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(table = %self.table, skipped, "Change feed lagged");
                    return Err(BackendError::Unavailable(format!(
                        "change feed dropped {} events",
                        skipped
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return Err(BackendError::SubscriptionClosed);
                }
            }
        }
    }
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("table", &self.table)
            .field("mask", &self.mask)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
