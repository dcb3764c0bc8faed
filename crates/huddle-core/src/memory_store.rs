//! In-memory backend for testing
//!
//! Implements [`Store`] over per-table row vectors and a broadcast change
//! feed, with failure injection so soft-failure paths can be exercised.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huddle_core::{EventMask, Filter, MemoryStore, Store, Table};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let mut feed = store.subscribe(Table::UserLocations, EventMask::ALL).await?;
//!
//! store.upsert(Table::UserLocations, json!({ "user_id": "bob", ... })).await?;
//! let change = feed.recv().await?;
//!
//! store.set_offline(true);
//! assert!(store.query(Table::Profiles, &Filter::new()).await.is_err());
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::BackendError;
use crate::event::{ChangeKind, ChangeRecord, EventMask};
use crate::store::{ChangeFeed, Filter, Row, Store, Table};

/// Change feed buffer size
const FEED_CAPACITY: usize = 1024;

/// An in-memory [`Store`]
pub struct MemoryStore {
    tables: DashMap<Table, Vec<Row>>,
    changes: Mutex<broadcast::Sender<ChangeRecord>>,
    offline: AtomicBool,
    failures_pending: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tables: DashMap::new(),
            changes: Mutex::new(tx),
            offline: AtomicBool::new(false),
            failures_pending: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with `Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Number of calls made against the store (including failed ones)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Put rows in place without emitting change events
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Row>) {
        self.tables.entry(table).or_default().extend(rows);
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .get(&table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Push a raw change to every open feed without touching the tables
    pub fn push_change(&self, record: ChangeRecord) {
        let _ = self.changes.lock().send(record);
    }

    /// Close every open feed, as a dropped real-time connection would
    pub fn close_feeds(&self) {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        *self.changes.lock() = tx;
    }

    fn check_available(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend offline".into()));
        }

        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::Unavailable("injected failure".into()));
        }

        Ok(())
    }

    fn emit(&self, table: Table, kind: ChangeKind, new: Option<Row>, old: Option<Row>) {
        trace!(%table, %kind, "Emitting change");
        let _ = self.changes.lock().send(ChangeRecord {
            table,
            kind,
            new,
            old,
        });
    }
}

/// Values of the key columns, or the name of the first missing one
fn key_of(table: Table, row: &Row) -> Result<Vec<Value>, String> {
    table
        .primary_key()
        .iter()
        .map(|col| row.get(*col).cloned().ok_or_else(|| col.to_string()))
        .collect()
}

fn require_object(table: Table, row: &Row) -> Result<(), BackendError> {
    if row.is_object() {
        Ok(())
    } else {
        Err(BackendError::Decode(format!("{} row is not an object", table)))
    }
}

/// Fill in a generated `id` for tables keyed by one
fn assign_id(table: Table, row: &mut Row) {
    if table.primary_key() == ["id"] && row.get("id").is_none() {
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, BackendError> {
        self.check_available()?;
        Ok(self
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, mut row: Row) -> Result<Row, BackendError> {
        self.check_available()?;
        require_object(table, &row)?;
        assign_id(table, &mut row);

        let key = key_of(table, &row).map_err(|col| {
            BackendError::Decode(format!("{} row missing key column {}", table, col))
        })?;

        {
            let mut rows = self.tables.entry(table).or_default();
            if rows.iter().any(|r| key_of(table, r).ok().as_ref() == Some(&key)) {
                return Err(BackendError::Conflict(format!("duplicate key in {}", table)));
            }
            rows.push(row.clone());
        }

        self.emit(table, ChangeKind::Insert, Some(row.clone()), None);
        Ok(row)
    }

    async fn upsert(&self, table: Table, mut row: Row) -> Result<Row, BackendError> {
        self.check_available()?;
        require_object(table, &row)?;
        assign_id(table, &mut row);

        let key = key_of(table, &row).map_err(|col| {
            BackendError::Decode(format!("{} row missing key column {}", table, col))
        })?;

        let previous = {
            let mut rows = self.tables.entry(table).or_default();
            match rows
                .iter_mut()
                .find(|r| key_of(table, r).ok().as_ref() == Some(&key))
            {
                Some(existing) => Some(std::mem::replace(existing, row.clone())),
                None => {
                    rows.push(row.clone());
                    None
                }
            }
        };

        match previous {
            Some(old) => self.emit(table, ChangeKind::Update, Some(row.clone()), Some(old)),
            None => self.emit(table, ChangeKind::Insert, Some(row.clone()), None),
        }
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: Row,
    ) -> Result<usize, BackendError> {
        self.check_available()?;
        let Some(fields) = patch.as_object() else {
            return Err(BackendError::Decode(format!("{} patch is not an object", table)));
        };

        let changed: Vec<(Row, Row)> = {
            let mut rows = self.tables.entry(table).or_default();
            rows.iter_mut()
                .filter(|r| filter.matches(r))
                .filter_map(|r| {
                    let old = r.clone();
                    let obj = r.as_object_mut()?;
                    for (k, v) in fields {
                        obj.insert(k.clone(), v.clone());
                    }
                    Some((r.clone(), old))
                })
                .collect()
        };

        let count = changed.len();
        for (new, old) in changed {
            self.emit(table, ChangeKind::Update, Some(new), Some(old));
        }
        Ok(count)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<usize, BackendError> {
        self.check_available()?;

        let removed: Vec<Row> = {
            let mut rows = self.tables.entry(table).or_default();
            let (gone, kept): (Vec<Row>, Vec<Row>) =
                rows.drain(..).partition(|r| filter.matches(r));
            *rows = kept;
            gone
        };

        let count = removed.len();
        for old in removed {
            self.emit(table, ChangeKind::Delete, None, Some(old));
        }
        Ok(count)
    }

    async fn subscribe(&self, table: Table, mask: EventMask) -> Result<ChangeFeed, BackendError> {
        self.check_available()?;
        let rx = self.changes.lock().subscribe();
        Ok(ChangeFeed::new(table, mask, rx))
    }
}
