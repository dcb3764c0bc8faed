//! Collaborator traits
//!
//! Everything outside the presence engine is injected through these traits:
//! the auth provider, the device position API, the toast UI and the clock.
//! The backend itself is [`Store`](crate::store::Store).
//!
//! ## Key Traits
//!
//! - [`AuthProvider`]: who is signed in
//! - [`PositionProvider`]: one-shot and continuous device fixes
//! - [`Notifier`]: transient user-facing notifications
//! - [`Clock`]: time abstraction for testability

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::GeoOptions;
use crate::error::GeoError;
use crate::geo::PositionSample;
use crate::identity::AuthUser;

/// Source of the signed-in user
pub trait AuthProvider: Send + Sync {
    /// The current user, or `None` when signed out
    fn current_user(&self) -> Option<AuthUser>;
}

/// The device's position API
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Request a single fix
    async fn current_position(&self, options: &GeoOptions) -> Result<PositionSample, GeoError>;

    /// Start continuous monitoring
    ///
    /// Fixes arrive at a device-determined cadence. Errors are delivered in
    /// band and monitoring continues after them.
    fn watch_position(&self, options: &GeoOptions) -> Result<PositionWatch, GeoError>;
}

/// Item delivered by a [`PositionWatch`]
pub type PositionReading = Result<PositionSample, GeoError>;

/// Handle to a running position watch
///
/// Cancelling is idempotent; dropping the handle cancels it.
pub struct PositionWatch {
    id: u64,
    rx: Option<mpsc::Receiver<PositionReading>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl PositionWatch {
    /// Wrap the channel a provider feeds and the signal it listens on for cancellation
    pub fn new(
        id: u64,
        rx: mpsc::Receiver<PositionReading>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            rx: Some(rx),
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Next fix or error; `None` once the watch is cancelled or the provider stops
    pub async fn next(&mut self) -> Option<PositionReading> {
        let rx = self.rx.as_mut()?;
        let item = rx.recv().await;
        if item.is_none() {
            self.rx = None;
        }
        item
    }

    /// Stop monitoring. No-op if already cancelled.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for PositionWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionWatch")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
