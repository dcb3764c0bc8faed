//! Scripted device doubles for testing
//!
//! [`ScriptedPositionProvider`] stands in for the device position API and
//! [`RecordingNotifier`] for the toast UI.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::config::GeoOptions;
use crate::error::GeoError;
use crate::geo::PositionSample;
use crate::traits::{Notice, Notifier, PositionProvider, PositionReading, PositionWatch};

/// Buffer per watch channel
const WATCH_BUFFER: usize = 64;

struct Watcher {
    id: u64,
    tx: mpsc::Sender<PositionReading>,
    cancel_rx: oneshot::Receiver<()>,
}

impl Watcher {
    fn is_cancelled(&mut self) -> bool {
        !matches!(
            self.cancel_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ) || self.tx.is_closed()
    }
}

/// Position provider driven by the test
pub struct ScriptedPositionProvider {
    one_shot: Mutex<VecDeque<PositionReading>>,
    last_sample: Mutex<Option<PositionSample>>,
    watchers: Mutex<Vec<Watcher>>,
    next_id: AtomicU64,
    one_shot_calls: AtomicUsize,
    one_shot_delay: Mutex<Option<Duration>>,
    supported: bool,
}

impl Default for ScriptedPositionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPositionProvider {
    pub fn new() -> Self {
        Self {
            one_shot: Mutex::new(VecDeque::new()),
            last_sample: Mutex::new(None),
            watchers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            one_shot_calls: AtomicUsize::new(0),
            one_shot_delay: Mutex::new(None),
            supported: true,
        }
    }

    /// A device without geolocation support
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Queue the reply for the next one-shot request
    pub fn queue_current(&self, reading: PositionReading) {
        self.one_shot.lock().push_back(reading);
    }

    /// Delay every one-shot reply (to exercise timeouts)
    pub fn set_current_delay(&self, delay: Option<Duration>) {
        *self.one_shot_delay.lock() = delay;
    }

    /// Deliver a reading to every active watch
    ///
    /// Successful samples also become the reply to unscripted one-shot requests.
    pub fn push(&self, reading: PositionReading) {
        if let Ok(sample) = &reading {
            *self.last_sample.lock() = Some(sample.clone());
        }

        let mut watchers = self.watchers.lock();
        watchers.retain_mut(|w| !w.is_cancelled());
        for watcher in watchers.iter() {
            let _ = watcher.tx.try_send(reading.clone());
        }
    }

    /// Number of watches that have not been cancelled
    pub fn active_watches(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain_mut(|w| !w.is_cancelled());
        watchers.len()
    }

    /// Ids of the watches that have not been cancelled
    pub fn active_watch_ids(&self) -> Vec<u64> {
        let mut watchers = self.watchers.lock();
        watchers.retain_mut(|w| !w.is_cancelled());
        watchers.iter().map(|w| w.id).collect()
    }

    /// How many one-shot requests reached the device
    pub fn current_calls(&self) -> usize {
        self.one_shot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionProvider for ScriptedPositionProvider {
    async fn current_position(&self, _options: &GeoOptions) -> Result<PositionSample, GeoError> {
        self.one_shot_calls.fetch_add(1, Ordering::SeqCst);
        if !self.supported {
            return Err(GeoError::Unsupported);
        }

        let delay = *self.one_shot_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.one_shot.lock().pop_front();
        match scripted {
            Some(reading) => reading,
            None => self
                .last_sample
                .lock()
                .clone()
                .ok_or(GeoError::PositionUnavailable),
        }
    }

    fn watch_position(&self, _options: &GeoOptions) -> Result<PositionWatch, GeoError> {
        if !self.supported {
            return Err(GeoError::Unsupported);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.watchers.lock().push(Watcher { id, tx, cancel_rx });
        Ok(PositionWatch::new(id, rx, cancel_tx))
    }
}

/// Notifier that keeps every notice for later inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
