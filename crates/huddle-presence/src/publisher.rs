//! LocationPublisher: writes the signed-in user's position row
//!
//! Publishing is best effort and at most once per sample. A failed write is
//! logged and reported, never queued; the next fix supersedes it.
//!
//! ## Cadence
//!
//! [`LocationPublisher::maybe_publish`] limits how often fixes reach the
//! backend:
//!
//! - **Foreground**: at most once per `location_update_interval`
//! - **Background**: at most once per `background_update_interval`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_core::{
    BackendError, Clock, LocalPresence, PositionSample, PresenceConfig, Store, Table, UserId,
    encode_row,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::bounded;

/// Whether the app is on screen, which picks the publish interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cadence {
    #[default]
    Foreground,
    Background,
}

/// What happened to a sample offered to [`LocationPublisher::maybe_publish`]
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The row was written
    Published,
    /// Skipped: the last publish is younger than the cadence interval
    Throttled,
    /// Skipped: the sample is older than what was already published
    Outdated,
    /// The write failed; nothing is retried
    Failed(BackendError),
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published)
    }
}

/// Owns every write to the signed-in user's `user_locations` row
pub struct LocationPublisher {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
    foreground_interval: Duration,
    background_interval: Duration,
    backend_timeout: Duration,
    cadence: Cadence,
    last_sample: Option<PositionSample>,
    last_published_at: Option<DateTime<Utc>>,
}

impl LocationPublisher {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        user_id: UserId,
        config: &PresenceConfig,
    ) -> Self {
        Self {
            store,
            clock,
            user_id,
            foreground_interval: config.location_update_interval(),
            background_interval: config.background_update_interval(),
            backend_timeout: config.backend_timeout(),
            cadence: Cadence::Foreground,
            last_sample: None,
            last_published_at: None,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn set_cadence(&mut self, cadence: Cadence) {
        if self.cadence != cadence {
            debug!(?cadence, "Publish cadence changed");
            self.cadence = cadence;
        }
    }

    /// Minimum time between publishes at the current cadence
    pub fn interval(&self) -> Duration {
        match self.cadence {
            Cadence::Foreground => self.foreground_interval,
            Cadence::Background => self.background_interval,
        }
    }

    /// The sample most recently written
    pub fn last_published(&self) -> Option<&PositionSample> {
        self.last_sample.as_ref()
    }

    /// Upsert the position row for this user (last write wins)
    pub async fn publish(&mut self, sample: &PositionSample) -> Result<(), BackendError> {
        let row = encode_row(&LocalPresence::from_sample(self.user_id.clone(), sample))?;
        match bounded(
            self.backend_timeout,
            self.store.upsert(Table::UserLocations, row),
        )
        .await
        {
            Ok(_) => {
                debug!(
                    latitude = sample.coordinate.latitude,
                    longitude = sample.coordinate.longitude,
                    "Location published"
                );
                self.last_sample = Some(sample.clone());
                self.last_published_at = Some(self.clock.now_utc());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to publish location");
                Err(e)
            }
        }
    }

    /// Publish unless throttled by the cadence or superseded
    pub async fn maybe_publish(&mut self, sample: &PositionSample) -> PublishOutcome {
        if let Some(last) = &self.last_sample {
            if sample.captured_at < last.captured_at {
                return PublishOutcome::Outdated;
            }
        }

        if !self.should_publish() {
            return PublishOutcome::Throttled;
        }

        match self.publish(sample).await {
            Ok(()) => PublishOutcome::Published,
            Err(e) => PublishOutcome::Failed(e),
        }
    }

    fn should_publish(&self) -> bool {
        match self.last_published_at {
            None => true,
            Some(last) => {
                let elapsed = (self.clock.now_utc() - last)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                elapsed >= self.interval()
            }
        }
    }
}
