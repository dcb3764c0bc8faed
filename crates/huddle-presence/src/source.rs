//! GeoSource: the device position API with timeout and fix caching

use std::sync::Arc;

use huddle_core::{Clock, GeoError, GeoOptions, PositionProvider, PositionSample, PositionWatch};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Wraps a [`PositionProvider`] with the configured [`GeoOptions`]
///
/// One-shot requests are bounded by `timeout` and answered from the last
/// fix while it is no older than `maximum_age`.
pub struct GeoSource {
    provider: Arc<dyn PositionProvider>,
    options: GeoOptions,
    clock: Arc<dyn Clock>,
    last_fix: Mutex<Option<PositionSample>>,
}

impl GeoSource {
    pub fn new(
        provider: Arc<dyn PositionProvider>,
        options: GeoOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            options,
            clock,
            last_fix: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &GeoOptions {
        &self.options
    }

    /// The most recent fix seen, from either a request or the watch
    pub fn last_fix(&self) -> Option<PositionSample> {
        self.last_fix.lock().clone()
    }

    /// Record a fix delivered by the watch so one-shot requests can reuse it
    pub fn remember(&self, sample: &PositionSample) {
        let mut last = self.last_fix.lock();
        let newer = last
            .as_ref()
            .is_none_or(|prev| prev.captured_at <= sample.captured_at);
        if newer {
            *last = Some(sample.clone());
        }
    }

    /// A single fix, reusing the cached one while it is fresh enough
    pub async fn current_position(&self) -> Result<PositionSample, GeoError> {
        let now = self.clock.now_utc();
        let cached = self.last_fix();
        if let Some(sample) = cached {
            if !sample.is_stale(now, self.options.maximum_age()) {
                trace!(age_ms = sample.age(now).as_millis() as u64, "Reusing cached fix");
                return Ok(sample);
            }
        }

        let request = self.provider.current_position(&self.options);
        let sample = match tokio::time::timeout(self.options.timeout(), request).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(timeout_ms = self.options.timeout_ms, "Position request timed out");
                return Err(GeoError::Timeout);
            }
        };
        let sample = validated(sample)?;

        self.remember(&sample);
        Ok(sample)
    }

    /// Start continuous monitoring
    pub fn watch(&self) -> Result<PositionWatch, GeoError> {
        let watch = self.provider.watch_position(&self.options)?;
        debug!(watch_id = watch.id(), "Position watch started");
        Ok(watch)
    }

    /// Stop a watch; safe to call more than once
    pub fn cancel(watch: &mut PositionWatch) {
        if watch.is_active() {
            debug!(watch_id = watch.id(), "Position watch cancelled");
        }
        watch.cancel();
    }
}

/// Reject fixes outside the coordinate ranges
pub fn validated(sample: PositionSample) -> Result<PositionSample, GeoError> {
    if sample.coordinate.is_valid() {
        Ok(sample)
    } else {
        Err(GeoError::InvalidCoordinate {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
        })
    }
}
