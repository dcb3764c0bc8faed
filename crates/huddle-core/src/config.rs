//! Configuration for the presence engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default proximity alert threshold in meters
pub const DEFAULT_MAX_DISTANCE_ALERT_M: f64 = 200.0;

/// Default foreground publish interval in milliseconds
pub const DEFAULT_LOCATION_UPDATE_INTERVAL_MS: u64 = 10_000;

/// Default publish interval while the app is in the background
pub const DEFAULT_BACKGROUND_UPDATE_INTERVAL_MS: u64 = 30_000;

/// Options passed to the device position API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoOptions {
    /// Ask the device for its most accurate fix
    pub high_accuracy: bool,
    /// How long a single fix may take
    pub timeout_ms: u64,
    /// Oldest cached fix that may be reused instead of asking again
    pub maximum_age_ms: u64,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 30_000,
        }
    }
}

impl GeoOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }
}

/// How often a standing proximity alert is repeated
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Alert on every qualifying evaluation, even if nothing changed
    #[default]
    EveryEvaluation,
    /// Stay silent while the nearest friend and distance are unchanged
    SuppressUnchanged { tolerance_m: f64 },
    /// At most one alert per period while the rule keeps firing
    Cooldown { period_ms: u64 },
}

/// Configuration for a presence session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Nearest-friend distance above which an alert is raised
    pub max_distance_alert_m: f64,
    /// Minimum time between publishes while in the foreground
    pub location_update_interval_ms: u64,
    /// Minimum time between publishes while in the background
    pub background_update_interval_ms: u64,
    /// Device position options
    pub geo: GeoOptions,
    /// Periodic roster reload; `None` disables it
    pub resync_interval_ms: Option<u64>,
    /// Upper bound on a single backend call made by the session
    pub backend_timeout_ms: u64,
    /// Alert repetition policy
    pub alert_policy: AlertPolicy,
    /// Flip the profile's online flag on session start and end
    pub track_online_status: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            max_distance_alert_m: DEFAULT_MAX_DISTANCE_ALERT_M,
            location_update_interval_ms: DEFAULT_LOCATION_UPDATE_INTERVAL_MS,
            background_update_interval_ms: DEFAULT_BACKGROUND_UPDATE_INTERVAL_MS,
            geo: GeoOptions::default(),
            resync_interval_ms: Some(60_000),
            backend_timeout_ms: 15_000,
            alert_policy: AlertPolicy::default(),
            track_online_status: true,
        }
    }
}

impl PresenceConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `HUDDLE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Overlay `HUDDLE_*` environment variables onto this config
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_parse::<f64>("HUDDLE_MAX_DISTANCE_ALERT")? {
            self.max_distance_alert_m = v;
        }
        if let Some(v) = env_parse::<u64>("HUDDLE_LOCATION_UPDATE_INTERVAL_MS")? {
            self.location_update_interval_ms = v;
        }
        if let Some(v) = env_parse::<u64>("HUDDLE_BACKGROUND_UPDATE_INTERVAL_MS")? {
            self.background_update_interval_ms = v;
        }
        if let Some(v) = env_parse::<u64>("HUDDLE_GEO_TIMEOUT_MS")? {
            self.geo.timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("HUDDLE_GEO_MAXIMUM_AGE_MS")? {
            self.geo.maximum_age_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject thresholds and intervals that would disable the engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_distance_alert_m.is_finite() && self.max_distance_alert_m > 0.0) {
            return Err(invalid("max_distance_alert_m", "must be a positive number of meters"));
        }
        if self.location_update_interval_ms == 0 {
            return Err(invalid("location_update_interval_ms", "must be greater than zero"));
        }
        if self.background_update_interval_ms == 0 {
            return Err(invalid("background_update_interval_ms", "must be greater than zero"));
        }
        if self.geo.timeout_ms == 0 {
            return Err(invalid("geo.timeout_ms", "must be greater than zero"));
        }
        if self.resync_interval_ms == Some(0) {
            return Err(invalid("resync_interval_ms", "must be greater than zero when set"));
        }
        if self.backend_timeout_ms == 0 {
            return Err(invalid("backend_timeout_ms", "must be greater than zero"));
        }
        if let AlertPolicy::SuppressUnchanged { tolerance_m } = self.alert_policy {
            if !(tolerance_m.is_finite() && tolerance_m >= 0.0) {
                return Err(invalid("alert_policy.tolerance_m", "must be non-negative"));
            }
        }
        Ok(())
    }

    /// Set the alert threshold
    pub fn with_max_distance_alert(mut self, meters: f64) -> Self {
        self.max_distance_alert_m = meters;
        self
    }

    /// Set the foreground publish interval
    pub fn with_location_update_interval(mut self, interval: Duration) -> Self {
        self.location_update_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the periodic resync interval
    pub fn with_resync_interval(mut self, interval: Option<Duration>) -> Self {
        self.resync_interval_ms = interval.map(|d| d.as_millis() as u64);
        self
    }

    /// Set the alert policy
    pub fn with_alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alert_policy = policy;
        self
    }

    /// Enable or disable online-flag tracking
    pub fn with_online_tracking(mut self, enabled: bool) -> Self {
        self.track_online_status = enabled;
        self
    }

    pub fn location_update_interval(&self) -> Duration {
        Duration::from_millis(self.location_update_interval_ms)
    }

    pub fn background_update_interval(&self) -> Duration {
        Duration::from_millis(self.background_update_interval_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_ms.map(Duration::from_millis)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &format!("cannot parse {:?}", raw))),
        Err(_) => Ok(None),
    }
}
