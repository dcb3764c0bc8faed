//! Configuration for the social features

use chrono::Duration;
use huddle_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Characters a group code is drawn from
pub const GROUP_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// How long a group lives before it is purged
    pub group_lifetime_hours: u32,
    /// Length of generated join codes
    pub group_code_length: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            group_lifetime_hours: 6,
            group_code_length: 6,
        }
    }
}

impl SocialConfig {
    pub fn group_lifetime(&self) -> Duration {
        Duration::hours(i64::from(self.group_lifetime_hours))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_lifetime_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "group_lifetime_hours".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.group_code_length < 4 {
            return Err(ConfigError::InvalidValue {
                key: "group_code_length".into(),
                reason: "must be at least 4".into(),
            });
        }
        Ok(())
    }
}
