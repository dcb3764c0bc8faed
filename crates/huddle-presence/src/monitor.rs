//! ProximityMonitor: the "you've drifted away from everyone" rule
//!
//! Every time the local position or the roster changes, the monitor finds
//! the nearest friend with a known location. If even that friend is farther
//! than the threshold, an [`AlertEvent`] is raised.
//!
//! ## States
//!
//! ```text
//! Quiet <-> Alerted
//! ```
//!
//! Any evaluation where the rule does not fire returns to **Quiet**. While
//! **Alerted**, the [`AlertPolicy`] decides whether a repeat evaluation
//! raises another alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_core::{
    AlertEvent, AlertPolicy, Clock, Coordinate, FriendIdentity, FriendRecord, Notice,
    PresenceConfig, UserId, distance_meters, format_km,
};
use tracing::{debug, info, warn};

/// The nearest located friend and how far away they are
#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    pub distance_meters: f64,
    pub nearest: FriendIdentity,
}

/// Find the nearest friend with a known location
///
/// Ties keep the first friend encountered, so with a roster iterated in
/// ascending id order the lowest id wins.
pub fn nearest<'a>(
    local: &Coordinate,
    friends: impl IntoIterator<Item = &'a FriendRecord>,
) -> Option<Proximity> {
    let mut best: Option<(f64, &FriendRecord)> = None;
    for record in friends {
        let Some(location) = &record.location else {
            continue;
        };
        let d = distance_meters(local, &location.coordinate);
        if !d.is_finite() {
            warn!(friend = %record.id(), "Skipping friend with unusable distance");
            continue;
        }
        if best.is_none_or(|(min, _)| d < min) {
            best = Some((d, record));
        }
    }
    best.map(|(distance_meters, record)| Proximity {
        distance_meters,
        nearest: record.identity.clone(),
    })
}

/// Alert state
#[derive(Debug, Clone, PartialEq)]
pub enum AlertState {
    Quiet,
    Alerted {
        friend: UserId,
        distance_meters: f64,
        last_alert_at: DateTime<Utc>,
    },
}

/// Evaluates the proximity rule and tracks the alert state
pub struct ProximityMonitor {
    threshold_m: f64,
    policy: AlertPolicy,
    clock: Arc<dyn Clock>,
    state: AlertState,
}

impl ProximityMonitor {
    pub fn new(config: &PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold_m: config.max_distance_alert_m,
            policy: config.alert_policy,
            clock,
            state: AlertState::Quiet,
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Recompute the rule for the current local position and roster
    ///
    /// Returns the alert to raise, if any.
    pub fn evaluate<'a>(
        &mut self,
        local: Option<&Coordinate>,
        friends: impl IntoIterator<Item = &'a FriendRecord>,
    ) -> Option<AlertEvent> {
        let proximity = local.and_then(|local| nearest(local, friends));

        let Some(proximity) = proximity.filter(|p| p.distance_meters > self.threshold_m) else {
            if self.state != AlertState::Quiet {
                debug!("Proximity back within threshold");
                self.state = AlertState::Quiet;
            }
            return None;
        };

        let now = self.clock.now_utc();
        let suppressed = match (&self.state, self.policy) {
            (AlertState::Quiet, _) | (_, AlertPolicy::EveryEvaluation) => false,
            (
                AlertState::Alerted {
                    friend,
                    distance_meters,
                    ..
                },
                AlertPolicy::SuppressUnchanged { tolerance_m },
            ) => {
                *friend == proximity.nearest.id
                    && (proximity.distance_meters - distance_meters).abs() <= tolerance_m
            }
            (AlertState::Alerted { last_alert_at, .. }, AlertPolicy::Cooldown { period_ms }) => {
                let elapsed = (now - *last_alert_at).to_std().unwrap_or(Duration::ZERO);
                elapsed < Duration::from_millis(period_ms)
            }
        };

        if suppressed {
            debug!(
                distance_m = proximity.distance_meters,
                friend = %proximity.nearest.id,
                "Proximity alert suppressed"
            );
            return None;
        }

        info!(
            distance_m = proximity.distance_meters,
            friend = %proximity.nearest.id,
            threshold_m = self.threshold_m,
            "Proximity alert"
        );
        self.state = AlertState::Alerted {
            friend: proximity.nearest.id.clone(),
            distance_meters: proximity.distance_meters,
            last_alert_at: now,
        };
        Some(AlertEvent {
            distance_meters: proximity.distance_meters,
            nearest_friend: proximity.nearest,
        })
    }
}

/// The user-facing notification for an alert
pub fn alert_notice(alert: &AlertEvent) -> Notice {
    Notice::warning(format!(
        "You're {}km away from {}!",
        format_km(alert.distance_meters),
        alert.nearest_friend.display_name
    ))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use huddle_core::{ManualClock, NoticeLevel, PositionSample};

    use super::*;

    fn friend(id: &str, lat: f64, lon: f64) -> FriendRecord {
        FriendRecord {
            identity: FriendIdentity {
                id: UserId::new(id),
                display_name: id.to_uppercase(),
                avatar_ref: String::new(),
                is_online: true,
                last_seen_at: None,
            },
            location: Some(PositionSample::new(
                Coordinate::new(lat, lon).unwrap(),
                Utc::now(),
            )),
        }
    }

    fn monitor(policy: AlertPolicy) -> (ProximityMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let config = PresenceConfig::default().with_alert_policy(policy);
        (ProximityMonitor::new(&config, clock.clone()), clock)
    }

    fn origin() -> Coordinate {
        Coordinate::new(0.0, 0.0).unwrap()
    }

    #[test]
    fn test_far_friend_raises_one_alert() {
        let (mut monitor, _) = monitor(AlertPolicy::EveryEvaluation);
        let roster = [friend("bob", 0.0, 0.01)];

        let alert = monitor.evaluate(Some(&origin()), &roster).unwrap();
        assert!((alert.distance_meters - 1112.0).abs() < 1.5);
        assert_eq!(alert.nearest_friend.id, UserId::new("bob"));
    }

    #[test]
    fn test_near_friend_raises_nothing() {
        let (mut monitor, _) = monitor(AlertPolicy::EveryEvaluation);
        let roster = [friend("bob", 0.0, 0.0001)];

        assert!(monitor.evaluate(Some(&origin()), &roster).is_none());
        assert_eq!(monitor.state(), &AlertState::Quiet);
    }

    #[test]
    fn test_nothing_to_compare_stays_quiet() {
        let (mut monitor, _) = monitor(AlertPolicy::EveryEvaluation);
        let unlocated = FriendRecord {
            location: None,
            ..friend("bob", 0.0, 1.0)
        };

        assert!(monitor.evaluate(None, &[friend("bob", 0.0, 1.0)]).is_none());
        let empty: [FriendRecord; 0] = [];
        assert!(monitor.evaluate(Some(&origin()), &empty).is_none());
        assert!(monitor.evaluate(Some(&origin()), &[unlocated]).is_none());
        assert_eq!(monitor.state(), &AlertState::Quiet);
    }

    #[test]
    fn test_nearest_wins_over_farther() {
        let local = Coordinate::new(40.0, -74.0).unwrap();
        let roster = [friend("far", 41.0, -74.0), friend("near", 40.001, -74.0)];

        let p = nearest(&local, &roster).unwrap();
        assert_eq!(p.nearest.id, UserId::new("near"));
        assert!((p.distance_meters - 111.2).abs() < 1.0);
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let roster = [friend("amy", 0.0, 0.01), friend("zed", 0.0, -0.01)];
        let p = nearest(&origin(), &roster).unwrap();
        assert_eq!(p.nearest.id, UserId::new("amy"));
    }

    #[test]
    fn test_antipodal_friend_does_not_mask_alert() {
        let local = Coordinate::new(-12.0, -90.0).unwrap();
        let roster = [friend("amy", 12.0, 90.0), friend("bob", -12.0, -89.99)];

        let p = nearest(&local, &roster).unwrap();
        assert_eq!(p.nearest.id, UserId::new("bob"));
        assert!((p.distance_meters - 1087.7).abs() < 2.0, "got {}", p.distance_meters);

        let (mut monitor, _) = monitor(AlertPolicy::EveryEvaluation);
        let alert = monitor.evaluate(Some(&local), &roster).unwrap();
        assert_eq!(alert.nearest_friend.id, UserId::new("bob"));
    }

    #[test]
    fn test_every_evaluation_repeats() {
        let (mut monitor, _) = monitor(AlertPolicy::EveryEvaluation);
        let roster = [friend("bob", 0.0, 0.01)];

        assert!(monitor.evaluate(Some(&origin()), &roster).is_some());
        assert!(monitor.evaluate(Some(&origin()), &roster).is_some());
    }

    #[test]
    fn test_suppress_unchanged() {
        let (mut monitor, _) = monitor(AlertPolicy::SuppressUnchanged { tolerance_m: 50.0 });
        let roster = [friend("bob", 0.0, 0.01)];

        assert!(monitor.evaluate(Some(&origin()), &roster).is_some());
        assert!(monitor.evaluate(Some(&origin()), &roster).is_none());

        // Moved well past the tolerance
        let moved = Coordinate::new(0.0, -0.01).unwrap();
        assert!(monitor.evaluate(Some(&moved), &roster).is_some());

        // Back in range, then out again alerts afresh
        assert!(monitor.evaluate(Some(&Coordinate::new(0.0, 0.0099).unwrap()), &roster).is_none());
        assert_eq!(monitor.state(), &AlertState::Quiet);
        assert!(monitor.evaluate(Some(&moved), &roster).is_some());
    }

    #[test]
    fn test_cooldown() {
        let (mut monitor, clock) = monitor(AlertPolicy::Cooldown { period_ms: 60_000 });
        let roster = [friend("bob", 0.0, 0.01)];

        assert!(monitor.evaluate(Some(&origin()), &roster).is_some());
        clock.advance(Duration::from_secs(30));
        assert!(monitor.evaluate(Some(&origin()), &roster).is_none());
        clock.advance(Duration::from_secs(30));
        assert!(monitor.evaluate(Some(&origin()), &roster).is_some());
    }

    #[test]
    fn test_alert_notice_text() {
        let alert = AlertEvent {
            distance_meters: 1234.5,
            nearest_friend: friend("bob", 0.0, 0.0).identity,
        };
        let notice = alert_notice(&alert);
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "You're 1.23km away from BOB!");
    }
}
