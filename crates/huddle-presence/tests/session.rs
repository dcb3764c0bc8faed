//! End-to-end tests for a presence session against the in-memory backend

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use huddle_core::{
    AuthError, AuthUser, Clock, Coordinate, Filter, GeoError, LocalPresence, ManualClock, MemoryStore,
    NoticeLevel, PositionSample, PresenceConfig, RecordingNotifier, ScriptedPositionProvider,
    StaticAuth, Store, Table, UserId,
};
use huddle_presence::{
    Cadence, MarkerOp, PresenceError, PresenceSession, PresenceSnapshot, RecordingPresenter,
    SessionDeps, SessionHandle, nearest,
};
use serde_json::json;

struct Harness {
    store: Arc<MemoryStore>,
    positions: Arc<ScriptedPositionProvider>,
    notifier: Arc<RecordingNotifier>,
    presenter: Arc<RecordingPresenter>,
    clock: Arc<ManualClock>,
    auth: Arc<StaticAuth>,
}

impl Harness {
    /// alice is friends with bob (111 m north of her) and carol (111 km north)
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Table::Profiles,
            [
                json!({ "id": "alice", "username": "Alice", "is_online": false }),
                json!({ "id": "bob", "username": "Bob", "is_online": true }),
                json!({ "id": "carol", "username": "Carol", "is_online": true }),
            ],
        );
        store.seed(
            Table::Friendships,
            ["bob", "carol"].map(|friend| {
                json!({
                    "user_id": "alice",
                    "friend_id": friend,
                    "status": "accepted",
                    "created_at": clock.now_utc(),
                })
            }),
        );

        let harness = Self {
            store,
            positions: Arc::new(ScriptedPositionProvider::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            presenter: Arc::new(RecordingPresenter::new()),
            clock,
            auth: Arc::new(StaticAuth::signed_in(AuthUser::new(
                "alice",
                "alice@example.com",
            ))),
        };
        harness.seed_location("bob", 40.001, -74.0);
        harness.seed_location("carol", 41.0, -74.0);
        harness
    }

    fn seed_location(&self, user: &str, lat: f64, lon: f64) {
        self.store.seed(
            Table::UserLocations,
            [json!({
                "user_id": user,
                "latitude": lat,
                "longitude": lon,
                "updated_at": self.clock.now_utc(),
            })],
        );
    }

    fn deps(&self) -> SessionDeps {
        SessionDeps::new(
            self.auth.clone(),
            self.store.clone(),
            self.positions.clone(),
            self.notifier.clone(),
            self.presenter.clone(),
        )
        .with_clock(self.clock.clone())
    }

    fn fix(&self, lat: f64, lon: f64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, lon).unwrap(), self.clock.now_utc())
    }

    fn config() -> PresenceConfig {
        PresenceConfig::default().with_resync_interval(None)
    }

    async fn start_at(&self, lat: f64, lon: f64) -> SessionHandle {
        self.positions.queue_current(Ok(self.fix(lat, lon)));
        let handle = PresenceSession::start(self.deps(), Self::config())
            .await
            .unwrap();
        wait_for(&handle, |s| s.local.is_some()).await;
        handle
    }

    fn own_row(&self) -> Option<LocalPresence> {
        self.store
            .rows(Table::UserLocations)
            .into_iter()
            .find(|row| row["user_id"] == "alice")
            .map(|row| serde_json::from_value(row).unwrap())
    }

    fn notice_messages(&self) -> Vec<String> {
        self.notifier
            .notices()
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

async fn wait_for(
    handle: &SessionHandle,
    pred: impl Fn(&PresenceSnapshot) -> bool,
) -> PresenceSnapshot {
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("session dropped its snapshot channel");
        }
    })
    .await
    .expect("timed out waiting for session state")
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_start_requires_sign_in() {
    let h = Harness::new();
    h.auth.sign_out();

    let result = PresenceSession::start(h.deps(), Harness::config()).await;
    assert!(matches!(
        result,
        Err(PresenceError::Auth(AuthError::NotSignedIn))
    ));
    assert_eq!(h.positions.active_watches(), 0);
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let h = Harness::new();
    let config = Harness::config().with_max_distance_alert(0.0);

    let result = PresenceSession::start(h.deps(), config).await;
    assert!(matches!(result, Err(PresenceError::Config(_))));
}

#[tokio::test]
async fn test_nearest_friend_within_threshold_does_not_alert() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;

    let snapshot = wait_for(&handle, |s| s.friends.len() == 2).await;
    let local = snapshot.local.as_ref().unwrap().coordinate;
    let proximity = nearest(&local, &snapshot.friends).unwrap();
    assert_eq!(proximity.nearest.id, UserId::new("bob"));
    assert!((proximity.distance_meters - 111.2).abs() < 1.0);

    assert_eq!(snapshot.alerts_raised, 0);
    assert!(snapshot.last_alert.is_none());
    assert!(
        h.notifier
            .notices()
            .iter()
            .all(|n| n.level != NoticeLevel::Warning)
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_far_friend_alerts_with_distance_text() {
    let h = Harness::new();
    h.store
        .delete(Table::Friendships, &Filter::new().eq("friend_id", "carol"))
        .await
        .unwrap();
    h.store
        .upsert(
            Table::UserLocations,
            json!({
                "user_id": "bob",
                "latitude": 0.0,
                "longitude": 0.01,
                "updated_at": h.clock.now_utc(),
            }),
        )
        .await
        .unwrap();

    let handle = h.start_at(0.0, 0.0).await;
    let snapshot = wait_for(&handle, |s| s.alerts_raised >= 1).await;

    let alert = snapshot.last_alert.unwrap();
    assert!((alert.distance_meters - 1112.0).abs() < 1.5);
    assert_eq!(alert.nearest_friend.display_name, "Bob");
    assert!(
        h.notice_messages()
            .contains(&"You're 1.11km away from Bob!".to_string())
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_publishes_and_presents() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    wait_for(&handle, |s| s.friends.len() == 2 && s.live).await;

    let row = h.own_row().expect("own location row published");
    assert_eq!(row.coordinate, Coordinate::new(40.0, -74.0).unwrap());

    let profiles = h
        .store
        .query(Table::Profiles, &Filter::new().eq("id", "alice"))
        .await
        .unwrap();
    assert_eq!(profiles[0]["is_online"], true);

    let ops = h.presenter.ops();
    let created: Vec<_> = ops
        .iter()
        .filter_map(|op| match op {
            MarkerOp::Create { friend_id, .. } => Some(friend_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec!["bob", "carol"]);
    assert!(ops.contains(&MarkerOp::CenterOn {
        coordinate: Coordinate::new(40.0, -74.0).unwrap()
    }));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_live_updates_move_and_clear_friends() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    wait_for(&handle, |s| s.friends.len() == 2).await;
    let bob = UserId::new("bob");
    let identity = handle.snapshot().friend(&bob).unwrap().identity.clone();

    h.clock.advance(Duration::from_secs(5));
    h.store
        .upsert(
            Table::UserLocations,
            json!({
                "user_id": "bob",
                "latitude": 40.002,
                "longitude": -74.0,
                "updated_at": h.clock.now_utc(),
            }),
        )
        .await
        .unwrap();
    wait_for(&handle, |s| {
        s.friend(&UserId::new("bob"))
            .and_then(|f| f.location.as_ref())
            .is_some_and(|l| l.coordinate.latitude == 40.002)
    })
    .await;
    assert!(h.presenter.ops().iter().any(|op| matches!(
        op,
        MarkerOp::Move { friend_id, .. } if friend_id.as_str() == "bob"
    )));

    h.store
        .delete(Table::UserLocations, &Filter::new().eq("user_id", "bob"))
        .await
        .unwrap();
    let snapshot = wait_for(&handle, |s| {
        s.friend(&UserId::new("bob"))
            .is_some_and(|f| f.location.is_none())
    })
    .await;
    assert_eq!(snapshot.friend(&bob).unwrap().identity, identity);
    assert_eq!(snapshot.friends.len(), 2);
    assert!(h.presenter.ops().contains(&MarkerOp::Remove {
        friend_id: bob.clone()
    }));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_strangers_and_own_echo_leave_roster_unchanged() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    let before = wait_for(&handle, |s| s.friends.len() == 2).await.friends;

    h.store
        .upsert(
            Table::UserLocations,
            json!({
                "user_id": "mallory",
                "latitude": 10.0,
                "longitude": 10.0,
                "updated_at": h.clock.now_utc(),
            }),
        )
        .await
        .unwrap();

    // Own fix comes back as a change event; it must not enter the roster
    h.clock.advance(Duration::from_secs(11));
    h.positions.push(Ok(h.fix(40.0005, -74.0)));
    let snapshot = wait_for(&handle, |s| {
        s.local
            .as_ref()
            .is_some_and(|l| l.coordinate.latitude == 40.0005)
    })
    .await;

    // A known-friend event afterwards proves the earlier ones were processed
    h.store
        .delete(Table::UserLocations, &Filter::new().eq("user_id", "carol"))
        .await
        .unwrap();
    let after = wait_for(&handle, |s| {
        s.friend(&UserId::new("carol"))
            .is_some_and(|f| f.location.is_none())
    })
    .await;

    assert_eq!(after.friends.len(), before.len());
    assert!(after.friend(&UserId::new("mallory")).is_none());
    assert!(after.friend(&UserId::new("alice")).is_none());
    assert_eq!(after.friend(&UserId::new("bob")), snapshot.friend(&UserId::new("bob")));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_friend_location_is_ignored() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    let before = wait_for(&handle, |s| s.friends.len() == 2).await;
    let bob = UserId::new("bob");

    h.store
        .upsert(
            Table::UserLocations,
            json!({
                "user_id": "bob",
                "latitude": 500.0,
                "longitude": -999.0,
                "updated_at": h.clock.now_utc(),
            }),
        )
        .await
        .unwrap();

    // A later valid event shows the bad one was processed and dropped
    h.store
        .delete(Table::UserLocations, &Filter::new().eq("user_id", "carol"))
        .await
        .unwrap();
    let after = wait_for(&handle, |s| {
        s.friend(&UserId::new("carol"))
            .is_some_and(|f| f.location.is_none())
    })
    .await;

    assert_eq!(after.friend(&bob), before.friend(&bob));
    assert!(!h.presenter.ops().iter().any(|op| matches!(
        op,
        MarkerOp::Create { coordinate, .. } | MarkerOp::Move { coordinate, .. }
            if coordinate.latitude == 500.0
    )));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_is_throttled_by_cadence() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;

    h.clock.advance(Duration::from_secs(3));
    h.positions.push(Ok(h.fix(40.01, -74.0)));
    wait_for(&handle, |s| {
        s.local.as_ref().is_some_and(|l| l.coordinate.latitude == 40.01)
    })
    .await;
    assert_eq!(h.own_row().unwrap().coordinate.latitude, 40.0);

    h.clock.advance(Duration::from_secs(10));
    h.positions.push(Ok(h.fix(40.02, -74.0)));
    wait_for(&handle, |s| {
        s.local.as_ref().is_some_and(|l| l.coordinate.latitude == 40.02)
    })
    .await;
    assert_eq!(h.own_row().unwrap().coordinate.latitude, 40.02);
    assert_eq!(h.store.rows(Table::UserLocations).len(), 3);

    handle.set_cadence(Cadence::Background).await.unwrap();
    wait_for(&handle, |s| s.cadence == Cadence::Background).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_roster_load_failure_is_soft_and_refresh_recovers() {
    let h = Harness::new();
    h.store.set_offline(true);
    h.positions.queue_current(Ok(h.fix(40.0, -74.0)));

    let handle = PresenceSession::start(h.deps(), Harness::config())
        .await
        .unwrap();
    let snapshot = wait_for(&handle, |s| s.local.is_some()).await;
    assert!(snapshot.friends.is_empty());
    assert!(!snapshot.live);

    let messages = h.notice_messages();
    assert!(messages.contains(&"Failed to load friends".to_string()));
    assert!(messages.contains(&"Failed to share your location".to_string()));

    h.store.set_offline(false);
    handle.refresh().await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.friends.len(), 2);
    assert!(snapshot.live);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_closed_feed_triggers_resync() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    wait_for(&handle, |s| s.friends.len() == 2 && s.live).await;

    h.store.close_feeds();
    h.clock.advance(Duration::from_secs(5));
    h.store
        .upsert(
            Table::UserLocations,
            json!({
                "user_id": "carol",
                "latitude": 40.5,
                "longitude": -74.0,
                "updated_at": h.clock.now_utc(),
            }),
        )
        .await
        .unwrap();

    // Either the resync load or the reconnected feed brings carol's move in
    let snapshot = wait_for(&handle, |s| {
        s.live
            && s.friend(&UserId::new("carol"))
                .and_then(|f| f.location.as_ref())
                .is_some_and(|l| l.coordinate.latitude == 40.5)
    })
    .await;
    assert_eq!(snapshot.friends.len(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_permission_denied_is_notified_and_stops_watch() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    assert_eq!(h.positions.active_watches(), 1);

    h.positions.push(Err(GeoError::PermissionDenied));
    eventually("watch cancellation", || h.positions.active_watches() == 0).await;

    let expected = "Unable to get your location. Please enable location permissions.";
    assert!(h.notice_messages().contains(&expected.to_string()));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transient_geo_error_keeps_watching() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;

    h.positions.push(Err(GeoError::PositionUnavailable));
    h.clock.advance(Duration::from_secs(1));
    h.positions.push(Ok(h.fix(40.003, -74.0)));
    wait_for(&handle, |s| {
        s.local.as_ref().is_some_and(|l| l.coordinate.latitude == 40.003)
    })
    .await;

    assert_eq!(h.positions.active_watches(), 1);
    assert!(
        h.notice_messages()
            .contains(&"Unable to get your location. Location information unavailable.".to_string())
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_locate_refreshes_stale_fix() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;

    // Fresh enough: answered from the cache
    let cached = handle.locate().await.unwrap();
    assert_eq!(cached.coordinate.latitude, 40.0);
    assert_eq!(h.positions.current_calls(), 1);

    h.clock.advance(Duration::from_secs(31));
    h.positions.queue_current(Ok(h.fix(40.2, -74.0)));
    let fresh = handle.locate().await.unwrap();
    assert_eq!(fresh.coordinate.latitude, 40.2);
    assert_eq!(h.positions.current_calls(), 2);
    assert!(h.presenter.ops().contains(&MarkerOp::MoveSelf {
        coordinate: fresh.coordinate
    }));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_tears_everything_down() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    wait_for(&handle, |s| s.friends.len() == 2).await;
    let snapshots = handle.subscribe();

    handle.shutdown().await.unwrap();

    assert_eq!(h.positions.active_watches(), 0);
    let profiles = h
        .store
        .query(Table::Profiles, &Filter::new().eq("id", "alice"))
        .await
        .unwrap();
    assert_eq!(profiles[0]["is_online"], false);
    assert!(snapshots.borrow().friends.is_empty());
    assert!(!snapshots.borrow().live);

    let removed = h
        .presenter
        .ops()
        .iter()
        .filter(|op| matches!(op, MarkerOp::Remove { .. }))
        .count();
    assert_eq!(removed, 2);
    assert_eq!(h.presenter.ops().last(), Some(&MarkerOp::RemoveSelf));
}

#[tokio::test]
async fn test_shutdown_during_slow_first_fix() {
    let h = Harness::new();
    h.positions.set_current_delay(Some(Duration::from_secs(60)));
    h.positions.queue_current(Ok(h.fix(40.0, -74.0)));
    let handle = PresenceSession::start(h.deps(), Harness::config())
        .await
        .unwrap();
    wait_for(&handle, |s| s.friends.len() == 2).await;

    let stopped = tokio::time::timeout(Duration::from_secs(2), handle.shutdown()).await;
    assert!(stopped.is_ok(), "shutdown waited on the pending fix");
    assert_eq!(h.positions.active_watches(), 0);
    assert!(!h.presenter.ops().contains(&MarkerOp::RemoveSelf));
}

#[tokio::test]
async fn test_dropping_handle_stops_session() {
    let h = Harness::new();
    let handle = h.start_at(40.0, -74.0).await;
    assert_eq!(h.positions.active_watches(), 1);

    drop(handle);
    eventually("watch cancellation", || h.positions.active_watches() == 0).await;
}
