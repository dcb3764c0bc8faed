//! RosterStore: the live set of the signed-in user's friends
//!
//! Built from a bulk load (friendships, then profiles, then the latest
//! location rows) and kept current by location events from the change feed.
//! Friends are keyed by id in a `BTreeMap`, so iteration is in ascending id
//! order and there is never more than one record per friend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use huddle_core::{
    BackendError, ChangeKind, Filter, FriendIdentity, FriendRecord, Friendship, FriendshipStatus,
    LocalPresence, LocationEvent, PresenceConfig, Profile, Store, Table, UserId, decode_rows,
};
use tracing::{debug, instrument, trace, warn};

use crate::error::bounded;

/// What a load or event did to one roster entry
#[derive(Debug, Clone, PartialEq)]
pub enum RosterChange {
    /// A friend entered the roster
    Joined(FriendRecord),
    /// A friend's identity or location changed
    Updated(FriendRecord),
    /// A friend is no longer in the roster
    Left(UserId),
}

impl RosterChange {
    pub fn friend_id(&self) -> &UserId {
        match self {
            Self::Joined(record) | Self::Updated(record) => record.id(),
            Self::Left(id) => id,
        }
    }
}

/// In-memory roster for one signed-in user
pub struct RosterStore {
    store: Arc<dyn Store>,
    owner: UserId,
    backend_timeout: Duration,
    friends: BTreeMap<UserId, FriendRecord>,
}

impl RosterStore {
    /// An empty roster for `owner`
    pub fn new(store: Arc<dyn Store>, owner: UserId) -> Self {
        Self {
            store,
            owner,
            backend_timeout: PresenceConfig::default().backend_timeout(),
            friends: BTreeMap::new(),
        }
    }

    /// Bound every backend call made by [`load_initial`](Self::load_initial)
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Replace the roster with the owner's accepted friends and their
    /// latest locations
    ///
    /// On any backend error the roster is left exactly as it was. On success
    /// the returned changes describe how the roster moved.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn load_initial(&mut self) -> Result<Vec<RosterChange>, BackendError> {
        let loaded = self.fetch().await?;
        let changes = diff(&self.friends, &loaded);
        debug!(
            friends = loaded.len(),
            changes = changes.len(),
            "Roster loaded"
        );
        self.friends = loaded;
        Ok(changes)
    }

    async fn fetch(&self) -> Result<BTreeMap<UserId, FriendRecord>, BackendError> {
        let filter = Filter::new()
            .eq("user_id", &self.owner)
            .eq("status", FriendshipStatus::Accepted.as_str());
        let rows = bounded(
            self.backend_timeout,
            self.store.query(Table::Friendships, &filter),
        )
        .await?;
        let friend_ids: Vec<UserId> = decode_rows::<Friendship>(rows)?
            .into_iter()
            .map(|f| f.friend_id)
            .filter(|id| *id != self.owner)
            .collect();

        if friend_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let filter = Filter::new().in_list("id", &friend_ids);
        let rows = bounded(
            self.backend_timeout,
            self.store.query(Table::Profiles, &filter),
        )
        .await?;
        let mut profiles: HashMap<UserId, Profile> = decode_rows::<Profile>(rows)?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let filter = Filter::new().in_list("user_id", &friend_ids);
        let rows = bounded(
            self.backend_timeout,
            self.store.query(Table::UserLocations, &filter),
        )
        .await?;
        let mut locations: HashMap<UserId, LocalPresence> = HashMap::new();
        for presence in decode_rows::<LocalPresence>(rows)? {
            if !presence.coordinate.is_valid() {
                warn!(
                    user = %presence.user_id,
                    latitude = presence.coordinate.latitude,
                    longitude = presence.coordinate.longitude,
                    "Dropping location row with out-of-range coordinate"
                );
                continue;
            }
            // Keep the newest row if the backend ever returns more than one
            let newer = locations
                .get(&presence.user_id)
                .is_none_or(|prev| prev.updated_at <= presence.updated_at);
            if newer {
                locations.insert(presence.user_id.clone(), presence);
            }
        }

        Ok(friend_ids
            .into_iter()
            .map(|id| {
                let identity = match profiles.remove(&id) {
                    Some(profile) => FriendIdentity::from(profile),
                    None => placeholder_identity(&id),
                };
                let record = FriendRecord {
                    identity,
                    location: locations.get(&id).map(LocalPresence::to_sample),
                };
                (id, record)
            })
            .collect())
    }

    /// Apply one location event from the change feed
    ///
    /// Events for anyone who is not a known friend (the owner included) are
    /// ignored. A delete clears the friend's location but keeps the record.
    pub fn apply_location_event(&mut self, event: &LocationEvent) -> Option<RosterChange> {
        if event.user_id == self.owner {
            trace!("Ignoring echo of own location");
            return None;
        }

        let Some(record) = self.friends.get_mut(&event.user_id) else {
            trace!(user = %event.user_id, "Ignoring location of non-friend");
            return None;
        };

        let location = match event.kind {
            ChangeKind::Delete => None,
            ChangeKind::Insert | ChangeKind::Update => {
                let sample = event.sample.clone()?;
                if !sample.coordinate.is_valid() {
                    warn!(user = %event.user_id, "Ignoring location with out-of-range coordinate");
                    return None;
                }
                Some(sample)
            }
        };
        if record.location == location {
            return None;
        }

        record.location = location;
        Some(RosterChange::Updated(record.clone()))
    }

    pub fn get(&self, friend_id: &UserId) -> Option<&FriendRecord> {
        self.friends.get(friend_id)
    }

    /// Snapshot of every record, in ascending friend id order
    pub fn all(&self) -> Vec<FriendRecord> {
        self.friends.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FriendRecord> {
        self.friends.values()
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    /// Forget every friend (used on sign-out)
    pub fn clear(&mut self) -> Vec<RosterChange> {
        let left = self
            .friends
            .keys()
            .cloned()
            .map(RosterChange::Left)
            .collect();
        self.friends.clear();
        left
    }
}

/// Identity for a friend whose profile row is missing
fn placeholder_identity(id: &UserId) -> FriendIdentity {
    FriendIdentity {
        id: id.clone(),
        display_name: id.short_id(),
        avatar_ref: String::new(),
        is_online: false,
        last_seen_at: None,
    }
}

fn diff(
    before: &BTreeMap<UserId, FriendRecord>,
    after: &BTreeMap<UserId, FriendRecord>,
) -> Vec<RosterChange> {
    let mut changes = Vec::new();
    for (id, record) in after {
        match before.get(id) {
            None => changes.push(RosterChange::Joined(record.clone())),
            Some(prev) if prev != record => changes.push(RosterChange::Updated(record.clone())),
            Some(_) => {}
        }
    }
    for id in before.keys() {
        if !after.contains_key(id) {
            changes.push(RosterChange::Left(id.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use huddle_core::{Coordinate, MemoryStore, PositionSample};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_717_243_200 + secs, 0).unwrap()
    }

    fn friendship(user: &str, friend: &str, status: &str) -> serde_json::Value {
        json!({
            "user_id": user,
            "friend_id": friend,
            "status": status,
            "created_at": at(0),
        })
    }

    fn profile(id: &str, name: &str) -> serde_json::Value {
        json!({ "id": id, "username": name, "is_online": true })
    }

    fn location(user: &str, lat: f64, lon: f64, secs: i64) -> serde_json::Value {
        json!({
            "user_id": user,
            "latitude": lat,
            "longitude": lon,
            "updated_at": at(secs),
        })
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Table::Friendships,
            [
                friendship("alice", "bob", "accepted"),
                friendship("alice", "carol", "accepted"),
                friendship("alice", "dave", "pending"),
                friendship("erin", "alice", "accepted"),
            ],
        );
        store.seed(
            Table::Profiles,
            [
                profile("bob", "Bob"),
                profile("carol", "Carol"),
                profile("dave", "Dave"),
            ],
        );
        store.seed(
            Table::UserLocations,
            [location("bob", 40.001, -74.0, 10), location("dave", 1.0, 1.0, 10)],
        );
        store
    }

    fn sample(lat: f64, lon: f64, secs: i64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, lon).unwrap(), at(secs))
    }

    #[tokio::test]
    async fn test_load_initial_accepted_friends_only() {
        let store = seeded();
        let mut roster = RosterStore::new(store, UserId::new("alice"));

        let changes = assert_ok!(roster.load_initial().await);

        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| matches!(c, RosterChange::Joined(_))));
        let ids: Vec<_> = roster.iter().map(|r| r.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["bob", "carol"]);

        let bob = roster.get(&UserId::new("bob")).unwrap();
        assert_eq!(bob.identity.display_name, "Bob");
        assert_eq!(bob.location.as_ref().unwrap().coordinate.latitude, 40.001);
        assert!(roster.get(&UserId::new("carol")).unwrap().location.is_none());
    }

    #[tokio::test]
    async fn test_missing_profile_gets_placeholder() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Table::Friendships,
            [friendship("alice", "frank-0123456789", "accepted")],
        );
        let mut roster = RosterStore::new(store, UserId::new("alice"));
        roster.load_initial().await.unwrap();

        let frank = roster.get(&UserId::new("frank-0123456789")).unwrap();
        assert_eq!(frank.identity.display_name, "frank-01");
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_state() {
        let store = seeded();
        let mut roster = RosterStore::new(store.clone(), UserId::new("alice"));
        roster.load_initial().await.unwrap();
        let before = roster.all();

        store.set_offline(true);
        assert_err!(roster.load_initial().await);
        assert_eq!(roster.all(), before);
    }

    #[tokio::test]
    async fn test_transient_failure_then_recovery() {
        let store = seeded();
        let mut roster = RosterStore::new(store.clone(), UserId::new("alice"));

        store.fail_next(1);
        assert_err!(roster.load_initial().await);
        assert!(roster.is_empty());

        assert_ok!(roster.load_initial().await);
        assert_eq!(roster.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_reports_diff() {
        let store = seeded();
        let mut roster = RosterStore::new(store.clone(), UserId::new("alice"));
        roster.load_initial().await.unwrap();

        store
            .delete(
                Table::Friendships,
                &Filter::new().eq("friend_id", "carol"),
            )
            .await
            .unwrap();
        store
            .upsert(Table::UserLocations, location("bob", 40.002, -74.0, 20))
            .await
            .unwrap();

        let changes = roster.load_initial().await.unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|c| matches!(c, RosterChange::Updated(r) if r.id().as_str() == "bob")));
        assert!(changes.contains(&RosterChange::Left(UserId::new("carol"))));
    }

    #[tokio::test]
    async fn test_delete_clears_location_keeps_identity() {
        let mut roster = RosterStore::new(seeded(), UserId::new("alice"));
        roster.load_initial().await.unwrap();
        let bob_id = UserId::new("bob");
        let identity = roster.get(&bob_id).unwrap().identity.clone();

        let change = roster.apply_location_event(&LocationEvent::delete(bob_id.clone()));

        assert!(matches!(change, Some(RosterChange::Updated(_))));
        let bob = roster.get(&bob_id).unwrap();
        assert!(bob.location.is_none());
        assert_eq!(bob.identity, identity);
        assert_eq!(roster.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_own_events_are_ignored() {
        let mut roster = RosterStore::new(seeded(), UserId::new("alice"));
        roster.load_initial().await.unwrap();
        let before = roster.all();

        let stranger = LocationEvent::upsert(UserId::new("mallory"), sample(0.0, 0.0, 30));
        assert!(roster.apply_location_event(&stranger).is_none());

        let own = LocationEvent::upsert(UserId::new("alice"), sample(0.0, 0.0, 30));
        assert!(roster.apply_location_event(&own).is_none());

        assert_eq!(roster.all(), before);
    }

    #[tokio::test]
    async fn test_out_of_range_locations_are_rejected() {
        let store = seeded();
        store.seed(
            Table::UserLocations,
            [location("carol", 500.0, -999.0, 20)],
        );
        let mut roster = RosterStore::new(store, UserId::new("alice"));
        roster.load_initial().await.unwrap();
        let bob = UserId::new("bob");
        let carol = UserId::new("carol");
        assert!(roster.get(&carol).unwrap().location.is_none());

        let bad = PositionSample::new(
            Coordinate {
                latitude: 500.0,
                longitude: -999.0,
            },
            at(30),
        );
        let event = LocationEvent::upsert(bob.clone(), bad);
        assert!(roster.apply_location_event(&event).is_none());
        assert_eq!(
            roster.get(&bob).unwrap().location.as_ref().unwrap().coordinate.latitude,
            40.001
        );
    }

    #[tokio::test]
    async fn test_update_event_moves_friend() {
        let mut roster = RosterStore::new(seeded(), UserId::new("alice"));
        roster.load_initial().await.unwrap();
        let carol = UserId::new("carol");

        let fix = sample(40.5, -74.0, 30);
        let event = LocationEvent::upsert(carol.clone(), fix.clone());
        assert!(roster.apply_location_event(&event).is_some());
        assert_eq!(roster.get(&carol).unwrap().location, Some(fix));

        // Same fix again changes nothing
        assert!(roster.apply_location_event(&event).is_none());
    }

    #[tokio::test]
    async fn test_clear_reports_everyone_left() {
        let mut roster = RosterStore::new(seeded(), UserId::new("alice"));
        roster.load_initial().await.unwrap();

        let left = roster.clear();
        assert_eq!(left.len(), 2);
        assert!(roster.is_empty());
    }
}
