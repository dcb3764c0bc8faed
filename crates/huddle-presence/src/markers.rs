//! Marker reconciliation for the map view
//!
//! [`MarkerBoard`] remembers which markers the map shows and turns roster
//! changes into the minimal [`MarkerOp`]s that bring the map up to date.
//! Reconciling the same record twice yields nothing the second time.

use std::collections::{HashMap, HashSet};

use huddle_core::{Coordinate, FriendRecord, UserId};
use parking_lot::Mutex;
use tracing::trace;

use crate::roster::RosterChange;

/// One change to apply to the map
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    /// Add a marker for a friend
    Create {
        friend_id: UserId,
        coordinate: Coordinate,
        label: String,
        avatar_ref: String,
        online: bool,
    },
    /// Move or restyle an existing friend marker
    Move {
        friend_id: UserId,
        coordinate: Coordinate,
        online: bool,
    },
    /// Take a friend's marker off the map
    Remove { friend_id: UserId },
    /// Pan the map to a coordinate
    CenterOn { coordinate: Coordinate },
    /// Add the local user's marker
    PlaceSelf { coordinate: Coordinate },
    /// Move the local user's marker
    MoveSelf { coordinate: Coordinate },
    /// Take the local user's marker off the map
    RemoveSelf,
}

/// The map view, as far as the presence engine is concerned
pub trait MapPresenter: Send + Sync {
    fn apply(&self, op: &MarkerOp);
}

/// Presenter that records every op for later inspection
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    ops: Mutex<Vec<MarkerOp>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<MarkerOp> {
        self.ops.lock().clone()
    }

    pub fn take(&self) -> Vec<MarkerOp> {
        std::mem::take(&mut *self.ops.lock())
    }
}

impl MapPresenter for RecordingPresenter {
    fn apply(&self, op: &MarkerOp) {
        self.ops.lock().push(op.clone());
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Marker {
    coordinate: Coordinate,
    online: bool,
}

/// Markers currently on the map, keyed by friend id
#[derive(Debug, Default)]
pub struct MarkerBoard {
    friends: HashMap<UserId, Marker>,
    own: Option<Coordinate>,
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring one friend's marker in line with their record
    pub fn reconcile(&mut self, record: &FriendRecord) -> Option<MarkerOp> {
        let friend_id = record.id();
        let Some(location) = &record.location else {
            return self.remove(friend_id);
        };

        let wanted = Marker {
            coordinate: location.coordinate,
            online: record.identity.is_online,
        };
        match self.friends.get(friend_id).cloned() {
            Some(current) if current == wanted => None,
            Some(_) => {
                trace!(friend = %friend_id, "Moving marker");
                self.friends.insert(friend_id.clone(), wanted.clone());
                Some(MarkerOp::Move {
                    friend_id: friend_id.clone(),
                    coordinate: wanted.coordinate,
                    online: wanted.online,
                })
            }
            None => {
                trace!(friend = %friend_id, "Creating marker");
                self.friends.insert(friend_id.clone(), wanted.clone());
                Some(MarkerOp::Create {
                    friend_id: friend_id.clone(),
                    coordinate: wanted.coordinate,
                    label: record.identity.display_name.clone(),
                    avatar_ref: record.identity.avatar_ref.clone(),
                    online: wanted.online,
                })
            }
        }
    }

    /// Remove a friend's marker if the map shows one
    pub fn remove(&mut self, friend_id: &UserId) -> Option<MarkerOp> {
        self.friends.remove(friend_id).map(|_| MarkerOp::Remove {
            friend_id: friend_id.clone(),
        })
    }

    /// Ops for a roster change
    pub fn apply_change(&mut self, change: &RosterChange) -> Option<MarkerOp> {
        match change {
            RosterChange::Joined(record) | RosterChange::Updated(record) => self.reconcile(record),
            RosterChange::Left(friend_id) => self.remove(friend_id),
        }
    }

    /// Drop markers for anyone no longer in the roster
    pub fn retain_roster<'a>(
        &mut self,
        roster: impl IntoIterator<Item = &'a FriendRecord>,
    ) -> Vec<MarkerOp> {
        let keep: HashSet<&UserId> = roster.into_iter().map(FriendRecord::id).collect();
        let gone: Vec<UserId> = self
            .friends
            .keys()
            .filter(|id| !keep.contains(id))
            .cloned()
            .collect();
        gone.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Ops for a new local fix: the first centers the map and places the
    /// user's marker, later ones move it
    pub fn place_self(&mut self, coordinate: Coordinate) -> Vec<MarkerOp> {
        match self.own.replace(coordinate) {
            None => vec![
                MarkerOp::CenterOn { coordinate },
                MarkerOp::PlaceSelf { coordinate },
            ],
            Some(prev) if prev == coordinate => Vec::new(),
            Some(_) => vec![MarkerOp::MoveSelf { coordinate }],
        }
    }

    /// Remove the user's marker if the map shows one
    pub fn remove_self(&mut self) -> Option<MarkerOp> {
        self.own.take().map(|_| MarkerOp::RemoveSelf)
    }

    pub fn len(&self) -> usize {
        self.friends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    pub fn contains(&self, friend_id: &UserId) -> bool {
        self.friends.contains_key(friend_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use huddle_core::{FriendIdentity, PositionSample};

    use super::*;

    fn record(id: &str, at: Option<(f64, f64)>) -> FriendRecord {
        FriendRecord {
            identity: FriendIdentity {
                id: UserId::new(id),
                display_name: id.to_string(),
                avatar_ref: format!("{}.png", id),
                is_online: true,
                last_seen_at: None,
            },
            location: at.map(|(lat, lon)| {
                PositionSample::new(Coordinate::new(lat, lon).unwrap(), Utc::now())
            }),
        }
    }

    #[test]
    fn test_create_move_remove() {
        let mut board = MarkerBoard::new();

        let op = board.reconcile(&record("bob", Some((1.0, 1.0))));
        assert!(matches!(op, Some(MarkerOp::Create { ref label, .. }) if label == "bob"));
        assert!(board.contains(&UserId::new("bob")));

        let op = board.reconcile(&record("bob", Some((1.5, 1.0))));
        assert!(matches!(op, Some(MarkerOp::Move { coordinate, .. }) if coordinate.latitude == 1.5));

        let op = board.reconcile(&record("bob", None));
        assert_eq!(
            op,
            Some(MarkerOp::Remove {
                friend_id: UserId::new("bob")
            })
        );
        assert!(board.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut board = MarkerBoard::new();
        let bob = record("bob", Some((1.0, 1.0)));

        assert!(board.reconcile(&bob).is_some());
        assert!(board.reconcile(&bob).is_none());
        assert_eq!(board.len(), 1);

        // No marker to remove for someone never shown
        assert!(board.reconcile(&record("carol", None)).is_none());
    }

    #[test]
    fn test_online_flag_restyles() {
        let mut board = MarkerBoard::new();
        let mut bob = record("bob", Some((1.0, 1.0)));
        board.reconcile(&bob);

        bob.identity.is_online = false;
        assert!(matches!(
            board.reconcile(&bob),
            Some(MarkerOp::Move { online: false, .. })
        ));
    }

    #[test]
    fn test_retain_roster() {
        let mut board = MarkerBoard::new();
        let bob = record("bob", Some((1.0, 1.0)));
        let carol = record("carol", Some((2.0, 2.0)));
        board.reconcile(&bob);
        board.reconcile(&carol);

        let ops = board.retain_roster([&bob]);
        assert_eq!(
            ops,
            vec![MarkerOp::Remove {
                friend_id: UserId::new("carol")
            }]
        );
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_roster_change_left() {
        let mut board = MarkerBoard::new();
        board.apply_change(&RosterChange::Joined(record("bob", Some((1.0, 1.0)))));
        let op = board.apply_change(&RosterChange::Left(UserId::new("bob")));
        assert!(matches!(op, Some(MarkerOp::Remove { .. })));
    }

    #[test]
    fn test_self_marker_lifecycle() {
        let mut board = MarkerBoard::new();
        let here = Coordinate::new(40.0, -74.0).unwrap();
        let there = Coordinate::new(40.1, -74.0).unwrap();

        assert_eq!(
            board.place_self(here),
            vec![
                MarkerOp::CenterOn { coordinate: here },
                MarkerOp::PlaceSelf { coordinate: here }
            ]
        );
        assert!(board.place_self(here).is_empty());
        assert_eq!(
            board.place_self(there),
            vec![MarkerOp::MoveSelf { coordinate: there }]
        );

        assert_eq!(board.remove_self(), Some(MarkerOp::RemoveSelf));
        assert!(board.remove_self().is_none());
        // Placed again after removal, the map is re-centered
        assert_eq!(board.place_self(here).len(), 2);
    }

    #[test]
    fn test_recording_presenter() {
        let presenter = RecordingPresenter::new();
        presenter.apply(&MarkerOp::Remove {
            friend_id: UserId::new("bob"),
        });
        assert_eq!(presenter.ops().len(), 1);
        assert_eq!(presenter.take().len(), 1);
        assert!(presenter.ops().is_empty());
    }
}
