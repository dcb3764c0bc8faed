//! Terminal stand-ins for the toast UI and the map

use huddle_core::{Notice, NoticeLevel, Notifier};
use huddle_presence::{MapPresenter, MarkerOp};
use tracing::debug;

/// Prints every notice on its own line
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => " ok ",
            NoticeLevel::Warning => "WARN",
            NoticeLevel::Error => "FAIL",
        };
        println!("  [{}] {}", tag, notice.message);
    }
}

/// Logs marker ops instead of drawing them
pub struct ConsolePresenter;

impl MapPresenter for ConsolePresenter {
    fn apply(&self, op: &MarkerOp) {
        match op {
            MarkerOp::Create {
                friend_id,
                coordinate,
                label,
                ..
            } => debug!(
                friend = %friend_id,
                %label,
                lat = coordinate.latitude,
                lon = coordinate.longitude,
                "Marker created"
            ),
            MarkerOp::Move {
                friend_id,
                coordinate,
                online,
            } => debug!(
                friend = %friend_id,
                lat = coordinate.latitude,
                lon = coordinate.longitude,
                online,
                "Marker moved"
            ),
            MarkerOp::Remove { friend_id } => debug!(friend = %friend_id, "Marker removed"),
            MarkerOp::CenterOn { coordinate } => {
                debug!(lat = coordinate.latitude, lon = coordinate.longitude, "Map centered")
            }
            MarkerOp::PlaceSelf { coordinate } | MarkerOp::MoveSelf { coordinate } => {
                debug!(lat = coordinate.latitude, lon = coordinate.longitude, "Own marker placed")
            }
            MarkerOp::RemoveSelf => debug!("Own marker removed"),
        }
    }
}
