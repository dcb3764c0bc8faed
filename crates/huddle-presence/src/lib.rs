//! # Huddle Presence
//!
//! The proximity/presence engine: tracks the device's position, publishes
//! it, keeps a live roster of friends' positions, reconciles map markers,
//! and warns the user when every friend is farther than the threshold.
//!
//! ## Components
//!
//! - [`GeoSource`]: device fixes with timeout and staleness handling
//! - [`RosterStore`]: friends and their last known positions
//! - [`LocationPublisher`]: throttled writes of the local position
//! - [`ProximityMonitor`]: the distance alert rule
//! - [`MarkerBoard`]: marker create/move/remove for the map view
//! - [`PresenceSession`]: one task wiring all of the above together
//!
//! ## Example
//!
//! ```rust,ignore
//! use huddle_presence::{PresenceSession, SessionDeps};
//!
//! let handle = PresenceSession::start(deps, PresenceConfig::default()).await?;
//! let snapshot = handle.snapshot();
//! for row in snapshot.friends_list() {
//!     println!("{}: {}", row.identity.display_name, row.status_text);
//! }
//! handle.shutdown().await?;
//! ```

pub mod error;
pub mod friends_list;
pub mod markers;
pub mod monitor;
pub mod publisher;
pub mod roster;
pub mod session;
pub mod source;

pub use error::{PresenceError, PresenceResult};
pub use friends_list::{FriendSummary, summarize};
pub use markers::{MapPresenter, MarkerBoard, MarkerOp, RecordingPresenter};
pub use monitor::{AlertState, Proximity, ProximityMonitor, alert_notice, nearest};
pub use publisher::{Cadence, LocationPublisher, PublishOutcome};
pub use roster::{RosterChange, RosterStore};
pub use session::{PresenceSession, PresenceSnapshot, SessionDeps, SessionHandle};
pub use source::GeoSource;
