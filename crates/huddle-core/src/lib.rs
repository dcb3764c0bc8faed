//! # Huddle Core
//!
//! Core types, traits, and errors for the Huddle presence engine.
//!
//! This crate holds everything the engine shares with its collaborators:
//! the data model, the distance function, and the traits through which the
//! auth provider, the hosted backend and the device position API are
//! injected. In-memory doubles for all of them live here too, so the same
//! engine code runs against tests and the demo binary.
//!
//! ## Key Traits
//!
//! - [`Store`]: generic CRUD plus real-time change feed
//! - [`AuthProvider`]: the signed-in user
//! - [`PositionProvider`]: one-shot and continuous device fixes
//! - [`Notifier`]: transient user-facing notifications
//! - [`Clock`]: time abstraction for testability
//!
//! ## Key Types
//!
//! - [`Coordinate`] / [`PositionSample`]: where someone is and when
//! - [`FriendRecord`]: a roster entry
//! - [`LocalPresence`]: the published position row
//! - [`AlertEvent`]: the proximity rule fired
//! - [`PresenceConfig`]: thresholds and cadences

pub mod config;
pub mod distance;
pub mod error;
pub mod event;
pub mod geo;
pub mod identity;
pub mod memory_store;
pub mod mock_device;
pub mod model;
pub mod store;
pub mod traits;

// Re-export main types
pub use config::*;
pub use distance::*;
pub use error::*;
pub use event::*;
pub use geo::*;
pub use identity::*;
pub use memory_store::*;
pub use mock_device::*;
pub use model::*;
pub use store::*;
pub use traits::*;
