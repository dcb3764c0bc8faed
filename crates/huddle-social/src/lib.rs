//! # Huddle Social
//!
//! Everything around the map that is plain backend CRUD: short-lived groups
//! joined by code, friend requests, pings and the profile online flag.
//!
//! All operations hang off one [`SocialClient`]. Operations a user triggers
//! directly report their outcome through the notifier as well as returning it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use huddle_social::SocialClient;
//!
//! let social = SocialClient::new(auth, store, notifier);
//! let group = social.create_group("Friday night").await?;
//! println!("share this code: {}", group.code);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod friends;
pub mod groups;
pub mod pings;
pub mod profiles;

pub use client::SocialClient;
pub use config::SocialConfig;
pub use error::{SocialError, SocialResult};
pub use groups::generate_code;
