//! # EMOSYNC Core Library
//!
//! Transport-agnostic half of the emotional-state distribution layer.
//!
//! A journal backend analyses what the player writes and returns an
//! [`EmotionalState`]. This crate decides what happens to that state once it
//! reaches the client:
//!
//! - **Event bus**: typed publish/subscribe fan-out ([`EventBus`])
//! - **Persistence**: key/value backends, credential and last-state snapshots
//! - **Mapping policies**: pure, clamped transforms into gameplay outputs:
//!   combat multipliers, weather category, mood-map placement
//!
//! The network half (session, polling, endpoints) lives in `emosync-client`.
//!
//! ## Data Flow
//!
//! ```text
//! backend ──► EmotionalState ──► EventBus ──┬─► combat policy
//!                                           ├─► weather policy
//!                                           ├─► mood-map policy
//!                                           └─► LastStateCache (restart seed)
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod policy;
pub mod store;
pub mod token;
pub mod types;

pub use auth::AuthStatus;
pub use bus::{BusEvent, EventBus, Subscription, Topic};
pub use cache::LastStateCache;
pub use config::EmosyncConfig;
pub use error::CoreError;
pub use store::{KvStore, MemoryStore, SqliteStore};
pub use token::TokenStore;
pub use types::*;
