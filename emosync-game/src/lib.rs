//! # emosync-game: game-side consumers for EMOSYNC
//!
//! This crate wires the pure mapping policies of `emosync-core` to the
//! event bus, so that one emotional state fans out to every gameplay and
//! presentation surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  EventBus                    │
//! │   EmotionReceived         WeatherReceived    │
//! └──────┬──────────────┬───────────┬────────────┘
//!        ▼              ▼           ▼
//!  ┌──────────┐   ┌──────────┐ ┌──────────┐  ┌────────────────┐
//!  │  Combat  │   │ Weather  │ │ Mood map │  │ LastStateCache │
//!  └──────────┘   └──────────┘ └──────────┘  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `consumer`: shared consumer trait and subscription ownership
//! - `combat`: current stat modifiers and hit resolution
//! - `weather`: weather controller with paced transitions
//! - `mood_map`: bounded history scatter with hover/pin
//! - `rig`: builds, seeds and attaches all of the above

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod combat;
pub mod consumer;
pub mod mood_map;
pub mod rig;
pub mod weather;

pub use combat::CombatConsumer;
pub use consumer::{Attachment, StateConsumer};
pub use mood_map::MoodMapConsumer;
pub use rig::ConsumerRig;
pub use weather::WeatherConsumer;
