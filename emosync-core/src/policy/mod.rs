//! Mapping policies: pure transforms from [`crate::EmotionalState`] into
//! bounded outputs for independent consumers.
//!
//! | Policy     | Output                                   | Bounds                     |
//! |------------|------------------------------------------|----------------------------|
//! | `combat`   | attack/defense/speed multipliers, crit   | `[0.5, 1.5]`, `[0, 0.25]`  |
//! | `weather`  | weather category + transition length     | fixed enumeration          |
//! | `mood_map` | 2D placement + per-point interaction     | area rectangle             |
//!
//! Policies never touch the bus or storage; consumers own that wiring.

pub mod combat;
pub mod mood_map;
pub mod weather;

pub use combat::{AttackRoll, CombatModifiers, CombatPolicy};
pub use mood_map::{DetailOverlay, MoodArea, MoodMap, PointId, PointState};
pub use weather::{WeatherController, WeatherDecision, WeatherKind, WeatherPolicy};
