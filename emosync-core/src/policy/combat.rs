//! Combat policy: emotion → stat multipliers, plus damage resolution.
//!
//! Each rule scales linearly with intensity `s ∈ [0, 1]`:
//!
//! | Emotion | attack   | defense  | speed    | crit     |
//! |---------|----------|----------|----------|----------|
//! | anger   | +0.40·s  | −0.20·s  | +0.10·s  |          |
//! | calm    |          | +0.25·s  |          |          |
//! | sadness | +0.20·s  | −0.20·s  | −0.10·s  | +0.10·s  |
//! | joy     | +0.10·s  |          | +0.15·s  | +0.05·s  |
//! | fear    | −0.15·s  | +0.10·s  | +0.20·s  |          |
//!
//! Everything else stays neutral. Clamping is always the last step.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::CombatConfig;
use crate::types::{Emotion, EmotionalState};

/// Stat modifiers derived from an emotional state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatModifiers {
    /// Multiplier on base attack.
    pub attack_mult: f32,
    /// Multiplier on base defense.
    pub defense_mult: f32,
    /// Multiplier on movement/attack speed.
    pub speed_mult: f32,
    /// Additive bonus to crit chance.
    pub crit_chance_add: f32,
}

impl CombatModifiers {
    /// No effect.
    pub const NEUTRAL: Self = Self {
        attack_mult: 1.0,
        defense_mult: 1.0,
        speed_mult: 1.0,
        crit_chance_add: 0.0,
    };

    /// Whether every field equals [`CombatModifiers::NEUTRAL`].
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for CombatModifiers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Outcome of an attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackRoll {
    /// Final damage, never below 1.
    pub damage: i32,
    /// Whether the roll was critical.
    pub critical: bool,
}

/// Per-intensity deltas for one emotion.
#[derive(Debug, Clone, Copy, Default)]
struct Rule {
    attack: f32,
    defense: f32,
    speed: f32,
    crit: f32,
}

fn rule_for(emotion: &Emotion) -> Option<Rule> {
    match emotion {
        Emotion::Anger => Some(Rule { attack: 0.40, defense: -0.20, speed: 0.10, crit: 0.0 }),
        Emotion::Calm => Some(Rule { defense: 0.25, ..Rule::default() }),
        Emotion::Sadness => Some(Rule { attack: 0.20, defense: -0.20, speed: -0.10, crit: 0.10 }),
        Emotion::Joy => Some(Rule { attack: 0.10, defense: 0.0, speed: 0.15, crit: 0.05 }),
        Emotion::Fear => Some(Rule { attack: -0.15, defense: 0.10, speed: 0.20, crit: 0.0 }),
        Emotion::Anxiety
        | Emotion::Surprise
        | Emotion::Disgust
        | Emotion::Love
        | Emotion::Neutral
        | Emotion::Unknown(_) => None,
    }
}

/// Combat mapping with configurable bounds.
#[derive(Debug, Clone)]
pub struct CombatPolicy {
    config: CombatConfig,
}

impl Default for CombatPolicy {
    fn default() -> Self {
        Self::new(CombatConfig::default())
    }
}

impl CombatPolicy {
    /// Create a policy with the given bounds.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self { config }
    }

    /// Map a state to clamped modifiers.
    #[must_use]
    pub fn map(&self, state: &EmotionalState) -> CombatModifiers {
        let mut out = CombatModifiers::NEUTRAL;
        let s = state.intensity();

        if let Some(rule) = rule_for(state.primary_emotion()) {
            out.attack_mult += rule.attack * s;
            out.defense_mult += rule.defense * s;
            out.speed_mult += rule.speed * s;
            out.crit_chance_add += rule.crit * s;
        }

        self.clamp(out)
    }

    fn clamp(&self, m: CombatModifiers) -> CombatModifiers {
        let (lo, hi) = (self.config.min_multiplier, self.config.max_multiplier);
        CombatModifiers {
            attack_mult: m.attack_mult.clamp(lo, hi),
            defense_mult: m.defense_mult.clamp(lo, hi),
            speed_mult: m.speed_mult.clamp(lo, hi),
            crit_chance_add: m.crit_chance_add.clamp(0.0, self.config.max_crit_bonus),
        }
    }

    /// Roll an outgoing attack.
    ///
    /// Crit chance is `clamp01(base_crit + crit_chance_add)`; a crit scales
    /// the pre-rounding attack by the configured crit multiplier.
    pub fn roll_attack<R: Rng + ?Sized>(
        &self,
        base_attack: f32,
        base_crit: f32,
        mods: &CombatModifiers,
        rng: &mut R,
    ) -> AttackRoll {
        let chance = clamp01(base_crit + mods.crit_chance_add);
        let critical = rng.gen_bool(f64::from(chance));
        let mut attack = base_attack * mods.attack_mult;
        if critical {
            attack *= self.config.crit_damage_multiplier;
        }
        AttackRoll {
            damage: round_at_least_one(attack),
            critical,
        }
    }

    /// Reduce incoming damage by the modified defense. Never below 1.
    #[must_use]
    pub fn mitigate(&self, incoming: f32, base_defense: f32, mods: &CombatModifiers) -> i32 {
        round_at_least_one(incoming - base_defense * mods.defense_mult)
    }
}

fn clamp01(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

#[allow(clippy::cast_possible_truncation)]
fn round_at_least_one(v: f32) -> i32 {
    // NaN casts to 0 and is lifted to 1 like any other sub-1 value.
    (v.round() as i32).max(1)
}
