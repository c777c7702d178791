//! Combat consumer: holds the current stat modifiers and resolves hits.

use std::sync::Arc;

use emosync_core::policy::{AttackRoll, CombatModifiers, CombatPolicy};
use emosync_core::{AuthStatus, EmotionalState};
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::consumer::StateConsumer;

/// Current combat modifiers, refreshed from the bus.
pub struct CombatConsumer {
    policy: CombatPolicy,
    auth: Arc<dyn AuthStatus>,
    current: Mutex<CombatModifiers>,
}

impl CombatConsumer {
    /// Start neutral.
    #[must_use]
    pub fn new(policy: CombatPolicy, auth: Arc<dyn AuthStatus>) -> Arc<Self> {
        Arc::new(Self {
            policy,
            auth,
            current: Mutex::new(CombatModifiers::NEUTRAL),
        })
    }

    /// Apply a cached state without the auth check (start-up seeding).
    pub fn seed(&self, state: &EmotionalState) {
        self.accept(state);
    }

    /// Modifiers in effect.
    #[must_use]
    pub fn modifiers(&self) -> CombatModifiers {
        *self.current.lock()
    }

    /// Back to neutral.
    pub fn reset(&self) {
        *self.current.lock() = CombatModifiers::NEUTRAL;
    }

    /// Roll an outgoing attack with the current modifiers.
    pub fn roll_attack<R: Rng + ?Sized>(&self, base_attack: f32, base_crit: f32, rng: &mut R) -> AttackRoll {
        let mods = self.modifiers();
        self.policy.roll_attack(base_attack, base_crit, &mods, rng)
    }

    /// Damage taken after the current defense modifier.
    #[must_use]
    pub fn mitigate(&self, incoming: f32, base_defense: f32) -> i32 {
        let mods = self.modifiers();
        self.policy.mitigate(incoming, base_defense, &mods)
    }
}

impl StateConsumer for CombatConsumer {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn auth(&self) -> &dyn AuthStatus {
        self.auth.as_ref()
    }

    fn accept(&self, state: &EmotionalState) {
        let mods = self.policy.map(state);
        debug!(
            emotion = %state.primary_emotion(),
            attack = mods.attack_mult,
            defense = mods.defense_mult,
            speed = mods.speed_mult,
            crit = mods.crit_chance_add,
            "Combat modifiers updated"
        );
        *self.current.lock() = mods;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use emosync_core::Emotion;
    use emosync_core::auth::StaticAuth;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn logged_out_payloads_are_ignored() {
        let combat = CombatConsumer::new(CombatPolicy::default(), Arc::new(StaticAuth(false)));
        let applied = combat.apply(&EmotionalState::from_emotion(Emotion::Anger, 1.0, Utc::now()));
        assert!(!applied);
        assert!(combat.modifiers().is_neutral());
    }

    #[test]
    fn seeding_bypasses_auth() {
        let combat = CombatConsumer::new(CombatPolicy::default(), Arc::new(StaticAuth(false)));
        combat.seed(&EmotionalState::from_emotion(Emotion::Calm, 1.0, Utc::now()));
        assert!((combat.modifiers().defense_mult - 1.25).abs() < 1e-5);
        combat.reset();
        assert!(combat.modifiers().is_neutral());
    }

    #[test]
    fn resolves_hits_with_current_modifiers() {
        let combat = CombatConsumer::new(CombatPolicy::default(), Arc::new(StaticAuth(true)));
        combat.apply(&EmotionalState::from_emotion(Emotion::Anger, 1.0, Utc::now()));

        let mut rng = StdRng::seed_from_u64(3);
        let roll = combat.roll_attack(10.0, 0.0, &mut rng);
        assert_eq!(roll, AttackRoll { damage: 14, critical: false });
        // defense 0.8 × 10 = 8 → 12 after mitigation
        assert_eq!(combat.mitigate(20.0, 10.0), 12);
    }
}
