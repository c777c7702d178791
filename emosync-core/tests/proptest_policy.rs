//! Property-Based Tests for the mapping policies
//!
//! Uses `proptest` to verify that every policy output stays inside its
//! declared bounds, for any emotion and any (even hostile) numeric input.

use chrono::Utc;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use emosync_core::config::MoodMapConfig;
use emosync_core::policy::{CombatModifiers, CombatPolicy, MoodArea, MoodMap, PointState, WeatherKind, WeatherPolicy};
use emosync_core::types::{Emotion, EmotionalState, HistorySample, normalize_intensity};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    prop_oneof![
        proptest::sample::select(Emotion::KNOWN.to_vec()),
        "[a-z]{1,12}".prop_map(|s| Emotion::parse(&s)),
    ]
}

fn arb_modifiers() -> impl Strategy<Value = CombatModifiers> {
    (0.5..1.5f32, 0.5..1.5f32, 0.5..1.5f32, 0.0..0.25f32).prop_map(|(a, d, s, c)| CombatModifiers {
        attack_mult: a,
        defense_mult: d,
        speed_mult: s,
        crit_chance_add: c,
    })
}

// ---------------------------------------------------------------------------
// Property: combat outputs are always clamped
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn combat_multipliers_always_bounded(emotion in arb_emotion(), intensity in -10.0..200.0f32) {
        let state = EmotionalState::from_emotion(emotion, intensity, Utc::now());
        let m = CombatPolicy::default().map(&state);
        for mult in [m.attack_mult, m.defense_mult, m.speed_mult] {
            prop_assert!((0.5..=1.5).contains(&mult));
        }
        prop_assert!((0.0..=0.25).contains(&m.crit_chance_add));
    }
}

// ---------------------------------------------------------------------------
// Property: unknown emotions are exactly neutral
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unknown_emotions_are_neutral(label in "zz[a-z]{1,10}", intensity in 0.0..1.0f32) {
        let emotion = Emotion::parse(&label);
        prop_assume!(emotion.is_unknown());
        let state = EmotionalState::from_emotion(emotion, intensity, Utc::now());
        prop_assert_eq!(CombatPolicy::default().map(&state), CombatModifiers::NEUTRAL);
    }
}

// ---------------------------------------------------------------------------
// Property: damage never drops below 1
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn mitigated_damage_at_least_one(
        incoming in 0.0..500.0f32,
        defense in 0.0..10_000.0f32,
        mods in arb_modifiers(),
    ) {
        prop_assert!(CombatPolicy::default().mitigate(incoming, defense, &mods) >= 1);
    }

    #[test]
    fn attack_damage_at_least_one(
        base in 0.0..500.0f32,
        crit in -1.0..2.0f32,
        mods in arb_modifiers(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let roll = CombatPolicy::default().roll_attack(base, crit, &mods, &mut rng);
        prop_assert!(roll.damage >= 1);
    }
}

// ---------------------------------------------------------------------------
// Property: intensity normalization lands in [0, 1]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn normalized_intensity_in_unit_range(raw in any::<f32>()) {
        let n = normalize_intensity(raw);
        prop_assert!((0.0..=1.0).contains(&n));
    }
}

// ---------------------------------------------------------------------------
// Property: weather selection is total and respects the supported set
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn weather_always_selects_supported_or_clear(emotion in arb_emotion()) {
        let policy = WeatherPolicy::default();
        let kind = policy.select(&emotion);
        prop_assert!(WeatherKind::ALL.contains(&kind));
        if emotion.is_unknown() {
            prop_assert_eq!(kind, WeatherKind::Clear);
        }
    }

    #[test]
    fn transition_shrinks_with_intensity(a in 0.0..1.0f32, b in 0.0..1.0f32) {
        let policy = WeatherPolicy::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(policy.transition_duration(hi) <= policy.transition_duration(lo));
    }
}

// ---------------------------------------------------------------------------
// Property: mood-map placement stays inside the area
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn placement_within_area(
        valence in -50.0..50.0f32,
        arousal in -50.0..50.0f32,
        left in -500.0..500.0f32,
        bottom in -500.0..500.0f32,
        width in 0.0..2000.0f32,
        height in 0.0..2000.0f32,
    ) {
        let area = MoodArea::new(left, bottom, width, height);
        let (x, y) = area.place(valence, arousal).expect("finite input");
        prop_assert!(x >= area.left && x <= area.right());
        prop_assert!(y >= area.bottom && y <= area.top());
    }
}

// ---------------------------------------------------------------------------
// Property: at most one pinned point, whatever the click sequence
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn never_two_pinned(clicks in proptest::collection::vec(0usize..8, 1..40)) {
        let mut map = MoodMap::new(MoodArea::new(0.0, 0.0, 100.0, 100.0), &MoodMapConfig::default());
        let ids: Vec<_> = (0..8)
            .map(|i| {
                map.push(HistorySample {
                    timestamp: Utc::now(),
                    primary_emotion: Emotion::Calm,
                    valence: 0.1 * i as f32,
                    arousal: 0.5,
                    intensity: 0.5,
                })
                .expect("plottable")
            })
            .collect();

        for c in clicks {
            map.click(ids[c]);
            let pinned = ids.iter().filter(|id| map.state_of(**id) == PointState::Pinned).count();
            prop_assert!(pinned <= 1);
        }
    }
}
