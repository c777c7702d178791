//! EMOSYNC Benchmark Suite
//!
//! Everything here runs on the game thread, so it has to fit in a frame:
//!   combat_map_single ................ < 1μs
//!   weather_select_all_emotions ...... < 2μs
//!   mood_map_plot_200 ................ < 200μs
//!   bus_fan_out_full_rig ............. < 20μs

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use emosync_core::auth::StaticAuth;
use emosync_core::config::MoodMapConfig;
use emosync_core::policy::{CombatPolicy, MoodArea, MoodMap, WeatherPolicy};
use emosync_core::{
    AuthStatus, BusEvent, EmosyncConfig, Emotion, EmotionalState, EventBus, HistorySample, LastStateCache, MemoryStore,
};
use emosync_game::ConsumerRig;

const EMOTIONS: [Emotion; 10] = [
    Emotion::Joy,
    Emotion::Sadness,
    Emotion::Anger,
    Emotion::Fear,
    Emotion::Anxiety,
    Emotion::Calm,
    Emotion::Surprise,
    Emotion::Disgust,
    Emotion::Love,
    Emotion::Neutral,
];

fn make_sample(i: i64) -> HistorySample {
    HistorySample {
        timestamp: Utc::now() - ChronoDuration::hours(i),
        primary_emotion: EMOTIONS[(i as usize) % EMOTIONS.len()].clone(),
        valence: ((i as f32) / 50.0).sin(),
        arousal: ((i as f32) / 200.0).clamp(0.0, 1.0),
        intensity: 0.5,
    }
}

/// Benchmark: one combat mapping plus an attack roll.
fn bench_combat(c: &mut Criterion) {
    let policy = CombatPolicy::default();
    let state = EmotionalState::from_emotion(Emotion::Anger, 0.8, Utc::now());
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("combat_map_single", |b| {
        b.iter(|| {
            let mods = policy.map(black_box(&state));
            black_box(policy.roll_attack(10.0, 0.1, &mods, &mut rng));
        });
    });
}

/// Benchmark: weather selection across every known emotion.
fn bench_weather(c: &mut Criterion) {
    let policy = WeatherPolicy::default();

    c.bench_function("weather_select_all_emotions", |b| {
        b.iter(|| {
            for emotion in &EMOTIONS {
                black_box(policy.select(black_box(emotion)));
            }
        });
    });
}

/// Benchmark: replotting a full history window.
fn bench_mood_map(c: &mut Criterion) {
    let samples: Vec<HistorySample> = (0..200).map(make_sample).collect();
    let config = MoodMapConfig { capacity: 200, ..MoodMapConfig::default() };

    c.bench_function("mood_map_plot_200", |b| {
        b.iter(|| {
            let mut map = MoodMap::new(MoodArea::new(0.0, 0.0, 800.0, 600.0), &config);
            black_box(map.plot(black_box(samples.clone())));
        });
    });
}

/// Benchmark: one published state reaching every consumer and the cache.
fn bench_fan_out(c: &mut Criterion) {
    let auth: Arc<dyn AuthStatus> = Arc::new(StaticAuth(true));
    let bus = EventBus::new();
    let cache = LastStateCache::new(Arc::new(MemoryStore::new()));
    let rig = ConsumerRig::build(
        &EmosyncConfig::default(),
        &auth,
        &bus,
        &cache,
        MoodArea::new(0.0, 0.0, 800.0, 600.0),
    );
    let state = EmotionalState::from_emotion(Emotion::Joy, 0.7, Utc::now());

    c.bench_function("bus_fan_out_full_rig", |b| {
        b.iter(|| {
            bus.publish(BusEvent::EmotionReceived(black_box(state.clone())));
        });
    });

    black_box(rig.combat.modifiers());
}

criterion_group!(benches, bench_combat, bench_weather, bench_mood_map, bench_fan_out);
criterion_main!(benches);
