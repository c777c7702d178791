//! Mood-map consumer: history scatter fed by journal analyses.
//!
//! Only `EmotionReceived` adds points; polled weather snapshots repeat the
//! same state every interval and would flood the history.

use std::sync::Arc;
use std::time::Duration;

use emosync_core::config::MoodMapConfig;
use emosync_core::policy::{MoodArea, MoodMap};
use emosync_core::{AuthStatus, EmotionalState, HistorySample};
use parking_lot::Mutex;
use tracing::debug;

use crate::consumer::StateConsumer;

/// Shared mood map.
pub struct MoodMapConsumer {
    auth: Arc<dyn AuthStatus>,
    map: Mutex<MoodMap>,
}

impl MoodMapConsumer {
    /// Empty map over `area`.
    #[must_use]
    pub fn new(area: MoodArea, config: &MoodMapConfig, auth: Arc<dyn AuthStatus>) -> Arc<Self> {
        Arc::new(Self {
            auth,
            map: Mutex::new(MoodMap::new(area, config)),
        })
    }

    /// Replace the history with fetched samples. Returns how many were plotted.
    pub fn load_history(&self, samples: Vec<HistorySample>) -> usize {
        let received = samples.len();
        let plotted = self.map.lock().plot(samples);
        debug!(received, plotted, "Mood history loaded");
        plotted
    }

    /// Add a cached state as the latest point (start-up seeding).
    pub fn seed(&self, state: &EmotionalState) {
        self.accept(state);
    }

    /// Run `f` with the map locked; use for pointer events and rendering.
    pub fn with_map<T>(&self, f: impl FnOnce(&mut MoodMap) -> T) -> T {
        f(&mut self.map.lock())
    }

    /// Number of plotted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether nothing is plotted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Advance overlay fading.
    pub fn tick(&self, dt: Duration) {
        self.map.lock().tick(dt);
    }
}

impl StateConsumer for MoodMapConsumer {
    fn name(&self) -> &'static str {
        "mood-map"
    }

    fn auth(&self) -> &dyn AuthStatus {
        self.auth.as_ref()
    }

    fn accept(&self, state: &EmotionalState) {
        self.map.lock().push(state.to_sample());
    }

    fn follows_weather(&self) -> bool {
        false
    }
}
