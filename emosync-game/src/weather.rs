//! Weather consumer: drives a [`WeatherController`] from the bus.
//!
//! The renderer calls [`WeatherConsumer::tick`] every frame; requests that
//! arrive while a transition is running are dropped by the controller.

use std::sync::Arc;
use std::time::Duration;

use emosync_core::policy::{WeatherController, WeatherDecision, WeatherKind, WeatherPolicy};
use emosync_core::{AuthStatus, EmotionalState};
use parking_lot::Mutex;
use tracing::info;

use crate::consumer::StateConsumer;

/// Shared weather state.
pub struct WeatherConsumer {
    policy: WeatherPolicy,
    auth: Arc<dyn AuthStatus>,
    controller: Mutex<WeatherController>,
    last_decision: Mutex<Option<WeatherDecision>>,
}

impl WeatherConsumer {
    /// Start at clear sky.
    #[must_use]
    pub fn new(policy: WeatherPolicy, auth: Arc<dyn AuthStatus>) -> Arc<Self> {
        let controller = WeatherController::new(policy.clone(), WeatherKind::Clear);
        Arc::new(Self {
            policy,
            auth,
            controller: Mutex::new(controller),
            last_decision: Mutex::new(None),
        })
    }

    /// Jump straight to the weather for a cached state, without a transition.
    pub fn seed(&self, state: &EmotionalState) {
        let kind = self.policy.select(state.primary_emotion());
        *self.controller.lock() = WeatherController::new(self.policy.clone(), kind);
        info!(weather = %kind, "Weather seeded from last state");
    }

    /// Settled weather.
    #[must_use]
    pub fn current(&self) -> WeatherKind {
        self.controller.lock().current()
    }

    /// Target and progress of the running transition, if any.
    #[must_use]
    pub fn transition(&self) -> Option<(WeatherKind, f32)> {
        self.controller.lock().in_flight().map(|t| (t.to, t.progress()))
    }

    /// Outcome of the most recent applied request.
    #[must_use]
    pub fn last_decision(&self) -> Option<WeatherDecision> {
        *self.last_decision.lock()
    }

    /// Advance the transition; returns the weather that just settled.
    pub fn tick(&self, dt: Duration) -> Option<WeatherKind> {
        let settled = self.controller.lock().tick(dt);
        if let Some(kind) = settled {
            info!(weather = %kind, "Weather settled");
        }
        settled
    }
}

impl StateConsumer for WeatherConsumer {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn auth(&self) -> &dyn AuthStatus {
        self.auth.as_ref()
    }

    fn accept(&self, state: &EmotionalState) {
        let decision = self.controller.lock().request(state);
        *self.last_decision.lock() = Some(decision);
    }
}
