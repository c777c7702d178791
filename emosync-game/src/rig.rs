//! Consumer rig: builds, seeds and attaches every consumer in one place.

use std::sync::Arc;

use emosync_core::policy::{CombatPolicy, MoodArea, WeatherPolicy};
use emosync_core::{AuthStatus, EmosyncConfig, EventBus, LastStateCache, Subscription};
use parking_lot::Mutex;
use tracing::info;

use crate::combat::CombatConsumer;
use crate::consumer::Attachment;
use crate::mood_map::MoodMapConsumer;
use crate::weather::WeatherConsumer;

/// All game-side consumers of one session.
pub struct ConsumerRig {
    /// Combat modifiers.
    pub combat: Arc<CombatConsumer>,
    /// Weather controller.
    pub weather: Arc<WeatherConsumer>,
    /// Mood-map history.
    pub mood_map: Arc<MoodMapConsumer>,
    bus: EventBus,
    attachments: [Attachment; 3],
    cache_subscriptions: Mutex<Vec<Subscription>>,
}

impl ConsumerRig {
    /// Build every consumer from `config`, seed it from `cache`, and attach
    /// it (and the cache) to `bus`.
    #[must_use]
    pub fn build(
        config: &EmosyncConfig,
        auth: &Arc<dyn AuthStatus>,
        bus: &EventBus,
        cache: &LastStateCache,
        area: MoodArea,
    ) -> Self {
        let combat = CombatConsumer::new(CombatPolicy::new(config.combat.clone()), Arc::clone(auth));
        let weather = WeatherConsumer::new(WeatherPolicy::new(&config.weather), Arc::clone(auth));
        let mood_map = MoodMapConsumer::new(area, &config.mood_map, Arc::clone(auth));

        if let Some(last) = cache.load() {
            info!(emotion = %last.primary_emotion(), "Seeding consumers from last state");
            combat.seed(&last);
            weather.seed(&last);
            mood_map.seed(&last);
        }

        let attachments: [Attachment; 3] = Default::default();
        attachments[0].attach(&combat, bus);
        attachments[1].attach(&weather, bus);
        attachments[2].attach(&mood_map, bus);

        Self {
            combat,
            weather,
            mood_map,
            bus: bus.clone(),
            attachments,
            cache_subscriptions: Mutex::new(cache.attach(bus, Arc::clone(auth))),
        }
    }

    /// Remove every subscription the rig owns. Returns how many were removed.
    pub fn detach(&self) -> usize {
        let consumers: usize = self.attachments.iter().map(Attachment::detach).sum();
        let cache = std::mem::take(&mut *self.cache_subscriptions.lock())
            .iter()
            .filter(|s| self.bus.unsubscribe(s))
            .count();
        consumers + cache
    }

    /// Whether any consumer is still attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachments.iter().any(Attachment::is_attached)
    }
}

impl Drop for ConsumerRig {
    fn drop(&mut self) {
        self.detach();
    }
}
