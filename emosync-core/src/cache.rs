//! Durable snapshot of the most recent emotional state.
//!
//! Consumers seed themselves from this snapshot at start-up so the game
//! does not sit at neutral until the first live event arrives.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::AuthStatus;
use crate::bus::{EventBus, Subscription};
use crate::error::Result;
use crate::store::{KvStore, keys};
use crate::types::EmotionalState;

/// Last-known [`EmotionalState`], stored as JSON under a fixed key.
#[derive(Clone)]
pub struct LastStateCache {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for LastStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastStateCache").finish_non_exhaustive()
    }
}

impl LastStateCache {
    /// Wrap a key/value backend.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Overwrite the snapshot.
    ///
    /// # Errors
    /// Serialization or backend failure.
    pub fn store(&self, state: &EmotionalState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.store.set(keys::LAST_EMOTION, &json)?;
        debug!(emotion = %state.primary_emotion(), "Last state cached");
        Ok(())
    }

    /// Read the snapshot. A corrupt or unreadable snapshot is logged and
    /// reported as absent.
    #[must_use]
    pub fn load(&self) -> Option<EmotionalState> {
        let raw = match self.store.get(keys::LAST_EMOTION) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read last emotional state");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt last-state snapshot");
                None
            }
        }
    }

    /// Delete the snapshot.
    ///
    /// # Errors
    /// Backend failure.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(keys::LAST_EMOTION)?;
        Ok(())
    }

    /// Keep the snapshot current from the bus: every `EmotionReceived` and
    /// every `WeatherReceived` (converted) overwrites it, unless `auth`
    /// reports logged out when the payload arrives.
    pub fn attach(&self, bus: &EventBus, auth: Arc<dyn AuthStatus>) -> Vec<Subscription> {
        let on_emotion = (self.clone(), Arc::clone(&auth));
        let on_weather = (self.clone(), auth);
        vec![
            bus.on_emotion(move |state| on_emotion.0.persist(on_emotion.1.as_ref(), state)),
            bus.on_weather(move |weather| {
                on_weather.0.persist(on_weather.1.as_ref(), &weather.to_emotional_state());
            }),
        ]
    }

    fn persist(&self, auth: &dyn AuthStatus, state: &EmotionalState) {
        if !auth.is_authenticated() {
            debug!(emotion = %state.primary_emotion(), "Not caching state received while logged out");
            return;
        }
        if let Err(e) = self.store(state) {
            warn!(error = %e, "Failed to persist last emotional state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::bus::BusEvent;
    use crate::store::MemoryStore;
    use crate::types::{Emotion, WeatherState};
    use chrono::Utc;

    fn cache() -> (Arc<MemoryStore>, LastStateCache) {
        let backend = Arc::new(MemoryStore::new());
        (backend.clone(), LastStateCache::new(backend))
    }

    #[test]
    fn store_and_load() {
        let (_, cache) = cache();
        assert!(cache.load().is_none());

        let state = EmotionalState::new(Emotion::Calm, 0.6, 0.4, 0.2, Utc::now()).with_confidence(0.9);
        cache.store(&state).expect("store");
        assert_eq!(cache.load(), Some(state));
    }

    #[test]
    fn corrupt_snapshot_is_absent() {
        let (backend, cache) = cache();
        backend.set(keys::LAST_EMOTION, "{not json").expect("set");
        assert!(cache.load().is_none());
    }

    #[test]
    fn attach_tracks_latest_event() {
        let (_, cache) = cache();
        let bus = EventBus::new();
        let _subs = cache.attach(&bus, Arc::new(StaticAuth(true)));

        bus.publish(BusEvent::EmotionReceived(EmotionalState::from_emotion(
            Emotion::Anger,
            0.9,
            Utc::now(),
        )));
        assert_eq!(cache.load().map(|s| s.primary_emotion().clone()), Some(Emotion::Anger));

        bus.publish(BusEvent::WeatherReceived(WeatherState {
            weather_type: "rain".into(),
            emotion: Emotion::Sadness,
            intensity: 0.4,
            description: "drizzle".into(),
            timestamp: Utc::now(),
        }));
        assert_eq!(cache.load().map(|s| s.primary_emotion().clone()), Some(Emotion::Sadness));
    }

    #[test]
    fn logged_out_payloads_are_not_cached() {
        let (_, cache) = cache();
        let bus = EventBus::new();
        let _subs = cache.attach(&bus, Arc::new(StaticAuth(false)));

        bus.publish(BusEvent::EmotionReceived(EmotionalState::from_emotion(
            Emotion::Anger,
            1.0,
            Utc::now(),
        )));
        bus.publish(BusEvent::WeatherReceived(WeatherState {
            weather_type: "storm".into(),
            emotion: Emotion::Fear,
            intensity: 0.7,
            description: "thunder".into(),
            timestamp: Utc::now(),
        }));
        assert!(cache.load().is_none());
    }
}
