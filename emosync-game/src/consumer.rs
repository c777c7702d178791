//! Shared plumbing for bus-driven consumers.
//!
//! A consumer turns each authorized [`EmotionalState`] into its own policy
//! output. [`Attachment`] owns the bus subscriptions so teardown is
//! explicit, and the handlers hold only a weak reference to the consumer.

use std::sync::{Arc, Weak};

use emosync_core::{AuthStatus, EmotionalState, EventBus, Subscription};
use parking_lot::Mutex;
use tracing::debug;

/// Something that reacts to emotional state from the bus.
pub trait StateConsumer: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Authorization view re-checked before every payload.
    fn auth(&self) -> &dyn AuthStatus;

    /// Update the policy output. Called only while authorized.
    fn accept(&self, state: &EmotionalState);

    /// Whether polled weather snapshots should drive this consumer too.
    fn follows_weather(&self) -> bool {
        true
    }

    /// Apply `state` if the session is still authorized. Returns whether it was applied.
    fn apply(&self, state: &EmotionalState) -> bool {
        if !self.auth().is_authenticated() {
            debug!(consumer = self.name(), "Dropping payload received while logged out");
            return false;
        }
        self.accept(state);
        true
    }
}

/// Subscriptions held on behalf of one consumer.
#[derive(Debug, Default)]
pub struct Attachment {
    bus: Mutex<Option<EventBus>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Attachment {
    /// Subscribe `consumer` to `bus`. Re-attaching first detaches from the previous bus.
    pub fn attach<C: StateConsumer>(&self, consumer: &Arc<C>, bus: &EventBus) {
        self.detach();

        let weak: Weak<C> = Arc::downgrade(consumer);
        let mut subs = vec![bus.on_emotion({
            let weak = weak.clone();
            move |state| {
                if let Some(c) = weak.upgrade() {
                    c.apply(state);
                }
            }
        })];
        if consumer.follows_weather() {
            subs.push(bus.on_weather(move |weather| {
                if let Some(c) = weak.upgrade() {
                    c.apply(&weather.to_emotional_state());
                }
            }));
        }

        debug!(consumer = consumer.name(), subscriptions = subs.len(), "Consumer attached");
        *self.subscriptions.lock() = subs;
        *self.bus.lock() = Some(bus.clone());
    }

    /// Drop every subscription. Returns how many were removed.
    pub fn detach(&self) -> usize {
        let subs = std::mem::take(&mut *self.subscriptions.lock());
        let Some(bus) = self.bus.lock().take() else {
            return 0;
        };
        subs.iter().filter(|s| bus.unsubscribe(s)).count()
    }

    /// Whether any subscription is live.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }
}
