//! Typed publish/subscribe bus.
//!
//! Lets the session, the poller and the mapping consumers talk without
//! knowing about each other. Delivery is synchronous, on the publishing
//! thread, in subscription order. Within one topic, publish order equals
//! delivery order; there is no ordering across topics.
//!
//! Handlers are invoked with no bus lock held, so a handler may publish,
//! subscribe or unsubscribe. A panicking handler is isolated and logged;
//! the remaining handlers still receive the event.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::types::{EmotionalState, WeatherState};

/// Topic a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Authorization state transitions.
    AuthChanged,
    /// A new emotional analysis arrived.
    EmotionReceived,
    /// A new weather snapshot arrived.
    WeatherReceived,
}

/// Payload delivered on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// `true` on login/restore, `false` on logout/expiry/401.
    AuthChanged(bool),
    /// New emotional analysis.
    EmotionReceived(EmotionalState),
    /// New weather snapshot.
    WeatherReceived(WeatherState),
}

impl BusEvent {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::AuthChanged(_) => Topic::AuthChanged,
            Self::EmotionReceived(_) => Topic::EmotionReceived,
            Self::WeatherReceived(_) => Topic::WeatherReceived,
        }
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler,
}

/// Handle returned by [`EventBus::subscribe`]; pass it to
/// [`EventBus::unsubscribe`] to stop delivery.
#[derive(Debug)]
#[must_use = "dropping a Subscription leaves the handler subscribed with no way to remove it"]
pub struct Subscription {
    id: u64,
    topic: Topic,
}

impl Subscription {
    /// Topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Delivery statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events published.
    pub published: u64,
    /// Handler invocations that returned normally.
    pub delivered: u64,
    /// Handler invocations that panicked.
    pub handler_failures: u64,
}

struct BusInner {
    next_id: u64,
    handlers: HashMap<Topic, Vec<Entry>>,
    stats: BusStats,
}

/// Cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus")
            .field("topics", &inner.handlers.len())
            .field("stats", &inner.stats)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                handlers: HashMap::new(),
                stats: BusStats::default(),
            })),
        }
    }

    /// Register `handler` for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.entry(topic).or_default().push(Entry {
            id,
            active: Arc::new(AtomicBool::new(true)),
            handler: Arc::new(handler),
        });
        trace!(?topic, id, "subscribed");
        Subscription { id, topic }
    }

    /// Subscribe to [`Topic::AuthChanged`] with a typed handler.
    pub fn on_auth_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.subscribe(Topic::AuthChanged, move |event| {
            if let BusEvent::AuthChanged(authorized) = event {
                handler(*authorized);
            }
        })
    }

    /// Subscribe to [`Topic::EmotionReceived`] with a typed handler.
    pub fn on_emotion<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EmotionalState) + Send + Sync + 'static,
    {
        self.subscribe(Topic::EmotionReceived, move |event| {
            if let BusEvent::EmotionReceived(state) = event {
                handler(state);
            }
        })
    }

    /// Subscribe to [`Topic::WeatherReceived`] with a typed handler.
    pub fn on_weather<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WeatherState) + Send + Sync + 'static,
    {
        self.subscribe(Topic::WeatherReceived, move |event| {
            if let BusEvent::WeatherReceived(state) = event {
                handler(state);
            }
        })
    }

    /// Remove a subscription. Returns `false` if it was already removed.
    ///
    /// Takes effect immediately, including for a delivery currently in
    /// progress on another handler.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut inner = self.inner.lock();
        let Some(entries) = inner.handlers.get_mut(&subscription.topic) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| e.id == subscription.id) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.active.store(false, Ordering::Release);
        true
    }

    /// Deliver `event` to every handler of its topic, in subscription order.
    pub fn publish(&self, event: BusEvent) {
        let topic = event.topic();
        let snapshot: Vec<(u64, Arc<AtomicBool>, Handler)> = {
            let mut inner = self.inner.lock();
            inner.stats.published += 1;
            inner
                .handlers
                .get(&topic)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| (e.id, Arc::clone(&e.active), Arc::clone(&e.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut failures = 0;
        for (id, active, handler) in snapshot {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    failures += 1;
                    error!(
                        ?topic,
                        subscription = id,
                        reason = %panic_message(payload.as_ref()),
                        "Event handler panicked; continuing delivery"
                    );
                }
            }
        }

        let mut inner = self.inner.lock();
        inner.stats.delivered += delivered;
        inner.stats.handler_failures += failures;
    }

    /// Number of live handlers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.lock().handlers.get(&topic).map_or(0, Vec::len)
    }

    /// Delivery statistics since creation.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.inner.lock().stats
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
