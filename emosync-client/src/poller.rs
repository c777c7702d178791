//! Polling Scheduler: periodic weather-state refresh while authorized.
//!
//! One background task per running scheduler. The task waits a short
//! initial delay, then polls every interval. Cancellation is a
//! [`CancellationToken`] checked after every suspension point. The check and
//! the publish share a gate that `stop()` also takes, so nothing is published
//! once `stop()` has returned.
//!
//! ```text
//! AuthChanged(true)  ──► start ──► [delay] ─► poll ─► [interval] ─► poll ─► …
//! AuthChanged(false) ──► stop  ──► token cancelled ──► task exits at next check
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use emosync_core::config::PollingConfig;
use emosync_core::{AuthStatus, BusEvent, EventBus, Subscription};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::StateSource;
use crate::error::ApiError;

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not authorized; nothing requested.
    Skipped,
    /// A snapshot was published.
    Published,
    /// The request failed; the cycle was dropped.
    Failed,
    /// Stopped while the request was in flight; result discarded.
    Cancelled,
}

/// Running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Cycles executed.
    pub cycles: u64,
    /// Snapshots published.
    pub published: u64,
    /// Cycles skipped while logged out.
    pub skipped: u64,
    /// Cycles that failed.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

/// Everything one cycle needs; cloned into the background task.
#[derive(Clone)]
struct Cycle {
    source: Arc<dyn StateSource>,
    auth: Arc<dyn AuthStatus>,
    bus: EventBus,
    counters: Arc<Counters>,
    // Reentrant: `stop()` may run inside a handler of the publish it waits on.
    gate: Arc<ReentrantMutex<()>>,
}

impl Cycle {
    async fn run(&self, cancel: &CancellationToken) -> PollOutcome {
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        if !self.auth.is_authenticated() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return PollOutcome::Skipped;
        }

        let result = self.source.fetch_weather_state().await;
        let _gate = self.gate.lock();
        if cancel.is_cancelled() {
            debug!("Poll result discarded after stop");
            return PollOutcome::Cancelled;
        }

        match result {
            Ok(state) => {
                debug!(emotion = %state.emotion, intensity = state.intensity, "Weather state polled");
                self.bus.publish(BusEvent::WeatherReceived(state));
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                PollOutcome::Published
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                match &e {
                    ApiError::Parse(_) => warn!(error = %e, "Unreadable weather state; skipping cycle"),
                    ApiError::SessionExpired | ApiError::Unauthenticated => {
                        debug!("Session ended during poll");
                    }
                    e if e.is_network() => debug!(error = %e, "Backend unreachable; skipping cycle"),
                    e => warn!(error = %e, "Weather poll failed"),
                }
                PollOutcome::Failed
            }
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic poller with deterministic start/stop.
pub struct PollingScheduler {
    cycle: Cycle,
    runtime: Handle,
    initial_delay: Duration,
    default_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl PollingScheduler {
    /// Create a stopped scheduler whose task will run on `runtime`.
    #[must_use]
    pub fn new(
        source: Arc<dyn StateSource>,
        auth: Arc<dyn AuthStatus>,
        bus: EventBus,
        config: &PollingConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            cycle: Cycle {
                source,
                auth,
                bus,
                counters: Arc::new(Counters::default()),
                gate: Arc::new(ReentrantMutex::new(())),
            },
            runtime,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            default_interval: Duration::from_secs(config.interval_secs),
            running: Mutex::new(None),
        }
    }

    /// Interval used by [`PollingScheduler::follow_auth`].
    #[must_use]
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Begin polling every `interval`. Returns `false` if already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let interval = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let cycle = self.cycle.clone();
        let initial_delay = self.initial_delay;

        let handle = self.runtime.spawn(async move {
            tokio::select! {
                () = task_cancel.cancelled() => return,
                () = tokio::time::sleep(initial_delay) => {}
            }
            loop {
                if task_cancel.is_cancelled() {
                    break;
                }
                cycle.run(&task_cancel).await;
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            debug!("Poll task exited");
        });

        info!(interval_secs = interval.as_secs_f32(), "Polling started");
        *running = Some(Running { cancel, handle });
        true
    }

    /// Stop polling. Idempotent and safe to call from a bus handler.
    ///
    /// Blocks until a publish already under way on another thread finishes.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        running.cancel.cancel();
        drop(self.cycle.gate.lock());
        info!("Polling stopped");
        true
    }

    /// Whether a poll task is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one cycle now, independent of the background task.
    pub async fn poll_once(&self) -> PollOutcome {
        self.cycle.run(&CancellationToken::new()).await
    }

    /// Totals since construction.
    #[must_use]
    pub fn stats(&self) -> PollStats {
        let c = &self.cycle.counters;
        PollStats {
            cycles: c.cycles.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }

    /// Start on `AuthChanged(true)` and stop on `AuthChanged(false)`.
    ///
    /// The handler holds a weak reference, so the subscription does not keep
    /// the scheduler alive.
    pub fn follow_auth(self: &Arc<Self>, bus: &EventBus) -> Subscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        bus.on_auth_changed(move |authenticated| {
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            if authenticated {
                scheduler.start(scheduler.default_interval);
            } else {
                scheduler.stop();
            }
        })
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("running", &self.is_running())
            .field("initial_delay", &self.initial_delay)
            .field("default_interval", &self.default_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::Utc;
    use emosync_core::auth::StaticAuth;
    use emosync_core::{Emotion, WeatherState};

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
        fail_with: Option<fn() -> ApiError>,
    }

    impl CountingSource {
        fn ok() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail_with: None })
        }

        fn failing(f: fn() -> ApiError) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail_with: Some(f) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StateSource for CountingSource {
        async fn fetch_weather_state(&self) -> Result<WeatherState, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(f) = self.fail_with {
                return Err(f());
            }
            Ok(WeatherState {
                weather_type: "rain".into(),
                emotion: Emotion::Sadness,
                intensity: 0.5,
                description: "drizzle".into(),
                timestamp: Utc::now(),
            })
        }
    }

    fn config() -> PollingConfig {
        PollingConfig {
            interval_secs: 30,
            initial_delay_ms: 1_000,
            ..PollingConfig::default()
        }
    }

    fn scheduler(source: Arc<CountingSource>, authed: bool, bus: &EventBus) -> Arc<PollingScheduler> {
        Arc::new(PollingScheduler::new(
            source,
            Arc::new(StaticAuth(authed)),
            bus.clone(),
            &config(),
            Handle::current(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_after_delay_then_every_interval() {
        let bus = EventBus::new();
        let published = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&published);
        let _sub = bus.on_weather(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let source = CountingSource::ok();
        let poller = scheduler(source.clone(), true, &bus);

        assert!(poller.start(Duration::from_secs(30)));
        assert!(!poller.start(Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.calls(), 0);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(published.load(Ordering::SeqCst), 2);

        assert!(poller.stop());
        assert!(!poller.stop());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.calls(), 2);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn unauthenticated_cycles_are_skipped() {
        let bus = EventBus::new();
        let source = CountingSource::ok();
        let poller = scheduler(source.clone(), false, &bus);

        poller.start(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(65)).await;

        assert_eq!(source.calls(), 0);
        let stats = poller.stats();
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.published, 0);
    }

    #[tokio::test]
    async fn failures_do_not_publish() {
        let bus = EventBus::new();
        let published = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&published);
        let _sub = bus.on_weather(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });

        for make in [
            (|| ApiError::Parse("bad".into())) as fn() -> ApiError,
            || ApiError::Timeout(100),
            || ApiError::SessionExpired,
        ] {
            let poller = scheduler(CountingSource::failing(make), true, &bus);
            assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        }
        assert_eq!(published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn follows_auth_changes() {
        let bus = EventBus::new();
        let source = CountingSource::ok();
        let poller = scheduler(source.clone(), true, &bus);
        let _sub = poller.follow_auth(&bus);

        bus.publish(BusEvent::AuthChanged(true));
        assert!(poller.is_running());
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(source.calls(), 1);

        bus.publish(BusEvent::AuthChanged(false));
        assert!(!poller.is_running());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_poll_prevents_it() {
        let bus = EventBus::new();
        let source = CountingSource::ok();
        let poller = scheduler(source.clone(), true, &bus);

        poller.start(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(200)).await;
        poller.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_waits_for_publish_in_flight() {
        let bus = EventBus::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&delivered);
        let _sub = bus.on_weather(move |_| {
            let _ = entered_tx.send(());
            std::thread::sleep(Duration::from_millis(150));
            d.fetch_add(1, Ordering::SeqCst);
        });
        let source = CountingSource::ok();
        let poller = Arc::new(PollingScheduler::new(
            source.clone(),
            Arc::new(StaticAuth(true)),
            bus.clone(),
            &PollingConfig { interval_secs: 30, initial_delay_ms: 0, ..PollingConfig::default() },
            Handle::current(),
        ));

        poller.start(Duration::from_secs(30));
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join")
            .expect("handler entered");

        assert!(poller.stop());
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_weather_handler_does_not_deadlock() {
        let bus = EventBus::new();
        let source = CountingSource::ok();
        let poller = scheduler(source.clone(), true, &bus);
        let weak = Arc::downgrade(&poller);
        let _sub = bus.on_weather(move |_| {
            if let Some(p) = weak.upgrade() {
                p.stop();
            }
        });

        poller.start(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(source.calls(), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn dropped_scheduler_ignores_auth_events() {
        let bus = EventBus::new();
        let poller = scheduler(CountingSource::ok(), true, &bus);
        let _sub = poller.follow_auth(&bus);
        drop(poller);
        bus.publish(BusEvent::AuthChanged(true));
        assert_eq!(bus.stats().handler_failures, 0);
    }
}
