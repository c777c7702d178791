//! Weather policy: emotion → weather category, with intensity-paced
//! transitions.
//!
//! Each emotion declares an ordered preference list; the first kind the
//! renderer supports wins. An emotion with no supported preference falls
//! back to [`WeatherKind::Clear`] with a warning.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::types::{Emotion, EmotionalState};

/// Fixed set of weather categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherKind {
    /// Clear sky.
    Clear,
    /// A few clouds.
    #[serde(alias = "mostly_clear")]
    MostlyClear,
    /// Broken clouds.
    #[serde(alias = "partly_cloudy")]
    PartlyCloudy,
    /// Full cloud cover.
    Overcast,
    /// Thunderstorm.
    Thunder,
    /// Fog.
    Foggy,
    /// Rain.
    Rain,
    /// Burning sky.
    Firestorm,
}

impl WeatherKind {
    /// Every category.
    pub const ALL: [WeatherKind; 8] = [
        WeatherKind::Clear,
        WeatherKind::MostlyClear,
        WeatherKind::PartlyCloudy,
        WeatherKind::Overcast,
        WeatherKind::Thunder,
        WeatherKind::Foggy,
        WeatherKind::Rain,
        WeatherKind::Firestorm,
    ];

    /// Canonical label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::MostlyClear => "mostly-clear",
            Self::PartlyCloudy => "partly-cloudy",
            Self::Overcast => "overcast",
            Self::Thunder => "thunder",
            Self::Foggy => "foggy",
            Self::Rain => "rain",
            Self::Firestorm => "firestorm",
        }
    }

    /// Parse a label (case-insensitive; `-`, `_` and spaces are equivalent).
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        Self::ALL.into_iter().find(|k| k.label() == key)
    }
}

impl std::fmt::Display for WeatherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered preferences per emotion; later entries are fallbacks.
fn preferences(emotion: &Emotion) -> &'static [WeatherKind] {
    use WeatherKind::{Clear, Firestorm, Foggy, MostlyClear, Overcast, PartlyCloudy, Rain, Thunder};
    match emotion {
        Emotion::Joy | Emotion::Love => &[Clear],
        Emotion::Calm => &[MostlyClear, Clear],
        Emotion::Neutral => &[MostlyClear, PartlyCloudy],
        Emotion::Surprise => &[PartlyCloudy, Clear],
        Emotion::Sadness => &[Rain, Thunder],
        Emotion::Anger => &[Firestorm, Rain],
        Emotion::Fear => &[Foggy, Thunder],
        Emotion::Anxiety => &[Foggy, Overcast],
        Emotion::Disgust => &[Overcast, Foggy],
        Emotion::Unknown(_) => &[],
    }
}

/// Emotion → weather selection and transition pacing.
#[derive(Debug, Clone)]
pub struct WeatherPolicy {
    supported: Vec<WeatherKind>,
    fast: f32,
    slow: f32,
}

impl Default for WeatherPolicy {
    fn default() -> Self {
        Self::new(&WeatherConfig::default())
    }
}

impl WeatherPolicy {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            supported: config.supported.clone(),
            fast: config.fast_transition_secs,
            slow: config.slow_transition_secs,
        }
    }

    /// Pick the weather for `emotion`.
    #[must_use]
    pub fn select(&self, emotion: &Emotion) -> WeatherKind {
        if let Some(kind) = preferences(emotion)
            .iter()
            .copied()
            .find(|k| self.supported.contains(k))
        {
            return kind;
        }
        warn!(emotion = %emotion, "No supported weather for emotion; falling back to clear");
        WeatherKind::Clear
    }

    /// Transition length: `slow` at intensity 0, `fast` at intensity 1.
    #[must_use]
    pub fn transition_duration(&self, intensity: f32) -> Duration {
        let t = if intensity.is_finite() { intensity.clamp(0.0, 1.0) } else { 0.0 };
        let secs = self.slow + (self.fast - self.slow) * t;
        Duration::from_secs_f32(secs.max(0.0))
    }
}

/// A weather change in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// Weather being left.
    pub from: WeatherKind,
    /// Weather being entered.
    pub to: WeatherKind,
    /// Total length.
    pub duration: Duration,
    /// Time elapsed so far.
    pub elapsed: Duration,
}

impl Transition {
    /// Completion fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

/// Result of [`WeatherController::request`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeatherDecision {
    /// Already showing the requested weather.
    Unchanged(WeatherKind),
    /// A transition is in flight; this request was dropped.
    Suppressed {
        /// What the dropped request asked for.
        requested: WeatherKind,
        /// Target of the transition still running.
        in_flight: WeatherKind,
    },
    /// A new transition began.
    Started(Transition),
}

/// Current weather plus at most one in-flight transition.
#[derive(Debug, Clone)]
pub struct WeatherController {
    policy: WeatherPolicy,
    current: WeatherKind,
    in_flight: Option<Transition>,
}

impl WeatherController {
    /// Start at `initial` with no transition running.
    #[must_use]
    pub fn new(policy: WeatherPolicy, initial: WeatherKind) -> Self {
        Self {
            policy,
            current: initial,
            in_flight: None,
        }
    }

    /// Weather currently settled on screen.
    #[must_use]
    pub fn current(&self) -> WeatherKind {
        self.current
    }

    /// Transition currently running, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&Transition> {
        self.in_flight.as_ref()
    }

    /// Ask for the weather matching `state`.
    pub fn request(&mut self, state: &EmotionalState) -> WeatherDecision {
        let target = self.policy.select(state.primary_emotion());

        if let Some(running) = &self.in_flight {
            debug!(requested = %target, in_flight = %running.to, "Weather change suppressed");
            return WeatherDecision::Suppressed {
                requested: target,
                in_flight: running.to,
            };
        }
        if target == self.current {
            return WeatherDecision::Unchanged(target);
        }

        let transition = Transition {
            from: self.current,
            to: target,
            duration: self.policy.transition_duration(state.intensity()),
            elapsed: Duration::ZERO,
        };
        debug!(from = %transition.from, to = %transition.to, secs = transition.duration.as_secs_f32(), "Weather transition started");
        self.in_flight = Some(transition);
        WeatherDecision::Started(transition)
    }

    /// Advance the running transition. Returns the new weather when one completes.
    pub fn tick(&mut self, dt: Duration) -> Option<WeatherKind> {
        let running = self.in_flight.as_mut()?;
        running.elapsed = running.elapsed.saturating_add(dt);
        if running.elapsed < running.duration {
            return None;
        }
        let done = running.to;
        self.in_flight = None;
        self.current = done;
        Some(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(emotion: Emotion, intensity: f32) -> EmotionalState {
        EmotionalState::from_emotion(emotion, intensity, Utc::now())
    }

    fn policy_supporting(kinds: &[WeatherKind]) -> WeatherPolicy {
        WeatherPolicy::new(&WeatherConfig {
            supported: kinds.to_vec(),
            ..WeatherConfig::default()
        })
    }

    #[test]
    fn preferred_kinds_win() {
        let policy = WeatherPolicy::default();
        assert_eq!(policy.select(&Emotion::Sadness), WeatherKind::Rain);
        assert_eq!(policy.select(&Emotion::Anger), WeatherKind::Firestorm);
        assert_eq!(policy.select(&Emotion::Joy), WeatherKind::Clear);
        assert_eq!(policy.select(&Emotion::Fear), WeatherKind::Foggy);
        assert_eq!(policy.select(&Emotion::Neutral), WeatherKind::MostlyClear);
    }

    #[test]
    fn declared_fallbacks_apply() {
        let policy = policy_supporting(&[WeatherKind::Clear, WeatherKind::Thunder, WeatherKind::Rain]);
        assert_eq!(policy.select(&Emotion::Sadness), WeatherKind::Rain);
        assert_eq!(policy.select(&Emotion::Anger), WeatherKind::Rain);

        let no_rain = policy_supporting(&[WeatherKind::Clear, WeatherKind::Thunder]);
        assert_eq!(no_rain.select(&Emotion::Sadness), WeatherKind::Thunder);
        assert_eq!(no_rain.select(&Emotion::Fear), WeatherKind::Thunder);
    }

    #[test]
    fn unmapped_falls_back_to_clear() {
        let policy = WeatherPolicy::default();
        assert_eq!(policy.select(&Emotion::Unknown("wistful".into())), WeatherKind::Clear);
        let sparse = policy_supporting(&[WeatherKind::Clear]);
        assert_eq!(sparse.select(&Emotion::Anxiety), WeatherKind::Clear);
    }

    #[test]
    fn higher_intensity_transitions_faster() {
        let policy = WeatherPolicy::default();
        let slow = policy.transition_duration(0.0);
        let mid = policy.transition_duration(0.5);
        let fast = policy.transition_duration(1.0);
        assert!(fast < mid && mid < slow);
        assert!((slow.as_secs_f32() - 10.0).abs() < 1e-3);
        assert!((fast.as_secs_f32() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn same_target_is_idempotent() {
        let mut ctl = WeatherController::new(WeatherPolicy::default(), WeatherKind::Rain);
        assert_eq!(ctl.request(&state(Emotion::Sadness, 0.5)), WeatherDecision::Unchanged(WeatherKind::Rain));
        assert!(ctl.in_flight().is_none());
    }

    #[test]
    fn in_flight_transition_suppresses_requests() {
        let mut ctl = WeatherController::new(WeatherPolicy::default(), WeatherKind::Clear);
        assert!(matches!(ctl.request(&state(Emotion::Anger, 1.0)), WeatherDecision::Started(_)));

        let again = ctl.request(&state(Emotion::Sadness, 1.0));
        assert_eq!(
            again,
            WeatherDecision::Suppressed { requested: WeatherKind::Rain, in_flight: WeatherKind::Firestorm }
        );

        assert_eq!(ctl.tick(Duration::from_secs(1)), None);
        assert_eq!(ctl.tick(Duration::from_secs(5)), Some(WeatherKind::Firestorm));
        assert_eq!(ctl.current(), WeatherKind::Firestorm);

        assert!(matches!(ctl.request(&state(Emotion::Sadness, 1.0)), WeatherDecision::Started(_)));
    }

    #[test]
    fn parse_accepts_variants() {
        assert_eq!(WeatherKind::parse("Partly_Cloudy"), Some(WeatherKind::PartlyCloudy));
        assert_eq!(WeatherKind::parse("mostly clear"), Some(WeatherKind::MostlyClear));
        assert_eq!(WeatherKind::parse("hail"), None);
    }
}
