//! Core type definitions for the EMOSYNC distribution layer.
//!
//! Every value that crosses the event bus is an immutable snapshot: fields
//! are clamped once at construction and only exposed through accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Emotion vocabulary
// ---------------------------------------------------------------------------

/// Primary emotion label attached to an analysis result.
///
/// Parsing is case-insensitive and accepts common synonyms; anything outside
/// the vocabulary is kept verbatim in [`Emotion::Unknown`] so policies can
/// fall back to neutral behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Emotion {
    /// Happiness, delight.
    Joy,
    /// Anger, frustration, rage.
    Anger,
    /// Calm, peace, relaxation.
    Calm,
    /// Fear, dread.
    Fear,
    /// Anxiety, nervousness.
    Anxiety,
    /// Sadness, grief.
    Sadness,
    /// Surprise.
    Surprise,
    /// Disgust.
    Disgust,
    /// Love, affection.
    Love,
    /// No dominant emotion.
    Neutral,
    /// A label outside the known vocabulary (lower-cased, trimmed).
    Unknown(String),
}

impl Emotion {
    /// Every known (non-`Unknown`) emotion.
    pub const KNOWN: [Emotion; 10] = [
        Emotion::Joy,
        Emotion::Anger,
        Emotion::Calm,
        Emotion::Fear,
        Emotion::Anxiety,
        Emotion::Sadness,
        Emotion::Surprise,
        Emotion::Disgust,
        Emotion::Love,
        Emotion::Neutral,
    ];

    /// Parse a free-form label, case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "joy" | "happy" | "happiness" | "joyful" => Self::Joy,
            "anger" | "angry" | "mad" | "rage" | "frustrated" => Self::Anger,
            "calm" | "peaceful" | "relaxed" | "content" => Self::Calm,
            "fear" | "scared" | "afraid" | "terrified" => Self::Fear,
            "anxiety" | "anxious" | "nervous" | "worried" => Self::Anxiety,
            "sad" | "sadness" | "grief" | "depressed" => Self::Sadness,
            "surprise" | "surprised" => Self::Surprise,
            "disgust" | "disgusted" => Self::Disgust,
            "love" | "loved" | "affection" => Self::Love,
            "neutral" | "" => Self::Neutral,
            _ => Self::Unknown(normalized),
        }
    }

    /// Canonical lower-case label.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Joy => "joy",
            Self::Anger => "anger",
            Self::Calm => "calm",
            Self::Fear => "fear",
            Self::Anxiety => "anxiety",
            Self::Sadness => "sadness",
            Self::Surprise => "surprise",
            Self::Disgust => "disgust",
            Self::Love => "love",
            Self::Neutral => "neutral",
            Self::Unknown(raw) => raw,
        }
    }

    /// Baseline valence used when a payload carries none.
    #[must_use]
    pub fn baseline_valence(&self) -> f32 {
        match self {
            Self::Love => 0.9,
            Self::Joy => 0.8,
            Self::Calm => 0.5,
            Self::Surprise => 0.2,
            Self::Neutral | Self::Unknown(_) => 0.0,
            Self::Anxiety => -0.5,
            Self::Disgust => -0.6,
            Self::Anger | Self::Fear | Self::Sadness => -0.7,
        }
    }

    /// Whether this label is outside the known vocabulary.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl From<String> for Emotion {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Emotion> for String {
    fn from(value: Emotion) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Canonicalize an intensity to `[0, 1]`.
///
/// Backends report intensity either as a fraction or as a percentage; values
/// above `1.0` are read as percentages. Non-finite input becomes `0.0`.
#[must_use]
pub fn normalize_intensity(raw: f32) -> f32 {
    if !raw.is_finite() {
        return 0.0;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

// ---------------------------------------------------------------------------
// Emotional state
// ---------------------------------------------------------------------------

/// One emotional analysis result, normalized and immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EmotionalStateRecord", into = "EmotionalStateRecord")]
pub struct EmotionalState {
    primary_emotion: Emotion,
    intensity: f32,
    valence: f32,
    arousal: f32,
    confidence: Option<f32>,
    timestamp: DateTime<Utc>,
}

impl EmotionalState {
    /// Build a state, clamping every numeric field into its range.
    ///
    /// `intensity` is passed through [`normalize_intensity`], `valence` is
    /// clamped to `[-1, 1]` and `arousal` to `[0, 1]`. Non-finite inputs fall
    /// back to neutral values.
    #[must_use]
    pub fn new(
        primary_emotion: Emotion,
        intensity: f32,
        valence: f32,
        arousal: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            primary_emotion,
            intensity: normalize_intensity(intensity),
            valence: finite_or(valence, 0.0).clamp(-1.0, 1.0),
            arousal: finite_or(arousal, 0.0).clamp(0.0, 1.0),
            confidence: None,
            timestamp,
        }
    }

    /// Build a state from an emotion and intensity alone.
    ///
    /// Valence comes from [`Emotion::baseline_valence`] and arousal mirrors
    /// the (normalized) intensity.
    #[must_use]
    pub fn from_emotion(primary_emotion: Emotion, intensity: f32, timestamp: DateTime<Utc>) -> Self {
        let intensity = normalize_intensity(intensity);
        let valence = primary_emotion.baseline_valence();
        Self::new(primary_emotion, intensity, valence, intensity, timestamp)
    }

    /// A neutral state at the given instant.
    #[must_use]
    pub fn neutral(timestamp: DateTime<Utc>) -> Self {
        Self::new(Emotion::Neutral, 0.0, 0.0, 0.0, timestamp)
    }

    /// Attach a model confidence (clamped to `[0, 1]`, dropped if non-finite).
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.is_finite().then(|| confidence.clamp(0.0, 1.0));
        self
    }

    /// Dominant emotion.
    #[must_use]
    pub fn primary_emotion(&self) -> &Emotion {
        &self.primary_emotion
    }

    /// Intensity in `[0, 1]`.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Valence in `[-1, 1]`.
    #[must_use]
    pub fn valence(&self) -> f32 {
        self.valence
    }

    /// Arousal in `[0, 1]`.
    #[must_use]
    pub fn arousal(&self) -> f32 {
        self.arousal
    }

    /// Model confidence, if reported.
    #[must_use]
    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// When the analysis was produced.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Project this state into a mood-map history sample.
    #[must_use]
    pub fn to_sample(&self) -> HistorySample {
        HistorySample {
            timestamp: self.timestamp,
            primary_emotion: self.primary_emotion.clone(),
            valence: self.valence,
            arousal: self.arousal,
            intensity: self.intensity,
        }
    }
}

/// Serialized shape of [`EmotionalState`]; re-clamped on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmotionalStateRecord {
    primary_emotion: Emotion,
    intensity: f32,
    valence: f32,
    arousal: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    timestamp: DateTime<Utc>,
}

impl From<EmotionalStateRecord> for EmotionalState {
    fn from(r: EmotionalStateRecord) -> Self {
        let state = EmotionalState::new(r.primary_emotion, r.intensity, r.valence, r.arousal, r.timestamp);
        match r.confidence {
            Some(c) => state.with_confidence(c),
            None => state,
        }
    }
}

impl From<EmotionalState> for EmotionalStateRecord {
    fn from(s: EmotionalState) -> Self {
        Self {
            primary_emotion: s.primary_emotion,
            intensity: s.intensity,
            valence: s.valence,
            arousal: s.arousal,
            confidence: s.confidence,
            timestamp: s.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Weather state (polling payload)
// ---------------------------------------------------------------------------

/// Externally computed weather/emotion snapshot returned by the polling endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherState {
    /// Server-side weather label (informational).
    pub weather_type: String,
    /// Emotion the weather was derived from.
    pub emotion: Emotion,
    /// Intensity in `[0, 1]` (normalized at ingress).
    pub intensity: f32,
    /// Human-readable description.
    pub description: String,
    /// When the server computed the snapshot.
    pub timestamp: DateTime<Utc>,
}

impl WeatherState {
    /// Convert into an [`EmotionalState`] for consumers keyed on emotion.
    #[must_use]
    pub fn to_emotional_state(&self) -> EmotionalState {
        EmotionalState::from_emotion(self.emotion.clone(), self.intensity, self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One historical sample for mood-map visualization.
///
/// Fields are raw: a sample with a non-finite valence or arousal is kept as
/// received so the mood map can skip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// When the sample was recorded.
    pub timestamp: DateTime<Utc>,
    /// Dominant emotion at that time.
    #[serde(alias = "emotion")]
    pub primary_emotion: Emotion,
    /// Valence, nominally `[-1, 1]`.
    #[serde(default = "missing_axis")]
    pub valence: f32,
    /// Arousal, nominally `[0, 1]`.
    #[serde(default = "missing_axis")]
    pub arousal: f32,
    /// Intensity, `[0, 1]` after [`HistorySample::normalized`].
    #[serde(default)]
    pub intensity: f32,
}

fn missing_axis() -> f32 {
    f32::NAN
}

impl HistorySample {
    /// Canonicalize intensity; valence and arousal are left untouched.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.intensity = normalize_intensity(self.intensity);
        self
    }

    /// Whether both plotting axes are finite.
    #[must_use]
    pub fn is_plottable(&self) -> bool {
        self.valence.is_finite() && self.arousal.is_finite()
    }
}

/// One journal entry as listed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntryRecord {
    /// Backend identifier.
    pub id: String,
    /// Entry text, when the listing includes it.
    pub content: Option<String>,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Analysis attached to the entry, if any.
    pub analysis: Option<EmotionalState>,
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Default authorization scheme.
pub const BEARER: &str = "Bearer";

/// Bearer credential issued by the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    raw_token: String,
    token_scheme: String,
    user_id: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Build a credential, normalizing the scheme and stripping any scheme
    /// prefix the server left on the raw token.
    #[must_use]
    pub fn new(raw_token: &str, token_scheme: &str, user_id: impl Into<String>) -> Self {
        let scheme = normalize_scheme(token_scheme);
        let token = strip_scheme_prefix(raw_token, &scheme).to_string();
        Self {
            raw_token: token,
            token_scheme: scheme,
            user_id: user_id.into(),
            expires_at: None,
        }
    }

    /// Attach an expiry instant.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Raw token without scheme prefix.
    #[must_use]
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// Authorization scheme (`Bearer` unless the server said otherwise).
    #[must_use]
    pub fn token_scheme(&self) -> &str {
        &self.token_scheme
    }

    /// Backend user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Expiry instant decoded from the token, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the credential carries a usable token.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.raw_token.is_empty()
    }

    /// Whether the recorded expiry has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Value for the `Authorization` header: scheme and token, once.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_scheme, self.raw_token)
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token_scheme", &self.token_scheme)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn normalize_scheme(scheme: &str) -> String {
    let trimmed = scheme.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(BEARER) {
        BEARER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove every leading `"<scheme> "` from `raw`.
fn strip_scheme_prefix<'a>(raw: &'a str, scheme: &str) -> &'a str {
    let mut token = raw.trim();
    while let Some((head, rest)) = token.split_once(char::is_whitespace) {
        if !head.eq_ignore_ascii_case(scheme) {
            break;
        }
        token = rest.trim_start();
    }
    token
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
