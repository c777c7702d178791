//! Tolerant decoding of backend payloads.
//!
//! The journal backend is loose about shapes: analyses may be wrapped as
//! `emotion_analysis` or `analysis`, timestamps may lack a zone, intensities
//! may be percentages, and list endpoints return either a bare array or an
//! object with a single array field. Everything here reads from
//! [`serde_json::Value`] and canonicalizes at the boundary, so the rest of
//! the workspace only sees clamped core types.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use emosync_core::{Emotion, EmotionalState, HistorySample, JournalEntryRecord, WeatherState};
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;

/// Wrapper keys under which a submission response carries its analysis.
const ANALYSIS_KEYS: [&str; 2] = ["emotion_analysis", "analysis"];

/// Parse a body into a JSON value.
///
/// # Errors
/// [`ApiError::Parse`] on invalid JSON.
pub fn body_value(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Parse(format!("invalid JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Read a timestamp: RFC 3339, zone-less ISO 8601 (taken as UTC), or epoch seconds.
#[must_use]
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            #[allow(clippy::cast_possible_truncation)]
            let secs = n.as_f64()? as i64;
            Utc.timestamp_opt(secs, 0).single()
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().map(|k| &obj[*k]).find(|v| !v.is_null())
}

// ---------------------------------------------------------------------------
// Emotional analysis
// ---------------------------------------------------------------------------

/// Build an [`EmotionalState`] from an analysis object.
///
/// Missing valence defaults to the emotion's baseline and missing arousal to
/// the intensity. Returns `None` when no emotion label is present.
#[must_use]
pub fn analysis(value: &Value, fallback_ts: DateTime<Utc>) -> Option<EmotionalState> {
    let label = first(value, &["primary_emotion", "emotion", "dominant_emotion"]).and_then(Value::as_str)?;
    let emotion = Emotion::parse(label);
    let intensity = first(value, &["intensity"]).and_then(number).unwrap_or(0.0);
    let normalized = emosync_core::normalize_intensity(intensity);
    let valence = first(value, &["valence"])
        .and_then(number)
        .unwrap_or_else(|| emotion.baseline_valence());
    let arousal = first(value, &["arousal"]).and_then(number).unwrap_or(normalized);
    let ts = first(value, &["analysis_timestamp", "timestamp"])
        .and_then(timestamp)
        .unwrap_or(fallback_ts);

    let state = EmotionalState::new(emotion, intensity, valence, arousal, ts);
    Some(match first(value, &["confidence"]).and_then(number) {
        Some(c) => state.with_confidence(c),
        None => state,
    })
}

/// Extract the analysis from a `POST /journal/entry` response.
///
/// # Errors
/// [`ApiError::Parse`] when neither wrapper key (nor a bare analysis) is present.
pub fn submission(body: &str) -> Result<EmotionalState, ApiError> {
    let value = body_value(body)?;
    let outer_ts = value.get("timestamp").and_then(timestamp).unwrap_or_else(Utc::now);

    let inner = ANALYSIS_KEYS
        .iter()
        .map(|k| &value[*k])
        .find(|v| v.is_object())
        .unwrap_or(&value);

    analysis(inner, outer_ts).ok_or_else(|| {
        ApiError::Parse("submission response carries no emotion analysis".to_string())
    })
}

/// Decode `GET /unity/weather-state`.
///
/// # Errors
/// [`ApiError::Parse`] when the body is not an object with an `emotion` field.
pub fn weather_state(body: &str) -> Result<WeatherState, ApiError> {
    let value = body_value(body)?;
    let label = first(&value, &["emotion", "primary_emotion"])
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Parse("weather state has no emotion".to_string()))?;

    Ok(WeatherState {
        weather_type: first(&value, &["weather_type", "weather"]).and_then(text).unwrap_or_default(),
        emotion: Emotion::parse(label),
        intensity: emosync_core::normalize_intensity(value.get("intensity").and_then(number).unwrap_or(0.0)),
        description: value.get("description").and_then(text).unwrap_or_default(),
        timestamp: value.get("timestamp").and_then(timestamp).unwrap_or_else(Utc::now),
    })
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// Locate the item array of a list response.
///
/// Accepts a bare array or an object holding exactly one array-valued field.
///
/// # Errors
/// [`ApiError::Parse`] for any other shape.
pub fn array_items(body: &str) -> Result<Vec<Value>, ApiError> {
    match body_value(body)? {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter_map(|(k, v)| match v {
                Value::Array(items) => Some((k, items)),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some((_, items)), None) => Ok(items),
                (None, _) => Err(ApiError::Parse("list response contains no array".to_string())),
                (Some((a, _)), Some((b, _))) => Err(ApiError::Parse(format!(
                    "list response has several arrays ('{a}', '{b}', ...)"
                ))),
            }
        }
        other => Err(ApiError::Parse(format!("expected a list, got {}", kind(&other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode every item with `decode`, skipping (and logging) the ones it rejects.
pub fn decode_items<T>(items: &[Value], what: &str, decode: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let decoded = decode(item);
            if decoded.is_none() {
                warn!(index, what, "Skipping malformed item");
            }
            decoded
        })
        .collect()
}

/// One mood-map sample. Requires a timestamp and an emotion; a missing axis
/// is kept as NaN so the mood map can skip the sample.
#[must_use]
pub fn history_sample(value: &Value) -> Option<HistorySample> {
    let ts = first(value, &["timestamp", "created_at"]).and_then(timestamp)?;
    let label = first(value, &["primary_emotion", "emotion"]).and_then(Value::as_str)?;
    Some(
        HistorySample {
            timestamp: ts,
            primary_emotion: Emotion::parse(label),
            valence: value.get("valence").and_then(number).unwrap_or(f32::NAN),
            arousal: value.get("arousal").and_then(number).unwrap_or(f32::NAN),
            intensity: value.get("intensity").and_then(number).unwrap_or(0.0),
        }
        .normalized(),
    )
}

/// One journal entry listing. Requires an id and a timestamp.
///
/// The analysis may be nested under a wrapper key or flattened onto the
/// entry itself (`emotion`, `intensity`, `valence`, `arousal`).
#[must_use]
pub fn journal_entry(value: &Value) -> Option<JournalEntryRecord> {
    let id = first(value, &["id", "entry_id"]).and_then(text)?;
    let ts = first(value, &["timestamp", "created_at"]).and_then(timestamp)?;
    let source = ANALYSIS_KEYS
        .iter()
        .map(|k| &value[*k])
        .find(|v| v.is_object())
        .unwrap_or(value);
    let analysis = analysis(source, ts);

    Some(JournalEntryRecord {
        id,
        content: first(value, &["content", "message"]).and_then(text),
        timestamp: ts,
        analysis,
    })
}
