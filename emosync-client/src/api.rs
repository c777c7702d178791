//! Journal backend endpoints.
//!
//! Every call except [`EmotionApi::health`] goes through
//! [`SessionManager::authorized_request`], so a 401 anywhere ends the
//! session the same way.

use std::sync::Arc;

use async_trait::async_trait;
use emosync_core::{BusEvent, EmotionalState, HistorySample, JournalEntryRecord, WeatherState};
use serde_json::json;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::parse;
use crate::session::SessionManager;
use crate::transport::ApiRequest;

/// Something that yields the current weather/emotion snapshot.
///
/// The poller depends on this rather than on [`EmotionApi`] directly.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Fetch the latest snapshot.
    async fn fetch_weather_state(&self) -> Result<WeatherState, ApiError>;
}

/// Typed access to the journal endpoints.
#[derive(Debug, Clone)]
pub struct EmotionApi {
    session: Arc<SessionManager>,
}

impl EmotionApi {
    /// Wrap a session.
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Session used for every request.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Submit a journal entry and publish the resulting analysis.
    ///
    /// The analysis is normalized before publication as `EmotionReceived`.
    ///
    /// # Errors
    /// Anything [`SessionManager::authorized_request`] returns, or
    /// [`ApiError::Parse`] when the response carries no analysis.
    pub async fn submit_entry(&self, content: &str) -> Result<EmotionalState, ApiError> {
        let response = self
            .session
            .authorized_request(ApiRequest::post_json("/journal/entry", json!({ "content": content })))
            .await?;
        let state = parse::submission(&response.body)?;
        info!(
            emotion = %state.primary_emotion(),
            intensity = state.intensity(),
            "Journal entry analysed"
        );
        self.session.bus().publish(BusEvent::EmotionReceived(state.clone()));
        Ok(state)
    }

    /// `GET /unity/weather-state`.
    ///
    /// # Errors
    /// As [`SessionManager::authorized_request`], or [`ApiError::Parse`].
    pub async fn fetch_weather_state(&self) -> Result<WeatherState, ApiError> {
        let response = self
            .session
            .authorized_request(ApiRequest::get("/unity/weather-state"))
            .await?;
        parse::weather_state(&response.body)
    }

    /// Mood samples for the last `days` days, oldest first.
    ///
    /// # Errors
    /// As [`SessionManager::authorized_request`], or [`ApiError::Parse`] when
    /// the body is not a list. Malformed items are skipped, not fatal.
    pub async fn fetch_mood_samples(&self, days: u32) -> Result<Vec<HistorySample>, ApiError> {
        let response = self
            .session
            .authorized_request(ApiRequest::get("/mood/samples").with_query("days", days))
            .await?;
        let items = parse::array_items(&response.body)?;
        let mut samples = parse::decode_items(&items, "mood sample", parse::history_sample);
        samples.sort_by_key(|s| s.timestamp);
        debug!(days, received = items.len(), kept = samples.len(), "Fetched mood samples");
        Ok(samples)
    }

    /// One page of journal entries.
    ///
    /// # Errors
    /// As [`EmotionApi::fetch_mood_samples`].
    pub async fn fetch_journal_entries(&self, limit: u32, offset: u32) -> Result<Vec<JournalEntryRecord>, ApiError> {
        self.journal_page(limit, offset).await.map(|(entries, _)| entries)
    }

    /// Walk pages of `page_size` until a short page or `max_pages` pages.
    ///
    /// # Errors
    /// The first page error; entries from earlier pages are discarded.
    pub async fn fetch_all_journal_entries(
        &self,
        page_size: u32,
        max_pages: u32,
    ) -> Result<Vec<JournalEntryRecord>, ApiError> {
        let mut all = Vec::new();
        if page_size == 0 {
            return Ok(all);
        }
        for page in 0..max_pages {
            let (entries, raw_len) = self.journal_page(page_size, page.saturating_mul(page_size)).await?;
            all.extend(entries);
            // Compare against what the server sent, not what survived decoding.
            if raw_len < page_size as usize {
                break;
            }
        }
        debug!(total = all.len(), "Fetched journal history");
        Ok(all)
    }

    async fn journal_page(&self, limit: u32, offset: u32) -> Result<(Vec<JournalEntryRecord>, usize), ApiError> {
        let request = ApiRequest::get("/journal/entries")
            .with_query("limit", limit)
            .with_query("offset", offset);
        let response = self.session.authorized_request(request).await?;
        let items = parse::array_items(&response.body)?;
        let entries = parse::decode_items(&items, "journal entry", parse::journal_entry);
        Ok((entries, items.len()))
    }

    /// `GET /health`, unauthenticated.
    ///
    /// # Errors
    /// The network family, or [`ApiError::Protocol`] for a non-success status.
    pub async fn health(&self) -> Result<(), ApiError> {
        self.session.check_health().await
    }
}

#[async_trait]
impl StateSource for EmotionApi {
    async fn fetch_weather_state(&self) -> Result<WeatherState, ApiError> {
        EmotionApi::fetch_weather_state(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use emosync_core::config::ApiConfig;
    use emosync_core::{Emotion, EventBus, MemoryStore, TokenStore};
    use parking_lot::Mutex;

    use super::*;
    use crate::transport::ApiResponse;
    use crate::transport::mock::ScriptedTransport;

    async fn logged_in_api(transport: Arc<ScriptedTransport>) -> (EmotionApi, EventBus) {
        let bus = EventBus::new();
        let session = Arc::new(SessionManager::new(
            transport,
            TokenStore::new(Arc::new(MemoryStore::new())),
            bus.clone(),
            &ApiConfig::default(),
        ));
        session.login("alice", "pw").await.expect("login");
        (EmotionApi::new(session), bus)
    }

    fn token() -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse::new(200, r#"{"access_token":"tok","token_type":"bearer","user_id":"u-1"}"#))
    }

    #[tokio::test]
    async fn submission_publishes_normalized_state() {
        let transport = ScriptedTransport::new(|req| match req.path.as_str() {
            "/token" => token(),
            "/journal/entry" => Ok(ApiResponse::new(
                200,
                r#"{"status":"success","analysis":{"primary_emotion":"joy","intensity":90,"confidence":0.8},"entry_id":"e1"}"#,
            )),
            _ => Ok(ApiResponse::new(404, "")),
        });
        let (api, bus) = logged_in_api(transport.clone()).await;

        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        let _sub = bus.on_emotion(move |s| r.lock().push(s.clone()));

        let state = api.submit_entry("a good day").await.expect("submit");
        assert_eq!(state.primary_emotion(), &Emotion::Joy);
        assert!((state.intensity() - 0.9).abs() < 1e-6);
        assert_eq!(received.lock().as_slice(), &[state]);

        let seen = transport.seen.lock();
        assert!(matches!(
            &seen[1].body,
            crate::transport::RequestBody::Json(v) if v["content"] == "a good day"
        ));
    }

    #[tokio::test]
    async fn mood_samples_are_sorted_and_filtered() {
        let transport = ScriptedTransport::new(|req| match req.path.as_str() {
            "/token" => token(),
            "/mood/samples" => Ok(ApiResponse::new(
                200,
                r#"{"samples":[
                    {"timestamp":"2024-05-02T00:00:00","emotion":"calm","valence":0.4,"arousal":0.2},
                    {"emotion":"sad"},
                    {"timestamp":"2024-05-01T00:00:00","emotion":"sad","valence":-0.6,"arousal":0.3}
                ]}"#,
            )),
            _ => Ok(ApiResponse::new(404, "")),
        });
        let (api, _bus) = logged_in_api(transport.clone()).await;

        let samples = api.fetch_mood_samples(7).await.expect("samples");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].primary_emotion, Emotion::Sadness);
        assert_eq!(transport.seen.lock()[1].query, vec![("days".to_string(), "7".to_string())]);
    }

    #[tokio::test]
    async fn paging_stops_on_short_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let transport = ScriptedTransport::new(move |req| match req.path.as_str() {
            "/token" => token(),
            "/journal/entries" => {
                let page = c.fetch_add(1, Ordering::SeqCst);
                let n = if page < 2 { 2 } else { 1 };
                let items: Vec<_> = (0..n)
                    .map(|i| serde_json::json!({ "id": page * 10 + i, "timestamp": "2024-05-01T00:00:00Z" }))
                    .collect();
                Ok(ApiResponse::new(200, serde_json::Value::Array(items).to_string()))
            }
            _ => Ok(ApiResponse::new(404, "")),
        });
        let (api, _bus) = logged_in_api(transport).await;

        let entries = api.fetch_all_journal_entries(2, 10).await.expect("entries");
        assert_eq!(entries.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn paging_respects_max_pages() {
        let transport = ScriptedTransport::new(|req| match req.path.as_str() {
            "/token" => token(),
            _ => Ok(ApiResponse::new(
                200,
                r#"[{"id":"a","timestamp":"2024-05-01T00:00:00Z"},{"id":"b","timestamp":"2024-05-01T00:00:00Z"}]"#,
            )),
        });
        let (api, _bus) = logged_in_api(transport).await;
        let entries = api.fetch_all_journal_entries(2, 3).await.expect("entries");
        assert_eq!(entries.len(), 6);
        assert!(api.fetch_all_journal_entries(0, 3).await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn server_error_is_protocol() {
        let transport = ScriptedTransport::new(|req| match req.path.as_str() {
            "/token" => token(),
            _ => Ok(ApiResponse::new(500, r#"{"detail":"boom"}"#)),
        });
        let (api, _bus) = logged_in_api(transport).await;
        let err = api.fetch_weather_state().await.expect_err("500");
        assert!(matches!(err, ApiError::Protocol { status: 500, ref body } if body == "boom"));
        assert!(api.session().credential().is_some());
    }
}
