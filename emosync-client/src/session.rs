//! Session Manager: credential lifecycle and authorized requests.
//!
//! The manager is the only writer of the [`TokenStore`] and the only
//! publisher of [`BusEvent::AuthChanged`]. Every path that drops the
//! credential (logout, local expiry, a 401 from the server) funnels through
//! one teardown that takes the credential out under a lock, so concurrent
//! failures produce exactly one `AuthChanged(false)`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use emosync_core::config::ApiConfig;
use emosync_core::{AuthStatus, BEARER, BusEvent, Credential, EventBus, TokenStore};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// `POST /token` success body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
}

/// Owns the credential for one client process.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    bus: EventBus,
    credential: Mutex<Option<Credential>>,
    grace: Duration,
    health_timeout: Duration,
}

impl SessionManager {
    /// Create a logged-out manager.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore, bus: EventBus, config: &ApiConfig) -> Self {
        Self {
            transport,
            tokens,
            bus,
            credential: Mutex::new(None),
            grace: Duration::from_millis(config.auto_login_grace_ms),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
        }
    }

    /// Bus this manager publishes auth changes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Snapshot of the held credential.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.credential.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Login / register / logout
    // -----------------------------------------------------------------------

    /// Exchange username and password for a credential.
    ///
    /// On success the credential is persisted and installed. `AuthChanged(true)`
    /// is published when this moves the session from logged out to logged in;
    /// logging in again while authorized replaces the credential silently.
    /// On failure nothing changes.
    ///
    /// # Errors
    /// [`ApiError::Auth`] with the server's `detail` when rejected,
    /// the network family on transport failure, [`ApiError::Parse`] for an
    /// unusable token response and [`ApiError::Storage`] if it cannot be saved.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let request = ApiRequest::post_form("/token", [("username", username), ("password", password)]);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(rejection(&response, "Incorrect username or password"));
        }

        let body: TokenResponse = response.json()?;
        let user_id = match body.user_id {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => username.to_string(),
            Some(other) => other.to_string(),
        };
        let scheme = body.token_type.as_deref().unwrap_or(BEARER);
        let credential = Credential::new(&body.access_token, scheme, user_id);
        if !credential.has_token() {
            return Err(ApiError::Parse("token response carries an empty access_token".to_string()));
        }
        let expires_at = TokenStore::expiry_of(credential.raw_token());
        let credential = credential.with_expiry(expires_at);

        self.tokens.save(&credential)?;
        info!(user = credential.user_id(), expires_at = ?credential.expires_at(), "Logged in");
        self.install(credential.clone());
        Ok(credential)
    }

    /// Create an account, then log into it.
    ///
    /// # Errors
    /// [`ApiError::Auth`] when the server refuses the registration, otherwise
    /// whatever [`SessionManager::login`] returns.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Credential, ApiError> {
        let request = ApiRequest::post_json(
            "/register",
            json!({ "username": username, "password": password, "email": email }),
        );
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(rejection(&response, "Registration failed"));
        }
        info!(user = username, "Registered");
        self.login(username, password).await
    }

    /// Drop the credential and clear storage. Returns whether a session ended.
    ///
    /// Idempotent: `AuthChanged(false)` is only published on an actual transition.
    pub fn logout(&self) -> bool {
        let ended = self.teardown("logout");
        if !ended {
            // Nothing in memory, but storage may still hold a credential.
            self.clear_storage();
        }
        ended
    }

    // -----------------------------------------------------------------------
    // Start-up
    // -----------------------------------------------------------------------

    /// Install a persisted, non-expired credential. Returns whether one was found.
    pub fn restore(&self) -> bool {
        match self.tokens.load() {
            Some(credential) => {
                info!(user = credential.user_id(), "Restored stored credential");
                self.install(credential);
                true
            }
            None => {
                debug!("No stored credential to restore");
                false
            }
        }
    }

    /// Restore a stored session once the backend is reachable.
    ///
    /// Waits the configured grace period, probes `GET /health` within the
    /// health timeout, then calls [`SessionManager::restore`]. A failed probe
    /// leaves the client logged out.
    ///
    /// # Errors
    /// [`ApiError::Timeout`] when the probe exceeds its budget, or the probe's own error.
    pub async fn auto_login(&self) -> Result<bool, ApiError> {
        tokio::time::sleep(self.grace).await;
        self.check_health().await?;
        Ok(self.restore())
    }

    /// Probe `GET /health` (no credential), bounded by the health timeout.
    ///
    /// # Errors
    /// [`ApiError::Timeout`] past the budget, [`ApiError::Protocol`] for a
    /// non-success status, or the transport's network error.
    pub async fn check_health(&self) -> Result<(), ApiError> {
        #[allow(clippy::cast_possible_truncation)]
        let budget_ms = self.health_timeout.as_millis() as u64;
        let request = ApiRequest::get("/health").with_timeout(self.health_timeout);
        match tokio::time::timeout(self.health_timeout, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => Ok(()),
            Ok(Ok(response)) => Err(response.protocol_error()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(timeout_ms = budget_ms, "Health probe timed out");
                Err(ApiError::Timeout(budget_ms))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Authorized requests
    // -----------------------------------------------------------------------

    /// Send `request` with the held credential.
    ///
    /// A 401 tears the session down centrally and yields
    /// [`ApiError::SessionExpired`]; other non-success statuses yield
    /// [`ApiError::Protocol`].
    ///
    /// # Errors
    /// [`ApiError::Unauthenticated`] when no valid credential is held, plus
    /// the cases above and the network family.
    pub async fn authorized_request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if !self.is_authenticated() {
            return Err(ApiError::Unauthenticated);
        }
        let Some(credential) = self.credential() else {
            return Err(ApiError::Unauthenticated);
        };

        let path = request.path.clone();
        let response = self
            .transport
            .send(request.with_authorization(credential.authorization_header()))
            .await?;

        match response.status {
            401 => {
                warn!(path = %path, "Server rejected credential");
                self.deauthenticate(&credential, "server returned 401");
                Err(ApiError::SessionExpired)
            }
            _ if response.is_success() => Ok(response),
            _ => Err(response.protocol_error()),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn install(&self, credential: Credential) {
        let was_authenticated = self.credential.lock().replace(credential).is_some();
        if !was_authenticated {
            self.bus.publish(BusEvent::AuthChanged(true));
        }
    }

    /// Tear down only if `used` is still the held credential, so a 401 for a
    /// token that has since been replaced does not end the new session.
    fn deauthenticate(&self, used: &Credential, reason: &str) {
        let taken = {
            let mut guard = self.credential.lock();
            match guard.as_ref() {
                Some(current) if current.raw_token() == used.raw_token() => guard.take(),
                _ => None,
            }
        };
        if taken.is_some() {
            self.finish_teardown(reason);
        }
    }

    fn teardown(&self, reason: &str) -> bool {
        let taken = self.credential.lock().take();
        if taken.is_some() {
            self.finish_teardown(reason);
            true
        } else {
            false
        }
    }

    // Called with the credential already taken; the lock is not held.
    fn finish_teardown(&self, reason: &str) {
        info!(reason, "Session ended");
        self.clear_storage();
        self.bus.publish(BusEvent::AuthChanged(false));
    }

    fn clear_storage(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
    }
}

impl AuthStatus for SessionManager {
    fn is_authenticated(&self) -> bool {
        let expired = match self.credential.lock().as_ref() {
            None => return false,
            Some(credential) => credential.is_expired_at(Utc::now()),
        };
        if expired {
            self.teardown("credential expired");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("authenticated", &self.credential.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// Map a rejected login/registration to [`ApiError::Auth`], keeping server
/// errors (5xx) in the protocol family.
fn rejection(response: &ApiResponse, fallback: &str) -> ApiError {
    if response.status >= 500 {
        return response.protocol_error();
    }
    ApiError::Auth(response.detail().unwrap_or_else(|| fallback.to_string()))
}
