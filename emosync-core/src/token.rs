//! Durable credential storage with local expiry detection.
//!
//! Expiry is read straight from the signed token's payload segment, so a
//! stale credential is discarded at start-up without a backend round trip.
//! Decoding is deliberately forgiving: a token whose payload cannot be read
//! is treated as *not* expired, and the server's 401 remains the final word.

use std::sync::Arc;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{KvStore, keys};
use crate::types::{BEARER, Credential};

/// base64url that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Persists the credential under fixed keys.
///
/// Only the session manager writes through this type.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Wrap a key/value backend.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Persist every credential field.
    ///
    /// # Errors
    /// Backend failure; a partial write is possible and is cleaned up by the
    /// next [`TokenStore::clear`].
    pub fn save(&self, credential: &Credential) -> Result<()> {
        self.store.set(keys::RAW_TOKEN, credential.raw_token())?;
        self.store.set(keys::TOKEN_SCHEME, credential.token_scheme())?;
        self.store.set(keys::USER_ID, credential.user_id())?;
        match credential.expires_at() {
            Some(exp) => self.store.set(keys::EXPIRES_AT, &exp.to_rfc3339())?,
            None => {
                self.store.remove(keys::EXPIRES_AT)?;
            }
        }
        debug!(user = credential.user_id(), "Credential saved");
        Ok(())
    }

    /// Load the stored credential.
    ///
    /// Returns `None` when nothing is stored, when storage fails (logged),
    /// or when the token has expired, in which case the store is cleared
    /// before returning.
    #[must_use]
    pub fn load(&self) -> Option<Credential> {
        let raw = match self.store.get(keys::RAW_TOKEN) {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                return None;
            }
        };

        let now = Utc::now();
        let stored_expiry = self
            .read_optional(keys::EXPIRES_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        if Self::is_expired_at(&raw, now) || stored_expiry.is_some_and(|exp| exp <= now) {
            info!("Stored credential has expired; clearing");
            if let Err(e) = self.clear() {
                warn!(error = %e, "Failed to clear expired credential");
            }
            return None;
        }

        let scheme = self.read_optional(keys::TOKEN_SCHEME).unwrap_or_else(|| BEARER.to_string());
        let user_id = self.read_optional(keys::USER_ID).unwrap_or_default();
        let expires_at = stored_expiry.or_else(|| Self::expiry_of(&raw));

        Some(Credential::new(&raw, &scheme, user_id).with_expiry(expires_at))
    }

    /// Remove every credential field.
    ///
    /// # Errors
    /// The first backend failure; removal of the remaining keys is still attempted.
    pub fn clear(&self) -> Result<()> {
        let mut first_err = None;
        for key in [keys::RAW_TOKEN, keys::TOKEN_SCHEME, keys::USER_ID, keys::EXPIRES_AT] {
            if let Err(e) = self.store.remove(key) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether `raw_token`'s expiry claim lies in the past.
    ///
    /// No claim means non-expiring. An undecodable token is reported as not
    /// expired.
    #[must_use]
    pub fn is_expired(raw_token: &str) -> bool {
        Self::is_expired_at(raw_token, Utc::now())
    }

    /// [`TokenStore::is_expired`] against an explicit clock.
    #[must_use]
    pub fn is_expired_at(raw_token: &str, now: DateTime<Utc>) -> bool {
        match decode_expiry(raw_token) {
            Ok(Some(exp)) => exp <= now,
            Ok(None) => false,
            Err(reason) => {
                warn!(%reason, "Could not decode token expiry; treating as valid");
                false
            }
        }
    }

    /// Expiry instant encoded in `raw_token`, if one can be decoded.
    #[must_use]
    pub fn expiry_of(raw_token: &str) -> Option<DateTime<Utc>> {
        decode_expiry(raw_token).ok().flatten()
    }

    fn read_optional(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(v) => v.filter(|s| !s.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read credential field");
                None
            }
        }
    }
}

/// Decode the `exp` claim of a three-part signed token.
fn decode_expiry(raw_token: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let mut parts = raw_token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("token is not three dot-separated segments".into());
    };

    let bytes = URL_SAFE_LENIENT
        .decode(payload.trim_end_matches('=').as_bytes())
        .map_err(|e| format!("payload is not base64url: {e}"))?;
    let claims: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| format!("payload is not JSON: {e}"))?;

    let Some(exp) = claims.get("exp") else {
        return Ok(None);
    };
    let seconds = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f.floor() as i64))
        .ok_or_else(|| format!("exp claim is not numeric: {exp}"))?;

    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(Some)
        .ok_or_else(|| format!("exp claim out of range: {seconds}"))
}
