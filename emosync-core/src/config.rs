//! Configuration for the EMOSYNC distribution layer.
//!
//! Maps directly to `emosync.toml`. Every section is optional; missing
//! sections and keys take the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::policy::weather::WeatherKind;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmosyncConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Backend endpoint and timeouts.
    #[serde(default)]
    pub api: ApiConfig,
    /// Background polling.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Durable client state.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Combat mapping bounds.
    #[serde(default)]
    pub combat: CombatConfig,
    /// Weather mapping.
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Mood-map visualization.
    #[serde(default)]
    pub mood_map: MoodMapConfig,
}

impl EmosyncConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let c = &self.combat;
        if !(c.min_multiplier > 0.0 && c.min_multiplier <= 1.0 && c.max_multiplier >= 1.0) {
            return Err(CoreError::Config(format!(
                "combat multiplier bounds must satisfy 0 < min <= 1 <= max (got {}..{})",
                c.min_multiplier, c.max_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&c.max_crit_bonus) {
            return Err(CoreError::Config("combat.max_crit_bonus must be in [0, 1]".into()));
        }
        let w = &self.weather;
        if !(w.fast_transition_secs > 0.0
            && w.slow_transition_secs >= w.fast_transition_secs
            && w.slow_transition_secs.is_finite())
        {
            return Err(CoreError::Config(
                "weather transitions must satisfy 0 < fast <= slow < inf".into(),
            ));
        }
        if self.mood_map.capacity == 0 {
            return Err(CoreError::Config("mood_map.capacity must be positive".into()));
        }
        if self.polling.interval_secs == 0 {
            return Err(CoreError::Config("polling.interval_secs must be positive".into()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(CoreError::Config("api.base_url must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Backend endpoint and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the journal backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Bounded wait for the start-up health probe.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,
    /// Grace period before attempting auto-login.
    #[serde(default = "default_grace")]
    pub auto_login_grace_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            health_timeout_ms: default_health_timeout(),
            auto_login_grace_ms: default_grace(),
        }
    }
}

/// Background polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Whether the poller follows auth state automatically.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between polls.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Delay before the first poll after start.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval(),
            initial_delay_ms: default_initial_delay(),
        }
    }
}

/// Durable client-state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Enable WAL journaling.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 per value.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Combat mapping bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Lower clamp for attack/defense/speed multipliers.
    #[serde(default = "default_min_mult")]
    pub min_multiplier: f32,
    /// Upper clamp for attack/defense/speed multipliers.
    #[serde(default = "default_max_mult")]
    pub max_multiplier: f32,
    /// Upper clamp for the additive crit-chance bonus.
    #[serde(default = "default_max_crit")]
    pub max_crit_bonus: f32,
    /// Damage multiplier applied on a critical hit.
    #[serde(default = "default_crit_damage")]
    pub crit_damage_multiplier: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            min_multiplier: default_min_mult(),
            max_multiplier: default_max_mult(),
            max_crit_bonus: default_max_crit(),
            crit_damage_multiplier: default_crit_damage(),
        }
    }
}

/// Weather mapping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Transition length at intensity 1.0.
    #[serde(default = "default_fast_transition")]
    pub fast_transition_secs: f32,
    /// Transition length at intensity 0.0.
    #[serde(default = "default_slow_transition")]
    pub slow_transition_secs: f32,
    /// Weather kinds the renderer can show.
    #[serde(default = "default_supported_weather")]
    pub supported: Vec<WeatherKind>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            fast_transition_secs: default_fast_transition(),
            slow_transition_secs: default_slow_transition(),
            supported: default_supported_weather(),
        }
    }
}

/// Mood-map settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodMapConfig {
    /// Maximum plotted samples; older ones are dropped.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Detail overlay fade-in duration.
    #[serde(default = "default_fade_in")]
    pub fade_in_ms: u64,
    /// Detail overlay fade-out duration.
    #[serde(default = "default_fade_out")]
    pub fade_out_ms: u64,
    /// Idle time with no hover/pin before the overlay starts fading out.
    #[serde(default = "default_idle_delay")]
    pub idle_delay_ms: u64,
}

impl Default for MoodMapConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            fade_in_ms: default_fade_in(),
            fade_out_ms: default_fade_out(),
            idle_delay_ms: default_idle_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (used by serde)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_health_timeout() -> u64 {
    3_000
}
fn default_grace() -> u64 {
    500
}
fn default_interval() -> u64 {
    30
}
fn default_initial_delay() -> u64 {
    1_000
}
fn default_db_path() -> String {
    "emosync.db".to_string()
}
fn default_min_mult() -> f32 {
    0.5
}
fn default_max_mult() -> f32 {
    1.5
}
fn default_max_crit() -> f32 {
    0.25
}
fn default_crit_damage() -> f32 {
    1.5
}
fn default_fast_transition() -> f32 {
    2.0
}
fn default_slow_transition() -> f32 {
    10.0
}
fn default_supported_weather() -> Vec<WeatherKind> {
    WeatherKind::ALL.to_vec()
}
fn default_capacity() -> usize {
    500
}
fn default_fade_in() -> u64 {
    150
}
fn default_fade_out() -> u64 {
    300
}
fn default_idle_delay() -> u64 {
    400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EmosyncConfig::from_toml("").expect("parse");
        assert_eq!(config.polling.interval_secs, 30);
        assert_eq!(config.mood_map.capacity, 500);
        assert!((config.combat.max_multiplier - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.weather.supported.len(), WeatherKind::ALL.len());
    }

    #[test]
    fn partial_sections_are_merged() {
        let config = EmosyncConfig::from_toml(
            r#"
            [api]
            base_url = "https://journal.example"

            [weather]
            supported = ["clear", "rain"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.api.base_url, "https://journal.example");
        assert_eq!(config.api.health_timeout_ms, 3_000);
        assert_eq!(config.weather.supported, vec![WeatherKind::Clear, WeatherKind::Rain]);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let err = EmosyncConfig::from_toml("[combat]\nmin_multiplier = 1.2\n").expect_err("invalid");
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn infinite_transition_is_rejected() {
        assert!(EmosyncConfig::from_toml("[weather]\nslow_transition_secs = inf\n").is_err());
        assert!(EmosyncConfig::from_toml("[weather]\nfast_transition_secs = inf\nslow_transition_secs = inf\n").is_err());
        assert!(EmosyncConfig::from_toml("[weather]\nfast_transition_secs = nan\n").is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(EmosyncConfig::from_toml("[polling]\ninterval_secs = 0\n").is_err());
    }
}
