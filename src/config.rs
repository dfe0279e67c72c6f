//! # Configuration Management
//!
//! Loads and manages engine configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_CONNECTION_API_URL, APP_CONNECTION_AGENT_ID, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! Runtime updates arrive as partial JSON (the settings-update control
//! message) and are merged through [`AppConfig::update_from_json`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main engine configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub translation: TranslationConfig,
}

/// Connection settings for the pre-established event stream.
///
/// ## Fields:
/// - `api_url`: base URL of the streaming endpoint (ws:// or wss://)
/// - `api_key`: opaque credential appended to the stream URL
/// - `agent_id`: agent to open voice sessions against
/// - `ping_interval_secs`: client heartbeat interval on the WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub api_url: String,
    pub api_key: String,
    pub agent_id: String,
    pub ping_interval_secs: u64,
}

impl ConnectionConfig {
    /// Build the full stream URL with the API key as a query parameter.
    pub fn stream_url(&self) -> String {
        format!("{}/stream/?api_key={}", self.api_url, self.api_key)
    }
}

/// Capture-side audio settings.
///
/// ## Chunking policy:
/// The voice profile emits when at least `voice_min_chunk_ms` of audio is
/// buffered and that much wall time has passed, with `voice_max_chunk_ms` as
/// a hard emission cap. The translation profile has the min condition only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sample rate the capture device delivers samples at
    pub device_sample_rate: u32,

    /// Sample rate audio is resampled to before transmission
    pub transmit_sample_rate: u32,

    /// Minimum buffered duration before a voice chunk is emitted (ms)
    pub voice_min_chunk_ms: u64,

    /// Hard cap on the time between voice chunk emissions (ms)
    pub voice_max_chunk_ms: u64,

    /// Minimum buffered duration before a translation chunk is emitted (ms)
    pub translation_min_chunk_ms: u64,
}

/// Playback-side audio settings.
///
/// ## Fields:
/// - `voice_sample_rate`: rate assumed for raw PCM on the voice channel (24 kHz)
/// - `translation_sample_rate`: rate assumed for raw PCM on the translation channel (16 kHz)
/// - `min_payload_bytes` / `min_duration_ms`: guards against corrupted or
///   inaudibly short items; failing items are skipped, not fatal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub voice_sample_rate: u32,
    pub translation_sample_rate: u32,
    pub min_payload_bytes: usize,
    pub min_duration_ms: u64,
}

/// Settings for translation sessions, sent with the settings-update message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub language_a: String,
    pub language_b: String,
    pub context: Option<String>,
    pub enable_tts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                api_url: "ws://127.0.0.1:8080".to_string(),
                api_key: String::new(),
                agent_id: String::new(),
                ping_interval_secs: 120,
            },
            capture: CaptureConfig {
                device_sample_rate: 48000,
                transmit_sample_rate: 16000,
                voice_min_chunk_ms: 1000,
                voice_max_chunk_ms: 2000,
                translation_min_chunk_ms: 500,
            },
            playback: PlaybackConfig {
                voice_sample_rate: 24000,
                translation_sample_rate: 16000,
                min_payload_bytes: 100,
                min_duration_ms: 10,
            },
            translation: TranslationConfig {
                language_a: "en".to_string(),
                language_b: "es".to_string(),
                context: None,
                enable_tts: true,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for API_URL and API_KEY environment variables
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Bare API_URL / API_KEY / AGENT_ID are commonly set by deployment
        // environments without the APP_ prefix convention
        if let Ok(url) = env::var("API_URL") {
            settings = settings.set_override("connection.api_url", url)?;
        }
        if let Ok(key) = env::var("API_KEY") {
            settings = settings.set_override("connection.api_key", key)?;
        }
        if let Ok(agent) = env::var("AGENT_ID") {
            settings = settings.set_override("connection.agent_id", agent)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Sample rates are non-zero (zero rates make every duration infinite)
    /// - Voice max chunk duration is not below the min duration
    /// - Playback guards are non-zero
    /// - Heartbeat interval is non-zero
    pub fn validate(&self) -> Result<()> {
        if self.capture.device_sample_rate == 0 || self.capture.transmit_sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be greater than 0"));
        }

        if self.capture.voice_min_chunk_ms == 0 || self.capture.translation_min_chunk_ms == 0 {
            return Err(anyhow::anyhow!("Chunk durations must be greater than 0"));
        }

        if self.capture.voice_max_chunk_ms < self.capture.voice_min_chunk_ms {
            return Err(anyhow::anyhow!(
                "Voice max chunk duration ({}) must not be below the min duration ({})",
                self.capture.voice_max_chunk_ms,
                self.capture.voice_min_chunk_ms
            ));
        }

        if self.playback.voice_sample_rate == 0 || self.playback.translation_sample_rate == 0 {
            return Err(anyhow::anyhow!("Playback sample rates must be greater than 0"));
        }

        if self.playback.min_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Minimum payload size must be greater than 0"));
        }

        if self.connection.ping_interval_secs == 0 {
            return Err(anyhow::anyhow!("Ping interval must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a partial JSON document.
    ///
    /// This backs the runtime settings-update message: only the fields that
    /// are present in the JSON are changed, and the result is re-validated.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(translation) = partial_config.get("translation") {
            if let Some(lang) = translation.get("language_a").and_then(|v| v.as_str()) {
                self.translation.language_a = lang.to_string();
            }
            if let Some(lang) = translation.get("language_b").and_then(|v| v.as_str()) {
                self.translation.language_b = lang.to_string();
            }
            if let Some(context) = translation.get("context").and_then(|v| v.as_str()) {
                self.translation.context = Some(context.to_string());
            }
            if let Some(tts) = translation.get("enable_tts").and_then(|v| v.as_bool()) {
                self.translation.enable_tts = tts;
            }
        }

        if let Some(capture) = partial_config.get("capture") {
            if let Some(min) = capture.get("voice_min_chunk_ms").and_then(|v| v.as_u64()) {
                self.capture.voice_min_chunk_ms = min;
            }
            if let Some(max) = capture.get("voice_max_chunk_ms").and_then(|v| v.as_u64()) {
                self.capture.voice_max_chunk_ms = max;
            }
            if let Some(min) = capture
                .get("translation_min_chunk_ms")
                .and_then(|v| v.as_u64())
            {
                self.capture.translation_min_chunk_ms = min;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.capture.transmit_sample_rate, 16000);
        assert_eq!(config.capture.voice_min_chunk_ms, 1000);
        assert_eq!(config.capture.voice_max_chunk_ms, 2000);
        assert_eq!(config.capture.translation_min_chunk_ms, 500);
        assert_eq!(config.playback.voice_sample_rate, 24000);
        assert_eq!(config.playback.translation_sample_rate, 16000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.capture.voice_max_chunk_ms = 500; // below the min duration
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.device_sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"translation": {"language_b": "fr", "enable_tts": false}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.translation.language_b, "fr");
        assert!(!config.translation.enable_tts);
        // Untouched fields keep their values
        assert_eq!(config.translation.language_a, "en");
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"capture": {"voice_max_chunk_ms": 100}}"#;
        // 100ms cap is below the 1000ms min and must fail validation
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_stream_url() {
        let mut config = AppConfig::default();
        config.connection.api_url = "wss://api.example.com".to_string();
        config.connection.api_key = "secret".to_string();
        assert_eq!(
            config.connection.stream_url(),
            "wss://api.example.com/stream/?api_key=secret"
        );
    }
}
