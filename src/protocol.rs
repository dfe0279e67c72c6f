//! # Outbound Control Messages
//!
//! JSON messages the engine sends upstream, tagged on the `event` field.
//! Wire names follow each message family's protocol: the voice/translation
//! family uses upper-case event names, the chat control verbs are lower-case.
//!
//! ## Message Inventory:
//! - Session lifecycle: `VOICE_SESSION_START`, `VOICE_SESSION_END`,
//!   `TRANSLATION_SESSION_START`, `TRANSLATION_SETTINGS_UPDATE`,
//!   `TRANSLATION_SESSION_END`
//! - Audio input: `VOICE_INPUT_AUDIO`, `TRANSLATION_AUDIO_STREAM`
//! - Chat control: `chat`, `cancel`, `interrupt_resume`
//! - Heartbeat: `PING`, `PONG`

use serde::{Deserialize, Serialize};

/// Control messages sent from the engine to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundMessage {
    /// Open a voice conversation session against an agent
    #[serde(rename = "VOICE_SESSION_START")]
    VoiceSessionStart {
        agent_id: String,
        voice_config: VoiceConfig,
        preferences: Preferences,
    },

    /// End the active voice session
    #[serde(rename = "VOICE_SESSION_END")]
    VoiceSessionEnd { session_id: String },

    /// One captured voice chunk (base64 PCM16 at `sample_rate`)
    #[serde(rename = "VOICE_INPUT_AUDIO")]
    VoiceInputAudio {
        session_id: String,
        audio_data: String,
        format: String,
        sample_rate: u32,
    },

    /// Ask the server to create a translation session
    #[serde(rename = "TRANSLATION_SESSION_START")]
    TranslationSessionStart {
        language_a: String,
        language_b: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        enable_tts: bool,
    },

    /// Update settings for an existing translation session
    #[serde(rename = "TRANSLATION_SETTINGS_UPDATE")]
    TranslationSettingsUpdate {
        session_id: String,
        language_a: String,
        language_b: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        enable_tts: bool,
    },

    /// One captured translation chunk (base64 PCM16)
    #[serde(rename = "TRANSLATION_AUDIO_STREAM")]
    TranslationAudioStream {
        session_id: String,
        audio_data: String,
    },

    /// End the active translation session
    #[serde(rename = "TRANSLATION_SESSION_END")]
    TranslationSessionEnd { session_id: String },

    /// Send a user chat message
    #[serde(rename = "chat")]
    Chat { content: String },

    /// Cancel the in-flight generation
    #[serde(rename = "cancel")]
    Cancel,

    /// Resume an approval interrupt with per-tool decisions
    #[serde(rename = "interrupt_resume")]
    InterruptResume { decisions: Vec<ApprovalDecision> },

    /// Heartbeat request
    #[serde(rename = "PING")]
    Ping,

    /// Heartbeat response
    #[serde(rename = "PONG")]
    Pong,
}

/// Per-tool decision answering a human-approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub name: String,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Voice session configuration sent at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub interaction_mode: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            interaction_mode: "conversation".to_string(),
        }
    }
}

/// User preferences sent at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub language: String,
    pub voice_settings: VoiceSettings,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            voice_settings: VoiceSettings::default(),
        }
    }
}

/// Synthesis tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub speed: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}
