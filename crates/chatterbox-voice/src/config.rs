//! Settings for the agent and speech providers.
//!
//! Loaded once at startup and read-only afterwards. Precedence: environment
//! (`CHATTERBOX__SECTION__KEY`) > TOML file (`CHATTERBOX_CONFIG` path, else
//! `config/chatterbox.toml`) > defaults.
//!
//! | Section | Key | Default |
//! |---------|-----|---------|
//! | agent | endpoint | "" (primary agent disabled) |
//! | agent | timeout_secs | 60 |
//! | openai | base_url | https://api.openai.com/v1 |
//! | openai | chat_model / stt_model / tts_model | gpt-4o-mini / whisper-1 / tts-1 |
//! | speech | voice | alloy |
//! | speech | summarize | true |
//! | capture | timeslice_ms / max_duration_ms / max_payload_bytes | 100 / 30000 / 25 MiB |

use crate::audio::CaptureConfig;
use crate::error::VoiceResult;
use crate::voice_output::Voice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/chatterbox";

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hello! I'm glad to assist you today. How may I help you?";

fn default_agent_timeout_secs() -> u64 {
    60
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_welcome_message() -> Option<String> {
    Some(DEFAULT_WELCOME_MESSAGE.to_string())
}

/// Primary conversational agent endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// URL accepting `{userQuery, clientSessionId, clientSequenceId}`. Empty disables the primary agent.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// OpenAI-compatible API used for chat fallback, summarization, STT and TTS.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: String::new(),
            chat_model: default_chat_model(),
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
        }
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("chat_model", &self.chat_model)
            .field("stt_model", &self.stt_model)
            .field("tts_model", &self.tts_model)
            .finish()
    }
}

/// Speech input/output behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Server-mediated transcription endpoint (`{audioBase64}` → `{text}`), tried after the direct call.
    #[serde(default)]
    pub server_transcription_url: Option<String>,
    #[serde(default)]
    pub voice: Voice,
    /// Shorten replies into a speech-friendly form before synthesis.
    #[serde(default = "default_true")]
    pub summarize: bool,
    /// Also speak replies to typed messages.
    #[serde(default)]
    pub speak_text_replies: bool,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            server_transcription_url: None,
            voice: Voice::default(),
            summarize: true,
            speak_text_replies: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    #[serde(default = "default_welcome_message")]
    pub welcome_message: Option<String>,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            welcome_message: default_welcome_message(),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub conversation: ConversationSettings,
}

impl Settings {
    /// Load from file and environment. Path: env `CHATTERBOX_CONFIG` > `config/chatterbox.toml`.
    pub fn load() -> VoiceResult<Self> {
        let config_path =
            std::env::var("CHATTERBOX_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path. A missing file falls back to defaults + environment.
    pub fn load_from(path: &Path) -> VoiceResult<Self> {
        let builder = config::Config::builder();

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            // config::File resolves the extension itself when given a stem.
            builder.add_source(config::File::with_name(&path.to_string_lossy()).required(false))
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("CHATTERBOX")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = built.try_deserialize()?;
        Ok(settings)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    /// True when a primary agent endpoint is configured.
    pub fn agent_enabled(&self) -> bool {
        !self.agent.endpoint.trim().is_empty()
    }
}
