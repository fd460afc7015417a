//! Error types for the Chatterbox voice system

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while running a conversation turn
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No microphone found: {0}")]
    DeviceNotFound(String),

    #[error("No audio data captured")]
    NoAudioCaptured,

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Audio playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::AudioDevice(format!("WAV encoding failed: {}", err))
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                VoiceError::DeviceNotFound(err.to_string())
            }
            other => classify_backend_error(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => VoiceError::DeviceNotFound(err.to_string()),
            other => classify_backend_error(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => VoiceError::DeviceNotFound(err.to_string()),
            other => classify_backend_error(other.to_string()),
        }
    }
}

/// Backends report access refusals as free-form text.
fn classify_backend_error(message: String) -> VoiceError {
    let lower = message.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("not allowed") {
        VoiceError::PermissionDenied(message)
    } else {
        VoiceError::AudioDevice(message)
    }
}
