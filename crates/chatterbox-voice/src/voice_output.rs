//! **Speaker**: summarize a reply for speech, synthesize it and play it back.
//!
//! Summarization is best effort. Synthesis goes through `TtsBackend` and playback
//! through `AudioSink`; `RodioSink` plays on the default output device.

use crate::agent::GenerationProvider;
use crate::audio::AudioPayload;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SUMMARY_PROMPT: &str = "Please summarize the following message in one clear and natural response \
that would sound appropriate if spoken aloud by a voice assistant. The summary should be conversational \
and helpful. Do not include URLs, IDs, or overly technical details unless absolutely necessary. \
DO NOT ADD OR MODIFY ANY INFORMATION GIVEN!! Here is the message to summarize: ";

/// MIME type assumed when the TTS response does not name one.
const DEFAULT_TTS_MIME: &str = "audio/mpeg";

/// Synthesis voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| VoiceError::Config(format!("Unknown voice: {}", s)))
    }
}

/// Text to encoded audio.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> VoiceResult<AudioPayload>;
}

/// Plays encoded audio; resolves when playback has finished.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, payload: &AudioPayload) -> VoiceResult<()>;
}

/// OpenAI-compatible TTS (`/audio/speech`).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    /// tts-1 (fast) or tts-1-hd
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TtsBackend for OpenAiTts {
    async fn synthesize(&self, text: &str, voice: Voice) -> VoiceResult<AudioPayload> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Tts("Nothing to synthesize".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(VoiceError::Tts("OpenAI API key is not configured".to_string()));
        }

        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice.as_str(),
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }

        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| DEFAULT_TTS_MIME.to_string());
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(AudioPayload::new(bytes.to_vec(), mime_type))
    }
}

/// Default output device through rodio.
///
/// `OutputStream` is not `Send`, so each playback opens the device inside a
/// blocking task and holds it until the sink drains.
#[derive(Debug, Default, Clone)]
pub struct RodioSink;

impl RodioSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, payload: &AudioPayload) -> VoiceResult<()> {
        let bytes = payload.bytes.clone();
        tokio::task::spawn_blocking(move || -> VoiceResult<()> {
            let (_stream, handle) = OutputStream::try_default()
                .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
            let sink =
                Sink::try_new(&handle).map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
            let source = Decoder::new(Cursor::new(bytes))
                .map_err(|e| VoiceError::PlaybackFailed(format!("Decode failed: {}", e)))?;
            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        })
        .await
        .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?
    }
}

/// Reject payloads that cannot be audio before handing them to a sink.
pub fn validate_payload(payload: &AudioPayload) -> VoiceResult<()> {
    if payload.is_empty() {
        return Err(VoiceError::PlaybackFailed("Empty audio data".to_string()));
    }
    if !payload.mime_type.starts_with("audio/") {
        return Err(VoiceError::PlaybackFailed(format!(
            "Invalid audio data format: {}",
            payload.mime_type
        )));
    }
    Ok(())
}

/// Summarize, synthesize and play replies.
pub struct Speaker {
    summarizer: Option<Arc<dyn GenerationProvider>>,
    tts: Arc<dyn TtsBackend>,
    sink: Arc<dyn AudioSink>,
}

impl Speaker {
    pub fn new(tts: Arc<dyn TtsBackend>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            summarizer: None,
            tts,
            sink,
        }
    }

    /// Shorten replies through `summarizer` before synthesis.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn GenerationProvider>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Text that will actually be spoken for `text`. Never fails.
    pub async fn speech_text(&self, text: &str) -> String {
        let Some(summarizer) = &self.summarizer else {
            return text.to_string();
        };
        match self.summarize(summarizer.as_ref(), text).await {
            Ok(summary) => {
                debug!("Using summarized speech ({} chars)", summary.chars().count());
                summary
            }
            Err(e) => {
                warn!("{}; falling back to full response", e);
                text.to_string()
            }
        }
    }

    async fn summarize(&self, summarizer: &dyn GenerationProvider, text: &str) -> VoiceResult<String> {
        let prompt = format!("{}{}", SUMMARY_PROMPT, text);
        let summary = summarizer
            .generate(&prompt)
            .await
            .map_err(|e| VoiceError::SummarizationFailed(e.to_string()))?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(VoiceError::SummarizationFailed(
                "empty summary".to_string(),
            ));
        }
        Ok(summary.to_string())
    }

    /// Speak `text`; resolves once playback has ended.
    pub async fn speak(&self, text: &str, voice: Voice) -> VoiceResult<()> {
        let spoken = self.speech_text(text).await;
        let preview: String = spoken.chars().take(100).collect();
        info!("🔊 Sending text to TTS ({}): {}...", voice, preview);

        let payload = self
            .tts
            .synthesize(&spoken, voice)
            .await
            .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
        validate_payload(&payload)?;
        debug!("TTS response received: {} bytes, {}", payload.len(), payload.mime_type);

        self.sink.play(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_parses_and_displays_lowercase() {
        assert_eq!("Nova".parse::<Voice>().unwrap(), Voice::Nova);
        assert_eq!(Voice::Shimmer.to_string(), "shimmer");
        assert!("robot".parse::<Voice>().is_err());
        assert_eq!(serde_json::to_string(&Voice::Onyx).unwrap(), "\"onyx\"");
    }

    #[test]
    fn payload_validation() {
        assert!(validate_payload(&AudioPayload::new(vec![1], "audio/mpeg")).is_ok());
        assert!(matches!(
            validate_payload(&AudioPayload::new(Vec::new(), "audio/mpeg")),
            Err(VoiceError::PlaybackFailed(_))
        ));
        assert!(matches!(
            validate_payload(&AudioPayload::new(vec![1], "text/html")),
            Err(VoiceError::PlaybackFailed(_))
        ));
    }

    #[test]
    fn summary_prompt_forbids_new_information() {
        assert!(SUMMARY_PROMPT.contains("DO NOT ADD OR MODIFY ANY INFORMATION GIVEN!!"));
        assert!(SUMMARY_PROMPT.ends_with("Here is the message to summarize: "));
    }
}
