//! **Speech-to-Text (STT)**: turn a recorded `AudioPayload` into text.
//!
//! `Transcriber` walks an ordered list of `SttBackend`s and returns the first
//! success. The usual chain is the direct OpenAI-compatible call followed by the
//! server-mediated endpoint. An empty string is a valid result ("no speech").

use crate::audio::{AudioPayload, MAX_PAYLOAD_BYTES};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backend for converting an encoded payload to text.
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Return an empty string if nothing was said.
    async fn transcribe(&self, payload: &AudioPayload) -> VoiceResult<String>;
}

/// Direct OpenAI-compatible transcription (`/audio/transcriptions`, multipart).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    /// whisper-1 by default
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiStt {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

fn file_name_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/webm" => "recording.webm",
        "audio/ogg" => "recording.ogg",
        "audio/mpeg" | "audio/mp3" => "recording.mp3",
        "audio/mp4" | "audio/m4a" => "recording.m4a",
        _ => "recording.wav",
    }
}

#[async_trait]
impl SttBackend for OpenAiStt {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, payload: &AudioPayload) -> VoiceResult<String> {
        if self.api_key.trim().is_empty() {
            return Err(VoiceError::Stt("OpenAI API key is not configured".to_string()));
        }
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(VoiceError::Stt(format!(
                "Audio file too large ({:.1}MB). Maximum size is 25MB.",
                payload.len() as f64 / (1024.0 * 1024.0)
            )));
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let part = reqwest::multipart::Part::bytes(payload.bytes.clone())
            .file_name(file_name_for(&payload.mime_type))
            .mime_str(&payload.mime_type)
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json")
            .text("temperature", "0");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }

        let json: serde_json::Value = res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerSttRequest {
    audio_base64: String,
}

#[derive(Deserialize)]
struct ServerSttResponse {
    #[serde(default)]
    text: String,
}

/// Server-mediated transcription: POST `{audioBase64: <data URL>}`, response `{text}`.
#[derive(Debug, Clone)]
pub struct ServerStt {
    endpoint: String,
    client: reqwest::Client,
}

impl ServerStt {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SttBackend for ServerStt {
    fn name(&self) -> &str {
        "server"
    }

    async fn transcribe(&self, payload: &AudioPayload) -> VoiceResult<String> {
        let body = ServerSttRequest {
            audio_base64: payload.to_data_url(),
        };
        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!(
                "Server transcription error {}: {}",
                status, body
            )));
        }
        let parsed: ServerSttResponse =
            res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Ordered STT fallback chain.
pub struct Transcriber {
    backends: Vec<Arc<dyn SttBackend>>,
}

impl Transcriber {
    pub fn new(backends: Vec<Arc<dyn SttBackend>>) -> Self {
        Self { backends }
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// First successful backend wins; `TranscriptionFailed` if none succeeds.
    pub async fn transcribe(&self, payload: &AudioPayload) -> VoiceResult<String> {
        debug!(
            "Transcribing {} bytes of {} with {} backend(s)",
            payload.len(),
            payload.mime_type,
            self.backends.len()
        );

        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.transcribe(payload).await {
                Ok(text) => {
                    info!(
                        "📝 Transcribed via {} ({} chars)",
                        backend.name(),
                        text.chars().count()
                    );
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Transcription via {} failed: {}", backend.name(), e);
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        error!("All transcription methods failed");
        if failures.is_empty() {
            failures.push("no transcription backend configured".to_string());
        }
        Err(VoiceError::TranscriptionFailed(failures.join("; ")))
    }
}
