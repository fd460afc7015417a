//! Agent routing: primary conversational agent with session continuity, falling
//! back to a stateless generation provider.

use crate::error::{VoiceError, VoiceResult};
use crate::session::ConversationSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Request body for the primary agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub user_query: String,
    pub client_session_id: Option<String>,
    pub client_sequence_id: u64,
}

/// Primary agent response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub agent_response: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub sequence_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AgentResult {
    /// The reply, if this result counts as a success.
    pub fn reply(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.agent_response
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    /// `error`, else `message`, else a generic text.
    pub fn error_text(&self) -> String {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|text| !text.is_empty())
            .unwrap_or(UNKNOWN_ERROR)
            .to_string()
    }
}

/// Conversational agent that keeps context across requests.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn complete(&self, request: &AgentRequest) -> VoiceResult<AgentResult>;
}

/// Stateless text generation (fallback replies and speech summaries).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, user_message: &str) -> VoiceResult<String>;
}

/// Which provider produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedReply {
    pub text: String,
    pub source: ReplySource,
    /// Why the primary agent was skipped, for notification.
    pub primary_error: Option<String>,
}

/// Routes a user turn to the primary agent, or the fallback when it fails.
pub struct AgentRouter {
    primary: Option<Arc<dyn AgentProvider>>,
    secondary: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

impl AgentRouter {
    pub fn new(
        primary: Option<Arc<dyn AgentProvider>>,
        secondary: Arc<dyn GenerationProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            timeout,
        }
    }

    pub async fn route(
        &self,
        user_text: &str,
        session: &ConversationSession,
    ) -> VoiceResult<RoutedReply> {
        let primary_error = match &self.primary {
            Some(primary) => match self.call_primary(primary.as_ref(), user_text, session).await {
                Ok(text) => {
                    return Ok(RoutedReply {
                        text,
                        source: ReplySource::Primary,
                        primary_error: None,
                    })
                }
                Err(error) => {
                    // A failed turn never reuses a stale session.
                    session.reset();
                    warn!("Primary agent failed: {}", error);
                    Some(error)
                }
            },
            None => {
                session.reset();
                None
            }
        };

        info!("Falling back to secondary provider");
        match self.secondary.generate(user_text).await {
            Ok(text) if !text.trim().is_empty() => Ok(RoutedReply {
                text,
                source: ReplySource::Fallback,
                primary_error,
            }),
            Ok(_) => Err(VoiceError::AgentUnavailable(
                "Secondary provider returned an empty reply".to_string(),
            )),
            Err(e) => Err(VoiceError::AgentUnavailable(e.to_string())),
        }
    }

    /// Returns the reply text, or the error text to report.
    async fn call_primary(
        &self,
        primary: &dyn AgentProvider,
        user_text: &str,
        session: &ConversationSession,
    ) -> Result<String, String> {
        let snapshot = session.snapshot();
        let request = AgentRequest {
            user_query: user_text.to_string(),
            client_session_id: snapshot.session_id,
            client_sequence_id: snapshot.sequence_id,
        };
        debug!(
            "Sending to primary agent (session {:?}, sequence {})",
            request.client_session_id, request.client_sequence_id
        );

        let result = match tokio::time::timeout(self.timeout, primary.complete(&request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(format!(
                    "Agent did not respond within {}s",
                    self.timeout.as_secs()
                ))
            }
        };

        session.apply_result(&result);
        match result.reply() {
            Some(text) => Ok(text.to_string()),
            None if result.success => {
                session.reset();
                Err("Agent returned no response".to_string())
            }
            None => Err(result.error_text()),
        }
    }
}

// -----------------------------------------------------------------------------
// HTTP providers
// -----------------------------------------------------------------------------

/// Primary agent reached over HTTP with a JSON body.
pub struct HttpAgentProvider {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAgentProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AgentProvider for HttpAgentProvider {
    async fn complete(&self, request: &AgentRequest) -> VoiceResult<AgentResult> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Agent(format!("Agent API error {}: {}", status, body)));
        }

        let result: AgentResult = response.json().await?;
        Ok(result)
    }
}

// OpenAI-compatible chat completions
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client used for fallback replies and summaries.
pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            model: "gpt-4o-mini".to_string(),
            client,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    async fn generate(&self, user_message: &str) -> VoiceResult<String> {
        if self.api_key.is_empty() {
            return Err(VoiceError::Agent("OpenAI API key is not configured".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
            temperature: Some(0.7),
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Agent(format!("OpenAI API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = res.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| VoiceError::Agent("No response from OpenAI".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_result_uses_camel_case_wire_names() {
        let result: AgentResult = serde_json::from_str(
            r#"{"success":true,"agentResponse":"Hello","sessionId":"s1","sequenceId":2}"#,
        )
        .unwrap();
        assert_eq!(result.reply(), Some("Hello"));
        assert_eq!(result.session_id.as_deref(), Some("s1"));
        assert_eq!(result.sequence_id, Some(2));

        let request = AgentRequest {
            user_query: "Hi".to_string(),
            client_session_id: None,
            client_sequence_id: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["userQuery"], "Hi");
        assert_eq!(json["clientSequenceId"], 1);
        assert!(json["clientSessionId"].is_null());
    }

    #[test]
    fn error_text_prefers_error_then_message() {
        let both = AgentResult {
            error: Some("timeout".to_string()),
            message: Some("other".to_string()),
            ..AgentResult::default()
        };
        assert_eq!(both.error_text(), "timeout");

        let message_only = AgentResult {
            message: Some("quota".to_string()),
            ..AgentResult::default()
        };
        assert_eq!(message_only.error_text(), "quota");
        assert_eq!(AgentResult::default().error_text(), "Unknown error");
    }

    #[test]
    fn success_without_response_is_not_a_reply() {
        let result = AgentResult {
            success: true,
            agent_response: Some("  ".to_string()),
            ..AgentResult::default()
        };
        assert_eq!(result.reply(), None);
    }
}
