//! Voice Orchestrator - runs voice and text turns end to end.
//!
//! One turn at a time: a compare-and-set on `VoiceState` admits a turn only from
//! `Idle`. Every failure is reported through the notification sink and leaves the
//! orchestrator back in `Idle`.

use crate::agent::{
    AgentProvider, AgentRouter, GenerationProvider, HttpAgentProvider, OpenAiChat, ReplySource,
};
use crate::audio::{AudioCapture, CaptureConfig, CpalMicrophone, Microphone};
use crate::config::Settings;
use crate::error::{VoiceError, VoiceResult};
use crate::notify::{NotificationSink, Severity, TracingNotifier};
use crate::session::{ConversationSession, Message, SessionSnapshot};
use crate::stt::{OpenAiStt, ServerStt, SttBackend, Transcriber};
use crate::voice_output::{OpenAiTts, RodioSink, Speaker, Voice};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Shown in place of the user's message when transcription fails.
pub const TRANSCRIPTION_APOLOGY: &str =
    "Sorry, there was an error processing your audio. Please try again.";

/// Shown in place of the user's message when nothing was said.
pub const NO_SPEECH_TEXT: &str = "(No speech detected)";

/// User message shown while a recording is transcribed.
pub const PENDING_TRANSCRIPT: &str = "...";

const STATE_CHANNEL_CAPACITY: usize = 64;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    Idle,
    Initializing,
    Listening,
    Processing,
    Routing,
    Speaking,
    Error,
}

impl VoiceState {
    /// Status line text.
    pub fn status_text(&self) -> &'static str {
        match self {
            VoiceState::Idle => "Ready",
            VoiceState::Initializing => "Initializing microphone...",
            VoiceState::Listening => "Listening",
            VoiceState::Processing => "Processing",
            VoiceState::Routing => "Thinking",
            VoiceState::Speaking => "Speaking",
            VoiceState::Error => "Error",
        }
    }

    /// Status light class; empty when idle.
    pub fn status_class(&self) -> &'static str {
        match self {
            VoiceState::Idle => "",
            VoiceState::Initializing | VoiceState::Processing | VoiceState::Routing => "processing",
            VoiceState::Listening => "listening",
            VoiceState::Speaking => "speaking",
            VoiceState::Error => "error",
        }
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Not admitted (wrong state or blank input).
    Ignored,
    NoSpeech,
    Replied(ReplySource),
    Failed(String),
}

/// Configuration for the voice orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub capture: CaptureConfig,
    pub voice: Voice,
    /// Speak replies to typed messages too.
    pub speak_text_replies: bool,
    pub welcome_message: Option<String>,
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            capture: settings.capture.clone(),
            voice: settings.speech.voice,
            speak_text_replies: settings.speech.speak_text_replies,
            welcome_message: settings.conversation.welcome_message.clone(),
        }
    }
}

/// Runs conversation turns over capture, transcription, routing and speech.
pub struct VoiceOrchestrator {
    capture: tokio::sync::Mutex<AudioCapture>,
    transcriber: Transcriber,
    router: AgentRouter,
    speaker: Speaker,
    notifier: Arc<dyn NotificationSink>,
    session: ConversationSession,
    state: Mutex<VoiceState>,
    state_tx: broadcast::Sender<VoiceState>,
    voice: Mutex<Voice>,
    speak_text_replies: bool,
}

impl VoiceOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        microphone: Arc<dyn Microphone>,
        transcriber: Transcriber,
        router: AgentRouter,
        speaker: Speaker,
        notifier: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let session = match config.welcome_message.as_deref() {
            Some(welcome) => ConversationSession::with_welcome(welcome),
            None => ConversationSession::new(),
        };
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);

        info!("🎭 Voice Orchestrator ready (voice: {})", config.voice);
        Arc::new(Self {
            capture: tokio::sync::Mutex::new(AudioCapture::new(config.capture, microphone)),
            transcriber,
            router,
            speaker,
            notifier,
            session,
            state: Mutex::new(VoiceState::Idle),
            state_tx,
            voice: Mutex::new(config.voice),
            speak_text_replies: config.speak_text_replies,
        })
    }

    /// Wire the HTTP providers, the default microphone and the default output device.
    pub fn from_settings(settings: &Settings) -> VoiceResult<Arc<Self>> {
        let openai = &settings.openai;

        let chat: Arc<dyn GenerationProvider> = Arc::new(
            OpenAiChat::new(openai.base_url.clone(), openai.api_key.clone())
                .with_model(&openai.chat_model),
        );
        let primary: Option<Arc<dyn AgentProvider>> = if settings.agent_enabled() {
            Some(Arc::new(HttpAgentProvider::new(
                settings.agent.endpoint.clone(),
                settings.agent.api_key.clone(),
            )))
        } else {
            warn!("No agent endpoint configured; replies come from the fallback provider");
            None
        };
        let router = AgentRouter::new(primary, Arc::clone(&chat), settings.agent_timeout());

        let mut backends: Vec<Arc<dyn SttBackend>> = vec![Arc::new(OpenAiStt::new(
            openai.base_url.clone(),
            openai.api_key.clone(),
            openai.stt_model.clone(),
        )?)];
        if let Some(url) = settings
            .speech
            .server_transcription_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            backends.push(Arc::new(ServerStt::new(url)));
        }

        let tts = OpenAiTts::new(
            openai.base_url.clone(),
            openai.api_key.clone(),
            openai.tts_model.clone(),
        )?;
        let mut speaker = Speaker::new(Arc::new(tts), Arc::new(RodioSink::new()));
        if settings.speech.summarize {
            speaker = speaker.with_summarizer(chat);
        }

        Ok(Self::new(
            OrchestratorConfig::from(settings),
            Arc::new(CpalMicrophone::new()),
            Transcriber::new(backends),
            router,
            speaker,
            Arc::new(TracingNotifier),
        ))
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> VoiceState {
        *self.lock_state()
    }

    /// Every transition, in order.
    pub fn subscribe_state(&self) -> broadcast::Receiver<VoiceState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: VoiceState) {
        let mut state = self.lock_state();
        if *state != next {
            debug!("State {:?} -> {:?}", *state, next);
            *state = next;
            let _ = self.state_tx.send(next);
        }
    }

    /// Move `from → to` only if currently in `from`.
    fn try_transition(&self, from: VoiceState, to: VoiceState) -> bool {
        let mut state = self.lock_state();
        if *state != from {
            return false;
        }
        debug!("State {:?} -> {:?}", from, to);
        *state = to;
        let _ = self.state_tx.send(to);
        true
    }

    fn fail(&self, title: &str, message: &str) -> TurnOutcome {
        error!("{}: {}", title, message);
        self.notifier.notify(title, message, Severity::Error);
        self.set_state(VoiceState::Error);
        self.set_state(VoiceState::Idle);
        TurnOutcome::Failed(message.to_string())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn voice(&self) -> Voice {
        *self.voice.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_voice(&self, voice: Voice) {
        *self.voice.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = voice;
        info!("Voice set to {}", voice);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.session.messages()
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    // -------------------------------------------------------------------------
    // Voice turn
    // -------------------------------------------------------------------------

    /// Acquire the microphone and start recording. `false` if not admitted or the
    /// device could not be opened.
    pub async fn start_recording(self: &Arc<Self>) -> bool {
        if !self.try_transition(VoiceState::Idle, VoiceState::Initializing) {
            debug!("start_recording ignored in state {:?}", self.state());
            return false;
        }

        let mut capture = self.capture.lock().await;
        if let Err(e) = capture.acquire().await {
            drop(capture);
            self.fail("Recording Error", &recording_error_message(&e));
            return false;
        }

        // A stopped or dropped orchestrator turns a late timer into a no-op.
        let weak = Arc::downgrade(self);
        let on_timeout = async move {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.stop_recording().await;
            }
        };
        if let Err(e) = capture.start(on_timeout).await {
            drop(capture);
            self.fail("Recording Error", &recording_error_message(&e));
            return false;
        }

        // A shutdown that ran meanwhile already moved the state back to Idle.
        if !self.try_transition(VoiceState::Initializing, VoiceState::Listening) {
            capture.release();
            return false;
        }
        true
    }

    /// Stop recording and run the rest of the voice turn.
    pub async fn stop_recording(&self) -> TurnOutcome {
        if !self.try_transition(VoiceState::Listening, VoiceState::Processing) {
            debug!("stop_recording ignored in state {:?}", self.state());
            return TurnOutcome::Ignored;
        }

        let payload = {
            let mut capture = self.capture.lock().await;
            capture.stop().await
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                return self.fail("Processing Error", &format!("Failed to process recording: {}", e))
            }
        };

        self.session.append_message(Message::user(PENDING_TRANSCRIPT));

        let transcript = match self.transcriber.transcribe(&payload).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("{}", e);
                self.session.replace_last_user_message(TRANSCRIPTION_APOLOGY);
                return self.fail(
                    "Audio Processing Error",
                    "There was an error processing your audio. Please try again with a shorter message or check your microphone setup.",
                );
            }
        };

        if transcript.is_empty() {
            info!("No speech detected");
            self.session.replace_last_user_message(NO_SPEECH_TEXT);
            self.set_state(VoiceState::Idle);
            return TurnOutcome::NoSpeech;
        }

        self.session.replace_last_user_message(&transcript);
        self.respond(&transcript, true, "Failed to process recording").await
    }

    // -------------------------------------------------------------------------
    // Text turn
    // -------------------------------------------------------------------------

    pub async fn send_message(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }
        if !self.try_transition(VoiceState::Idle, VoiceState::Routing) {
            debug!("send_message ignored in state {:?}", self.state());
            return TurnOutcome::Ignored;
        }

        self.session.append_message(Message::user(text));
        self.respond(text, self.speak_text_replies, "Failed to process message")
            .await
    }

    /// Route `text`, append the reply and optionally speak it.
    async fn respond(&self, text: &str, speak: bool, failure_prefix: &str) -> TurnOutcome {
        self.set_state(VoiceState::Routing);

        let typing = self.session.insert_typing_placeholder();
        let routed = self.router.route(text, &self.session).await;
        self.session.remove_typing_placeholder(typing);

        let reply = match routed {
            Ok(reply) => reply,
            Err(e) => return self.fail("Processing Error", &format!("{}: {}", failure_prefix, e)),
        };

        if let Some(primary_error) = &reply.primary_error {
            self.notifier
                .notify("Agent Error", primary_error, Severity::Error);
        }
        self.session.append_assistant_message(&reply.text);

        if speak {
            self.set_state(VoiceState::Speaking);
            if let Err(e) = self.speaker.speak(&reply.text, self.voice()).await {
                error!("Text-to-Speech error: {}", e);
                self.notifier.notify(
                    "Text-to-Speech Error",
                    "Could not convert response to speech.",
                    Severity::Warning,
                );
                self.set_state(VoiceState::Error);
            }
        }

        self.set_state(VoiceState::Idle);
        TurnOutcome::Replied(reply.source)
    }

    /// Abandon any recording and release the microphone. A text or voice turn
    /// already past recording is left to finish on its own.
    pub async fn shutdown(&self) {
        self.capture.lock().await.release();
        if !self.try_transition(VoiceState::Listening, VoiceState::Idle) {
            self.try_transition(VoiceState::Initializing, VoiceState::Idle);
        }
        info!("Voice Orchestrator shut down");
    }
}

fn recording_error_message(error: &VoiceError) -> String {
    match error {
        VoiceError::PermissionDenied(_) => "Microphone access denied. Please check your system \
            permissions and make sure microphone access is allowed for this application."
            .to_string(),
        VoiceError::DeviceNotFound(_) => {
            "No microphone found. Please connect a microphone and try again.".to_string()
        }
        other => format!("Failed to start recording: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_projections() {
        assert_eq!(VoiceState::Idle.status_text(), "Ready");
        assert_eq!(VoiceState::Idle.status_class(), "");
        assert_eq!(VoiceState::Initializing.status_text(), "Initializing microphone...");
        assert_eq!(VoiceState::Routing.status_text(), "Thinking");
        assert_eq!(VoiceState::Listening.status_class(), "listening");
        assert_eq!(VoiceState::Speaking.status_class(), "speaking");
        assert_eq!(VoiceState::Error.to_string(), "Error");
    }

    #[test]
    fn recording_errors_get_specific_guidance() {
        let denied = recording_error_message(&VoiceError::PermissionDenied("x".into()));
        assert!(denied.starts_with("Microphone access denied"));
        let missing = recording_error_message(&VoiceError::DeviceNotFound("x".into()));
        assert!(missing.starts_with("No microphone found"));
    }
}
