//! # Chatterbox Voice - voice and chat conversation orchestration
//!
//! Captures speech or typed text, transcribes it, routes it to a primary
//! conversational agent with a stateless fallback provider, keeps the dialogue
//! history and speaks replies back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Voice Orchestrator                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │   Audio In   │→ │ Transcriber  │→ │      Agent Router      │  │
//! │  │    (cpal)    │  │ (direct →    │  │ (primary agent →       │  │
//! │  │  30s limit   │  │  server)     │  │  fallback generation)  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! │                                                  ↓               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │  Audio Out   │← │   Speaker    │← │  Conversation Session  │  │
//! │  │   (rodio)    │  │ (summarize,  │  │ (session ids, history, │  │
//! │  │              │  │  synthesize) │  │  typing placeholder)   │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod markup;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod stt;
pub mod voice_output;

pub use agent::{
    AgentProvider, AgentRequest, AgentResult, AgentRouter, GenerationProvider, HttpAgentProvider,
    OpenAiChat, ReplySource, RoutedReply,
};
pub use audio::{
    AudioCapture, AudioChunk, AudioPayload, CaptureConfig, CaptureConstraints, CpalMicrophone,
    InputStream, Microphone, RecordingState,
};
pub use config::Settings;
pub use error::{VoiceError, VoiceResult};
pub use markup::render_links;
pub use notify::{NotificationSink, Severity, TracingNotifier};
pub use orchestrator::{OrchestratorConfig, TurnOutcome, VoiceOrchestrator, VoiceState};
pub use session::{ConversationSession, Message, Sender, SessionSnapshot};
pub use stt::{OpenAiStt, ServerStt, SttBackend, Transcriber};
pub use voice_output::{AudioSink, OpenAiTts, RodioSink, Speaker, TtsBackend, Voice};
