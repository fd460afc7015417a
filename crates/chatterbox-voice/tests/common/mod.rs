//! Scripted providers and devices shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chatterbox_voice::{
    AgentProvider, AgentRequest, AgentResult, AgentRouter, AudioChunk, AudioPayload, AudioSink,
    CaptureConstraints, GenerationProvider, InputStream, Microphone, NotificationSink,
    OrchestratorConfig, Severity, Speaker, SttBackend, Transcriber, TtsBackend, Voice,
    VoiceError, VoiceOrchestrator, VoiceResult, VoiceState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// -----------------------------------------------------------------------------
// Microphone
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicFailure {
    Denied,
    Missing,
    /// Acquisition succeeds but the stream refuses to start.
    StartDenied,
}

/// Delivers `samples` as one chunk on start; counts acquisitions and releases.
pub struct MockMicrophone {
    samples: Vec<f32>,
    failure: Option<MicFailure>,
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl MockMicrophone {
    pub fn with_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            failure: None,
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Half a second of a quiet tone at 16 kHz.
    pub fn speaking() -> Self {
        Self::with_samples((0..8000).map(|i| (i as f32 * 0.05).sin() * 0.2).collect())
    }

    pub fn silent_device() -> Self {
        Self::with_samples(Vec::new())
    }

    pub fn failing(failure: MicFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::speaking()
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Microphone for MockMicrophone {
    fn acquire(&self, _constraints: &CaptureConstraints) -> VoiceResult<Box<dyn InputStream>> {
        match self.failure {
            Some(MicFailure::Denied) => {
                return Err(VoiceError::PermissionDenied("Access denied".to_string()))
            }
            Some(MicFailure::Missing) => {
                return Err(VoiceError::DeviceNotFound("No input device".to_string()))
            }
            Some(MicFailure::StartDenied) | None => {}
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockInputStream {
            refuse_start: self.failure == Some(MicFailure::StartDenied),
            samples: self.samples.clone(),
            tx: None,
            released: Arc::clone(&self.released),
            done: false,
        }))
    }
}

struct MockInputStream {
    refuse_start: bool,
    samples: Vec<f32>,
    tx: Option<mpsc::UnboundedSender<AudioChunk>>,
    released: Arc<AtomicUsize>,
    done: bool,
}

impl InputStream for MockInputStream {
    fn start(
        &mut self,
        _timeslice: Duration,
        chunk_tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> VoiceResult<()> {
        if self.refuse_start {
            return Err(VoiceError::PermissionDenied("Stream start refused".to_string()));
        }
        if !self.samples.is_empty() {
            let _ = chunk_tx.send(AudioChunk::new(self.samples.clone()));
        }
        self.tx = Some(chunk_tx);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        16000
    }

    fn release(&mut self) {
        self.tx = None;
        if !self.done {
            self.done = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// -----------------------------------------------------------------------------
// Speech to text
// -----------------------------------------------------------------------------

/// Returns `text`, or fails when `text` is `None`. Counts calls.
pub struct MockStt {
    name: String,
    text: Option<String>,
    pub calls: AtomicUsize,
}

impl MockStt {
    pub fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: "mock".to_string(),
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            text: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SttBackend for MockStt {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, payload: &AudioPayload) -> VoiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!payload.is_empty());
        self.text
            .clone()
            .ok_or_else(|| VoiceError::Stt(format!("{} unavailable", self.name)))
    }
}

// -----------------------------------------------------------------------------
// Agents
// -----------------------------------------------------------------------------

/// Replays scripted results in order; records every request.
#[derive(Default)]
pub struct MockAgent {
    script: Mutex<VecDeque<VoiceResult<AgentResult>>>,
    pub requests: Mutex<Vec<AgentRequest>>,
    delay: Option<Duration>,
}

impl MockAgent {
    pub fn scripted(results: Vec<VoiceResult<AgentResult>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration, result: AgentResult) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::from(vec![Ok(result)])),
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentProvider for MockAgent {
    async fn complete(&self, request: &AgentRequest) -> VoiceResult<AgentResult> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VoiceError::Agent("script exhausted".to_string())))
    }
}

pub fn agent_success(reply: &str, session_id: &str, sequence_id: u64) -> AgentResult {
    AgentResult {
        success: true,
        agent_response: Some(reply.to_string()),
        session_id: Some(session_id.to_string()),
        sequence_id: Some(sequence_id),
        ..AgentResult::default()
    }
}

pub fn agent_failure(error: &str) -> AgentResult {
    AgentResult {
        success: false,
        error: Some(error.to_string()),
        ..AgentResult::default()
    }
}

/// Generation provider. Prompts that start with `summary_marker` are treated as
/// summary requests and answered with `summary` (or an error when `None`).
pub struct MockGeneration {
    reply: Option<String>,
    summary: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

const SUMMARY_MARKER: &str = "Please summarize the following message";

impl MockGeneration {
    pub fn new(reply: Option<&str>, summary: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            summary: summary.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::new(Some(reply), None)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts that were not summary requests.
    pub fn fallback_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| !p.starts_with(SUMMARY_MARKER))
            .collect()
    }
}

#[async_trait]
impl GenerationProvider for MockGeneration {
    async fn generate(&self, user_message: &str) -> VoiceResult<String> {
        self.prompts.lock().unwrap().push(user_message.to_string());
        let answer = if user_message.starts_with(SUMMARY_MARKER) {
            &self.summary
        } else {
            &self.reply
        };
        answer
            .clone()
            .ok_or_else(|| VoiceError::Agent("generation unavailable".to_string()))
    }
}

// -----------------------------------------------------------------------------
// Speech output
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct MockTts {
    pub requests: Mutex<Vec<(String, Voice)>>,
    fail: bool,
}

impl MockTts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<(String, Voice)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsBackend for MockTts {
    async fn synthesize(&self, text: &str, voice: Voice) -> VoiceResult<AudioPayload> {
        self.requests.lock().unwrap().push((text.to_string(), voice));
        if self.fail {
            return Err(VoiceError::Tts("quota exceeded".to_string()));
        }
        Ok(AudioPayload::new(vec![0xFF, 0xF3, 0x44, 0xC4], "audio/mpeg"))
    }
}

#[derive(Default)]
pub struct MockSink {
    pub played: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn play(&self, _payload: &AudioPayload) -> VoiceResult<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Notifications
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        self.notifications.lock().unwrap().push(Notification {
            title: title.to_string(),
            message: message.to_string(),
            severity,
        });
    }
}

// -----------------------------------------------------------------------------
// Harness
// -----------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<VoiceOrchestrator>,
    pub microphone: Arc<MockMicrophone>,
    pub stt: Vec<Arc<MockStt>>,
    pub agent: Arc<MockAgent>,
    pub generation: Arc<MockGeneration>,
    pub tts: Arc<MockTts>,
    pub sink: Arc<MockSink>,
    pub notifier: Arc<RecordingNotifier>,
}

pub struct HarnessBuilder {
    microphone: MockMicrophone,
    stt: Vec<Arc<MockStt>>,
    agent: Arc<MockAgent>,
    generation: Arc<MockGeneration>,
    tts: Arc<MockTts>,
    config: OrchestratorConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            microphone: MockMicrophone::speaking(),
            stt: vec![MockStt::returning("Hi")],
            agent: MockAgent::scripted(Vec::new()),
            generation: MockGeneration::replying("Fallback reply"),
            tts: MockTts::new(),
            config: OrchestratorConfig {
                welcome_message: None,
                ..OrchestratorConfig::default()
            },
        }
    }

    pub fn microphone(mut self, microphone: MockMicrophone) -> Self {
        self.microphone = microphone;
        self
    }

    pub fn stt(mut self, stt: Vec<Arc<MockStt>>) -> Self {
        self.stt = stt;
        self
    }

    pub fn agent(mut self, agent: Arc<MockAgent>) -> Self {
        self.agent = agent;
        self
    }

    pub fn generation(mut self, generation: Arc<MockGeneration>) -> Self {
        self.generation = generation;
        self
    }

    pub fn tts(mut self, tts: Arc<MockTts>) -> Self {
        self.tts = tts;
        self
    }

    pub fn speak_text_replies(mut self) -> Self {
        self.config.speak_text_replies = true;
        self
    }

    pub fn build(self) -> Harness {
        let microphone = Arc::new(self.microphone);
        let sink = MockSink::new();
        let notifier = RecordingNotifier::new();

        let transcriber = Transcriber::new(
            self.stt
                .iter()
                .map(|s| Arc::clone(s) as Arc<dyn SttBackend>)
                .collect(),
        );
        let router = AgentRouter::new(
            Some(Arc::clone(&self.agent) as Arc<dyn AgentProvider>),
            Arc::clone(&self.generation) as Arc<dyn GenerationProvider>,
            Duration::from_secs(60),
        );
        let speaker = Speaker::new(
            Arc::clone(&self.tts) as Arc<dyn TtsBackend>,
            Arc::clone(&sink) as Arc<dyn AudioSink>,
        )
        .with_summarizer(Arc::clone(&self.generation) as Arc<dyn GenerationProvider>);

        let orchestrator = VoiceOrchestrator::new(
            self.config,
            Arc::clone(&microphone) as Arc<dyn Microphone>,
            transcriber,
            router,
            speaker,
            Arc::clone(&notifier) as Arc<dyn NotificationSink>,
        );

        Harness {
            orchestrator,
            microphone,
            stt: self.stt,
            agent: self.agent,
            generation: self.generation,
            tts: self.tts,
            sink,
            notifier,
        }
    }
}

/// Wait until the orchestrator broadcasts `target`.
pub async fn wait_for_state(rx: &mut broadcast::Receiver<VoiceState>, target: VoiceState) {
    loop {
        match rx.recv().await {
            Ok(state) if state == target => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("state channel closed"),
        }
    }
}
