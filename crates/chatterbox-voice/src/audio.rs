//! Microphone capture: acquisition, time-sliced recording and payload encoding.
//!
//! `AudioCapture` owns the recording lifecycle (`Idle → Acquiring → Listening →
//! Processing → Idle`). The platform side sits behind `Microphone` / `InputStream`;
//! `CpalMicrophone` is the bare-metal default. Captured chunks stay in memory only
//! for the current recording and are encoded to a 16-bit mono WAV payload at stop.

use crate::error::{VoiceError, VoiceResult};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Cursor;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time slice between delivered chunks.
pub const DEFAULT_TIMESLICE_MS: u64 = 100;

/// Recordings are stopped automatically after this long.
pub const DEFAULT_MAX_DURATION_MS: u64 = 30_000;

/// Upper payload size accepted by the transcription API (25 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;

/// How long to wait for in-flight chunks after the device has been released.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

pub const WAV_MIME_TYPE: &str = "audio/wav";

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_timeslice_ms() -> u64 {
    DEFAULT_TIMESLICE_MS
}

fn default_max_duration_ms() -> u64 {
    DEFAULT_MAX_DURATION_MS
}

fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sample rate in Hz (default: 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Payloads above this are submitted anyway, with a warning.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            timeslice_ms: DEFAULT_TIMESLICE_MS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl CaptureConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            sample_rate: self.sample_rate,
            channels: self.channels,
            ..CaptureConstraints::default()
        }
    }
}

/// What the caller asks of the input device.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// One time slice of captured audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,

    /// Timestamp when captured
    pub timestamp: Instant,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            timestamp: Instant::now(),
        }
    }
}

/// Encoded audio ready for transport (recorded speech or synthesized reply).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioPayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<data>`, the form the server-mediated endpoints exchange.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            BASE64_STANDARD.encode(&self.bytes)
        )
    }

    /// Parse a data URL. A bare base64 string is accepted with `fallback_mime`.
    pub fn from_data_url(data: &str, fallback_mime: &str) -> VoiceResult<Self> {
        let (mime_type, encoded) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, encoded) = rest.split_once(',').ok_or_else(|| {
                    VoiceError::PlaybackFailed("Invalid audio data format".to_string())
                })?;
                let mime = header.split(';').next().unwrap_or_default();
                let mime = if mime.is_empty() { fallback_mime } else { mime };
                (mime.to_string(), encoded)
            }
            None => (fallback_mime.to_string(), data),
        };
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| VoiceError::PlaybackFailed(format!("Invalid base64 audio: {}", e)))?;
        Ok(Self { bytes, mime_type })
    }
}

/// Platform microphone. `acquire` distinguishes refusal from absence.
pub trait Microphone: Send + Sync {
    fn acquire(&self, constraints: &CaptureConstraints) -> VoiceResult<Box<dyn InputStream>>;
}

/// An acquired input device.
pub trait InputStream: Send {
    /// Begin delivering chunks of roughly `timeslice` each.
    fn start(
        &mut self,
        timeslice: Duration,
        chunk_tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> VoiceResult<()>;

    /// Actual sample rate of delivered chunks.
    fn sample_rate(&self) -> u32;

    /// Stop delivering and free the device. Must drop the chunk sender. Idempotent.
    fn release(&mut self);
}

/// Recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Acquiring,
    Listening,
    Processing,
}

/// Releases the device when dropped, whatever path the recording took.
struct DeviceGuard {
    stream: Box<dyn InputStream>,
}

impl DeviceGuard {
    fn stream_mut(&mut self) -> &mut dyn InputStream {
        self.stream.as_mut()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.stream.release();
        debug!("Input device released");
    }
}

/// Microphone capture with an enforced maximum duration.
pub struct AudioCapture {
    config: CaptureConfig,
    microphone: Arc<dyn Microphone>,
    state: RecordingState,
    device: Option<DeviceGuard>,
    sample_rate: u32,
    chunk_rx: Option<mpsc::UnboundedReceiver<AudioChunk>>,
    chunks: Vec<AudioChunk>,
    auto_stop: Option<CancellationToken>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig, microphone: Arc<dyn Microphone>) -> Self {
        let sample_rate = config.sample_rate;
        Self {
            config,
            microphone,
            state: RecordingState::Idle,
            device: None,
            sample_rate,
            chunk_rx: None,
            chunks: Vec::new(),
            auto_stop: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Request microphone access. `Idle → Acquiring`; back to `Idle` on failure.
    ///
    /// Opening a device can block on an OS permission prompt, so it runs on the
    /// blocking pool.
    pub async fn acquire(&mut self) -> VoiceResult<()> {
        if self.state != RecordingState::Idle {
            debug!("acquire ignored in state {:?}", self.state);
            return Ok(());
        }
        self.state = RecordingState::Acquiring;

        let constraints = self.config.constraints();
        let microphone = Arc::clone(&self.microphone);
        let requested = constraints.clone();
        let acquired = tokio::task::spawn_blocking(move || microphone.acquire(&requested))
            .await
            .unwrap_or_else(|e| Err(VoiceError::AudioDevice(format!("Acquire task failed: {}", e))));
        match acquired {
            Ok(stream) => {
                self.sample_rate = stream.sample_rate();
                self.device = Some(DeviceGuard { stream });
                info!(
                    "🎤 Microphone acquired ({}Hz, {} channel(s))",
                    self.sample_rate, constraints.channels
                );
                Ok(())
            }
            Err(e) => {
                self.state = RecordingState::Idle;
                warn!("Microphone acquisition failed: {}", e);
                Err(e)
            }
        }
    }

    /// Start recording. `Acquiring → Listening`. `on_timeout` runs if the maximum
    /// duration elapses before `stop` cancels the timer.
    /// A device that fails to start is released and the state returns to `Idle`.
    pub async fn start<F>(&mut self, on_timeout: F) -> VoiceResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.state != RecordingState::Acquiring {
            debug!("start ignored in state {:?}", self.state);
            return Ok(());
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        self.chunks.clear();

        let timeslice = self.config.timeslice();
        let Some(mut device) = self.device.take() else {
            self.state = RecordingState::Idle;
            return Err(VoiceError::AudioDevice(
                "No acquired input device".to_string(),
            ));
        };
        // The guard rides along so a failed or panicked start still releases it.
        let started = tokio::task::spawn_blocking(move || {
            let result = device.stream_mut().start(timeslice, chunk_tx);
            (device, result)
        })
        .await;
        match started {
            Ok((device, Ok(()))) => self.device = Some(device),
            Ok((_device, Err(e))) => {
                self.state = RecordingState::Idle;
                warn!("Input stream failed to start: {}", e);
                return Err(e);
            }
            Err(e) => {
                self.state = RecordingState::Idle;
                return Err(VoiceError::AudioDevice(format!("Start task failed: {}", e)));
            }
        }

        self.chunk_rx = Some(chunk_rx);
        self.state = RecordingState::Listening;

        let token = CancellationToken::new();
        let timer = token.clone();
        let max_duration = self.config.max_duration();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(max_duration) => {
                    info!(
                        "⏱️ Maximum recording duration of {}s reached, stopping automatically",
                        max_duration.as_secs()
                    );
                    on_timeout.await;
                }
            }
        });
        self.auto_stop = Some(token);

        info!("▶️ Recording started ({}ms slices)", timeslice.as_millis());
        Ok(())
    }

    /// Finish the recording: cancel the timer, release the device, encode the buffer.
    pub async fn stop(&mut self) -> VoiceResult<AudioPayload> {
        if self.state != RecordingState::Listening {
            return Err(VoiceError::AudioDevice(
                "No active recording to stop".to_string(),
            ));
        }
        if let Some(token) = self.auto_stop.take() {
            token.cancel();
        }
        self.state = RecordingState::Processing;

        // Releasing the device closes the chunk channel.
        self.device = None;
        if let Some(mut rx) = self.chunk_rx.take() {
            while let Ok(Some(chunk)) = tokio::time::timeout(DRAIN_GRACE, rx.recv()).await {
                self.chunks.push(chunk);
            }
        }

        let chunks = std::mem::take(&mut self.chunks);
        self.state = RecordingState::Idle;

        let sample_count: usize = chunks.iter().map(|c| c.samples.len()).sum();
        if sample_count == 0 {
            return Err(VoiceError::NoAudioCaptured);
        }

        let samples: Vec<f32> = chunks.into_iter().flat_map(|c| c.samples).collect();
        let payload = AudioPayload::new(encode_wav(&samples, self.sample_rate)?, WAV_MIME_TYPE);

        info!(
            "Audio recording complete: {} samples, {} bytes, {}",
            sample_count,
            payload.len(),
            payload.mime_type
        );
        if payload.len() > self.config.max_payload_bytes {
            warn!(
                "Audio payload of {} bytes exceeds the {} byte limit; transcription may fail",
                payload.len(),
                self.config.max_payload_bytes
            );
        }

        Ok(payload)
    }

    /// Abandon any recording in progress and free the device.
    pub fn release(&mut self) {
        if let Some(token) = self.auto_stop.take() {
            token.cancel();
        }
        self.device = None;
        self.chunk_rx = None;
        self.chunks.clear();
        self.state = RecordingState::Idle;
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(token) = self.auto_stop.take() {
            token.cancel();
        }
    }
}

/// Encode mono f32 PCM to 16-bit WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * 32767.0).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

// -----------------------------------------------------------------------------
// cpal backend
// -----------------------------------------------------------------------------

/// Default input device via CPAL.
#[derive(Debug, Default, Clone)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    pub fn new() -> Self {
        Self
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::AudioDevice(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl Microphone for CpalMicrophone {
    fn acquire(&self, constraints: &CaptureConstraints) -> VoiceResult<Box<dyn InputStream>> {
        if constraints.echo_cancellation || constraints.noise_suppression {
            debug!("CPAL input has no echo cancellation / noise suppression; capturing raw");
        }
        let stream = CpalInputStream::open(constraints.clone())?;
        Ok(Box::new(stream))
    }
}

enum StreamCommand {
    Play(std_mpsc::SyncSender<VoiceResult<()>>),
    Stop,
}

type SharedChunkSender = Arc<Mutex<Option<ChunkSink>>>;

struct ChunkSink {
    tx: mpsc::UnboundedSender<AudioChunk>,
    samples_per_chunk: usize,
    pending: Vec<f32>,
}

/// Format the device actually opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenedFormat {
    sample_rate: u32,
    channels: u16,
}

impl From<&cpal::SupportedStreamConfig> for OpenedFormat {
    fn from(config: &cpal::SupportedStreamConfig) -> Self {
        Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels().max(1),
        }
    }
}

fn samples_per_chunk(sample_rate: u32, timeslice: Duration) -> usize {
    ((sample_rate as u128 * timeslice.as_millis()) / 1000).max(1) as usize
}

/// CPAL streams are not `Send`; the stream lives on its own thread and is driven by commands.
pub struct CpalInputStream {
    commands: std_mpsc::Sender<StreamCommand>,
    sink: SharedChunkSender,
    sample_rate: u32,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalInputStream {
    fn open(constraints: CaptureConstraints) -> VoiceResult<Self> {
        let (command_tx, command_rx) = std_mpsc::channel::<StreamCommand>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<VoiceResult<OpenedFormat>>(1);
        let sink: SharedChunkSender = Arc::new(Mutex::new(None));
        let callback_sink = Arc::clone(&sink);

        let handle = thread::spawn(move || {
            let stream = match build_input_stream(&constraints, callback_sink) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            serve_commands(command_rx, || stream.play().map_err(VoiceError::from));
            drop(stream);
            debug!("CPAL input thread finished");
        });

        match ready_rx.recv() {
            Ok(Ok(format)) => Ok(Self {
                commands: command_tx,
                sink,
                sample_rate: format.sample_rate,
                thread: Some(handle),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::AudioDevice(
                "Input thread exited before reporting".to_string(),
            )),
        }
    }
}

/// Input thread loop: runs `play` for each `Play` and answers on its reply channel.
fn serve_commands<P>(commands: std_mpsc::Receiver<StreamCommand>, mut play: P)
where
    P: FnMut() -> VoiceResult<()>,
{
    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let result = play();
                if let Err(e) = &result {
                    warn!("Failed to start input stream: {}", e);
                }
                let _ = reply.send(result);
            }
            StreamCommand::Stop => break,
        }
    }
}

fn build_input_stream(
    constraints: &CaptureConstraints,
    sink: SharedChunkSender,
) -> VoiceResult<(cpal::Stream, OpenedFormat)> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceNotFound("No input device available".to_string()))?;

    info!(
        "📱 Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    // Surfaces permission and availability problems before we build the stream.
    let default_config = device.default_input_config()?;
    debug!("🔧 Default input config: {:?}", default_config);

    let requested = OpenedFormat {
        sample_rate: constraints.sample_rate,
        channels: constraints.channels.max(1),
    };
    match open_with_format(&device, requested, Arc::clone(&sink)) {
        Err(cpal::BuildStreamError::StreamConfigNotSupported) => {
            let fallback = OpenedFormat::from(&default_config);
            info!(
                "Device rejected {}Hz/{}ch, using its default {}Hz/{}ch",
                requested.sample_rate, requested.channels, fallback.sample_rate, fallback.channels
            );
            let stream = open_with_format(&device, fallback, sink)?;
            Ok((stream, fallback))
        }
        Err(e) => Err(e.into()),
        Ok(stream) => Ok((stream, requested)),
    }
}

fn open_with_format(
    device: &cpal::Device,
    format: OpenedFormat,
    sink: SharedChunkSender,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let stream_config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = format.channels as usize;

    device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mut guard = match sink.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let Some(sink) = guard.as_mut() else {
                return;
            };
            for frame in data.chunks(channels) {
                let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                sink.pending.push(mono);
                if sink.pending.len() >= sink.samples_per_chunk {
                    let samples = std::mem::take(&mut sink.pending);
                    if let Err(e) = sink.tx.send(AudioChunk::new(samples)) {
                        warn!("Failed to send audio chunk: {}", e);
                    }
                }
            }
        },
        move |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )
}

impl InputStream for CpalInputStream {
    fn start(
        &mut self,
        timeslice: Duration,
        chunk_tx: mpsc::UnboundedSender<AudioChunk>,
    ) -> VoiceResult<()> {
        let samples_per_chunk = samples_per_chunk(self.sample_rate, timeslice);
        {
            let mut guard = self.sink.lock().unwrap_or_else(|p| p.into_inner());
            *guard = Some(ChunkSink {
                tx: chunk_tx,
                samples_per_chunk,
                pending: Vec::with_capacity(samples_per_chunk),
            });
        }
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.commands
            .send(StreamCommand::Play(reply_tx))
            .map_err(|_| VoiceError::AudioDevice("Input thread is gone".to_string()))?;
        let played = reply_rx.recv().unwrap_or_else(|_| {
            Err(VoiceError::AudioDevice(
                "Input thread exited before starting".to_string(),
            ))
        });
        if played.is_err() {
            self.sink.lock().unwrap_or_else(|p| p.into_inner()).take();
        }
        played
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn release(&mut self) {
        {
            let mut guard = self.sink.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(sink) = guard.take() {
                if !sink.pending.is_empty() {
                    let _ = sink.tx.send(AudioChunk::new(sink.pending));
                }
            }
        }
        let _ = self.commands.send(StreamCommand::Stop);
        // Dropping the handle detaches the thread; it exits right after Stop.
        self.thread.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.timeslice(), Duration::from_millis(100));
        assert_eq!(config.max_duration(), Duration::from_secs(30));
        let constraints = config.constraints();
        assert!(constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
    }

    #[test]
    fn play_failure_is_reported_to_the_caller() {
        let (command_tx, command_rx) = std_mpsc::channel();
        let input_thread = thread::spawn(move || {
            serve_commands(command_rx, || {
                Err(cpal::PlayStreamError::DeviceNotAvailable.into())
            })
        });

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        command_tx.send(StreamCommand::Play(reply_tx)).unwrap();
        let err = reply_rx.recv().unwrap().unwrap_err();
        assert!(matches!(err, VoiceError::DeviceNotFound(_)));

        command_tx.send(StreamCommand::Stop).unwrap();
        input_thread.join().unwrap();
    }

    #[test]
    fn fallback_follows_the_device_default() {
        let default_config = cpal::SupportedStreamConfig::new(
            2,
            cpal::SampleRate(48000),
            cpal::SupportedBufferSize::Unknown,
            cpal::SampleFormat::F32,
        );
        let format = OpenedFormat::from(&default_config);
        assert_eq!(
            format,
            OpenedFormat {
                sample_rate: 48000,
                channels: 2
            }
        );
        assert_eq!(samples_per_chunk(format.sample_rate, Duration::from_millis(100)), 4800);
        assert_eq!(samples_per_chunk(16000, Duration::from_millis(100)), 1600);
    }

    #[test]
    fn play_success_is_acknowledged() {
        let (command_tx, command_rx) = std_mpsc::channel();
        let input_thread = thread::spawn(move || serve_commands(command_rx, || Ok(())));

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        command_tx.send(StreamCommand::Play(reply_tx)).unwrap();
        assert!(reply_rx.recv().unwrap().is_ok());

        drop(command_tx);
        input_thread.join().unwrap();
    }

    #[test]
    fn wav_encoding_has_riff_header_and_pcm16_body() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.5];
        let wav = encode_wav(&samples, 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), samples.len());
        // Out-of-range input is clamped to full scale.
        assert_eq!(decoded[3], 32767);
    }

    #[test]
    fn data_url_parsing_accepts_prefixed_and_bare_base64() {
        let payload = AudioPayload::new(vec![1, 2, 3, 4], "audio/mpeg");
        let url = payload.to_data_url();
        assert!(url.starts_with("data:audio/mpeg;base64,"));
        assert_eq!(AudioPayload::from_data_url(&url, "audio/wav").unwrap(), payload);

        let bare = AudioPayload::from_data_url("AQIDBA==", "audio/mp3").unwrap();
        assert_eq!(bare.mime_type, "audio/mp3");
        assert_eq!(bare.bytes, vec![1, 2, 3, 4]);

        assert!(matches!(
            AudioPayload::from_data_url("data:audio/wav;base64", "audio/wav"),
            Err(VoiceError::PlaybackFailed(_))
        ));
    }

    #[test]
    fn test_list_devices() {
        // This might fail in CI environments without audio devices
        if let Ok(devices) = CpalMicrophone::list_input_devices() {
            println!("Available input devices: {:?}", devices);
        }
    }
}
