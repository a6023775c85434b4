//! Per-call transcription stream state machine.
//!
//! Owns one upstream provider connection: buffers and forwards audio,
//! receives partial/final results, reconnects with capped exponential
//! backoff, and enriches results with speaker roles before emitting
//! `TranscriptEvent`s. Exhausting reconnection attempts switches the stream
//! to the degraded scripted source instead of terminating the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use murmur_core::config::TranscriptionConfig;
use murmur_core::error::MurmurError;
use murmur_core::types::{SpeakerRole, TranscriptEvent, WordInfo};

use crate::degraded::DegradedTranscriptionSource;
use crate::provider::{
    ProviderEvent, ProviderStream, RawTranscript, StreamParams, TranscriptionProvider,
};
use crate::speaker::SpeakerTracker;

/// Lifecycle state of a transcription stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
    ReconnectBackoff { attempt: u32 },
    Closed,
}

/// Streaming-transcription adapter for one call.
pub struct TranscriptionStream {
    config: TranscriptionConfig,
    provider: Arc<dyn TranscriptionProvider>,
    tracker: Arc<Mutex<SpeakerTracker>>,
    state: Arc<Mutex<StreamState>>,
    degraded: Arc<AtomicBool>,
    buffer: Vec<u8>,
    audio_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    events_tx: mpsc::UnboundedSender<TranscriptEvent>,
    driver: Option<JoinHandle<()>>,
}

impl TranscriptionStream {
    /// Create a stream that will emit transcript events on `events_tx`.
    pub fn new(
        config: TranscriptionConfig,
        provider: Arc<dyn TranscriptionProvider>,
        events_tx: mpsc::UnboundedSender<TranscriptEvent>,
    ) -> Self {
        Self {
            config,
            provider,
            tracker: Arc::new(Mutex::new(SpeakerTracker::new())),
            state: Arc::new(Mutex::new(StreamState::Disconnected)),
            degraded: Arc::new(AtomicBool::new(false)),
            buffer: Vec::new(),
            audio_tx: None,
            shutdown_tx: None,
            events_tx,
            driver: None,
        }
    }

    /// Open the upstream connection and start the driver task.
    ///
    /// A provider that cannot be reached does not fail the call: the stream
    /// switches to the degraded scripted source and keeps running. Calling
    /// `connect` on an already-streaming or closed stream is a no-op /
    /// error respectively.
    pub async fn connect(&mut self) -> Result<(), MurmurError> {
        if self.state() == StreamState::Closed {
            return Err(MurmurError::Transcription(
                "Stream is closed".to_string(),
            ));
        }
        if self.audio_tx.is_some() {
            debug!("Stream already connected");
            return Ok(());
        }

        set_state(&self.state, StreamState::Connecting);

        let params = StreamParams::new(
            self.config.sample_rate,
            self.config.channels,
            self.config.diarization,
        );

        let stream = match self.provider.connect(&params).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Provider unreachable; entering degraded mode");
                self.degraded.store(true, Ordering::SeqCst);
                Box::new(DegradedTranscriptionSource::new(Duration::from_secs(
                    self.config.degraded_interval_secs,
                )))
            }
        };

        self.spawn_driver(stream, params);
        Ok(())
    }

    fn spawn_driver(&mut self, stream: Box<dyn ProviderStream>, params: StreamParams) {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.audio_tx = Some(audio_tx);
        self.shutdown_tx = Some(shutdown_tx);

        set_state(&self.state, StreamState::Streaming);

        let ctx = DriverContext {
            provider: Arc::clone(&self.provider),
            params,
            config: self.config.clone(),
            tracker: Arc::clone(&self.tracker),
            state: Arc::clone(&self.state),
            degraded: Arc::clone(&self.degraded),
            events_tx: self.events_tx.clone(),
        };

        self.driver = Some(tokio::spawn(drive(stream, audio_rx, shutdown_rx, ctx)));
    }

    /// Buffer audio for upstream delivery.
    ///
    /// Bytes accumulate until the configured threshold is crossed, then the
    /// whole buffer is handed to the driver in one piece. Buffering is
    /// transparent to callers; nothing is dropped silently.
    pub fn send_audio(&mut self, bytes: &[u8]) -> Result<(), MurmurError> {
        let Some(audio_tx) = &self.audio_tx else {
            return Err(MurmurError::Transcription(
                "Stream not connected".to_string(),
            ));
        };

        self.buffer.extend_from_slice(bytes);

        if self.buffer.len() >= self.config.buffer_threshold {
            let pending = std::mem::take(&mut self.buffer);
            audio_tx.send(pending).map_err(|_| {
                MurmurError::ProviderDisconnected("Stream driver is gone".to_string())
            })?;
        }
        Ok(())
    }

    /// Force any buffered audio out to the driver.
    pub fn flush(&mut self) -> Result<(), MurmurError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let Some(audio_tx) = &self.audio_tx else {
            return Err(MurmurError::Transcription(
                "Stream not connected".to_string(),
            ));
        };
        let pending = std::mem::take(&mut self.buffer);
        audio_tx
            .send(pending)
            .map_err(|_| MurmurError::ProviderDisconnected("Stream driver is gone".to_string()))
    }

    /// Cancel the driver, flush buffered audio, release the connection, and
    /// reset speaker statistics. Idempotent.
    pub async fn close(&mut self) {
        if self.state() == StreamState::Closed {
            return;
        }

        if let Err(e) = self.flush() {
            debug!(error = %e, "Flush on close failed");
        }
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        self.audio_tx = None;

        if let Some(driver) = self.driver.take() {
            if driver.await.is_err() {
                warn!("Stream driver task panicked");
            }
        }

        set_state(&self.state, StreamState::Closed);
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.reset();
        }
        info!("Transcription stream closed");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(StreamState::Closed)
    }

    /// True while the driver is running, including in degraded mode.
    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// True once the stream runs on the degraded scripted source.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Current role for a speaker id.
    pub fn speaker_role(&self, speaker_id: u32) -> SpeakerRole {
        self.tracker
            .lock()
            .map(|tracker| tracker.get_role(speaker_id))
            .unwrap_or(SpeakerRole::Unknown)
    }

    /// Bytes currently held in the outbound buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}

struct DriverContext {
    provider: Arc<dyn TranscriptionProvider>,
    params: StreamParams,
    config: TranscriptionConfig,
    tracker: Arc<Mutex<SpeakerTracker>>,
    state: Arc<Mutex<StreamState>>,
    degraded: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<TranscriptEvent>,
}

/// Driver task: forwards buffered audio and processes inbound provider
/// messages. A blocked provider read never stalls audio buffering, which
/// happens on the owning task.
async fn drive(
    mut stream: Box<dyn ProviderStream>,
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
    ctx: DriverContext,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                drain_and_close(&mut stream, &mut audio_rx).await;
                return;
            }
            maybe_audio = audio_rx.recv() => match maybe_audio {
                Some(bytes) => {
                    if let Err(e) = stream.send_audio(&bytes).await {
                        warn!(error = %e, "Audio forward failed");
                        if !reconnect(&mut stream, &mut shutdown_rx, &ctx).await {
                            drain_and_close(&mut stream, &mut audio_rx).await;
                            return;
                        }
                    }
                }
                None => {
                    drain_and_close(&mut stream, &mut audio_rx).await;
                    return;
                }
            },
            event = stream.next_event() => match event {
                Some(ProviderEvent::Transcript(raw)) => emit_transcript(raw, &ctx),
                Some(ProviderEvent::Metadata(value)) => {
                    debug!(%value, "Dropping provider metadata message");
                }
                Some(ProviderEvent::Closed) | None => {
                    if !reconnect(&mut stream, &mut shutdown_rx, &ctx).await {
                        drain_and_close(&mut stream, &mut audio_rx).await;
                        return;
                    }
                }
            },
        }
    }
}

/// Re-establish the provider connection with exponential backoff.
///
/// Returns false only when shutdown was requested mid-backoff. Exhausting
/// the attempt cap swaps in the degraded source and reports success, so the
/// session keeps running.
async fn reconnect(
    stream: &mut Box<dyn ProviderStream>,
    shutdown_rx: &mut watch::Receiver<bool>,
    ctx: &DriverContext,
) -> bool {
    if ctx.degraded.load(Ordering::SeqCst) {
        // The scripted source does not disconnect; nothing to do.
        return true;
    }

    let mut delay = Duration::from_secs(ctx.config.reconnect_initial_secs.max(1));

    for attempt in 1..=ctx.config.max_reconnect_attempts {
        set_state(&ctx.state, StreamState::ReconnectBackoff { attempt });
        info!(
            attempt,
            max = ctx.config.max_reconnect_attempts,
            delay_secs = delay.as_secs(),
            "Provider disconnected; backing off before reconnect"
        );

        tokio::select! {
            _ = shutdown_rx.changed() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        set_state(&ctx.state, StreamState::Connecting);
        match ctx.provider.connect(&ctx.params).await {
            Ok(new_stream) => {
                *stream = new_stream;
                set_state(&ctx.state, StreamState::Streaming);
                info!(attempt, "Provider reconnected");
                return true;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Reconnect attempt failed");
                delay *= 2;
            }
        }
    }

    warn!("Reconnect attempts exhausted; switching to degraded mode");
    ctx.degraded.store(true, Ordering::SeqCst);
    *stream = Box::new(DegradedTranscriptionSource::new(Duration::from_secs(
        ctx.config.degraded_interval_secs,
    )));
    set_state(&ctx.state, StreamState::Streaming);
    true
}

/// Forward any audio still queued, then release the provider connection.
async fn drain_and_close(
    stream: &mut Box<dyn ProviderStream>,
    audio_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Ok(bytes) = audio_rx.try_recv() {
        if let Err(e) = stream.send_audio(&bytes).await {
            debug!(error = %e, "Dropping queued audio during close");
            break;
        }
    }
    if let Err(e) = stream.close().await {
        debug!(error = %e, "Provider close failed");
    }
}

/// Enrich a raw provider transcript and emit it on the event channel.
fn emit_transcript(raw: RawTranscript, ctx: &DriverContext) {
    if raw.text.trim().is_empty() {
        return;
    }

    let speaker_id = raw
        .words
        .iter()
        .filter_map(|w| w.speaker)
        .last()
        .unwrap_or(0);

    let (start, end) = if raw.words.is_empty() {
        (raw.start, raw.end)
    } else {
        (raw.words[0].start, raw.words[raw.words.len() - 1].end)
    };
    let duration = (end - start).max(0.0);

    let word_count = if raw.words.is_empty() {
        raw.text.split_whitespace().count() as u64
    } else {
        raw.words.len() as u64
    };

    let speaker_role = ctx
        .tracker
        .lock()
        .map(|mut tracker| tracker.track(speaker_id, &raw.text, duration, word_count))
        .unwrap_or(SpeakerRole::Unknown);

    let event = TranscriptEvent {
        text: raw.text,
        speaker_id,
        speaker_role,
        is_final: raw.is_final,
        confidence: raw.confidence,
        start_time: start,
        end_time: end,
        words: raw
            .words
            .into_iter()
            .map(|w| WordInfo {
                word: w.word,
                start: w.start,
                end: w.end,
                confidence: w.confidence,
                speaker: w.speaker,
            })
            .collect(),
        timestamp: Utc::now(),
    };

    if ctx.events_tx.send(event).is_err() {
        debug!("Transcript event receiver dropped");
    }
}

fn set_state(state: &Mutex<StreamState>, value: StreamState) {
    if let Ok(mut guard) = state.lock() {
        *guard = value;
    }
}
