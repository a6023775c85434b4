//! Per-call session handler.
//!
//! Owns exactly one `TranscriptionStream` and one `SuggestionAgent`, routes
//! inbound client frames and outbound transcript/suggestion events, and runs
//! teardown to completion when the call ends. Failures local to this call
//! never cross into other sessions.

use std::sync::Arc;

use base64::Engine;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use murmur_agent::{GenerationService, SuggestionAgent};
use murmur_core::config::MurmurConfig;
use murmur_core::events::DomainEvent;
use murmur_core::types::{SessionId, TranscriptEvent};
use murmur_rag::Retriever;
use murmur_transcribe::{TranscriptionProvider, TranscriptionStream};

use crate::manager::SessionManager;
use crate::protocol::{ClientMessage, ControlKind, ControlParams, ServerMessage};

/// One inbound frame from the client transport.
#[derive(Debug)]
pub enum InboundFrame {
    /// A JSON text message.
    Text(String),
    /// A raw binary audio frame (no JSON wrapping).
    Binary(Vec<u8>),
    /// The transport is gone; tear the session down.
    Closed,
}

/// Handles a single call session end to end.
pub struct SessionHandler {
    session_id: SessionId,
    manager: Arc<SessionManager>,
    stream: TranscriptionStream,
    agent: SuggestionAgent,
    transcript_rx: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
    is_active: bool,
    is_listening: bool,
    speaker_filter_enabled: bool,
    self_speaker_id: Option<u32>,
}

impl SessionHandler {
    pub fn new(
        session_id: SessionId,
        manager: Arc<SessionManager>,
        config: &MurmurConfig,
        provider: Arc<dyn TranscriptionProvider>,
        backend: Arc<dyn GenerationService>,
        retriever: Option<Arc<Retriever>>,
    ) -> Self {
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let stream =
            TranscriptionStream::new(config.transcription.clone(), provider, transcript_tx);
        let agent = SuggestionAgent::new(&config.agent, backend, retriever);

        Self {
            session_id,
            manager,
            stream,
            agent,
            transcript_rx: Some(transcript_rx),
            is_active: true,
            is_listening: false,
            speaker_filter_enabled: false,
            self_speaker_id: None,
        }
    }

    /// Run the session loop until the client disconnects, then tear down.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<InboundFrame>) {
        let Some(mut transcript_rx) = self.transcript_rx.take() else {
            return;
        };

        self.manager.deliver(
            self.session_id,
            &ServerMessage::Status {
                status: "connected".to_string(),
                message: Some("Connected to live call copilot".to_string()),
                session_id: Some(self.session_id.to_string()),
                session: None,
                is_listening: Some(self.is_listening),
                transcription_connected: Some(self.stream.is_connected()),
            },
        );

        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(InboundFrame::Text(text)) => self.handle_text(&text).await,
                    Some(InboundFrame::Binary(bytes)) => self.handle_binary_audio(&bytes),
                    Some(InboundFrame::Closed) | None => {
                        info!(session_id = %self.session_id, "Client disconnected");
                        break;
                    }
                },
                event = transcript_rx.recv() => match event {
                    Some(event) => self.handle_transcript(event).await,
                    None => break,
                },
            }
        }

        self.teardown().await;
    }

    /// Parse and dispatch one JSON frame from the client.
    async fn handle_text(&mut self, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(session_id = %self.session_id, error = %e, "Invalid client message");
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::error("INVALID_JSON", "Invalid JSON message"),
                );
                return;
            }
        };

        match message {
            ClientMessage::AudioChunk {
                data,
                audio_base64,
                ..
            } => self.handle_audio_chunk(data, audio_base64),
            ClientMessage::Control {
                control: Some(kind),
                params,
            } => self.handle_control(kind, params).await,
            ClientMessage::Control { control: None, .. } => {
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::error("INVALID_CONTROL", "Missing control verb"),
                );
            }
            ClientMessage::Ping => self.handle_control(ControlKind::Ping, None).await,
            ClientMessage::Start => self.handle_control(ControlKind::Start, None).await,
            ClientMessage::Stop => self.handle_control(ControlKind::Stop, None).await,
        }
    }

    /// Audio delivered inside a JSON frame, as samples or base64.
    fn handle_audio_chunk(&mut self, data: Option<Vec<i16>>, audio_base64: Option<String>) {
        self.manager.record_audio(self.session_id);

        if !self.is_listening {
            return;
        }

        let bytes: Vec<u8> = if let Some(samples) = data {
            samples
                .iter()
                .flat_map(|sample| sample.to_le_bytes())
                .collect()
        } else if let Some(encoded) = audio_base64 {
            match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(session_id = %self.session_id, error = %e, "Bad base64 audio");
                    self.manager.deliver(
                        self.session_id,
                        &ServerMessage::error("INVALID_AUDIO", "Audio payload is not valid base64"),
                    );
                    return;
                }
            }
        } else {
            return;
        };

        if let Err(e) = self.stream.send_audio(&bytes) {
            warn!(session_id = %self.session_id, error = %e, "Audio forwarding failed");
        }
    }

    /// Raw binary frames are treated as audio without JSON wrapping.
    fn handle_binary_audio(&mut self, bytes: &[u8]) {
        self.manager.record_audio(self.session_id);

        if self.is_listening {
            if let Err(e) = self.stream.send_audio(bytes) {
                warn!(session_id = %self.session_id, error = %e, "Audio forwarding failed");
            }
        }
    }

    async fn handle_control(&mut self, kind: ControlKind, params: Option<ControlParams>) {
        match kind {
            ControlKind::Start => {
                let params = params.unwrap_or_default();

                if let Some(prompt) = params.system_prompt.as_deref() {
                    self.agent.set_system_prompt(prompt);
                    info!(
                        session_id = %self.session_id,
                        chars = prompt.len(),
                        "Custom system prompt received"
                    );
                }

                if let Some(enabled) = params.speaker_filter_enabled {
                    self.speaker_filter_enabled = enabled;
                    // First speaker after (re)enabling becomes "self".
                    self.self_speaker_id = None;
                    self.manager.update_metadata(
                        self.session_id,
                        serde_json::json!({"speaker_filter_enabled": enabled}),
                    );
                    info!(session_id = %self.session_id, enabled, "Speaker filter updated");
                }

                if !self.is_listening {
                    if let Err(e) = self.stream.connect().await {
                        warn!(session_id = %self.session_id, error = %e, "Stream connect failed");
                    }
                    self.is_listening = self.stream.is_connected();

                    if self.stream.is_degraded() {
                        self.manager.publish(DomainEvent::StreamDegraded {
                            session_id: self.session_id,
                        });
                    }

                    let (status, message) = if self.is_listening {
                        ("listening", "Started listening")
                    } else {
                        ("transcription_unavailable", "Transcription service unavailable")
                    };
                    self.manager
                        .deliver(self.session_id, &ServerMessage::status(status, message));
                }
            }
            ControlKind::Stop => {
                self.is_listening = false;
                if let Err(e) = self.stream.flush() {
                    debug!(session_id = %self.session_id, error = %e, "Flush on stop failed");
                }
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::status("stopped", "Stopped listening"),
                );
            }
            ControlKind::ClearContext => {
                self.agent.clear_session();
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::status("context_cleared", "Conversation session cleared"),
                );
            }
            ControlKind::GetStatus => {
                let session = self
                    .manager
                    .snapshot(self.session_id)
                    .and_then(|snapshot| serde_json::to_value(snapshot).ok());
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::Status {
                        status: "active".to_string(),
                        message: None,
                        session_id: None,
                        session,
                        is_listening: Some(self.is_listening),
                        transcription_connected: Some(self.stream.is_connected()),
                    },
                );
            }
            ControlKind::Ping => {
                self.manager.deliver(self.session_id, &ServerMessage::Pong);
            }
        }
    }

    /// Forward a transcript to the client and feed the suggestion loop.
    async fn handle_transcript(&mut self, event: TranscriptEvent) {
        if !self.is_active || !self.is_listening {
            return;
        }

        if self.speaker_filter_enabled && self.self_speaker_id.is_none() {
            self.self_speaker_id = Some(event.speaker_id);
            info!(
                session_id = %self.session_id,
                speaker_id = event.speaker_id,
                "First speaker treated as self"
            );
        }

        let is_self =
            self.speaker_filter_enabled && self.self_speaker_id == Some(event.speaker_id);

        // The client always sees the transcript, own speech included.
        self.manager
            .deliver(self.session_id, &ServerMessage::transcript(&event, is_self));

        // Final utterances from other speakers drive the suggestion loop.
        if event.is_final && !is_self {
            let suggestion = self
                .agent
                .process_utterance(&event.text, &event.speaker_label(), true)
                .await;

            if let Some(suggestion) = suggestion {
                self.manager.deliver(
                    self.session_id,
                    &ServerMessage::suggestion(&event.text, &suggestion),
                );
            }
        }
    }

    /// Teardown always runs to completion: flush and release the stream,
    /// clear agent state, deregister. Nothing is emitted past this point.
    async fn teardown(&mut self) {
        self.is_active = false;
        self.is_listening = false;

        self.stream.close().await;
        self.agent.clear_session();
        self.manager.close(self.session_id);

        info!(session_id = %self.session_id, "Session handler cleaned up");
    }
}
