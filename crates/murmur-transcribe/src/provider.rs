//! Upstream streaming-transcription provider contract and websocket client.
//!
//! The provider is an abstract contract: raw PCM goes in, timed and
//! speaker-attributed results come out. `WsTranscriptionProvider` speaks the
//! common JSON-over-websocket shape of hosted streaming STT services.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use murmur_core::error::MurmurError;

/// Connection parameters for one streaming session.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub diarization: bool,
    pub interim_results: bool,
}

impl StreamParams {
    pub fn new(sample_rate: u32, channels: u16, diarization: bool) -> Self {
        Self {
            encoding: "linear16".to_string(),
            sample_rate,
            channels,
            diarization,
            interim_results: true,
        }
    }
}

/// One word within a provider transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
    pub speaker: Option<u32>,
}

/// A transcript result as delivered by the provider, before enrichment.
#[derive(Debug, Clone, Default)]
pub struct RawTranscript {
    pub text: String,
    pub is_final: bool,
    pub confidence: f64,
    pub words: Vec<RawWord>,
    /// Utterance bounds used when `words` carries no timing.
    pub start: f64,
    pub end: f64,
}

/// An inbound message from the provider connection.
#[derive(Debug)]
pub enum ProviderEvent {
    /// A partial or final transcript.
    Transcript(RawTranscript),
    /// Provider metadata or any message the client does not understand.
    Metadata(serde_json::Value),
    /// The connection ended.
    Closed,
}

/// Factory for provider connections. One connection serves one call.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn connect(&self, params: &StreamParams) -> Result<Box<dyn ProviderStream>, MurmurError>;
}

/// A live bidirectional provider connection.
#[async_trait]
pub trait ProviderStream: Send {
    /// Forward raw PCM bytes upstream.
    async fn send_audio(&mut self, bytes: &[u8]) -> Result<(), MurmurError>;

    /// Wait for the next inbound message. `None` means the connection is
    /// gone and will produce nothing further.
    async fn next_event(&mut self) -> Option<ProviderEvent>;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), MurmurError>;
}

// ---------------------------------------------------------------------------
// Websocket provider client
// ---------------------------------------------------------------------------

/// Streaming STT provider over a JSON websocket.
#[derive(Debug, Clone)]
pub struct WsTranscriptionProvider {
    endpoint: String,
    api_key: String,
}

impl WsTranscriptionProvider {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self { endpoint, api_key }
    }

    fn request_url(&self, params: &StreamParams) -> String {
        format!(
            "{}?encoding={}&sample_rate={}&channels={}&diarize={}&interim_results={}&punctuate=true",
            self.endpoint,
            params.encoding,
            params.sample_rate,
            params.channels,
            params.diarization,
            params.interim_results,
        )
    }
}

#[async_trait]
impl TranscriptionProvider for WsTranscriptionProvider {
    async fn connect(&self, params: &StreamParams) -> Result<Box<dyn ProviderStream>, MurmurError> {
        if self.endpoint.is_empty() {
            return Err(MurmurError::ProviderUnavailable(
                "No transcription endpoint configured".into(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(MurmurError::ProviderUnavailable(
                "No transcription API key configured".into(),
            ));
        }

        let url = self.request_url(params);
        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| MurmurError::ProviderUnavailable(format!("Bad endpoint: {}", e)))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|_| MurmurError::ProviderUnavailable("Bad API key".into()))?,
        );

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| MurmurError::ProviderUnavailable(format!("Connect failed: {}", e)))?;

        debug!(url = %url, "Connected to streaming transcription provider");

        let (write, read) = socket.split();
        Ok(Box::new(WsProviderStream { write, read }))
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;
type WsSource = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;

struct WsProviderStream {
    write: WsSink,
    read: WsSource,
}

#[async_trait]
impl ProviderStream for WsProviderStream {
    async fn send_audio(&mut self, bytes: &[u8]) -> Result<(), MurmurError> {
        self.write
            .send(Message::Binary(bytes.to_vec()))
            .await
            .map_err(|e| MurmurError::ProviderDisconnected(format!("Send failed: {}", e)))
    }

    async fn next_event(&mut self) -> Option<ProviderEvent> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(parse_provider_message(&text));
                }
                Some(Ok(Message::Close(_))) | None => return Some(ProviderEvent::Closed),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    debug!(?other, "Ignoring non-text provider frame");
                    continue;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Provider read error");
                    return Some(ProviderEvent::Closed);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), MurmurError> {
        self.write
            .send(Message::Close(None))
            .await
            .map_err(|e| MurmurError::ProviderDisconnected(format!("Close failed: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Wire parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireResult {
    channel: WireChannel,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    alternatives: Vec<WireAlternative>,
}

#[derive(Debug, Deserialize)]
struct WireAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    words: Vec<WireWord>,
}

#[derive(Debug, Deserialize)]
struct WireWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    speaker: Option<u32>,
}

/// Parse one provider text frame into an event.
///
/// Frames carrying transcript alternatives become `Transcript`; everything
/// else (metadata, utterance markers) becomes `Metadata` for the caller to
/// log and drop.
pub(crate) fn parse_provider_message(text: &str) -> ProviderEvent {
    match serde_json::from_str::<WireResult>(text) {
        Ok(result) => {
            let Some(alternative) = result.channel.alternatives.into_iter().next() else {
                return ProviderEvent::Metadata(serde_json::json!({"empty_alternatives": true}));
            };

            let words: Vec<RawWord> = alternative
                .words
                .into_iter()
                .map(|w| RawWord {
                    word: w.word,
                    start: w.start,
                    end: w.end,
                    confidence: w.confidence,
                    speaker: w.speaker,
                })
                .collect();

            let start = words.first().map(|w| w.start).unwrap_or(0.0);
            let end = words.last().map(|w| w.end).unwrap_or(0.0);

            ProviderEvent::Transcript(RawTranscript {
                text: alternative.transcript,
                is_final: result.is_final,
                confidence: alternative.confidence,
                words,
                start,
                end,
            })
        }
        Err(_) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => ProviderEvent::Metadata(value),
            Err(_) => ProviderEvent::Metadata(serde_json::json!({"unparseable": text})),
        },
    }
}
