//! Client-facing wire protocol: JSON messages over a persistent connection,
//! with an alternate binary path for raw audio frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use murmur_core::types::{SpeakerRole, Suggestion, SuggestionKind, TranscriptEvent};

/// Messages the client sends to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Audio as 16-bit PCM samples or base64-encoded bytes.
    AudioChunk {
        #[serde(default)]
        data: Option<Vec<i16>>,
        #[serde(default)]
        audio_base64: Option<String>,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        sequence: Option<u64>,
    },
    /// Session/agent control. `command` is accepted as a legacy alias.
    #[serde(alias = "command")]
    Control {
        #[serde(default, alias = "action")]
        control: Option<ControlKind>,
        #[serde(default)]
        params: Option<ControlParams>,
    },
    Ping,
    /// Bare `start`/`stop` shorthand for the corresponding control.
    Start,
    Stop,
}

/// Control verbs accepted inside a `control` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Start,
    Stop,
    ClearContext,
    GetStatus,
    Ping,
}

/// Optional parameters carried by a control message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlParams {
    #[serde(default, rename = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default, rename = "speakerFilterEnabled")]
    pub speaker_filter_enabled: Option<bool>,
}

/// Messages the server sends to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcript {
        text: String,
        speaker: String,
        speaker_id: u32,
        speaker_role: SpeakerRole,
        is_final: bool,
        confidence: f64,
        start_time: f64,
        end_time: f64,
        timestamp: DateTime<Utc>,
        is_self: bool,
    },
    Suggestion {
        /// The utterance that triggered the suggestion.
        question: String,
        response: String,
        confidence: f64,
        question_type: SuggestionKind,
        source: String,
        timestamp: DateTime<Utc>,
    },
    Status {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_listening: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcription_connected: Option<bool>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    Pong,
}

impl ServerMessage {
    /// Build a transcript frame from a stream event.
    pub fn transcript(event: &TranscriptEvent, is_self: bool) -> Self {
        ServerMessage::Transcript {
            text: event.text.clone(),
            speaker: event.speaker_label(),
            speaker_id: event.speaker_id,
            speaker_role: event.speaker_role,
            is_final: event.is_final,
            confidence: event.confidence,
            start_time: event.start_time,
            end_time: event.end_time,
            timestamp: event.timestamp,
            is_self,
        }
    }

    /// Build a suggestion frame from the agent output and its trigger text.
    pub fn suggestion(trigger: &str, suggestion: &Suggestion) -> Self {
        ServerMessage::Suggestion {
            question: trigger.to_string(),
            response: suggestion.text.clone(),
            confidence: suggestion.confidence,
            question_type: suggestion.kind,
            source: suggestion.source.as_str().to_string(),
            timestamp: suggestion.timestamp,
        }
    }

    /// A bare status frame with just a state and a human-readable note.
    pub fn status(status: &str, message: &str) -> Self {
        ServerMessage::Status {
            status: status.to_string(),
            message: Some(message.to_string()),
            session_id: None,
            session: None,
            is_listening: None,
            transcription_connected: None,
        }
    }

    /// An error frame. The connection stays open after sending one.
    pub fn error(code: &str, message: &str) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}
