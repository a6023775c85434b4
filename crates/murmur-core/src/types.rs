use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Inferred role of a speaker in the call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    /// Not enough signal yet to assign a role.
    #[default]
    Unknown,
    /// The speaker asking most of the questions.
    Customer,
    /// The speaker fielding the questions.
    Consultant,
}

impl SpeakerRole {
    /// Returns the wire-format string for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Unknown => "unknown",
            SpeakerRole::Customer => "customer",
            SpeakerRole::Consultant => "consultant",
        }
    }
}

/// Classification of a generated suggestion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// A direct answer the consultant can relay.
    #[default]
    Answer,
    /// A discovery question the consultant should ask.
    Question,
    /// A handler for customer pushback.
    Objection,
    /// Background information worth knowing, no action required.
    Info,
}

impl SuggestionKind {
    /// Returns the wire-format string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Answer => "answer",
            SuggestionKind::Question => "question",
            SuggestionKind::Objection => "objection",
            SuggestionKind::Info => "info",
        }
    }
}

/// Where a suggestion's content came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Generated from conversation history alone.
    Model,
    /// Generated with grounding context from the knowledge index.
    ModelGrounded,
    /// Produced by a scripted backend (tests, development without keys).
    Scripted,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionSource::Model => "model",
            SuggestionSource::ModelGrounded => "model_grounded",
            SuggestionSource::Scripted => "scripted",
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Unique identifier for a call session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Transcription confidence. Range: 0.0 (no confidence) to 1.0 (certain).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(pub f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

/// Relevance score for retrieval results. Range: 0.0 (no match) to 1.0
/// (identical).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SimilarityScore(pub f64);

impl SimilarityScore {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

// =============================================================================
// Entity Structs (defined in murmur-core for shared use)
// =============================================================================

/// A single word within a transcript, with timing and speaker attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
    /// Numeric speaker id from diarization, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
}

/// A transcription result emitted by the stream, partial or final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub speaker_id: u32,
    pub speaker_role: SpeakerRole,
    pub is_final: bool,
    pub confidence: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub words: Vec<WordInfo>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    /// Display label for the speaker ("Speaker 0", "Speaker 1", ...).
    pub fn speaker_label(&self) -> String {
        format!("Speaker {}", self.speaker_id)
    }

    /// Utterance duration derived from first/last word boundaries.
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}

/// One turn of conversation history kept by the suggestion agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// An advisory message produced for the consultant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub confidence: f64,
    pub kind: SuggestionKind,
    pub source: SuggestionSource,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
