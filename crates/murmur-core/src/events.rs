use serde::{Deserialize, Serialize};

use crate::types::{SessionId, SpeakerRole, SuggestionKind};

/// Domain events published by the session layer.
///
/// Events are emitted on a broadcast channel after state changes and consumed
/// by observability listeners and tests. They are not part of the client wire
/// protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    /// A client connected and a session was registered.
    SessionOpened { session_id: SessionId },

    /// A session was deregistered.
    SessionClosed {
        session_id: SessionId,
        messages: u64,
        audio_chunks: u64,
        transcripts_sent: u64,
        suggestions_sent: u64,
    },

    /// A transcript frame was delivered to the client.
    TranscriptDelivered {
        session_id: SessionId,
        speaker_id: u32,
        speaker_role: SpeakerRole,
        is_final: bool,
    },

    /// A suggestion frame was delivered to the client.
    SuggestionDelivered {
        session_id: SessionId,
        kind: SuggestionKind,
        confidence: f64,
    },

    /// Delivery to a session's transport failed; the session is degraded.
    DeliveryFailed { session_id: SessionId },

    /// The upstream transcription connection entered degraded mode.
    StreamDegraded { session_id: SessionId },
}

impl DomainEvent {
    /// Returns the session this event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            DomainEvent::SessionOpened { session_id }
            | DomainEvent::SessionClosed { session_id, .. }
            | DomainEvent::TranscriptDelivered { session_id, .. }
            | DomainEvent::SuggestionDelivered { session_id, .. }
            | DomainEvent::DeliveryFailed { session_id }
            | DomainEvent::StreamDegraded { session_id } => *session_id,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::SessionOpened { .. } => "session_opened",
            DomainEvent::SessionClosed { .. } => "session_closed",
            DomainEvent::TranscriptDelivered { .. } => "transcript_delivered",
            DomainEvent::SuggestionDelivered { .. } => "suggestion_delivered",
            DomainEvent::DeliveryFailed { .. } => "delivery_failed",
            DomainEvent::StreamDegraded { .. } => "stream_degraded",
        }
    }
}
