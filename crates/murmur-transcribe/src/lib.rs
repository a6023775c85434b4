//! Streaming transcription: provider contract, speaker-role inference, and
//! the per-call stream state machine.
//!
//! One `TranscriptionStream` is owned by each call session. It buffers
//! outbound audio, drives the upstream provider connection (with capped
//! reconnection backoff), resolves speaker roles, and emits
//! `TranscriptEvent`s on a channel. When no provider is reachable the stream
//! runs on a `DegradedTranscriptionSource` that produces deterministic
//! scripted transcripts, keeping the rest of the pipeline alive.

pub mod degraded;
pub mod provider;
pub mod speaker;
pub mod stream;

pub use degraded::{DegradedProvider, DegradedTranscriptionSource};
pub use provider::{
    ProviderEvent, ProviderStream, RawTranscript, RawWord, StreamParams, TranscriptionProvider,
    WsTranscriptionProvider,
};
pub use speaker::{SpeakerProfile, SpeakerTracker};
pub use stream::{StreamState, TranscriptionStream};
