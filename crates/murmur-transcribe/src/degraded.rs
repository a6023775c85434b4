//! Degraded producer mode: deterministic scripted transcripts.
//!
//! Selected explicitly when no upstream provider is configured or reachable,
//! so the rest of the pipeline (speaker roles, suggestions, delivery) stays
//! exercisable without credentials. This is a first-class strategy behind the
//! same interface as the real provider, not a hidden fallback.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use murmur_core::error::MurmurError;

use crate::provider::{
    ProviderEvent, ProviderStream, RawTranscript, StreamParams, TranscriptionProvider,
};

/// Scripted utterances cycled by the degraded source.
const SCRIPTED_PHRASES: &[&str] = &[
    "What does your pricing look like for a migration of our size?",
    "How long would the initial rollout usually take?",
    "Can you walk me through your compliance certifications?",
    "What does the support model look like after go live?",
    "How would this connect to the systems we already run?",
];

/// Synthetic utterance length reported for scripted transcripts, in seconds.
const SCRIPTED_UTTERANCE_SECS: f64 = 2.0;

/// A provider stream that emits one scripted transcript per interval.
///
/// Audio is accepted and discarded. Transcripts are final, attributed to
/// speaker 0, and cycle deterministically through `SCRIPTED_PHRASES`.
pub struct DegradedTranscriptionSource {
    interval: Duration,
    phrase_index: usize,
    audio_chunks_discarded: u64,
    /// Deadline of the next emission. Kept across cancelled polls so that
    /// interleaved audio traffic cannot starve the emission cadence.
    next_emit: Option<tokio::time::Instant>,
}

impl DegradedTranscriptionSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            phrase_index: 0,
            audio_chunks_discarded: 0,
            next_emit: None,
        }
    }

    /// Number of audio sends accepted and dropped so far.
    pub fn audio_chunks_discarded(&self) -> u64 {
        self.audio_chunks_discarded
    }
}

#[async_trait]
impl ProviderStream for DegradedTranscriptionSource {
    async fn send_audio(&mut self, _bytes: &[u8]) -> Result<(), MurmurError> {
        self.audio_chunks_discarded += 1;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ProviderEvent> {
        let deadline = *self
            .next_emit
            .get_or_insert_with(|| tokio::time::Instant::now() + self.interval);
        tokio::time::sleep_until(deadline).await;
        self.next_emit = None;

        let phrase = SCRIPTED_PHRASES[self.phrase_index % SCRIPTED_PHRASES.len()];
        self.phrase_index += 1;

        debug!(phrase, "Degraded source produced scripted transcript");

        Some(ProviderEvent::Transcript(RawTranscript {
            text: phrase.to_string(),
            is_final: true,
            confidence: 0.95,
            words: Vec::new(),
            start: 0.0,
            end: SCRIPTED_UTTERANCE_SECS,
        }))
    }

    async fn close(&mut self) -> Result<(), MurmurError> {
        Ok(())
    }
}

/// Provider whose connections are always degraded sources.
///
/// Used when configuration carries no provider endpoint, and by tests that
/// need deterministic transcripts.
#[derive(Debug, Clone)]
pub struct DegradedProvider {
    interval: Duration,
}

impl DegradedProvider {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl TranscriptionProvider for DegradedProvider {
    async fn connect(&self, _params: &StreamParams) -> Result<Box<dyn ProviderStream>, MurmurError> {
        Ok(Box::new(DegradedTranscriptionSource::new(self.interval)))
    }
}
