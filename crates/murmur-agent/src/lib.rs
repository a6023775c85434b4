//! Continuous-participant suggestion engine.
//!
//! The agent holds a rolling conversation history and a cooldown timer per
//! call, asks the generative-model backend whether there is anything worth
//! saying, optionally grounds the prompt in retrieved knowledge, and
//! classifies substantive replies into suggestion kinds.

pub mod agent;
pub mod classify;
pub mod generation;

pub use agent::{AgentState, SuggestionAgent, NO_SUGGESTION_SENTINEL};
pub use classify::{classify_suggestion, score_confidence};
pub use generation::{
    FailingBackend, GenerationService, HttpGenerationClient, RecordingBackend, ScriptedBackend,
};
