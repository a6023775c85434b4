//! The per-call suggestion decision loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use murmur_core::config::AgentConfig;
use murmur_core::types::{ConversationTurn, Suggestion, SuggestionSource};
use murmur_rag::Retriever;

use crate::classify::{classify_suggestion, score_confidence};
use crate::generation::GenerationService;

/// Exact backend reply meaning "nothing to add this turn".
pub const NO_SUGGESTION_SENTINEL: &str = "NO_SUGGESTION";

/// Utterances shorter than this many words are ignored.
const MIN_UTTERANCE_WORDS: usize = 2;

/// System prompts shorter than this are rejected as configuration mistakes.
const MIN_SYSTEM_PROMPT_CHARS: usize = 50;

/// System prompts longer than this are truncated rather than rejected.
const MAX_SYSTEM_PROMPT_CHARS: usize = 20_000;

/// How many recent turns are rendered into the generation prompt.
const PROMPT_HISTORY_TURNS: usize = 5;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a real-time copilot for a solutions consultant on a \
live sales call. You see the conversation as it happens and occasionally offer short, specific \
advice: answers to customer questions, discovery questions worth asking, and ways to handle \
pushback. Be extremely concise; the consultant can only glance at your output. Never invent \
pricing or capabilities.";

/// Decision-loop state, for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Evaluating,
    Cooldown,
}

/// Continuous-participant agent for one call.
///
/// Failure semantics: retrieval and generation failures never propagate; the
/// loop yields no suggestion and stays usable for the next utterance.
pub struct SuggestionAgent {
    backend: Arc<dyn GenerationService>,
    retriever: Option<Arc<Retriever>>,
    system_prompt: String,
    history: VecDeque<ConversationTurn>,
    history_cap: usize,
    cooldown: Duration,
    last_suggestion_at: Option<tokio::time::Instant>,
    state: AgentState,
}

impl SuggestionAgent {
    pub fn new(
        config: &AgentConfig,
        backend: Arc<dyn GenerationService>,
        retriever: Option<Arc<Retriever>>,
    ) -> Self {
        Self {
            backend,
            retriever,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history: VecDeque::new(),
            history_cap: config.history_turns,
            cooldown: Duration::from_secs(config.cooldown_secs),
            last_suggestion_at: None,
            state: AgentState::Idle,
        }
    }

    /// Feed one utterance through the decision loop.
    ///
    /// Only final utterances of at least two words are considered. Inside
    /// the cooldown window nothing is generated. A sentinel reply yields no
    /// suggestion and leaves the cooldown untouched; a substantive reply is
    /// classified, scored, and resets the cooldown.
    pub async fn process_utterance(
        &mut self,
        text: &str,
        speaker: &str,
        is_final: bool,
    ) -> Option<Suggestion> {
        if !is_final {
            return None;
        }
        if text.split_whitespace().count() < MIN_UTTERANCE_WORDS {
            return None;
        }

        self.push_turn(speaker, text);

        if let Some(last) = self.last_suggestion_at {
            if last.elapsed() < self.cooldown {
                self.state = AgentState::Cooldown;
                debug!("Within cooldown window; skipping generation");
                return None;
            }
        }
        self.state = AgentState::Evaluating;

        let grounding = self.retrieve_grounding(text).await;
        let prompt = self.build_prompt(grounding.as_deref());

        let response = match self.backend.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Generation failed; no suggestion this turn");
                self.state = AgentState::Idle;
                return None;
            }
        };

        let trimmed = response.trim();
        if trimmed.is_empty() || trimmed == NO_SUGGESTION_SENTINEL {
            self.state = AgentState::Idle;
            return None;
        }

        let kind = classify_suggestion(trimmed);
        let confidence = score_confidence(trimmed);
        let source = if self.backend.scripted() {
            SuggestionSource::Scripted
        } else if grounding.is_some() {
            SuggestionSource::ModelGrounded
        } else {
            SuggestionSource::Model
        };

        self.last_suggestion_at = Some(tokio::time::Instant::now());
        self.state = AgentState::Cooldown;

        info!(?kind, confidence, "Suggestion generated");

        Some(Suggestion {
            text: trimmed.to_string(),
            confidence,
            kind,
            source,
            timestamp: Utc::now(),
        })
    }

    /// Replace the system prompt.
    ///
    /// Empty or too-short input keeps the previous prompt; overlong input is
    /// truncated rather than rejected.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        let trimmed = prompt.trim();
        if trimmed.len() < MIN_SYSTEM_PROMPT_CHARS {
            warn!(
                chars = trimmed.len(),
                "Rejected system prompt below minimum length; keeping previous"
            );
            return;
        }

        if trimmed.len() > MAX_SYSTEM_PROMPT_CHARS {
            let mut end = MAX_SYSTEM_PROMPT_CHARS;
            while end > 0 && !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            warn!(
                original_chars = trimmed.len(),
                "Truncating overlong system prompt"
            );
            self.system_prompt = trimmed[..end].to_string();
        } else {
            self.system_prompt = trimmed.to_string();
        }
    }

    /// Empty history and cooldown state; the configured prompt stays.
    pub fn clear_session(&mut self) {
        self.history.clear();
        self.last_suggestion_at = None;
        self.state = AgentState::Idle;
        debug!("Agent session cleared");
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn push_turn(&mut self, speaker: &str, text: &str) {
        self.history.push_back(ConversationTurn {
            speaker: speaker.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// Retrieve grounding context; any failure degrades to "no context".
    async fn retrieve_grounding(&self, query: &str) -> Option<String> {
        let retriever = self.retriever.as_ref()?;
        match retriever.retrieve(query, None, None).await {
            Ok(result) if result.has_relevant_content => Some(result.context_text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Retrieval failed; continuing without context");
                None
            }
        }
    }

    fn build_prompt(&self, grounding: Option<&str>) -> String {
        let mut prompt = self.system_prompt.clone();

        if !self.history.is_empty() {
            prompt.push_str("\n\nRECENT CONVERSATION:\n");
            let skip = self.history.len().saturating_sub(PROMPT_HISTORY_TURNS);
            for turn in self.history.iter().skip(skip) {
                prompt.push_str(&format!("[{}]: {}\n", turn.speaker, turn.text));
            }
        }

        if let Some(context) = grounding {
            prompt.push_str("\n\nRELEVANT KNOWLEDGE BASE CONTENT:\n");
            prompt.push_str(context);
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "\n\nIf you have specific, valuable advice for the consultant right now, reply with \
             it in at most four short lines. If there is nothing worth adding, reply with \
             exactly {}.",
            NO_SUGGESTION_SENTINEL
        ));

        prompt
    }
}
