//! Suggestion classification and confidence scoring.
//!
//! Lightweight content markers only; no model calls. Marker lists mirror the
//! phrasing the generation prompt asks for, so classification stays stable
//! across backends.

use murmur_core::types::SuggestionKind;

/// Markers indicating the suggestion handles customer pushback.
const OBJECTION_MARKERS: &[&str] = &[
    "objection",
    "pushback",
    "push back",
    "if they hesitate",
    "concern",
    "reassure",
];

/// Markers indicating the suggestion is a question for the consultant to ask.
const QUESTION_MARKERS: &[&str] = &[
    "ask:",
    "ask them",
    "suggest asking",
    "worth asking",
    "discovery question",
];

/// Markers indicating background information with no direct action.
const INFO_MARKERS: &[&str] = &["for context", "fyi", "background:", "keep in mind", "note:"];

/// Markers that lower confidence in a generated response.
const UNCERTAINTY_MARKERS: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "i don't know",
    "might be",
    "possibly",
    "unclear",
];

/// Markers of structured, scannable output.
const STRUCTURE_MARKERS: &[&str] = &["**", "- ", "* ", "\u{2022} "];

/// Classify a substantive response into a suggestion kind.
pub fn classify_suggestion(text: &str) -> SuggestionKind {
    let lower = text.to_lowercase();

    if OBJECTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return SuggestionKind::Objection;
    }
    if QUESTION_MARKERS.iter().any(|m| lower.contains(m)) || lower.trim_end().ends_with('?') {
        return SuggestionKind::Question;
    }
    if INFO_MARKERS.iter().any(|m| lower.contains(m)) {
        return SuggestionKind::Info;
    }
    SuggestionKind::Answer
}

/// Heuristic confidence for a generated response.
///
/// Base 0.7, with bonuses for structure and reasonable length and a penalty
/// for hedging language. Clamped to [0, 1].
pub fn score_confidence(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let mut confidence: f64 = 0.7;
    let lower = text.to_lowercase();

    if STRUCTURE_MARKERS.iter().any(|m| text.contains(m)) {
        confidence += 0.1;
    }

    let word_count = text.split_whitespace().count();
    if (50..=300).contains(&word_count) {
        confidence += 0.1;
    }

    if UNCERTAINTY_MARKERS.iter().any(|m| lower.contains(m)) {
        confidence -= 0.2;
    }

    confidence.clamp(0.0, 1.0)
}
