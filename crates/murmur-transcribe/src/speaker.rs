//! Speaker-role inference from utterance statistics.
//!
//! The speaker who asks more questions is taken to be the customer. Roles
//! are assigned once and never flip for the rest of the session.

use std::collections::HashMap;

use murmur_core::types::SpeakerRole;

/// Minimum combined questions across the two most inquisitive speakers
/// before roles are assigned.
const MIN_COMBINED_QUESTIONS: u64 = 3;

/// Words that mark an utterance as a question when it starts with one.
const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "would", "should",
    "is", "are", "do", "does", "did", "tell me",
];

/// Running statistics for one speaker id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeakerProfile {
    pub utterance_count: u64,
    pub question_count: u64,
    pub word_count: u64,
    pub total_duration: f64,
}

/// Incrementally infers customer/consultant roles per numeric speaker id.
#[derive(Debug, Default)]
pub struct SpeakerTracker {
    stats: HashMap<u32, SpeakerProfile>,
    roles: HashMap<u32, SpeakerRole>,
}

impl SpeakerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an utterance and return the speaker's current role.
    ///
    /// Roles are assigned once at least two distinct speakers have produced
    /// three or more questions combined, with a strict majority deciding who
    /// the customer is. An assignment persists until `reset`.
    pub fn track(
        &mut self,
        speaker_id: u32,
        text: &str,
        duration: f64,
        word_count: u64,
    ) -> SpeakerRole {
        let profile = self.stats.entry(speaker_id).or_default();
        profile.utterance_count += 1;
        profile.word_count += word_count;
        profile.total_duration += duration.max(0.0);

        if is_question(text) {
            profile.question_count += 1;
        }

        self.update_role_assignments();

        self.get_role(speaker_id)
    }

    /// Current role for a speaker, `Unknown` if unassigned.
    pub fn get_role(&self, speaker_id: u32) -> SpeakerRole {
        self.roles
            .get(&speaker_id)
            .copied()
            .unwrap_or(SpeakerRole::Unknown)
    }

    /// Statistics accumulated for a speaker, if any were recorded.
    pub fn profile(&self, speaker_id: u32) -> Option<&SpeakerProfile> {
        self.stats.get(&speaker_id)
    }

    /// Forget all statistics and role assignments.
    pub fn reset(&mut self) {
        self.stats.clear();
        self.roles.clear();
    }

    fn update_role_assignments(&mut self) {
        // Assignment is monotonic: once made it stands until reset.
        if !self.roles.is_empty() {
            return;
        }
        if self.stats.len() < 2 {
            return;
        }

        let mut by_questions: Vec<(u32, u64)> = self
            .stats
            .iter()
            .map(|(id, profile)| (*id, profile.question_count))
            .collect();
        by_questions.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let (top_id, top_q) = by_questions[0];
        let (next_id, next_q) = by_questions[1];

        if top_q + next_q >= MIN_COMBINED_QUESTIONS && top_q > next_q {
            self.roles.insert(top_id, SpeakerRole::Customer);
            self.roles.insert(next_id, SpeakerRole::Consultant);
        }
    }
}

/// An utterance counts as a question if it ends with `?` or starts with a
/// fixed interrogative word.
fn is_question(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    lower.ends_with('?') || QUESTION_WORDS.iter().any(|qw| lower.starts_with(qw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_question(tracker: &mut SpeakerTracker, speaker: u32, text: &str) -> SpeakerRole {
        tracker.track(speaker, text, 2.0, text.split_whitespace().count() as u64)
    }

    #[test]
    fn test_single_speaker_stays_unknown() {
        let mut tracker = SpeakerTracker::new();
        for _ in 0..10 {
            let role = track_question(&mut tracker, 0, "what is the price?");
            assert_eq!(role, SpeakerRole::Unknown);
        }
    }

    #[test]
    fn test_roles_assigned_after_three_questions() {
        let mut tracker = SpeakerTracker::new();
        track_question(&mut tracker, 1, "we support that platform");
        track_question(&mut tracker, 0, "what about security?");
        track_question(&mut tracker, 0, "how long is onboarding?");
        assert_eq!(tracker.get_role(0), SpeakerRole::Unknown);

        track_question(&mut tracker, 0, "can we start next month?");
        assert_eq!(tracker.get_role(0), SpeakerRole::Customer);
        assert_eq!(tracker.get_role(1), SpeakerRole::Consultant);
    }

    #[test]
    fn test_no_assignment_below_combined_threshold() {
        let mut tracker = SpeakerTracker::new();
        track_question(&mut tracker, 0, "what is this?");
        track_question(&mut tracker, 1, "let me explain the details");
        track_question(&mut tracker, 0, "why though?");
        // Only 2 combined questions.
        assert_eq!(tracker.get_role(0), SpeakerRole::Unknown);
        assert_eq!(tracker.get_role(1), SpeakerRole::Unknown);
    }

    #[test]
    fn test_no_assignment_on_tie() {
        let mut tracker = SpeakerTracker::new();
        track_question(&mut tracker, 0, "what about support?");
        track_question(&mut tracker, 0, "how much is it?");
        track_question(&mut tracker, 1, "which region are you in?");
        track_question(&mut tracker, 1, "when would you start?");
        // 2 vs 2: no strict majority.
        assert_eq!(tracker.get_role(0), SpeakerRole::Unknown);
        assert_eq!(tracker.get_role(1), SpeakerRole::Unknown);
    }

    #[test]
    fn test_spec_scenario_four_questions_vs_zero() {
        let mut tracker = SpeakerTracker::new();
        for text in [
            "what is your pricing?",
            "how does support work?",
            "can you integrate with our stack?",
            "when could we go live?",
        ] {
            track_question(&mut tracker, 0, text);
        }
        track_question(&mut tracker, 1, "happy to walk you through it");

        assert_eq!(tracker.get_role(0), SpeakerRole::Customer);
        assert_eq!(tracker.get_role(1), SpeakerRole::Consultant);
    }

    #[test]
    fn test_assignment_is_monotonic() {
        let mut tracker = SpeakerTracker::new();
        track_question(&mut tracker, 0, "what is the sla?");
        track_question(&mut tracker, 0, "how fast is failover?");
        track_question(&mut tracker, 0, "who handles incidents?");
        track_question(&mut tracker, 1, "good question");
        assert_eq!(tracker.get_role(0), SpeakerRole::Customer);

        // Speaker 1 now out-questions speaker 0; the assignment must hold.
        for _ in 0..10 {
            track_question(&mut tracker, 1, "what would you like to know?");
        }
        assert_eq!(tracker.get_role(0), SpeakerRole::Customer);
        assert_eq!(tracker.get_role(1), SpeakerRole::Consultant);
    }

    #[test]
    fn test_reset_clears_roles_and_stats() {
        let mut tracker = SpeakerTracker::new();
        track_question(&mut tracker, 0, "what is this?");
        track_question(&mut tracker, 0, "how does it work?");
        track_question(&mut tracker, 0, "why is it better?");
        track_question(&mut tracker, 1, "let me show you");
        assert_eq!(tracker.get_role(0), SpeakerRole::Customer);

        tracker.reset();
        assert_eq!(tracker.get_role(0), SpeakerRole::Unknown);
        assert!(tracker.profile(0).is_none());
    }

    #[test]
    fn test_profile_accumulates() {
        let mut tracker = SpeakerTracker::new();
        tracker.track(3, "what is the plan?", 1.5, 4);
        tracker.track(3, "we should talk pricing", 2.5, 4);

        let profile = tracker.profile(3).unwrap();
        assert_eq!(profile.utterance_count, 2);
        assert_eq!(profile.question_count, 1);
        assert_eq!(profile.word_count, 8);
        assert!((profile.total_duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_duration_clamped() {
        let mut tracker = SpeakerTracker::new();
        tracker.track(0, "hello", -3.0, 1);
        assert_eq!(tracker.profile(0).unwrap().total_duration, 0.0);
    }

    #[test]
    fn test_question_detection() {
        assert!(is_question("what do you offer"));
        assert!(is_question("Tell me about your roadmap"));
        assert!(is_question("that works for us?"));
        assert!(is_question("  Could you repeat that  "));
        assert!(!is_question("we are ready to proceed"));
        assert!(!is_question(""));
        assert!(!is_question("   "));
    }
}
