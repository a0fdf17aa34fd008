//! Regex-based extraction of user preferences from conversation history.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ConversationTurn;

const PREFERENCE_PATTERNS: &[&str] = &[
    r"\bi like ([\w\s]+)",
    r"\bi prefer ([\w\s]+)",
    r"\bi want ([\w\s]+)",
    r"\bi'm interested in ([\w\s]+)",
    r"\bi need ([\w\s]+)",
    r"\bfocus on ([\w\s]+)",
    r"\bspecifically ([\w\s]+)",
];

const CONSTRAINT_PATTERNS: &[&str] = &[
    r"\bmust be ([\w\s]+)",
    r"\bshould be ([\w\s]+)",
    r"\bneeds to be ([\w\s]+)",
    r"\bhas to be ([\w\s]+)",
    r"\bwithin ([\w\s]+)",
    r"\bbudget of ([\w\s]+)",
];

const NEGATION_PATTERNS: &[&str] = &[
    r"\bnot ([\w\s]+)",
    r"\bdon't want ([\w\s]+)",
    r"\bavoid ([\w\s]+)",
    r"\bexcept ([\w\s]+)",
];

/// Captures shorter than this are noise ("it", "me").
const MIN_CAPTURE_CHARS: usize = 3;

/// Everything the tracker found across a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSummary {
    /// Things the user likes or wants, first-seen order.
    pub preferences: Vec<String>,
    /// Requirements the answer must satisfy.
    pub constraints: Vec<String>,
    /// Things to leave out.
    pub negations: Vec<String>,
    /// One-line rendering of all of the above.
    pub combined_context: String,
}

impl PreferenceSummary {
    /// More than one distinct preference was stated
    pub fn has_multiple_preferences(&self) -> bool {
        self.preferences.len() > 1
    }

    /// Nothing was found
    pub fn is_empty(&self) -> bool {
        self.combined_context.is_empty()
    }
}

/// Pulls preferences, constraints and negations out of user queries.
pub struct PreferenceTracker {
    preference_patterns: Vec<Regex>,
    constraint_patterns: Vec<Regex>,
    negation_patterns: Vec<Regex>,
}

impl Default for PreferenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceTracker {
    /// Create a tracker with the built-in phrase patterns
    pub fn new() -> Self {
        Self {
            preference_patterns: compile(PREFERENCE_PATTERNS),
            constraint_patterns: compile(CONSTRAINT_PATTERNS),
            negation_patterns: compile(NEGATION_PATTERNS),
        }
    }

    /// Scan every user query in the history
    pub fn extract(&self, history: &[ConversationTurn]) -> PreferenceSummary {
        let mut preferences = Vec::new();
        let mut constraints = Vec::new();
        let mut negations = Vec::new();

        for turn in history {
            let query = turn.query_text.to_lowercase();
            collect(&self.preference_patterns, &query, &mut preferences);
            collect(&self.constraint_patterns, &query, &mut constraints);
            collect(&self.negation_patterns, &query, &mut negations);
        }

        let combined_context = combine(&preferences, &constraints, &negations);

        debug!(
            preferences = preferences.len(),
            constraints = constraints.len(),
            negations = negations.len(),
            "Preferences extracted"
        );

        PreferenceSummary {
            preferences,
            constraints,
            negations,
            combined_context,
        }
    }

    /// Render a prompt block; empty when nothing was found
    pub fn build_context_prompt(&self, summary: &PreferenceSummary) -> String {
        if summary.is_empty() {
            return String::new();
        }

        let mut prompt = format!(
            "=== USER PREFERENCES (CUMULATIVE) ===\n{}\n\n",
            summary.combined_context
        );

        if summary.has_multiple_preferences() {
            let combined = summary.preferences.join(" + ");
            prompt.push_str(&format!(
                "CRITICAL - DO NOT IGNORE:\n\
                 The user wants ideas that combine ALL of these: {combined}\n\
                 Your answer MUST include ONLY ideas that have ALL these elements together.\n\
                 DO NOT give separate ideas for each interest.\n\
                 COMBINE {combined} in EVERY single idea you provide.\n\n"
            ));
        }

        prompt
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %p, error = %e, "Skipping invalid preference pattern");
                None
            }
        })
        .collect()
}

fn collect(patterns: &[Regex], text: &str, into: &mut Vec<String>) {
    for pattern in patterns {
        for captures in pattern.captures_iter(text) {
            let Some(capture) = captures.get(1) else {
                continue;
            };
            let value = capture.as_str().trim();
            if value.chars().count() < MIN_CAPTURE_CHARS {
                continue;
            }
            if !into.iter().any(|existing| existing == value) {
                into.push(value.to_string());
            }
        }
    }
}

fn combine(preferences: &[String], constraints: &[String], negations: &[String]) -> String {
    let mut parts = Vec::new();

    match preferences {
        [] => {}
        [only] => parts.push(format!("User is interested in {}", only)),
        [first, second] => parts.push(format!("User is interested in {} AND {}", first, second)),
        [init @ .., last] => parts.push(format!(
            "User is interested in {}, AND {}",
            init.join(", "),
            last
        )),
    }
    if preferences.len() > 1 {
        parts.push(format!(
            "CRITICAL: User wants ideas that combine ALL of these interests: {}",
            preferences.join(" + ")
        ));
    }
    if !constraints.is_empty() {
        parts.push(format!("Constraints: {}", constraints.join(", ")));
    }
    if !negations.is_empty() {
        parts.push(format!("Exclude: {}", negations.join(", ")));
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn turns(queries: &[&str]) -> Vec<ConversationTurn> {
        queries.iter().map(|q| ConversationTurn::new(*q, "")).collect()
    }

    #[test]
    fn test_single_preference() {
        let tracker = PreferenceTracker::new();
        let summary = tracker.extract(&turns(&["I like healthcare"]));
        assert_eq!(summary.preferences, vec!["healthcare".to_string()]);
        assert_eq!(summary.combined_context, "User is interested in healthcare");
        assert!(!summary.has_multiple_preferences());
    }

    #[test]
    fn test_preferences_accumulate_across_turns() {
        let tracker = PreferenceTracker::new();
        let summary = tracker.extract(&turns(&[
            "I'm interested in healthcare. Any ideas?",
            "Now I like technology",
            "I like healthcare",
        ]));
        assert_eq!(
            summary.preferences,
            vec!["healthcare".to_string(), "technology".to_string()]
        );
        assert_eq!(
            summary.combined_context,
            "User is interested in healthcare AND technology. \
             CRITICAL: User wants ideas that combine ALL of these interests: healthcare + technology"
        );
    }

    #[test]
    fn test_three_preferences_listing() {
        let tracker = PreferenceTracker::new();
        let summary = tracker.extract(&turns(&["I like art", "I like music", "I like food"]));
        assert!(summary
            .combined_context
            .starts_with("User is interested in art, music, AND food"));
    }

    #[test]
    fn test_constraints_and_negations() {
        let tracker = PreferenceTracker::new();
        let summary = tracker.extract(&turns(&[
            "It must be cheap, and I don't want subscriptions",
        ]));
        assert_eq!(summary.constraints, vec!["cheap".to_string()]);
        assert_eq!(summary.negations, vec!["subscriptions".to_string()]);
        assert_eq!(
            summary.combined_context,
            "Constraints: cheap. Exclude: subscriptions"
        );
    }

    #[test]
    fn test_short_captures_dropped() {
        let tracker = PreferenceTracker::new();
        let summary = tracker.extract(&turns(&["I want it"]));
        assert!(summary.preferences.is_empty());
        assert!(summary.is_empty());
        assert_eq!(tracker.build_context_prompt(&summary), "");
    }

    #[test]
    fn test_context_prompt_blocks() {
        let tracker = PreferenceTracker::new();
        let single = tracker.extract(&turns(&["I like hiking"]));
        let prompt = tracker.build_context_prompt(&single);
        assert!(prompt.starts_with("=== USER PREFERENCES (CUMULATIVE) ===\nUser is interested in hiking"));
        assert!(!prompt.contains("CRITICAL - DO NOT IGNORE"));

        let multiple = tracker.extract(&turns(&["I like hiking", "I like photography"]));
        let prompt = tracker.build_context_prompt(&multiple);
        assert!(prompt.contains("CRITICAL - DO NOT IGNORE"));
        assert!(prompt.contains("combine ALL of these: hiking + photography"));
    }
}
