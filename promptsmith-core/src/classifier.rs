//! Decision classifier for Team Lead output
//!
//! Maps free text to one of four outcomes using keyword evidence. The keyword
//! sets live in a [`KeywordTable`] so deployments can tune them without
//! touching the decision rules.
//!
//! Decision rules, with `a`, `r` and `q` the number of distinct approval,
//! rejection and question indicators present:
//!
//! 1. `r > a` gives [`Decision::Rejection`]
//! 2. `a > r` and `a > 0` gives [`Decision::Approval`]
//! 3. `q > 2` or `current_iteration < max_iterations - 1` gives [`Decision::Question`]
//! 4. anything else is [`Decision::Review`]
//!
//! # Forced convergence on final iteration
//!
//! In the last allowed round the classifier switches to a terminal policy:
//! the text is a rejection only when a strong-rejection phrase is present,
//! otherwise it is an approval. This keeps every session inside its
//! iteration budget.
//!
//! ```rust
//! use promptsmith_core::classifier::{DecisionClassifier, Decision};
//!
//! let classifier = DecisionClassifier::default();
//! assert_eq!(classifier.decide("approve this solution, it looks great", 0, 3), Decision::Approval);
//! assert_eq!(classifier.decide("a few small gaps remain", 2, 3), Decision::Approval);
//! assert_eq!(classifier.decide("fundamental problems remain", 2, 3), Decision::Rejection);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::text::count_indicators;

/// Outcome category of a classified turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approval,
    Rejection,
    Question,
    Review,
}

/// Tunable keyword sets used by the classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordTable {
    pub approval: Vec<String>,
    pub rejection: Vec<String>,
    pub question: Vec<String>,
    pub strong_rejection: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            approval: owned(&[
                "approve",
                "approved",
                "approval",
                "accept",
                "accepted",
                "good to go",
                "ready for implementation",
                "implement",
                "proceed",
                "move forward",
                "excellent",
                "perfect",
                "well done",
                "great job",
            ]),
            rejection: owned(&[
                "reject",
                "rejected",
                "rejection",
                "not ready",
                "needs work",
                "inadequate",
                "insufficient",
                "missing",
                "incomplete",
                "unclear",
                "rethink",
                "redo",
                "start over",
                "major issues",
            ]),
            question: owned(&[
                "question",
                "clarify",
                "explain",
                "elaborate",
                "more detail",
                "unclear",
                "confusing",
                "what",
                "how",
                "why",
                "when",
                "where",
            ]),
            strong_rejection: owned(&[
                "cannot approve",
                "strongly reject",
                "major issues",
                "fundamental problems",
                "completely inadequate",
                "not acceptable",
                "serious concerns",
            ]),
        }
    }
}

/// Indicator counts behind a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub approval: usize,
    pub rejection: usize,
    pub question: usize,
    pub strong_rejection: usize,
}

/// Keyword-evidence classifier
#[derive(Debug, Clone, Default)]
pub struct DecisionClassifier {
    keywords: KeywordTable,
}

impl DecisionClassifier {
    pub fn new(keywords: KeywordTable) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Count indicator matches in `text`
    pub fn evidence(&self, text: &str) -> Evidence {
        Evidence {
            approval: count_indicators(text, &self.keywords.approval),
            rejection: count_indicators(text, &self.keywords.rejection),
            question: count_indicators(text, &self.keywords.question),
            strong_rejection: count_indicators(text, &self.keywords.strong_rejection),
        }
    }

    /// Classify with the ordinary rules.
    pub fn classify(&self, text: &str, current_iteration: u32, max_iterations: u32) -> Decision {
        let evidence = self.evidence(text);
        let decision = if evidence.rejection > evidence.approval {
            Decision::Rejection
        } else if evidence.approval > evidence.rejection && evidence.approval > 0 {
            Decision::Approval
        } else if evidence.question > 2 || current_iteration + 1 < max_iterations {
            Decision::Question
        } else {
            Decision::Review
        };

        debug!(
            "Classified text as {:?} (approval={}, rejection={}, question={})",
            decision, evidence.approval, evidence.rejection, evidence.question
        );
        decision
    }

    /// Terminal policy: rejection only on a strong-rejection phrase.
    pub fn classify_final(&self, text: &str) -> Decision {
        let strong = count_indicators(text, &self.keywords.strong_rejection);
        if strong > 0 {
            Decision::Rejection
        } else {
            Decision::Approval
        }
    }

    /// Whether `current_iteration` is the last allowed round
    pub fn is_final_round(current_iteration: u32, max_iterations: u32) -> bool {
        current_iteration + 1 >= max_iterations
    }

    /// Pick the policy for the round and classify.
    pub fn decide(&self, text: &str, current_iteration: u32, max_iterations: u32) -> Decision {
        if Self::is_final_round(current_iteration, max_iterations) {
            let decision = self.classify_final(text);
            debug!(
                "Forced convergence at iteration {}/{}: {:?}",
                current_iteration, max_iterations, decision
            );
            decision
        } else {
            self.classify(text, current_iteration, max_iterations)
        }
    }
}

static FEEDBACK_QUESTION_RE: OnceLock<Regex> = OnceLock::new();
static EXPLICIT_QUESTION_RE: OnceLock<Regex> = OnceLock::new();

fn feedback_question_re() -> &'static Regex {
    FEEDBACK_QUESTION_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:what|how|why|when|where|who) ([^?]+?)\?")
            .expect("valid feedback question pattern")
    })
}

fn explicit_question_re() -> &'static Regex {
    EXPLICIT_QUESTION_RE
        .get_or_init(|| Regex::new(r"[^.!?]*\?").expect("valid explicit question pattern"))
}

/// Fallback question when a rejection names no specific questions
pub const GENERIC_FEEDBACK_QUESTION: &str =
    "Could you address the specific issues mentioned in the feedback?";

/// Questions the next agent (or the user) should answer, derived from a verdict.
///
/// Rejections yield the interrogative clauses they contain, or a generic
/// follow-up. Questions yield up to three explicit `?` sentences.
pub fn extract_feedback_questions(decision: Decision, text: &str) -> Vec<String> {
    match decision {
        Decision::Rejection => {
            let mut questions: Vec<String> = feedback_question_re()
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| format!("{}?", m.as_str().trim()))
                .filter(|q| q.chars().count() > 10)
                .collect();
            questions.dedup();
            if questions.is_empty() {
                questions.push(GENERIC_FEEDBACK_QUESTION.to_string());
            }
            questions
        }
        Decision::Question => explicit_question_re()
            .find_iter(text)
            .map(|m| m.as_str().trim().to_string())
            .filter(|q| q.chars().count() > 10)
            .take(3)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("approve this solution, it looks great", 0, 3, Decision::Approval)]
    #[case("this is rejected, major issues with scalability", 0, 3, Decision::Rejection)]
    #[case("It is incomplete and unclear, but I approve of the direction", 0, 5, Decision::Rejection)]
    #[case("Please explain the caching and clarify what the retry budget is", 2, 5, Decision::Question)]
    #[case("Some thoughts on the layout", 0, 3, Decision::Question)]
    #[case("Some thoughts on the layout", 3, 3, Decision::Review)]
    fn test_classify_rules(
        #[case] text: &str,
        #[case] current: u32,
        #[case] max: u32,
        #[case] expected: Decision,
    ) {
        let classifier = DecisionClassifier::default();
        assert_eq!(classifier.classify(text, current, max), expected);
    }

    #[test]
    fn test_evidence_counts_distinct_indicators() {
        let classifier = DecisionClassifier::default();
        let evidence = classifier.evidence("this is rejected, major issues with scalability");
        // "reject", "rejected" and "major issues"
        assert_eq!(evidence.rejection, 3);
        assert_eq!(evidence.approval, 0);
        assert_eq!(evidence.strong_rejection, 1);
    }

    #[test]
    fn test_forced_convergence_on_final_iteration() {
        let classifier = DecisionClassifier::default();
        assert_eq!(
            classifier.decide("This still needs work and is incomplete", 2, 3),
            Decision::Approval
        );
        assert_eq!(
            classifier.decide("I cannot approve this design", 2, 3),
            Decision::Rejection
        );
        // Not final yet: ordinary rules apply
        assert_eq!(
            classifier.decide("This still needs work and is incomplete", 1, 3),
            Decision::Rejection
        );
    }

    #[test]
    fn test_single_iteration_budget_is_always_final() {
        let classifier = DecisionClassifier::default();
        assert!(DecisionClassifier::is_final_round(0, 1));
        assert_eq!(classifier.decide("hmm", 0, 1), Decision::Approval);
    }

    #[test]
    fn test_custom_keyword_table() {
        let table = KeywordTable {
            approval: vec!["lgtm".to_string()],
            ..KeywordTable::default()
        };
        let classifier = DecisionClassifier::new(table);
        assert_eq!(classifier.classify("LGTM, ship it", 0, 3), Decision::Approval);
    }

    #[test]
    fn test_keyword_table_deserializes_partially() {
        let table: KeywordTable =
            serde_json::from_str(r#"{"strong_rejection": ["veto"]}"#).unwrap();
        assert_eq!(table.strong_rejection, vec!["veto".to_string()]);
        assert!(!table.approval.is_empty());
    }

    #[test]
    fn test_extract_feedback_questions_from_rejection() {
        let text = "Rejected. How will the service handle offline clients? Also why is there no cache?";
        let questions = extract_feedback_questions(Decision::Rejection, text);
        assert_eq!(
            questions,
            vec![
                "will the service handle offline clients?".to_string(),
                "is there no cache?".to_string()
            ]
        );

        let generic = extract_feedback_questions(Decision::Rejection, "Rejected outright.");
        assert_eq!(generic, vec![GENERIC_FEEDBACK_QUESTION.to_string()]);
    }

    #[test]
    fn test_extract_explicit_questions() {
        let text = "Good start. Which database do you prefer? Is offline mode needed? Ok? Who are the main users?  Do we need audit logs?";
        let questions = extract_feedback_questions(Decision::Question, text);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "Which database do you prefer?");
        assert!(extract_feedback_questions(Decision::Approval, text).is_empty());
    }

    proptest! {
        #[test]
        fn prop_neutral_text_before_final_round_is_question(
            current in 0u32..8,
            extra in 2u32..6,
        ) {
            let max = current + extra;
            let classifier = DecisionClassifier::default();
            prop_assert_eq!(classifier.classify("the layout uses three panels", current, max), Decision::Question);
        }

        #[test]
        fn prop_final_round_without_strong_rejection_approves(text in "[a-z ]{0,80}") {
            let classifier = DecisionClassifier::default();
            prop_assume!(classifier.evidence(&text).strong_rejection == 0);
            prop_assert_eq!(classifier.decide(&text, 4, 5), Decision::Approval);
        }
    }
}
