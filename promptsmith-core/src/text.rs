//! Lexical helpers shared by the classifier, validator, assessor and ledger search.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();
static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();
static SENTENCE_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s+").expect("valid header pattern"))
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"(?m)^\s*[-*+]\s+").expect("valid bullet pattern"))
}

fn numbered_re() -> &'static Regex {
    NUMBERED_RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s+").expect("valid numbered pattern"))
}

fn sentence_re() -> &'static Regex {
    SENTENCE_RE.get_or_init(|| Regex::new(r"[.!?]+").expect("valid sentence pattern"))
}

/// Words excluded from the search index.
pub const STOP_WORDS: &[&str] = &["this", "that", "with", "from", "they", "have", "been"];

/// Lowercased whitespace-separated words.
pub fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Distinct lowercased whitespace-separated words.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Search tokens: alphanumeric runs longer than three characters, minus stop words.
pub fn index_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Number of distinct indicators that occur (case-insensitively) in `text`.
pub fn count_indicators<S: AsRef<str>>(text: &str, indicators: &[S]) -> usize {
    let lower = text.to_lowercase();
    indicators
        .iter()
        .filter(|indicator| lower.contains(&indicator.as_ref().to_lowercase()))
        .count()
}

/// Whether any indicator occurs (case-insensitively) in `text`.
pub fn contains_any<S: AsRef<str>>(text: &str, indicators: &[S]) -> bool {
    count_indicators(text, indicators) > 0
}

/// Non-empty sentences split on terminal punctuation.
pub fn sentences(text: &str) -> Vec<&str> {
    sentence_re()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Average words per sentence, `None` when the text has no sentences.
pub fn average_sentence_words(text: &str) -> Option<f64> {
    let sentences = sentences(text);
    if sentences.is_empty() {
        return None;
    }
    let total: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    Some(total as f64 / sentences.len() as f64)
}

/// Blank-line separated paragraphs, untrimmed.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").collect()
}

pub fn header_count(text: &str) -> usize {
    header_re().find_iter(text).count()
}

pub fn bullet_count(text: &str) -> usize {
    bullet_re().find_iter(text).count()
}

pub fn numbered_count(text: &str) -> usize {
    numbered_re().find_iter(text).count()
}

/// Complete pairs of triple-backtick fences.
pub fn code_block_count(text: &str) -> usize {
    text.matches("```").count() / 2
}

/// Markdown headers, bullet lists or numbered lists at line start.
pub fn has_structure(text: &str) -> bool {
    header_count(text) > 0 || bullet_count(text) > 0 || numbered_count(text) > 0
}

/// Fraction of requirement words that also appear in `content`.
pub fn overlap_ratio(requirements: &str, content: &str) -> Option<f64> {
    let required = word_set(requirements);
    if required.is_empty() {
        return None;
    }
    let present = word_set(content);
    let shared = required.intersection(&present).count();
    Some(shared as f64 / required.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_indicators_counts_distinct_matches() {
        let text = "Approve it. I approve. Approved!";
        assert_eq!(count_indicators(text, &["approve", "approved", "reject"]), 2);
    }

    #[test]
    fn test_index_tokens_skip_short_and_stop_words() {
        let tokens = index_tokens("This API has been designed with caching layers");
        assert!(tokens.contains("designed"));
        assert!(tokens.contains("caching"));
        assert!(!tokens.contains("this"));
        assert!(!tokens.contains("api"));
        assert!(!tokens.contains("been"));
    }

    #[test]
    fn test_structure_detection() {
        assert!(has_structure("# Title\nbody"));
        assert!(has_structure("intro\n- item"));
        assert!(has_structure("intro\n1. first"));
        assert!(!has_structure("plain prose with a dash - inside"));
    }

    #[test]
    fn test_average_sentence_words() {
        assert_eq!(average_sentence_words("One two three. Four five six."), Some(3.0));
        assert_eq!(average_sentence_words("   "), None);
    }

    #[test]
    fn test_overlap_ratio() {
        let ratio = overlap_ratio("build a todo app", "a todo list").unwrap();
        assert!((ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(overlap_ratio("", "anything"), None);
    }
}
