//! Response validation and confidence scoring
//!
//! The validator runs a fixed battery of checks over an agent's output and
//! turns the resulting issues into a confidence score. Validity is strictly
//! "no CRITICAL and no ERROR issues"; everything else only lowers confidence.
//!
//! Auto-correction is limited to whitespace normalization and promoting the
//! first line of long unstructured text to a heading. Corrected text is
//! returned alongside the result and is never substituted by the validator.

use crate::agent::AgentRole;
use crate::context::AgentContext;
use crate::text;
use crate::turn::MessageCategory;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Confidence deducted per issue of this severity
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 0.5,
            Severity::Error => 0.2,
            Severity::Warning => 0.1,
            Severity::Info => 0.05,
        }
    }

    /// Whether an issue of this severity makes a response invalid
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// A single finding produced by the validator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new<C: Into<String>, M: Into<String>>(severity: Severity, code: C, message: M) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of validating one response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub issues: Vec<ValidationIssue>,
    pub corrected_text: Option<String>,
}

impl ValidationResult {
    pub fn has_severity(&self, severity: Severity) -> bool {
        self.issues.iter().any(|i| i.severity == severity)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// Highest severity present, if any issue was raised
    pub fn worst(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Summary of blocking issues, suitable for an error message
    pub fn blocking_summary(&self) -> String {
        self.issues
            .iter()
            .filter(|i| i.severity.is_blocking())
            .map(|i| format!("{} {}: {}", i.severity, i.code, i.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

const MIN_CONTENT_CHARS: usize = 10;
const MAX_WHITESPACE_RATIO: f64 = 0.5;
const MIN_CONTEXT_OVERLAP: f64 = 0.1;
const MAX_AVG_SENTENCE_WORDS: f64 = 30.0;
const MIN_AVG_SENTENCE_WORDS: f64 = 5.0;
const MAX_PARAGRAPH_CHARS: usize = 500;
const STRUCTURE_THRESHOLD_CHARS: usize = 200;

const REQUIREMENT_INDICATORS: &[&str] = &[
    "requirement",
    "specification",
    "user need",
    "functionality",
    "feature",
];
const USER_FOCUS_INDICATORS: &[&str] = &["user", "customer", "need", "want", "expect", "experience"];
const TECHNICAL_INDICATORS: &[&str] = &[
    "solution",
    "approach",
    "implementation",
    "architecture",
    "technical",
];
const FEASIBILITY_INDICATORS: &[&str] = &[
    "feasible",
    "possible",
    "practical",
    "implementable",
    "achievable",
];
const APPROVAL_WORDING: &[&str] = &[
    "approve", "accept", "agree", "endorse", "confirm", "good", "excellent",
];
const CONSTRUCTIVE_WORDING: &[&str] = &["improve", "suggest", "recommend", "modify", "adjust", "enhance"];

static HORIZONTAL_WS_RE: OnceLock<Regex> = OnceLock::new();
static BLANK_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn horizontal_ws_re() -> &'static Regex {
    HORIZONTAL_WS_RE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid whitespace pattern"))
}

fn blank_run_re() -> &'static Regex {
    BLANK_RUN_RE.get_or_init(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("valid blank-line pattern"))
}

/// Role-aware response validator
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator;

impl ResponseValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `text` produced by `role` under `category`.
    pub fn validate(
        &self,
        text: &str,
        role: AgentRole,
        category: MessageCategory,
        context: &AgentContext,
    ) -> ValidationResult {
        let mut issues = self.basic_checks(text);

        if issues.iter().any(|i| i.code == "EMPTY_CONTENT") {
            return ValidationResult {
                is_valid: false,
                confidence: 0.0,
                issues,
                corrected_text: None,
            };
        }

        issues.extend(self.role_checks(text, role, category));
        issues.extend(self.context_checks(text, category, context));
        issues.extend(self.format_checks(text, role, category));
        issues.extend(self.quality_checks(text));

        let is_valid = !issues.iter().any(|i| i.severity.is_blocking());
        let confidence = Self::confidence(&issues, text);
        let corrected_text = Self::corrections(text, &issues);

        debug!(
            "Validated {} {} response: valid={}, confidence={:.2}, issues={}",
            role,
            category,
            is_valid,
            confidence,
            issues.len()
        );

        ValidationResult {
            is_valid,
            confidence,
            issues,
            corrected_text,
        }
    }

    fn basic_checks(&self, text: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            issues.push(ValidationIssue::new(
                Severity::Critical,
                "EMPTY_CONTENT",
                "Response content is empty",
            ));
            return issues;
        }

        if trimmed.chars().count() < MIN_CONTENT_CHARS {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "CONTENT_TOO_SHORT",
                format!("Response must be at least {} characters", MIN_CONTENT_CHARS),
            ));
        }

        let total = text.chars().count();
        let blank = text.chars().filter(|c| c.is_whitespace()).count();
        if blank as f64 > total as f64 * MAX_WHITESPACE_RATIO {
            issues.push(ValidationIssue::new(
                Severity::Warning,
                "EXCESSIVE_WHITESPACE",
                "Response contains excessive whitespace",
            ));
        }

        let words = text::words(text);
        if words.len() > 10 {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for word in &words {
                *counts.entry(word.as_str()).or_default() += 1;
            }
            let mut repeated: Vec<&str> = counts
                .into_iter()
                .filter(|(_, n)| *n > 3)
                .map(|(w, _)| w)
                .collect();
            if !repeated.is_empty() {
                repeated.sort_unstable();
                repeated.truncate(5);
                issues.push(ValidationIssue::new(
                    Severity::Warning,
                    "REPEATED_CONTENT",
                    format!("Response repeats words: {}", repeated.join(", ")),
                ));
            }
        }

        issues
    }

    fn role_checks(
        &self,
        text: &str,
        role: AgentRole,
        category: MessageCategory,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        match (role, category) {
            (AgentRole::ProductManager, MessageCategory::Requirement) => {
                if !text::contains_any(text, REQUIREMENT_INDICATORS) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "MISSING_REQUIREMENT_INDICATORS",
                        "Requirements response does not state requirements explicitly",
                    ));
                }
                if !text::contains_any(text, USER_FOCUS_INDICATORS) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "MISSING_USER_FOCUS",
                        "Requirements response does not address users or their needs",
                    ));
                }
            }
            (AgentRole::ProductManager, MessageCategory::Clarification) => {
                if !text.contains('?') {
                    issues.push(ValidationIssue::new(
                        Severity::Error,
                        "MISSING_QUESTIONS",
                        "Clarification response contains no questions",
                    ));
                }
            }
            (AgentRole::Developer, MessageCategory::TechnicalSolution) => {
                if !text::contains_any(text, TECHNICAL_INDICATORS) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "MISSING_TECHNICAL_INDICATORS",
                        "Technical response does not describe a solution or approach",
                    ));
                }
                if !text::contains_any(text, FEASIBILITY_INDICATORS) {
                    issues.push(ValidationIssue::new(
                        Severity::Info,
                        "MISSING_FEASIBILITY_ASSESSMENT",
                        "Technical response does not assess feasibility",
                    ));
                }
            }
            (AgentRole::TeamLead, MessageCategory::Approval) => {
                if !text::contains_any(text, APPROVAL_WORDING) {
                    issues.push(ValidationIssue::new(
                        Severity::Error,
                        "MISSING_APPROVAL_INDICATORS",
                        "Approval response lacks explicit approval wording",
                    ));
                }
            }
            (AgentRole::TeamLead, MessageCategory::Rejection) => {
                if !text::contains_any(text, CONSTRUCTIVE_WORDING) {
                    issues.push(ValidationIssue::new(
                        Severity::Warning,
                        "MISSING_CONSTRUCTIVE_FEEDBACK",
                        "Rejection response lacks constructive feedback",
                    ));
                }
            }
            _ => {}
        }

        issues
    }

    fn context_checks(
        &self,
        text: &str,
        category: MessageCategory,
        context: &AgentContext,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if let Some(ratio) = text::overlap_ratio(&context.requirements, text) {
            if ratio < MIN_CONTEXT_OVERLAP {
                issues.push(ValidationIssue::new(
                    Severity::Warning,
                    "LOW_CONTEXT_RELEVANCE",
                    format!(
                        "Response shares only {:.0}% of the requirement wording",
                        ratio * 100.0
                    ),
                ));
            }
        }

        if context.current_iteration > 0
            && matches!(
                category,
                MessageCategory::Requirement | MessageCategory::TechnicalSolution
            )
        {
            let lower = text.to_lowercase();
            if !lower.contains("iteration") && !lower.contains("refine") {
                issues.push(ValidationIssue::new(
                    Severity::Info,
                    "MISSING_ITERATION_AWARENESS",
                    "Response does not acknowledge it refines an earlier iteration",
                ));
            }
        }

        issues
    }

    fn format_checks(
        &self,
        text: &str,
        role: AgentRole,
        category: MessageCategory,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let length = text.trim().chars().count();

        if length > STRUCTURE_THRESHOLD_CHARS && !text::has_structure(text) {
            issues.push(ValidationIssue::new(
                Severity::Info,
                "MISSING_STRUCTURE",
                "Long responses should use headers or lists",
            ));
        }

        if role == AgentRole::Developer
            && category == MessageCategory::TechnicalSolution
            && !text.contains("```")
            && length > 100
        {
            issues.push(ValidationIssue::new(
                Severity::Info,
                "MISSING_CODE_BLOCKS",
                "Technical solution has no fenced code examples",
            ));
        }

        issues
    }

    fn quality_checks(&self, text: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if let Some(average) = text::average_sentence_words(text) {
            if average > MAX_AVG_SENTENCE_WORDS {
                issues.push(ValidationIssue::new(
                    Severity::Info,
                    "LONG_SENTENCES",
                    format!("Average sentence length is {:.1} words", average),
                ));
            } else if average < MIN_AVG_SENTENCE_WORDS {
                issues.push(ValidationIssue::new(
                    Severity::Info,
                    "SHORT_SENTENCES",
                    format!("Average sentence length is {:.1} words", average),
                ));
            }
        }

        let paragraphs = text::paragraphs(text);
        if paragraphs.len() > 1
            && paragraphs
                .iter()
                .any(|p| p.trim().chars().count() > MAX_PARAGRAPH_CHARS)
        {
            issues.push(ValidationIssue::new(
                Severity::Info,
                "LONG_PARAGRAPHS",
                format!("A paragraph exceeds {} characters", MAX_PARAGRAPH_CHARS),
            ));
        }

        issues
    }

    /// Start at 1.0, subtract per-issue penalties, floor at 0, add bonuses, cap at 1.
    pub fn confidence(issues: &[ValidationIssue], text: &str) -> f64 {
        let penalties: f64 = issues.iter().map(|i| i.severity.penalty()).sum();
        let mut score = (1.0 - penalties).max(0.0);

        let length = text.trim().chars().count();
        if length > 100 {
            score += 0.1;
        }
        if length > 500 {
            score += 0.1;
        }
        if text::has_structure(text) {
            score += 0.1;
        }

        score.min(1.0)
    }

    fn corrections(text: &str, issues: &[ValidationIssue]) -> Option<String> {
        let mut corrected = text.to_string();

        if issues.iter().any(|i| i.code == "EXCESSIVE_WHITESPACE") {
            corrected = normalize_whitespace(&corrected);
        }

        if issues.iter().any(|i| i.code == "MISSING_STRUCTURE")
            && corrected.chars().count() > STRUCTURE_THRESHOLD_CHARS
            && !corrected.contains('#')
        {
            let mut lines: Vec<String> = corrected.lines().map(str::to_string).collect();
            if lines.len() > 3 {
                lines[0] = format!("# {}", lines[0].trim());
                corrected = lines.join("\n");
            }
        }

        (corrected != text).then_some(corrected)
    }
}

/// Collapse horizontal whitespace runs, strip line ends and squeeze blank lines.
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed: Vec<String> = text
        .lines()
        .map(|line| horizontal_ws_re().replace_all(line.trim(), " ").into_owned())
        .collect();
    let joined = collapsed.join("\n");
    blank_run_re()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}
