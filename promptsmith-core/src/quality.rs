//! Observability-only quality scores for agent responses.
//!
//! These scores never gate validity; they are attached to turns so that
//! transcripts can be compared across sessions.

use crate::agent::AgentRole;
use crate::context::AgentContext;
use crate::text;
use crate::turn::MessageCategory;
use serde::{Deserialize, Serialize};

const JARGON: &[&str] = &["utilize", "leverage", "synergize", "paradigm", "holistic"];
const ITERATION_WORDS: &[&str] = &["iteration", "refine", "improve", "feedback", "revise"];

/// Independent 0-1 scores for one response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub clarity: f64,
    pub completeness: f64,
    pub relevance: f64,
    pub structure: f64,
    pub readability: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor;

impl QualityAssessor {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(
        &self,
        text: &str,
        role: AgentRole,
        category: MessageCategory,
        context: &AgentContext,
    ) -> QualityReport {
        let clarity = Self::clarity(text);
        let completeness = Self::completeness(text, role, category);
        let relevance = Self::relevance(text, context);
        let structure = Self::structure(text);
        let readability = Self::readability(text);
        let overall = (clarity + completeness + relevance + structure + readability) / 5.0;

        QualityReport {
            clarity,
            completeness,
            relevance,
            structure,
            readability,
            overall,
        }
    }

    pub fn clarity(text: &str) -> f64 {
        let mut score: f64 = 0.5;

        let long_sentences = text::sentences(text)
            .iter()
            .filter(|s| s.split_whitespace().count() > 25)
            .count();
        if long_sentences > 0 {
            score -= (long_sentences as f64 * 0.1).min(0.3);
        }
        if text::header_count(text) > 0 {
            score += 0.2;
        }
        if text::bullet_count(text) > 0 {
            score += 0.2;
        }

        let jargon = text::count_indicators(text, JARGON);
        if jargon > 2 {
            score -= (jargon as f64 * 0.05).min(0.2);
        }

        score.clamp(0.0, 1.0)
    }

    pub fn completeness(text: &str, role: AgentRole, category: MessageCategory) -> f64 {
        let mut score: f64 = 0.5;

        let elements: &[&str] = match (role, category) {
            (AgentRole::ProductManager, MessageCategory::Requirement) => {
                &["user", "need", "requirement", "feature"]
            }
            (AgentRole::Developer, MessageCategory::TechnicalSolution) => {
                &["solution", "implement", "approach", "technical"]
            }
            (AgentRole::TeamLead, MessageCategory::Approval) => &["approve", "accept", "good"],
            (AgentRole::TeamLead, MessageCategory::Rejection) => &["improve", "suggest", "modify"],
            _ => &[],
        };
        if !elements.is_empty() {
            let found = text::count_indicators(text, elements);
            score += found as f64 / elements.len() as f64 * 0.3;
        }

        if text.split_whitespace().count() > 50 {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    pub fn relevance(text: &str, context: &AgentContext) -> f64 {
        let Some(mut score) = text::overlap_ratio(&context.requirements, text) else {
            return 0.5;
        };

        if context.current_iteration > 0 && text::contains_any(text, ITERATION_WORDS) {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    pub fn structure(text: &str) -> f64 {
        let mut score: f64 = 0.3;

        let headers = text::header_count(text);
        if headers > 0 {
            score += (headers as f64 * 0.1).min(0.3);
        }
        let bullets = text::bullet_count(text);
        if bullets > 0 {
            score += (bullets as f64 * 0.05).min(0.2);
        }
        let numbered = text::numbered_count(text);
        if numbered > 0 {
            score += (numbered as f64 * 0.05).min(0.2);
        }
        let code_blocks = text::code_block_count(text);
        if code_blocks > 0 {
            score += (code_blocks as f64 * 0.1).min(0.2);
        }

        score.clamp(0.0, 1.0)
    }

    pub fn readability(text: &str) -> f64 {
        let mut score: f64 = 0.5;

        if let Some(average) = text::average_sentence_words(text) {
            if (10.0..=20.0).contains(&average) {
                score += 0.3;
            } else if (5.0..=25.0).contains(&average) {
                score += 0.2;
            } else {
                score -= 0.1;
            }
        }

        let paragraphs: Vec<&str> = text::paragraphs(text)
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            let words: usize = paragraphs.iter().map(|p| p.split_whitespace().count()).sum();
            let average = words as f64 / paragraphs.len() as f64;
            if (30.0..=100.0).contains(&average) {
                score += 0.2;
            } else if average > 150.0 {
                score -= 0.1;
            }
        }

        score.clamp(0.0, 1.0)
    }
}
