//! Generation request assembly
//!
//! The manager renders the role's system prompt and the mode's task
//! template against an [`AgentContext`], appends the shared context
//! sections and picks the sampling profile for the invocation.

use crate::{renderer::PromptRenderer, templates, Result};
use promptsmith_core::agent::{AgentMode, AgentRole};
use promptsmith_core::config::AgentProfiles;
use promptsmith_core::context::AgentContext;
use promptsmith_core::generation::{ChatMessage, GenerationRequest};
use std::collections::HashMap;
use tracing::debug;

const NO_REQUIREMENTS: &str = "No requirements available yet.";
const NO_SOLUTION: &str = "No candidate prompt available yet.";
const NO_FEEDBACK: &str = "No feedback yet.";
const NO_INPUT: &str = "None.";

/// Builds generation requests for agent invocations
#[derive(Debug, Clone, Default)]
pub struct PromptManager {
    renderer: PromptRenderer,
    profiles: AgentProfiles,
}

impl PromptManager {
    /// Create a new prompt manager
    pub fn new(profiles: AgentProfiles) -> Self {
        Self {
            renderer: PromptRenderer::new(),
            profiles,
        }
    }

    pub fn profiles(&self) -> &AgentProfiles {
        &self.profiles
    }

    /// Assemble the request for `mode` against `context`
    pub fn build_request(&self, mode: AgentMode, context: &AgentContext) -> Result<GenerationRequest> {
        let role = mode.role();
        let variables = Self::variables(context);

        let mut system_prompt = self
            .renderer
            .render(templates::system_template(role), &variables)?;
        system_prompt.push_str(&Self::context_sections(role, context));
        system_prompt.push_str("\n\nAdditional Instructions: ");
        system_prompt.push_str(templates::mode_instructions(mode));

        let task = self
            .renderer
            .render(templates::task_template(mode), &variables)?;

        let profile = self
            .profiles
            .for_role(role, mode == AgentMode::FinalApproval);
        debug!(
            "Built {} request for session {} ({} chars, temperature {})",
            mode.as_str(),
            context.session_id,
            system_prompt.len() + task.len(),
            profile.temperature
        );

        Ok(GenerationRequest {
            system_prompt,
            messages: vec![ChatMessage::user(task)],
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        })
    }

    fn variables(context: &AgentContext) -> HashMap<&'static str, String> {
        let latest = |role: AgentRole, fallback: &str| {
            context
                .latest(role)
                .map(|output| output.content.clone())
                .unwrap_or_else(|| fallback.to_string())
        };
        let user_inputs = if context.pending_inputs.is_empty() {
            NO_INPUT.to_string()
        } else {
            context
                .pending_inputs
                .iter()
                .map(|input| format!("- {}", input))
                .collect::<Vec<_>>()
                .join("\n")
        };

        HashMap::from([
            ("requirements", context.requirements.clone()),
            (
                "iteration",
                (context.current_iteration + 1)
                    .min(context.max_iterations)
                    .to_string(),
            ),
            ("max_iterations", context.max_iterations.to_string()),
            (
                "product_requirements",
                latest(AgentRole::ProductManager, NO_REQUIREMENTS),
            ),
            ("technical_solution", latest(AgentRole::Developer, NO_SOLUTION)),
            ("feedback", latest(AgentRole::TeamLead, NO_FEEDBACK)),
            ("user_inputs", user_inputs),
        ])
    }

    fn context_sections(role: AgentRole, context: &AgentContext) -> String {
        let mut out = String::new();

        if !context.supplementary_inputs.is_empty() {
            out.push_str("\n\n=== SUPPLEMENTARY USER INPUTS ===");
            for (i, input) in context.supplementary_inputs.iter().enumerate() {
                out.push_str(&format!("\n{}. {}", i + 1, input));
            }
        }

        let transcript: Vec<String> = context
            .history
            .iter()
            .filter(|turn| !turn.is_failure() && turn.role != Some(role))
            .map(|turn| format!("{}: {}", turn.speaker(), turn.content))
            .collect();
        if !transcript.is_empty() {
            out.push_str("\n\n=== RECENT CONVERSATION ===\n");
            out.push_str(&transcript.join("\n\n"));
        }

        if context.can_request_input() {
            out.push_str(&format!(
                "\n\nThe user can still answer {} more question(s).",
                context.max_interventions - context.user_intervention_count
            ));
        } else {
            out.push_str("\n\nThe user cannot be asked further questions; make reasonable assumptions.");
        }

        out
    }
}
