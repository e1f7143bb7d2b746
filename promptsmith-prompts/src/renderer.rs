//! Prompt template rendering functionality

use crate::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
    })
}

/// Renders prompt templates with `{{variable}}` substitution
#[derive(Debug, Clone, Default)]
pub struct PromptRenderer;

impl PromptRenderer {
    /// Create a new prompt renderer
    pub fn new() -> Self {
        Self
    }

    /// Names of the placeholders a template uses, in first-use order
    pub fn variables(template: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for captures in placeholder_re().captures_iter(template) {
            let name = &captures[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Render a template with the provided variables
    pub fn render(&self, template: &str, variables: &HashMap<&str, String>) -> Result<String> {
        for name in Self::variables(template) {
            if !variables.contains_key(name.as_str()) {
                return Err(Error::MissingVariable { name });
            }
        }

        let rendered = placeholder_re().replace_all(template, |captures: &regex::Captures| {
            variables
                .get(&captures[1])
                .cloned()
                .unwrap_or_default()
        });

        // Values are inserted verbatim; leftover braces mean a malformed template
        if template.contains("{{") && Self::variables(template).is_empty() {
            return Err(Error::InvalidTemplate(
                "Template contains '{{' without a valid placeholder".to_string(),
            ));
        }
        if rendered.contains("{{") && rendered.contains("}}") {
            warn!("Rendered prompt still contains braces; a variable value may carry template syntax");
        }

        Ok(rendered.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_renders_all_occurrences() {
        let renderer = PromptRenderer::new();
        let rendered = renderer
            .render(
                "Goal: {{requirements}}. Again: {{ requirements }} ({{iteration}})",
                &vars(&[("requirements", "a recipe bot"), ("iteration", "2")]),
            )
            .unwrap();
        assert_eq!(rendered, "Goal: a recipe bot. Again: a recipe bot (2)");
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let renderer = PromptRenderer::new();
        assert_matches!(
            renderer.render("{{requirements}} / {{feedback}}", &vars(&[("requirements", "x")])),
            Err(Error::MissingVariable { name }) if name == "feedback"
        );
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let renderer = PromptRenderer::new();
        let rendered = renderer
            .render("{{a}}", &vars(&[("a", "{{b}}"), ("b", "nope")]))
            .unwrap();
        assert_eq!(rendered, "{{b}}");
    }

    #[test]
    fn test_malformed_template() {
        let renderer = PromptRenderer::new();
        assert_matches!(
            renderer.render("Hello {{ }}", &HashMap::new()),
            Err(Error::InvalidTemplate(_))
        );
    }

    #[test]
    fn test_variables_in_first_use_order() {
        assert_eq!(
            PromptRenderer::variables("{{b}} {{a}} {{b}}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }
}
