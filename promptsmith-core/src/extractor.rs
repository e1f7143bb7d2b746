//! Final-artifact extraction from the Team Lead's approval message

use regex::Regex;
use std::sync::OnceLock;

static SECTION_RE: OnceLock<Regex> = OnceLock::new();

fn section_re() -> &'static Regex {
    SECTION_RE.get_or_init(|| {
        Regex::new(r"(?i)#?[ \t]*final prompt[ \t]*:?[ \t]*\n?").expect("valid section pattern")
    })
}

/// Lines containing any of these (case-insensitively) are boilerplate.
const BOILERPLATE: &[&str] = &["#", "approval", "approved", "summary"];

/// Pull the finalized prompt out of an approval message.
///
/// Looks for a "Final Prompt" section first and returns its body up to the
/// next heading or blank line. Otherwise drops header and boilerplate lines.
/// Never returns an empty string for non-empty input.
pub fn extract(approval_text: &str) -> String {
    if let Some(section) = final_prompt_section(approval_text) {
        return section;
    }

    let kept: Vec<&str> = approval_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            !BOILERPLATE.iter().any(|marker| lower.contains(marker))
        })
        .collect();

    if kept.is_empty() {
        approval_text.to_string()
    } else {
        kept.join("\n")
    }
}

fn final_prompt_section(text: &str) -> Option<String> {
    let found = section_re().find(text)?;
    let rest = &text[found.end()..];
    let end = [rest.find("\n#"), rest.find("\n\n")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    let body = rest[..end].trim();
    (!body.is_empty()).then(|| body.to_string())
}
