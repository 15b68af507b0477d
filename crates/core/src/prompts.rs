//! Prompt templates.
//!
//! Defaults are compiled in from `crates/core/prompts/*.md`. A deployment can
//! override any of them by file stem (e.g. `decompose.md`), the same way the
//! service loads its prompt directory at startup.

use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Prompts {
    pub decompose: String,
    pub fact_explain: String,
    pub explain: String,
    pub synthesis: String,
    pub single_concept: String,
    pub evaluate: String,
    pub hint: String,
    pub remedial: String,
    pub assistant: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            decompose: include_str!("../prompts/decompose.md").to_string(),
            fact_explain: include_str!("../prompts/fact_explain.md").to_string(),
            explain: include_str!("../prompts/explain.md").to_string(),
            synthesis: include_str!("../prompts/synthesis.md").to_string(),
            single_concept: include_str!("../prompts/single_concept.md").to_string(),
            evaluate: include_str!("../prompts/evaluate.md").to_string(),
            hint: include_str!("../prompts/hint.md").to_string(),
            remedial: include_str!("../prompts/remedial.md").to_string(),
            assistant: include_str!("../prompts/assistant.md").to_string(),
        }
    }
}

impl Prompts {
    /// Starts from the defaults and replaces every template named in `overrides`.
    /// Unknown keys are ignored.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut prompts = Self::default();
        for (key, template) in overrides {
            let slot = match key.as_str() {
                "decompose" => &mut prompts.decompose,
                "fact_explain" => &mut prompts.fact_explain,
                "explain" => &mut prompts.explain,
                "synthesis" => &mut prompts.synthesis,
                "single_concept" => &mut prompts.single_concept,
                "evaluate" => &mut prompts.evaluate,
                "hint" => &mut prompts.hint,
                "remedial" => &mut prompts.remedial,
                "assistant" => &mut prompts.assistant,
                other => {
                    debug!(prompt = %other, "Ignoring unknown prompt override");
                    continue;
                }
            };
            *slot = template.clone();
        }
        prompts
    }
}

/// Substitutes `{name}` placeholders in one pass over the template.
/// Inserted values are never rescanned; unknown placeholders stay as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let template = template.trim();
    let mut text = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                text.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_every_occurrence() {
        let text = render("{topic} needs {topic}", &[("topic", "Light")]);
        assert_eq!(text, "Light needs Light");
    }

    #[test]
    fn render_leaves_inserted_values_alone() {
        let text = render(
            "Q: {question}\nA: {answer}\nUses: {prerequisites}",
            &[
                ("question", "What is {answer}?"),
                ("answer", "my set is {prerequisites} here"),
                ("prerequisites", "Light, Water"),
            ],
        );
        assert_eq!(
            text,
            "Q: What is {answer}?\nA: my set is {prerequisites} here\nUses: Light, Water"
        );
    }

    #[test]
    fn render_keeps_unknown_and_unclosed_braces() {
        let text = render("{topic} in {unknown} and {open", &[("topic", "Light")]);
        assert_eq!(text, "Light in {unknown} and {open");
    }

    #[test]
    fn defaults_carry_placeholders() {
        let prompts = Prompts::default();
        assert!(prompts.decompose.contains("{topic}"));
        assert!(prompts.explain.contains("{known}"));
        assert!(prompts.evaluate.contains("VERDICT:"));
    }

    #[test]
    fn overrides_replace_known_keys_only() {
        let overrides = HashMap::from([
            ("hint".to_string(), "Think about {missing}.".to_string()),
            ("system_prompt".to_string(), "unused".to_string()),
        ]);
        let prompts = Prompts::with_overrides(&overrides);
        assert_eq!(prompts.hint, "Think about {missing}.");
        assert_eq!(prompts.decompose, Prompts::default().decompose);
    }
}
