//! Prompt templates for reasoning calls.
//!
//! Built-in templates can be overridden per name by `{prompts_dir}/{name}.md`.
//! Placeholders are `{{name}}`; rendering fails if any remain unfilled.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").unwrap());

pub const ASSUMPTIONS: &str = "assumptions";
pub const GENERATION: &str = "generation";
pub const VALIDATION: &str = "validation";
pub const BATCH_VALIDATION: &str = "batch_validation";
pub const SCORING: &str = "scoring";

const BUILTIN: [(&str, &str, &[&str]); 5] = [
    (
        ASSUMPTIONS,
        r#"You are a market analyst. Turn the operator's assumptions below into concrete search keywords.

Assumptions:
{{assumptions}}

Respond with JSON only: [{"keyword": "...", "context": "why it matters"}]"#,
        &["assumptions"],
    ),
    (
        GENERATION,
        r#"You generate business ideas that can be built on public-data APIs.

Recent market signals (JSON):
{{signals}}

Catalog domains available:
{{domains}}

Services already proposed in the last 24 hours (do not repeat):
{{recent_services}}

Operator feedback:
{{feedback}}

Propose distinct hypotheses. Respond with JSON only:
{"hypotheses": [{"id": "H-001", "service_name": "...", "problem": "...", "solution": "...",
"target_buyer": "...", "revenue_model": "...", "opportunity_area": "...",
"data_needs": [{"field_name": "...", "description": "...", "priority": "required"}]}]}"#,
        &["signals", "domains", "recent_services", "feedback"],
    ),
    (
        VALIDATION,
        r#"Assess this business idea. Rate each item from 0.0 to 1.0.

{{idea}}

- timing_fit: how well the idea fits current market timing
- revenue_reference: strength of comparable revenue evidence
- mvp_difficulty: ease of building an MVP (1.0 = easy)

Respond with JSON only: {"timing_fit": 0.0, "revenue_reference": 0.0, "mvp_difficulty": 0.0}"#,
        &["idea"],
    ),
    (
        BATCH_VALIDATION,
        r#"Assess each business idea below. Rate each item from 0.0 to 1.0.

{{ideas}}

Respond with JSON only:
[{"id": "...", "timing_fit": 0.0, "revenue_reference": 0.0, "mvp_difficulty": 0.0}]"#,
        &["ideas"],
    ),
    (
        SCORING,
        r#"Score each idea from 0 to 5 on:
N (novelty), U (urgency of the problem), M (market size), R (resource fit with the matched APIs).

{{ideas}}

Respond with JSON only: [{"id": "...", "N": 0, "U": 0, "M": 0, "R": 0}]"#,
        &["ideas"],
    ),
];

#[derive(Debug, Clone)]
pub struct PromptSet {
    templates: HashMap<&'static str, String>,
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            templates: BUILTIN
                .iter()
                .map(|(name, body, _)| (*name, body.to_string()))
                .collect(),
        }
    }

    /// Built-ins with any `{dir}/{name}.md` overrides applied.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut set = Self::builtin();
        for &(name, _, _) in BUILTIN.iter() {
            let path = dir.join(format!("{}.md", name));
            if path.exists() {
                let body = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read prompt {}", path.display()))?;
                set.templates.insert(name, body);
            }
        }
        Ok(set)
    }

    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self
            .templates
            .get(name)
            .with_context(|| format!("Unknown prompt '{}'", name))?;

        let values: HashMap<&str, &str> = vars.iter().copied().collect();
        let mut missing = Vec::new();
        let rendered = PLACEHOLDER_REGEX.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match values.get(key) {
                Some(value) => value.to_string(),
                None => {
                    missing.push(key.to_string());
                    caps[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            anyhow::bail!("Prompt '{}' has unfilled placeholders: {}", name, missing.join(", "));
        }
        Ok(rendered.into_owned())
    }

    /// Render every template with its expected placeholders; returns failures.
    pub fn check(&self) -> Vec<String> {
        BUILTIN
            .iter()
            .filter_map(|(name, _, keys)| {
                let vars: Vec<(&str, &str)> = keys.iter().map(|k| (*k, "-")).collect();
                self.render(name, &vars).err().map(|e| e.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtins_pass_check() {
        assert!(PromptSet::builtin().check().is_empty());
    }

    #[test]
    fn test_render_fills_placeholders() {
        let out = PromptSet::builtin()
            .render(VALIDATION, &[("idea", "Clinic Finder")])
            .unwrap();
        assert!(out.contains("Clinic Finder"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_render_reports_missing() {
        let err = PromptSet::builtin().render(GENERATION, &[("signals", "[]")]).unwrap_err();
        assert!(err.to_string().contains("domains"));
    }

    #[test]
    fn test_override_from_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("scoring.md"), "Score: {{ideas}}").unwrap();
        let set = PromptSet::load(dir.path()).unwrap();
        assert_eq!(set.render(SCORING, &[("ideas", "x")]).unwrap(), "Score: x");
    }

    #[test]
    fn test_broken_override_fails_check() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("validation.md"), "{{idea}} {{typo}}").unwrap();
        let failures = PromptSet::load(dir.path()).unwrap().check();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("typo"));
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let out = PromptSet::builtin()
            .render(VALIDATION, &[("idea", "{{idea}}")])
            .unwrap();
        assert!(out.contains("{{idea}}"));
    }
}
