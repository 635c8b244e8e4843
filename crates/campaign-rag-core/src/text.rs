//! Post-processing of generated text.
//!
//! A [`TextPipeline`] is an ordered list of named regex removals, each a
//! pure `&str -> String` step that can be tested on its own. The default
//! pipeline drops a trailing `Sources:` section the generator may add by
//! itself (the canonical list is appended later, once), then the header
//! lines and prefixes generators are known to prepend. Output is trimmed.

use std::collections::HashSet;

use anyhow::{Context, Result};
use regex_lite::Regex;

/// Trailing `Sources:` section, through end of text.
pub const SOURCES_SECTION: &str = r"(?is)\n+sources\s*:\s*.*$";
/// `LV Connection — ...` header lines.
pub const CONNECTION_HEADER: &str = r"(?im)^\s*lv connection\s*—.*$";
/// `Answer — ` prefixes.
pub const ANSWER_PREFIX: &str = r"(?im)^\s*answer\s*—\s*";

/// One named removal step.
#[derive(Debug, Clone)]
pub struct TextTransform {
    name: String,
    pattern: Regex,
}

impl TextTransform {
    pub fn new(name: &str, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid strip pattern for '{}': {}", name, pattern))?;
        Ok(Self {
            name: name.to_string(),
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct TextPipeline {
    steps: Vec<TextTransform>,
}

impl TextPipeline {
    pub fn new(steps: Vec<TextTransform>) -> Self {
        Self { steps }
    }

    /// Default steps followed by `extra` patterns, in order.
    pub fn with_extra_patterns(extra: &[String]) -> Result<Self> {
        let mut steps = default_steps()?;
        for (i, pattern) in extra.iter().enumerate() {
            steps.push(TextTransform::new(&format!("extra_{}", i + 1), pattern)?);
        }
        Ok(Self::new(steps))
    }

    pub fn steps(&self) -> &[TextTransform] {
        &self.steps
    }

    /// Run every step in order, then trim.
    pub fn run(&self, text: &str) -> String {
        self.steps
            .iter()
            .fold(text.to_string(), |acc, step| step.apply(&acc))
            .trim()
            .to_string()
    }
}

impl Default for TextPipeline {
    fn default() -> Self {
        Self::with_extra_patterns(&[]).expect("built-in strip patterns compile")
    }
}

fn default_steps() -> Result<Vec<TextTransform>> {
    Ok(vec![
        TextTransform::new("strip_sources", SOURCES_SECTION)?,
        TextTransform::new("strip_connection_header", CONNECTION_HEADER)?,
        TextTransform::new("strip_answer_prefix", ANSWER_PREFIX)?,
    ])
}

/// Drop empty and repeated URLs, keeping first-seen order.
pub fn dedupe_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    urls.into_iter()
        .map(|u| u.as_ref().trim().to_string())
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_has_three_steps() {
        let p = TextPipeline::default();
        let names: Vec<&str> = p.steps().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["strip_sources", "strip_connection_header", "strip_answer_prefix"]
        );
    }

    #[test]
    fn test_strip_sources_section() {
        let step = TextTransform::new("s", SOURCES_SECTION).unwrap();
        let out = step.apply("Body text.\n\nSOURCES:\n- https://a\n- https://b");
        assert_eq!(out, "Body text.");
    }

    #[test]
    fn test_sources_word_inline_kept() {
        let step = TextTransform::new("s", SOURCES_SECTION).unwrap();
        let text = "Multiple sources: agree on this.";
        assert_eq!(step.apply(text), text);
    }

    #[test]
    fn test_strip_connection_header() {
        let step = TextTransform::new("h", CONNECTION_HEADER).unwrap();
        let out = step.apply("LV Connection — Kusama collab\nThe collection launched in 2023.");
        assert_eq!(out.trim(), "The collection launched in 2023.");
    }

    #[test]
    fn test_strip_answer_prefix() {
        let step = TextTransform::new("a", ANSWER_PREFIX).unwrap();
        assert_eq!(step.apply("Answer — It opened in Paris."), "It opened in Paris.");
    }

    #[test]
    fn test_pipeline_runs_in_order_and_trims() {
        let p = TextPipeline::default();
        let raw = "  answer — The store reopened.\nSources: https://x  ";
        assert_eq!(p.run(raw), "The store reopened.");
    }

    #[test]
    fn test_extra_patterns() {
        let p = TextPipeline::with_extra_patterns(&[r"(?i)\[draft\]\s*".to_string()]).unwrap();
        assert_eq!(p.steps().len(), 4);
        assert_eq!(p.run("[DRAFT] Hello"), "Hello");
        assert!(TextPipeline::with_extra_patterns(&["(".to_string()]).is_err());
    }

    #[test]
    fn test_dedupe_urls() {
        let urls = dedupe_urls(["https://a", "", "https://b", "https://a", " https://b "]);
        assert_eq!(urls, vec!["https://a", "https://b"]);
    }
}
