//! Keyword resolution: question or explicit reference → canonical keyword.
//!
//! Resolution order, first match wins:
//!
//! 1. An explicit keyword id that exists in the store.
//! 2. For the explicit name, then the question text (empty values skipped):
//!    a. exact case-insensitive name match;
//!    b. substring match in either direction against both the raw text and
//!       its rewritten form (abbreviations folded into canonical names),
//!       preferring the shortest keyword name.
//! 3. Otherwise no keyword — the caller refuses.

use anyhow::{Context, Result};
use regex_lite::Regex;
use tracing::debug;

use crate::models::Keyword;
use crate::store::HierarchyStore;

/// A text rewrite applied before substring matching, e.g. `lv` → `louis vuitton`.
#[derive(Debug, Clone)]
pub struct NameRewrite {
    pattern: Regex,
    replacement: String,
}

impl NameRewrite {
    /// Compile a rewrite. Patterns use `regex-lite` syntax; add `(?i)` for
    /// case-insensitive matching.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid rewrite pattern: {}", pattern))?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// The default brand abbreviation rewrite.
pub fn default_rewrites() -> Vec<NameRewrite> {
    vec![NameRewrite {
        pattern: Regex::new(r"(?i)\blv\b").expect("static pattern"),
        replacement: "louis vuitton".to_string(),
    }]
}

/// Resolves free text or explicit references to a keyword in the hierarchy.
#[derive(Debug, Clone)]
pub struct KeywordResolver {
    rewrites: Vec<NameRewrite>,
}

impl Default for KeywordResolver {
    fn default() -> Self {
        Self::new(default_rewrites())
    }
}

impl KeywordResolver {
    pub fn new(rewrites: Vec<NameRewrite>) -> Self {
        Self { rewrites }
    }

    /// Apply every rewrite in order to the trimmed text.
    pub fn normalize(&self, text: &str) -> String {
        self.rewrites
            .iter()
            .fold(text.trim().to_string(), |acc, rw| rw.apply(&acc))
    }

    /// Resolve to a keyword, or `None` when nothing matches.
    pub async fn resolve<S: HierarchyStore + ?Sized>(
        &self,
        store: &S,
        explicit_id: Option<&str>,
        explicit_name: Option<&str>,
        question: &str,
    ) -> Result<Option<Keyword>> {
        if let Some(id) = explicit_id.map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(kw) = store.get_keyword(id).await? {
                debug!(keyword_id = %kw.id, "resolved by explicit id");
                return Ok(Some(kw));
            }
        }

        let candidates = [explicit_name, Some(question)];
        for candidate in candidates.into_iter().flatten() {
            let raw = candidate.trim();
            if raw.is_empty() {
                continue;
            }

            if let Some(kw) = store.find_keyword_by_name(raw).await? {
                debug!(keyword_id = %kw.id, "resolved by exact name");
                return Ok(Some(kw));
            }

            let normalized = self.normalize(raw);
            let mut needles = vec![raw.to_string()];
            if normalized != raw && !normalized.is_empty() {
                needles.push(normalized);
            }

            let matches = store.keywords_matching(&needles).await?;
            if let Some(kw) = shortest_name(matches) {
                debug!(keyword_id = %kw.id, "resolved by substring");
                return Ok(Some(kw));
            }
        }

        Ok(None)
    }
}

/// The keyword with the fewest characters in its name; earliest wins ties.
fn shortest_name(keywords: Vec<Keyword>) -> Option<Keyword> {
    keywords
        .into_iter()
        .filter(|k| !k.name.trim().is_empty())
        .min_by_key(|k| k.name.trim().chars().count())
}
