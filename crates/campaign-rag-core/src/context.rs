//! Context assembly and answer composition.
//!
//! The context block is one line per ranked resource, in ranked order:
//!
//! ```text
//! - [shopping] Capucines MM → https://example.com/capucines
//! ```
//!
//! Resources without a URL are skipped; the block's source list is the
//! URLs of the lines that were emitted.

use crate::catalog::ScopedCatalog;
use crate::text::dedupe_urls;

/// Context lines and the URLs they cite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    pub text: String,
    pub sources: Vec<String>,
    /// `(title, url)` per emitted line.
    pub entries: Vec<(String, String)>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Build the context block for the first `limit` ids.
pub fn build_context(ids: &[String], catalog: &ScopedCatalog, limit: usize) -> ContextBlock {
    let mut lines = Vec::new();
    let mut block = ContextBlock::default();

    for id in ids.iter().take(limit) {
        let Some(resource) = catalog.get(id) else {
            continue;
        };
        let Some(url) = resource.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let title = resource.display_title().to_string();
        lines.push(format!("- [{}] {} → {}", resource.type_tag_or(catalog.default_type()), title, url));
        block.sources.push(url.to_string());
        block.entries.push((title, url.to_string()));
    }

    block.text = lines.join("\n");
    block
}

/// The `**Featured pieces**` block, or an empty string when there is nothing to feature.
pub fn featured_block(featured: &ContextBlock, limit: usize) -> String {
    if featured.entries.is_empty() || limit == 0 {
        return String::new();
    }
    let mut out = String::from("\n\n**Featured pieces**\n");
    for (title, url) in featured.entries.iter().take(limit) {
        out.push_str(&format!("- **{}** — curated for this topic. ({})\n", title, url));
    }
    out
}

/// Final answer text: body, optional featured block, then the canonical
/// `Sources:` section when any sources remain after de-duplication.
///
/// Returns the text and the de-duplicated sources.
pub fn compose_answer(body: &str, featured: &str, sources: &[String]) -> (String, Vec<String>) {
    let sources = dedupe_urls(sources);
    let mut text = format!("{}{}", body, featured);
    if !sources.is_empty() {
        text.push_str("\n\nSources:\n");
        text.push_str(&sources.join("\n"));
    }
    (text.trim().to_string(), sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;

    fn catalog() -> ScopedCatalog {
        ScopedCatalog::new(vec![
            Resource {
                id: "r1".into(),
                title: Some("Capucines MM".into()),
                url: Some("https://example.com/capucines".into()),
                resource_type: "Shopping".into(),
                keywords: vec!["kw".into()],
            },
            Resource {
                id: "r2".into(),
                title: None,
                url: Some("https://example.com/r2".into()),
                resource_type: String::new(),
                keywords: vec!["kw".into()],
            },
            Resource {
                id: "r3".into(),
                title: Some("No link".into()),
                url: None,
                resource_type: "news".into(),
                keywords: vec!["kw".into()],
            },
        ])
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_line_format() {
        let block = build_context(&ids(&["r1", "r2"]), &catalog(), 5);
        assert_eq!(
            block.text,
            "- [shopping] Capucines MM → https://example.com/capucines\n- [news] r2 → https://example.com/r2"
        );
        assert_eq!(block.sources.len(), 2);
    }

    #[test]
    fn test_skips_missing_url_and_unknown_ids() {
        let block = build_context(&ids(&["r3", "zz"]), &catalog(), 5);
        assert!(block.is_empty());
        assert!(block.sources.is_empty());
    }

    #[test]
    fn test_limit_applies_before_skipping() {
        let block = build_context(&ids(&["r3", "r1", "r2"]), &catalog(), 2);
        assert_eq!(block.sources, vec!["https://example.com/capucines"]);
    }

    #[test]
    fn test_featured_block() {
        let block = build_context(&ids(&["r1"]), &catalog(), 3);
        let featured = featured_block(&block, 3);
        assert_eq!(
            featured,
            "\n\n**Featured pieces**\n- **Capucines MM** — curated for this topic. (https://example.com/capucines)\n"
        );
        assert_eq!(featured_block(&ContextBlock::default(), 3), "");
    }

    #[test]
    fn test_compose_dedupes_sources() {
        let (text, sources) = compose_answer(
            "Body.",
            "",
            &ids(&["https://a", "https://b", "https://a"]),
        );
        assert_eq!(sources, vec!["https://a", "https://b"]);
        assert_eq!(text, "Body.\n\nSources:\nhttps://a\nhttps://b");
    }

    #[test]
    fn test_compose_without_sources() {
        let (text, sources) = compose_answer("Body.", "", &[]);
        assert_eq!(text, "Body.");
        assert!(sources.is_empty());
    }
}
