//! Read interface to the keyword hierarchy and its tagged resources.
//!
//! The [`HierarchyStore`] trait is the only way the retrieval pipeline
//! touches the campaign graph, enabling pluggable backends (SQLite,
//! in-memory for tests and demos).
//!
//! Implementations must be `Send + Sync` and must bound traversal depth
//! explicitly: the hierarchy is expected to be a forest, but cycles are
//! not ruled out.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Keyword, Resource};

/// Abstract read-only hierarchy backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_keyword`](HierarchyStore::get_keyword) | Keyword by id |
/// | [`find_keyword_by_name`](HierarchyStore::find_keyword_by_name) | Exact case-insensitive name match |
/// | [`keywords_matching`](HierarchyStore::keywords_matching) | Substring match in either direction |
/// | [`children_within`](HierarchyStore::children_within) | Descendants up to a depth |
/// | [`resources_within`](HierarchyStore::resources_within) | Resources under a root with min hop count |
/// | [`resources_tagged`](HierarchyStore::resources_tagged) | Resources tagged with any of a set of keywords |
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn get_keyword(&self, id: &str) -> Result<Option<Keyword>>;

    /// First keyword whose name equals `name`, ignoring case.
    async fn find_keyword_by_name(&self, name: &str) -> Result<Option<Keyword>>;

    /// Keywords whose lower-cased name contains, or is contained in, any
    /// of the lower-cased `needles`. Keywords with empty names never match.
    /// Results follow the store's natural keyword order.
    async fn keywords_matching(&self, needles: &[String]) -> Result<Vec<Keyword>>;

    /// Descendants of `root_id` reachable within `max_depth` parent→child
    /// hops, paired with their minimum depth. The root itself is excluded.
    async fn children_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(Keyword, u32)>>;

    /// Resources tagged by `root_id` or any descendant within `max_depth`,
    /// paired with the minimum hop count to a tagging keyword.
    async fn resources_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(String, u32)>>;

    /// Resources tagged with any of `keyword_ids`, each returned once.
    async fn resources_tagged(&self, keyword_ids: &[String]) -> Result<Vec<Resource>>;

    /// Every keyword in store order.
    async fn all_keywords(&self) -> Result<Vec<Keyword>>;
}

/// Whether a keyword name and a needle overlap by substring in either direction.
///
/// Both sides are compared lower-cased. An empty name never matches.
pub fn names_overlap(name: &str, needle: &str) -> bool {
    let name = name.trim().to_lowercase();
    let needle = needle.trim().to_lowercase();
    if name.is_empty() || needle.is_empty() {
        return false;
    }
    name.contains(&needle) || needle.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_overlap_both_directions() {
        assert!(names_overlap("Louis Vuitton", "tell me about louis vuitton stores"));
        assert!(names_overlap("Louis Vuitton Handbags", "louis vuitton"));
        assert!(!names_overlap("Kusama", "louis vuitton"));
    }

    #[test]
    fn test_names_overlap_empty() {
        assert!(!names_overlap("", "anything"));
        assert!(!names_overlap("Art", "  "));
    }
}
