//! Resource catalog lookup for a keyword scope.
//!
//! [`resources_for`] is a pure set lookup: the union of resources tagged
//! with any keyword in scope, each once, in store order. [`ScopedCatalog`]
//! indexes that union by id so later stages can read type tags and
//! metadata without another store round-trip.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::models::{Resource, Selection, DEFAULT_RESOURCE_TYPE};
use crate::store::HierarchyStore;

/// Resources tagged with any of `keyword_ids`, deduplicated by id.
pub async fn resources_for<S: HierarchyStore + ?Sized>(
    store: &S,
    keyword_ids: &[String],
) -> Result<Vec<Resource>> {
    if keyword_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut seen: HashSet<String> = HashSet::new();
    Ok(store
        .resources_tagged(keyword_ids)
        .await?
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect())
}

/// The resources in one query's scope, indexed by id.
#[derive(Debug, Clone)]
pub struct ScopedCatalog {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    default_type: String,
}

impl Default for ScopedCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScopedCatalog {
    pub fn new(resources: Vec<Resource>) -> Self {
        let mut index = HashMap::with_capacity(resources.len());
        let mut kept = Vec::with_capacity(resources.len());
        for r in resources {
            if !index.contains_key(&r.id) {
                index.insert(r.id.clone(), kept.len());
                kept.push(r);
            }
        }
        Self {
            resources: kept,
            index,
            default_type: DEFAULT_RESOURCE_TYPE.to_string(),
        }
    }

    /// Type tag for resources stored without one.
    pub fn with_default_type(mut self, default_type: &str) -> Self {
        self.default_type = default_type.trim().to_lowercase();
        self
    }

    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    /// Lower-cased type tag of a resource in scope.
    pub fn type_of(&self, id: &str) -> Option<String> {
        self.get(id).map(|r| r.type_tag_or(&self.default_type))
    }

    /// Ids whose type tag passes `types`, in catalog order.
    pub fn allowed_ids(&self, types: &Selection) -> Vec<String> {
        self.resources
            .iter()
            .filter(|r| types.allows(&r.type_tag_or(&self.default_type)))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryHierarchyStore;

    fn resource(id: &str, kind: &str, tags: &[&str]) -> Resource {
        Resource {
            id: id.to_string(),
            title: Some(id.to_uppercase()),
            url: Some(format!("https://example.com/{}", id)),
            resource_type: kind.to_string(),
            keywords: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn store() -> InMemoryHierarchyStore {
        let mut s = InMemoryHierarchyStore::new();
        s.add_keyword("a", "A", None)
            .add_keyword("b", "B", Some("a"))
            .add_keyword("c", "C", None);
        s.add_resource(resource("r1", "News", &["a"]))
            .add_resource(resource("r2", "shopping", &["a", "b"]))
            .add_resource(resource("r3", "hotel", &["c"]));
        s
    }

    #[tokio::test]
    async fn test_empty_input() {
        let s = store();
        assert!(resources_for(&s, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_untagged_leakage() {
        let s = store();
        let ids = vec!["a".to_string(), "b".to_string()];
        let res = resources_for(&s, &ids).await.unwrap();
        assert_eq!(res.len(), 2);
        for r in &res {
            assert!(r.keywords.iter().any(|k| ids.contains(k)));
        }
    }

    #[tokio::test]
    async fn test_type_filter() {
        let s = store();
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let catalog = ScopedCatalog::new(resources_for(&s, &ids).await.unwrap());
        assert_eq!(catalog.allowed_ids(&Selection::All).len(), 3);
        assert_eq!(
            catalog.allowed_ids(&Selection::from_items(["news"])),
            vec!["r1"]
        );
        assert!(catalog
            .allowed_ids(&Selection::from_items(["restaurant"]))
            .is_empty());
        assert_eq!(catalog.type_of("r1").as_deref(), Some("news"));
    }

    #[test]
    fn test_untyped_resources_take_configured_default() {
        let catalog = ScopedCatalog::new(vec![
            resource("r1", "", &["a"]),
            resource("r2", "Shopping", &["a"]),
        ])
        .with_default_type(" Article ");
        assert_eq!(catalog.type_of("r1").as_deref(), Some("article"));
        assert_eq!(
            catalog.allowed_ids(&Selection::from_items(["article"])),
            vec!["r1"]
        );
        assert!(catalog
            .allowed_ids(&Selection::from_items(["news"]))
            .is_empty());
    }
}
