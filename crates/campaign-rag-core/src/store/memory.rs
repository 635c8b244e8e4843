//! In-memory [`HierarchyStore`] implementation for tests and demo mode.
//!
//! Keywords and resources are kept in insertion order. Traversal is a
//! breadth-first walk with a visited set and an explicit depth bound, so
//! accidental parent cycles terminate.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Keyword, Resource};

use super::{names_overlap, HierarchyStore};

/// In-memory hierarchy store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHierarchyStore {
    keywords: Vec<Keyword>,
    keyword_index: HashMap<String, usize>,
    children: HashMap<String, Vec<String>>,
    resources: Vec<Resource>,
    tagged: HashMap<String, Vec<usize>>,
}

impl InMemoryHierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a keyword. A later insert with the same id replaces the name
    /// and parent but keeps the original position.
    pub fn add_keyword(&mut self, id: &str, name: &str, parent: Option<&str>) -> &mut Self {
        let kw = Keyword {
            id: id.to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
        };
        if let Some(&pos) = self.keyword_index.get(id) {
            if let Some(old_parent) = self.keywords[pos].parent.take() {
                if let Some(kids) = self.children.get_mut(&old_parent) {
                    kids.retain(|k| k != id);
                }
            }
            self.keywords[pos] = kw;
        } else {
            self.keyword_index.insert(id.to_string(), self.keywords.len());
            self.keywords.push(kw);
        }
        if let Some(p) = parent {
            self.children
                .entry(p.to_string())
                .or_default()
                .push(id.to_string());
        }
        self
    }

    /// Insert a resource and index it under each of its keyword tags.
    pub fn add_resource(&mut self, resource: Resource) -> &mut Self {
        let pos = self.resources.len();
        for kw in &resource.keywords {
            let slots = self.tagged.entry(kw.clone()).or_default();
            if !slots.contains(&pos) {
                slots.push(pos);
            }
        }
        self.resources.push(resource);
        self
    }

    /// Breadth-first walk from `root_id` (depth 0) bounded by `max_depth`.
    /// Each keyword appears once, at its minimum depth.
    fn walk(&self, root_id: &str, max_depth: u32) -> Vec<(String, u32)> {
        if !self.keyword_index.contains_key(root_id) {
            return Vec::new();
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
        let mut out = Vec::new();

        seen.insert(root_id);
        queue.push_back((root_id, 0));

        while let Some((id, depth)) = queue.pop_front() {
            out.push((id.to_string(), depth));
            if depth >= max_depth {
                continue;
            }
            if let Some(kids) = self.children.get(id) {
                for kid in kids {
                    if seen.insert(kid.as_str()) {
                        queue.push_back((kid.as_str(), depth + 1));
                    }
                }
            }
        }
        out
    }
}

#[async_trait]
impl HierarchyStore for InMemoryHierarchyStore {
    async fn get_keyword(&self, id: &str) -> Result<Option<Keyword>> {
        Ok(self
            .keyword_index
            .get(id)
            .map(|&pos| self.keywords[pos].clone()))
    }

    async fn find_keyword_by_name(&self, name: &str) -> Result<Option<Keyword>> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .keywords
            .iter()
            .find(|k| k.name.trim().to_lowercase() == wanted)
            .cloned())
    }

    async fn keywords_matching(&self, needles: &[String]) -> Result<Vec<Keyword>> {
        Ok(self
            .keywords
            .iter()
            .filter(|k| needles.iter().any(|n| names_overlap(&k.name, n)))
            .cloned()
            .collect())
    }

    async fn children_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(Keyword, u32)>> {
        Ok(self
            .walk(root_id, max_depth)
            .into_iter()
            .filter(|(id, _)| id != root_id)
            .filter_map(|(id, depth)| {
                self.keyword_index
                    .get(&id)
                    .map(|&pos| (self.keywords[pos].clone(), depth))
            })
            .collect())
    }

    async fn resources_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(String, u32)>> {
        let mut hops: HashMap<usize, u32> = HashMap::new();
        let mut order: Vec<usize> = Vec::new();
        for (kw, depth) in self.walk(root_id, max_depth) {
            if let Some(slots) = self.tagged.get(&kw) {
                for &pos in slots {
                    match hops.get_mut(&pos) {
                        Some(h) => *h = (*h).min(depth),
                        None => {
                            hops.insert(pos, depth);
                            order.push(pos);
                        }
                    }
                }
            }
        }
        Ok(order
            .into_iter()
            .map(|pos| (self.resources[pos].id.clone(), hops[&pos]))
            .collect())
    }

    async fn resources_tagged(&self, keyword_ids: &[String]) -> Result<Vec<Resource>> {
        let mut slots: Vec<usize> = keyword_ids
            .iter()
            .filter_map(|kw| self.tagged.get(kw))
            .flatten()
            .copied()
            .collect();
        slots.sort_unstable();
        slots.dedup();
        Ok(slots
            .into_iter()
            .map(|pos| self.resources[pos].clone())
            .collect())
    }

    async fn all_keywords(&self) -> Result<Vec<Keyword>> {
        Ok(self.keywords.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, kind: &str, tags: &[&str]) -> Resource {
        Resource {
            id: id.to_string(),
            title: Some(format!("Title {}", id)),
            url: Some(format!("https://example.com/{}", id)),
            resource_type: kind.to_string(),
            keywords: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn sample() -> InMemoryHierarchyStore {
        let mut store = InMemoryHierarchyStore::new();
        store
            .add_keyword("kw_lv", "Louis Vuitton", None)
            .add_keyword("kw_bags", "Handbags", Some("kw_lv"))
            .add_keyword("kw_speedy", "Speedy", Some("kw_bags"))
            .add_keyword("kw_art", "Art", None);
        store
            .add_resource(resource("r1", "news", &["kw_lv"]))
            .add_resource(resource("r2", "shopping", &["kw_bags", "kw_speedy"]))
            .add_resource(resource("r3", "news", &["kw_art"]));
        store
    }

    #[tokio::test]
    async fn test_children_within_bounded() {
        let store = sample();
        let kids = store.children_within("kw_lv", 1).await.unwrap();
        let ids: Vec<&str> = kids.iter().map(|(k, _)| k.id.as_str()).collect();
        assert_eq!(ids, vec!["kw_bags"]);

        let kids = store.children_within("kw_lv", 3).await.unwrap();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[1].1, 2);
    }

    #[tokio::test]
    async fn test_resources_within_min_hops() {
        let store = sample();
        let hops: HashMap<String, u32> = store
            .resources_within("kw_lv", 3)
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(hops.get("r1"), Some(&0));
        // r2 is tagged at depth 1 and depth 2; the minimum wins.
        assert_eq!(hops.get("r2"), Some(&1));
        assert!(!hops.contains_key("r3"));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let mut store = InMemoryHierarchyStore::new();
        store
            .add_keyword("a", "A", Some("b"))
            .add_keyword("b", "B", Some("a"));
        let kids = store.children_within("a", 10).await.unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].0.id, "b");
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let store = sample();
        assert!(store.children_within("nope", 3).await.unwrap().is_empty());
        assert!(store.resources_within("nope", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resources_tagged_dedup() {
        let store = sample();
        let res = store
            .resources_tagged(&["kw_bags".to_string(), "kw_speedy".to_string()])
            .await
            .unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].id, "r2");
    }

    #[tokio::test]
    async fn test_find_by_name_case_insensitive() {
        let store = sample();
        let kw = store.find_keyword_by_name("louis VUITTON").await.unwrap();
        assert_eq!(kw.map(|k| k.id), Some("kw_lv".to_string()));
    }
}
