//! Scope expansion over the keyword hierarchy.
//!
//! Given a resolved root keyword, computes the depth-bounded set of
//! descendant keywords and, for every resource tagged inside that subtree,
//! the minimum hop count from the root. A missing root yields an empty
//! scope rather than an error.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::store::HierarchyStore;

/// Default traversal bound below the resolved keyword.
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Root plus descendants within `max_depth` hops, root first, each id once.
///
/// Returns an empty list when `root_id` is not in the store.
pub async fn descendants<S: HierarchyStore + ?Sized>(
    store: &S,
    root_id: &str,
    max_depth: u32,
) -> Result<Vec<String>> {
    if store.get_keyword(root_id).await?.is_none() {
        return Ok(Vec::new());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut ids = vec![root_id.to_string()];
    seen.insert(root_id.to_string());

    // Enforce the bound here as well; stores may over-report.
    for (kw, depth) in store.children_within(root_id, max_depth).await? {
        if depth <= max_depth && seen.insert(kw.id.clone()) {
            ids.push(kw.id);
        }
    }
    Ok(ids)
}

/// Minimum hop count from `root_id` for every resource tagged inside its
/// depth-bounded subtree. Resources beyond the bound are absent.
pub async fn resource_hops<S: HierarchyStore + ?Sized>(
    store: &S,
    root_id: &str,
    max_depth: u32,
) -> Result<HashMap<String, u32>> {
    if store.get_keyword(root_id).await?.is_none() {
        return Ok(HashMap::new());
    }

    let mut hops: HashMap<String, u32> = HashMap::new();
    for (rid, h) in store.resources_within(root_id, max_depth).await? {
        if h > max_depth {
            continue;
        }
        hops.entry(rid)
            .and_modify(|cur| *cur = (*cur).min(h))
            .or_insert(h);
    }
    Ok(hops)
}
