//! Hybrid ranking: vector similarity blended with a graph-distance prior.
//!
//! ```text
//! score = alpha * vector_similarity + beta * 1 / (1 + hops)
//! ```
//!
//! The vector pool is intersected with the graph-allowed ids (already
//! type-filtered by the caller), preserving pool order. When nothing in
//! the pool is allowed, every allowed id is ranked by the graph prior
//! alone with a vector similarity of zero, so a non-empty scope always
//! yields candidates.
//!
//! Ordering uses a stable sort on the blended score. Equal scores keep
//! the order of the previous step (pool order, or catalog order in the
//! fallback); no further tie-break is applied.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::RankedCandidate;
use crate::scope::DEFAULT_MAX_DEPTH;
use crate::vector::PoolHit;

/// Weights and bounds for one ranking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    pub alpha: f64,
    pub beta: f64,
    /// Hop count assumed for candidates missing from the hop map.
    pub hop_sentinel: u32,
    pub top_k: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            beta: 0.3,
            hop_sentinel: DEFAULT_MAX_DEPTH,
            top_k: 5,
        }
    }
}

/// Proximity prior `1 / (1 + hops)`.
pub fn graph_prior(hops: u32) -> f64 {
    1.0 / (1.0 + f64::from(hops))
}

/// Result of [`rank`]: the answer set plus everything ranked below it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ranking {
    /// At most `top_k` candidates, best first.
    pub primary: Vec<RankedCandidate>,
    /// Candidates ranked after `top_k`, best first.
    pub overflow: Vec<RankedCandidate>,
    /// True when the pool missed every allowed id.
    pub used_fallback: bool,
}

impl Ranking {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn primary_ids(&self) -> Vec<String> {
        self.primary.iter().map(|c| c.id.clone()).collect()
    }
}

/// Rank the allowed ids against the vector pool and hop map.
pub fn rank(
    pool: &[PoolHit],
    allowed: &[String],
    hops: &HashMap<String, u32>,
    params: &RankParams,
) -> Ranking {
    let allowed_set: HashSet<&str> = allowed.iter().map(String::as_str).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut candidates: Vec<(&str, f64)> = pool
        .iter()
        .filter(|hit| allowed_set.contains(hit.id.as_str()) && seen.insert(hit.id.as_str()))
        .map(|hit| (hit.id.as_str(), f64::from(hit.similarity)))
        .collect();

    let used_fallback = candidates.is_empty();
    if used_fallback {
        let mut seen: HashSet<&str> = HashSet::new();
        candidates = allowed
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| (id.as_str(), 0.0))
            .collect();
    }

    let mut scored: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|(id, vector_score)| {
            let h = hops.get(id).copied().unwrap_or(params.hop_sentinel);
            RankedCandidate {
                id: id.to_string(),
                vector_score,
                hops: h,
                score: params.alpha * vector_score + params.beta * graph_prior(h),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let overflow = if scored.len() > params.top_k {
        scored.split_off(params.top_k)
    } else {
        Vec::new()
    };

    Ranking {
        primary: scored,
        overflow,
        used_fallback,
    }
}
