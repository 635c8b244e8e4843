//! Vector pool search over a flat embedding matrix.
//!
//! The matrix is loaded once at startup, L2-normalized row by row, and
//! never mutated, so any number of queries can read it concurrently.
//! Similarity is the dot product of a normalized query against normalized
//! rows (cosine).
//!
//! # Search paths
//!
//! 1. **Index** — a [`VectorIndex`] (e.g. [`ivf::IvfIndex`]) returns up to
//!    `pool_size` rows in ranked order.
//! 2. **Brute force** — without an index, score every row, partially
//!    select the top `pool_size`, then sort that subset descending.
//!
//! `pool_size` is capped at the row count. The pool is deliberately much
//! larger than the final answer size: graph scoping later discards most
//! of it.

pub mod ivf;

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::embedding::{dot, normalize};

/// Default number of candidates fetched before graph intersection.
pub const DEFAULT_POOL_SIZE: usize = 1000;

/// One row of the pool: an id and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolHit {
    pub id: String,
    pub similarity: f32,
}

/// Id-aligned, row-normalized embedding matrix.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    ids: Vec<String>,
    data: Vec<f32>,
    dims: usize,
}

impl EmbeddingMatrix {
    /// Build from ids and row-major data (`ids.len() * dims` floats).
    ///
    /// Rows are normalized. Duplicate ids keep their first row.
    pub fn from_rows(ids: Vec<String>, data: Vec<f32>, dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("embedding dims must be > 0");
        }
        if ids.len() * dims != data.len() {
            bail!(
                "embedding matrix mismatch: {} ids × {} dims != {} floats",
                ids.len(),
                dims,
                data.len()
            );
        }

        let mut kept_ids = Vec::with_capacity(ids.len());
        let mut kept = Vec::with_capacity(data.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let mut row = data[i * dims..(i + 1) * dims].to_vec();
            normalize(&mut row);
            kept_ids.push(id);
            kept.extend_from_slice(&row);
        }

        let dropped = data.len() / dims - kept_ids.len();
        if dropped > 0 {
            info!(dropped, "duplicate embedding ids ignored");
        }

        Ok(Self {
            ids: kept_ids,
            data: kept,
            dims,
        })
    }

    /// A matrix with no rows, used when embeddings are disabled.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            data: Vec::new(),
            dims: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id(&self, row: usize) -> Option<&str> {
        self.ids.get(row).map(String::as_str)
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dims..(row + 1) * self.dims]
    }

    /// Exact top-`k` rows by dot product with `query`.
    pub fn brute_force(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, dot(self.row(i), query)))
            .collect();
        select_top_k(scored, k)
    }
}

/// Keep the `k` highest-scoring entries, sorted descending.
///
/// Uses a partial selection before the final sort, so cost is linear in
/// the input plus `k log k`.
pub fn select_top_k(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    let k = k.min(scored.len());
    if k == 0 {
        return Vec::new();
    }
    let by_score_desc = |a: &(usize, f32), b: &(usize, f32)| {
        b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
    };
    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, by_score_desc);
        scored.truncate(k);
    }
    scored.sort_by(by_score_desc);
    scored
}

/// A nearest-neighbour structure over an [`EmbeddingMatrix`].
pub trait VectorIndex: Send + Sync {
    /// Short label for logs (e.g. `"ivf"`).
    fn kind(&self) -> &str;

    /// Up to `k` rows ranked by descending similarity to `query`.
    fn search(&self, matrix: &EmbeddingMatrix, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// The loaded matrix plus an optional index. Read-only after construction.
pub struct VectorPool {
    matrix: EmbeddingMatrix,
    index: Option<Box<dyn VectorIndex>>,
}

impl VectorPool {
    pub fn new(matrix: EmbeddingMatrix, index: Option<Box<dyn VectorIndex>>) -> Self {
        Self { matrix, index }
    }

    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    pub fn index_kind(&self) -> &str {
        self.index.as_ref().map(|i| i.kind()).unwrap_or("brute-force")
    }

    /// Global semantic pool: up to `pool_size` ids by descending similarity.
    ///
    /// `query` must already be normalized. A `pool_size` above the row
    /// count is capped silently.
    pub fn search(&self, query: &[f32], pool_size: usize) -> Vec<PoolHit> {
        let k = pool_size.min(self.matrix.len());
        if k == 0 || query.len() != self.matrix.dims() {
            debug!(
                rows = self.matrix.len(),
                query_dims = query.len(),
                matrix_dims = self.matrix.dims(),
                "vector pool empty"
            );
            return Vec::new();
        }

        let rows = match &self.index {
            Some(index) => index.search(&self.matrix, query, k),
            None => self.matrix.brute_force(query, k),
        };

        rows.into_iter()
            .filter_map(|(row, similarity)| {
                self.matrix.id(row).map(|id| PoolHit {
                    id: id.to_string(),
                    similarity,
                })
            })
            .collect()
    }
}
