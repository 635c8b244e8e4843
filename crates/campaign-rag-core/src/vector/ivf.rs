//! Inverted-file (IVF) index over a normalized embedding matrix.
//!
//! Rows are partitioned by spherical k-means into `n_lists` cells. A query
//! scores the centroids, visits the `n_probe` closest cells, and ranks
//! only the rows in those cells. When the probed cells hold fewer than
//! `k` rows, more cells are visited in centroid order until `k` rows are
//! available or every cell has been scanned, so the pool size contract
//! still holds.

use tracing::debug;

use super::{select_top_k, EmbeddingMatrix, VectorIndex};
use crate::embedding::{dot, normalize};

/// Default k-means refinement passes.
pub const DEFAULT_ITERATIONS: usize = 8;

pub struct IvfIndex {
    dims: usize,
    centroids: Vec<f32>,
    lists: Vec<Vec<usize>>,
    n_probe: usize,
}

impl IvfIndex {
    /// Cluster `matrix` into at most `n_lists` cells.
    ///
    /// Returns `None` for an empty matrix or `n_lists == 0`; callers fall
    /// back to brute force.
    pub fn build(
        matrix: &EmbeddingMatrix,
        n_lists: usize,
        n_probe: usize,
        iterations: usize,
    ) -> Option<Self> {
        let rows = matrix.len();
        let dims = matrix.dims();
        let n_lists = n_lists.min(rows);
        if n_lists == 0 {
            return None;
        }

        // Evenly spaced seeds keep the build deterministic.
        let mut centroids = Vec::with_capacity(n_lists * dims);
        for c in 0..n_lists {
            centroids.extend_from_slice(matrix.row(c * rows / n_lists));
        }

        let mut assignment = vec![0usize; rows];
        for pass in 0..iterations.max(1) {
            let mut changed = 0usize;
            for (row, slot) in assignment.iter_mut().enumerate() {
                let best = nearest_centroid(&centroids, dims, matrix.row(row));
                if *slot != best {
                    changed += 1;
                    *slot = best;
                }
            }

            let mut sums = vec![0f32; n_lists * dims];
            let mut counts = vec![0usize; n_lists];
            for (row, &c) in assignment.iter().enumerate() {
                counts[c] += 1;
                for (s, v) in sums[c * dims..(c + 1) * dims]
                    .iter_mut()
                    .zip(matrix.row(row))
                {
                    *s += v;
                }
            }
            for c in 0..n_lists {
                // Empty cells keep their previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                let centroid = &mut sums[c * dims..(c + 1) * dims];
                normalize(centroid);
                centroids[c * dims..(c + 1) * dims].copy_from_slice(centroid);
            }

            if pass > 0 && changed == 0 {
                debug!(pass, "ivf converged");
                break;
            }
        }

        let mut lists = vec![Vec::new(); n_lists];
        for (row, &c) in assignment.iter().enumerate() {
            lists[c].push(row);
        }

        debug!(rows, n_lists, n_probe, "ivf index built");
        Some(Self {
            dims,
            centroids,
            lists,
            n_probe: n_probe.clamp(1, n_lists),
        })
    }

    pub fn n_lists(&self) -> usize {
        self.lists.len()
    }

    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(Vec::len).collect()
    }
}

fn nearest_centroid(centroids: &[f32], dims: usize, row: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (c, centroid) in centroids.chunks_exact(dims).enumerate() {
        let s = dot(centroid, row);
        if s > best_score {
            best_score = s;
            best = c;
        }
    }
    best
}

impl VectorIndex for IvfIndex {
    fn kind(&self) -> &str {
        "ivf"
    }

    fn search(&self, matrix: &EmbeddingMatrix, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dims || k == 0 {
            return Vec::new();
        }

        let cells: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(c, centroid)| (c, dot(centroid, query)))
            .collect();
        let cells = select_top_k(cells, self.lists.len());

        let mut scored = Vec::new();
        for (probed, (cell, _)) in cells.into_iter().enumerate() {
            if probed >= self.n_probe && scored.len() >= k {
                break;
            }
            for &row in &self.lists[cell] {
                scored.push((row, dot(matrix.row(row), query)));
            }
        }
        select_top_k(scored, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered() -> EmbeddingMatrix {
        // Two tight clusters near the x and y axes.
        let mut ids = Vec::new();
        let mut data = Vec::new();
        for i in 0..10 {
            ids.push(format!("x{}", i));
            data.extend_from_slice(&[1.0, i as f32 * 0.01, 0.0]);
        }
        for i in 0..10 {
            ids.push(format!("y{}", i));
            data.extend_from_slice(&[i as f32 * 0.01, 1.0, 0.0]);
        }
        EmbeddingMatrix::from_rows(ids, data, 3).unwrap()
    }

    #[test]
    fn test_build_partitions_every_row() {
        let m = clustered();
        let ivf = IvfIndex::build(&m, 2, 1, DEFAULT_ITERATIONS).unwrap();
        assert_eq!(ivf.n_lists(), 2);
        assert_eq!(ivf.list_sizes().iter().sum::<usize>(), m.len());
        assert_eq!(ivf.list_sizes(), vec![10, 10]);
    }

    #[test]
    fn test_build_empty() {
        let m = EmbeddingMatrix::from_rows(vec![], vec![], 3).unwrap();
        assert!(IvfIndex::build(&m, 4, 1, DEFAULT_ITERATIONS).is_none());
    }

    #[test]
    fn test_probe_finds_own_cluster() {
        let m = clustered();
        let ivf = IvfIndex::build(&m, 2, 1, DEFAULT_ITERATIONS).unwrap();
        let hits = ivf.search(&m, &[1.0, 0.0, 0.0], 5);
        assert_eq!(hits.len(), 5);
        for (row, _) in hits {
            assert!(m.id(row).unwrap().starts_with('x'));
        }
    }

    #[test]
    fn test_widens_probe_to_fill_k() {
        let m = clustered();
        let ivf = IvfIndex::build(&m, 2, 1, DEFAULT_ITERATIONS).unwrap();
        let hits = ivf.search(&m, &[1.0, 0.0, 0.0], 15);
        assert_eq!(hits.len(), 15);
    }

    #[test]
    fn test_matches_brute_force_with_full_probe() {
        let m = clustered();
        let ivf = IvfIndex::build(&m, 4, 4, DEFAULT_ITERATIONS).unwrap();
        let q = {
            let mut q = vec![0.7, 0.3, 0.0];
            normalize(&mut q);
            q
        };
        let approx: Vec<usize> = ivf.search(&m, &q, 6).into_iter().map(|h| h.0).collect();
        let exact: Vec<usize> = m.brute_force(&q, 6).into_iter().map(|h| h.0).collect();
        assert_eq!(approx, exact);
    }
}
