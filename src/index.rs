//! Vector artifacts: build from a manifest, load at startup.
//!
//! An index directory holds three files:
//!
//! | File | Content |
//! |------|---------|
//! | `ids.json` | JSON array of ids, one per row |
//! | `embeddings.f32` | little-endian `f32` rows, row-major |
//! | `meta.json` | [`IndexMeta`] (`dims`, `model`, `count`, `scope`) |
//!
//! Loading verifies `ids × dims == floats` and fails otherwise. A bad
//! artifact is a startup failure, never a per-query one.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use campaign_rag_core::embedding::{blob_to_vec, vec_to_blob, Embedder};
use campaign_rag_core::vector::ivf::{IvfIndex, DEFAULT_ITERATIONS};
use campaign_rag_core::vector::{EmbeddingMatrix, VectorIndex, VectorPool};

use crate::config::Config;
use crate::manifest::{load_manifest, IndexScope};

pub const IDS_FILE: &str = "ids.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.f32";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub dims: usize,
    pub model: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub rows: usize,
    pub dims: usize,
    pub model: String,
}

/// Embed the manifest per `index.scope` and write the artifacts.
pub async fn build_index(
    config: &Config,
    manifest_path: &Path,
    embedder: &dyn Embedder,
) -> Result<BuildSummary> {
    if !config.embedding.is_enabled() {
        bail!("Cannot build an index with embedding.provider = \"disabled\"");
    }
    let manifest = load_manifest(manifest_path)?;
    let scope = IndexScope::parse(&config.index.scope)?;
    let entries = manifest.index_entries(
        scope,
        config.index.include_url,
        &config.retrieval.default_type,
    );
    if entries.is_empty() {
        bail!("Manifest has nothing to index for scope '{}'", config.index.scope);
    }

    let dims = embedder.dims();
    let batch = config.embedding.batch_size.max(1);
    let mut ids = Vec::with_capacity(entries.len());
    let mut data = Vec::with_capacity(entries.len() * dims);

    for chunk in entries.chunks(batch) {
        let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
        let vectors = embedder.encode_batch(&texts).await?;
        if vectors.len() != chunk.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                chunk.len()
            );
        }
        for ((id, _), v) in chunk.iter().zip(vectors) {
            if v.len() != dims {
                bail!("embedding for '{}' has {} dims, expected {}", id, v.len(), dims);
            }
            ids.push(id.clone());
            data.extend_from_slice(&v);
        }
        info!(embedded = ids.len(), total = entries.len(), "embedding batch done");
    }

    let meta = IndexMeta {
        dims,
        model: embedder.model_name().to_string(),
        count: ids.len(),
        scope: Some(config.index.scope.clone()),
    };
    write_artifacts(&config.index.dir, &ids, &data, &meta)?;

    info!(rows = ids.len(), dims, dir = %config.index.dir.display(), "index written");
    Ok(BuildSummary {
        rows: ids.len(),
        dims,
        model: meta.model,
    })
}

pub fn write_artifacts(dir: &Path, ids: &[String], data: &[f32], meta: &IndexMeta) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index dir: {}", dir.display()))?;
    std::fs::write(dir.join(IDS_FILE), serde_json::to_vec(ids)?)?;
    std::fs::write(dir.join(EMBEDDINGS_FILE), vec_to_blob(data))?;
    std::fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(meta)?)?;
    Ok(())
}

/// Read and verify the artifacts in `dir`.
pub fn load_matrix(dir: &Path) -> Result<(EmbeddingMatrix, IndexMeta)> {
    let ids_path = dir.join(IDS_FILE);
    let emb_path = dir.join(EMBEDDINGS_FILE);
    let meta_path = dir.join(META_FILE);

    let ids: Vec<String> = serde_json::from_slice(
        &std::fs::read(&ids_path)
            .with_context(|| format!("Missing index ids: {}", ids_path.display()))?,
    )
    .with_context(|| format!("Failed to parse {}", ids_path.display()))?;
    let meta: IndexMeta = serde_json::from_slice(
        &std::fs::read(&meta_path)
            .with_context(|| format!("Missing index metadata: {}", meta_path.display()))?,
    )
    .with_context(|| format!("Failed to parse {}", meta_path.display()))?;
    let bytes = std::fs::read(&emb_path)
        .with_context(|| format!("Missing embeddings: {}", emb_path.display()))?;

    if bytes.len() % 4 != 0 {
        bail!(
            "{} is {} bytes, not a whole number of f32 values",
            emb_path.display(),
            bytes.len()
        );
    }
    let data = blob_to_vec(&bytes);
    if ids.len() * meta.dims != data.len() {
        bail!(
            "Index artifacts disagree: {} ids × {} dims != {} floats in {}",
            ids.len(),
            meta.dims,
            data.len(),
            emb_path.display()
        );
    }

    let matrix = EmbeddingMatrix::from_rows(ids, data, meta.dims)?;
    Ok((matrix, meta))
}

/// Build the query-time vector pool.
///
/// With embeddings disabled the pool is empty and ranking falls back to
/// the graph prior. Otherwise the artifacts must exist and match the
/// embedder's dimensionality.
pub fn load_pool(config: &Config, embedder: &dyn Embedder) -> Result<Arc<VectorPool>> {
    if !config.embedding.is_enabled() {
        info!("embeddings disabled, ranking by graph prior only");
        return Ok(Arc::new(VectorPool::new(EmbeddingMatrix::empty(), None)));
    }

    let (matrix, meta) = load_matrix(&config.index.dir)?;
    if meta.dims != embedder.dims() {
        bail!(
            "Index was built with {} dims but embedder '{}' produces {}. Rebuild with `crag index build`.",
            meta.dims,
            embedder.model_name(),
            embedder.dims()
        );
    }
    if meta.model != embedder.model_name() {
        warn!(index_model = %meta.model, embedder = %embedder.model_name(), "index built with a different model");
    }

    let index: Option<Box<dyn VectorIndex>> = match config.index.kind.as_str() {
        "ivf" => IvfIndex::build(
            &matrix,
            config.index.n_lists,
            config.index.n_probe,
            DEFAULT_ITERATIONS,
        )
        .map(|ivf| Box::new(ivf) as Box<dyn VectorIndex>),
        _ => None,
    };
    if index.is_none() && config.index.kind == "ivf" {
        warn!(rows = matrix.len(), "ivf index unavailable, using brute force");
    }

    info!(rows = matrix.len(), dims = matrix.dims(), kind = %config.index.kind, "vector pool loaded");
    Ok(Arc::new(VectorPool::new(matrix, index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_load() {
        let tmp = TempDir::new().unwrap();
        let ids = vec!["a".to_string(), "b".to_string()];
        let data = vec![3.0, 4.0, 0.0, 2.0];
        let meta = IndexMeta {
            dims: 2,
            model: "m".into(),
            count: 2,
            scope: None,
        };
        write_artifacts(tmp.path(), &ids, &data, &meta).unwrap();
        let (matrix, loaded) = load_matrix(tmp.path()).unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(matrix.len(), 2);
        assert!((matrix.row(0)[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_load_rejects_mismatch() {
        let tmp = TempDir::new().unwrap();
        let meta = IndexMeta {
            dims: 3,
            model: "m".into(),
            count: 2,
            scope: None,
        };
        write_artifacts(
            tmp.path(),
            &["a".to_string(), "b".to_string()],
            &[1.0, 2.0, 3.0, 4.0],
            &meta,
        )
        .unwrap();
        let err = load_matrix(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("disagree"), "{}", err);
    }

    #[test]
    fn test_load_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(load_matrix(&tmp.path().join("nope")).is_err());
    }
}
