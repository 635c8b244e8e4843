//! Campaign manifest loading, import, and tag propagation.
//!
//! A manifest is a JSON document describing the keyword hierarchy and the
//! items tagged into it:
//!
//! ```json
//! {
//!   "keywords":  [{ "id": "kw_lv", "name": "Louis Vuitton", "parent": null }],
//!   "resources": [{ "id": "r1", "title": "...", "url": "...", "type": "news", "keywords": ["kw_lv"] }],
//!   "talents":   [{ "id": "t1", "name": "...", "role": "...", "url": "...", "keywords": ["kw_lv"] }]
//! }
//! ```
//!
//! Import is an upsert keyed on id. Keyword ids referenced by a resource
//! or talent but missing from `keywords` become placeholder keywords whose
//! name is the id. Within one manifest the first occurrence of an id wins.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use campaign_rag_core::models::{normalize_list, normalize_type};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub keywords: Vec<ManifestKeyword>,
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
    #[serde(default)]
    pub talents: Vec<ManifestTalent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestKeyword {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestResource {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ManifestResource {
    fn type_tag(&self, default_type: &str) -> String {
        normalize_type(self.resource_type.as_deref(), default_type)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestTalent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// What `index build` embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScope {
    All,
    Resources,
    Keywords,
    Talents,
}

impl IndexScope {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "resources" => Ok(Self::Resources),
            "keywords" => Ok(Self::Keywords),
            "talents" => Ok(Self::Talents),
            other => anyhow::bail!("Unknown index scope: {}", other),
        }
    }

    fn includes(self, other: IndexScope) -> bool {
        self == IndexScope::All || self == other
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

fn join_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

impl Manifest {
    /// `(id, text)` pairs to embed, resources first, then keywords, then
    /// talents. Entries with empty text are skipped and the first
    /// occurrence of an id wins.
    pub fn index_entries(
        &self,
        scope: IndexScope,
        include_url: bool,
        default_type: &str,
    ) -> Vec<(String, String)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        let mut push = |id: &str, text: String| {
            let id = id.trim();
            if id.is_empty() || text.is_empty() {
                return;
            }
            if seen.insert(id.to_string()) {
                out.push((id.to_string(), text));
            }
        };

        if scope.includes(IndexScope::Resources) {
            for r in &self.resources {
                let kind = r.type_tag(default_type);
                let url = if include_url { r.url.as_deref() } else { None };
                push(&r.id, join_parts(&[r.title.as_deref(), Some(&kind), url]));
            }
        }
        if scope.includes(IndexScope::Keywords) {
            for k in &self.keywords {
                push(&k.id, k.name.trim().to_string());
            }
        }
        if scope.includes(IndexScope::Talents) {
            for t in &self.talents {
                let url = if include_url { t.url.as_deref() } else { None };
                push(&t.id, join_parts(&[Some(&t.name), t.role.as_deref(), url]));
            }
        }
        out
    }

    /// Keyword ids referenced by resources or talents that the manifest
    /// does not declare, in first-reference order.
    pub fn missing_keyword_ids(&self) -> Vec<String> {
        let declared: HashSet<&str> = self.keywords.iter().map(|k| k.id.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let refs = self
            .resources
            .iter()
            .flat_map(|r| r.keywords.iter())
            .chain(self.talents.iter().flat_map(|t| t.keywords.iter()));
        let mut out = Vec::new();
        for id in refs {
            let id = id.trim();
            if id.is_empty() || declared.contains(id) {
                continue;
            }
            if seen.insert(id) {
                out.push(id.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub keywords: usize,
    pub placeholders: usize,
    pub resources: usize,
    pub talents: usize,
    pub tags: usize,
    pub skipped_duplicates: usize,
}

/// Delete every keyword, resource, talent, and tag.
pub async fn wipe(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in [
        "resource_keywords",
        "talent_keywords",
        "resources",
        "talents",
        "keywords",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Upsert a manifest into the graph database in one transaction.
///
/// Resources without a type are stored as `default_type`.
pub async fn import_manifest(
    pool: &SqlitePool,
    manifest: &Manifest,
    default_type: &str,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut tx = pool.begin().await?;

    let mut seen: HashSet<&str> = HashSet::new();
    for k in &manifest.keywords {
        let id = k.id.trim();
        if id.is_empty() {
            continue;
        }
        if !seen.insert(id) {
            stats.skipped_duplicates += 1;
            continue;
        }
        let parent = k
            .parent
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        sqlx::query(
            r#"
            INSERT INTO keywords (id, name, name_lc, parent_id, position)
            VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM keywords))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                name_lc = excluded.name_lc,
                parent_id = excluded.parent_id
            "#,
        )
        .bind(id)
        .bind(k.name.trim())
        .bind(k.name.trim().to_lowercase())
        .bind(parent)
        .execute(&mut *tx)
        .await?;
        stats.keywords += 1;
    }

    for id in manifest.missing_keyword_ids() {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO keywords (id, name, name_lc, parent_id, position)
            VALUES (?, ?, ?, NULL, (SELECT COALESCE(MAX(position), -1) + 1 FROM keywords))
            "#,
        )
        .bind(&id)
        .bind(&id)
        .bind(id.to_lowercase())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted > 0 {
            debug!(keyword_id = %id, "created placeholder keyword");
            stats.placeholders += 1;
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for r in &manifest.resources {
        let id = r.id.trim();
        if id.is_empty() {
            continue;
        }
        if !seen.insert(id) {
            stats.skipped_duplicates += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO resources (id, title, url, type, position)
            VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM resources))
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                type = excluded.type
            "#,
        )
        .bind(id)
        .bind(r.title.as_deref())
        .bind(r.url.as_deref().map(str::trim).filter(|u| !u.is_empty()))
        .bind(r.type_tag(default_type))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM resource_keywords WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for kw in r.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            let added = sqlx::query(
                "INSERT OR IGNORE INTO resource_keywords (resource_id, keyword_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(kw)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            stats.tags += added as usize;
        }
        stats.resources += 1;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for t in &manifest.talents {
        let id = t.id.trim();
        if id.is_empty() {
            continue;
        }
        if !seen.insert(id) {
            stats.skipped_duplicates += 1;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO talents (id, name, role, url, position)
            VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM talents))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                url = excluded.url
            "#,
        )
        .bind(id)
        .bind(t.name.trim())
        .bind(t.role.as_deref())
        .bind(t.url.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM talent_keywords WHERE talent_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for kw in t.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            sqlx::query(
                "INSERT OR IGNORE INTO talent_keywords (talent_id, keyword_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(kw)
            .execute(&mut *tx)
            .await?;
        }
        stats.talents += 1;
    }

    tx.commit().await?;

    if stats.skipped_duplicates > 0 {
        warn!(
            skipped = stats.skipped_duplicates,
            "duplicate manifest ids ignored (first occurrence kept)"
        );
    }
    info!(
        keywords = stats.keywords,
        placeholders = stats.placeholders,
        resources = stats.resources,
        talents = stats.talents,
        tags = stats.tags,
        "manifest imported"
    );
    Ok(stats)
}

/// Downward tag inheritance.
///
/// For each root, every resource whose type is in `types` and that is
/// tagged anywhere in the root's full subtree becomes tagged with every
/// keyword of that subtree. Returns the number of tags added.
pub async fn propagate(pool: &SqlitePool, roots: &[String], types: &[String]) -> Result<usize> {
    let types = normalize_list(types);
    if types.is_empty() {
        return Ok(0);
    }
    let types_json = serde_json::to_string(&types)?;

    let mut tx = pool.begin().await?;
    let mut added = 0usize;
    for root in roots.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM keywords WHERE id = ?
                UNION
                SELECT k.id FROM keywords k JOIN subtree s ON k.parent_id = s.id
            ),
            typed AS (
                SELECT DISTINCT rk.resource_id
                FROM resource_keywords rk
                JOIN resources r ON r.id = rk.resource_id
                WHERE rk.keyword_id IN (SELECT id FROM subtree)
                  AND r.type IN (SELECT value FROM json_each(?))
            )
            INSERT OR IGNORE INTO resource_keywords (resource_id, keyword_id)
            SELECT typed.resource_id, subtree.id FROM typed CROSS JOIN subtree
            "#,
        )
        .bind(root)
        .bind(&types_json)
        .execute(&mut *tx)
        .await?;
        let n = result.rows_affected() as usize;
        debug!(root = %root, added = n, "propagated tags");
        added += n;
    }
    tx.commit().await?;

    info!(roots = roots.len(), added, "tag propagation finished");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        serde_json::from_str(
            r#"{
                "keywords": [
                    {"id": "kw_lv", "name": "Louis Vuitton"},
                    {"id": "kw_bags", "name": "LV Bags", "parent": "kw_lv"}
                ],
                "resources": [
                    {"id": "r1", "title": "Speedy", "url": "https://x/1", "type": "Shopping", "keywords": ["kw_bags"]},
                    {"id": "r2", "title": "Runway", "url": "https://x/2", "keywords": ["kw_lv", "kw_ghost"]},
                    {"id": "r1", "title": "Dup", "keywords": []},
                    {"id": "r3", "title": "", "keywords": []}
                ],
                "talents": [
                    {"id": "t1", "name": "Zendaya", "role": "Ambassador", "keywords": ["kw_lv", "kw_talent_only"]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_index_entries_resources() {
        let entries = sample().index_entries(IndexScope::Resources, false, "news");
        assert_eq!(
            entries,
            vec![
                ("r1".to_string(), "Speedy | shopping".to_string()),
                ("r2".to_string(), "Runway | news".to_string()),
                ("r3".to_string(), "news".to_string()),
            ]
        );
    }

    #[test]
    fn test_index_entries_with_url_and_talents() {
        let entries = sample().index_entries(IndexScope::All, true, "news");
        assert_eq!(entries[0].1, "Speedy | shopping | https://x/1");
        assert!(entries.iter().any(|(id, t)| id == "kw_bags" && t == "LV Bags"));
        assert!(entries
            .iter()
            .any(|(id, t)| id == "t1" && t == "Zendaya | Ambassador"));
        let ids: Vec<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.iter().filter(|id| **id == "r1").count(), 1);
    }

    #[test]
    fn test_index_entries_use_default_type() {
        let entries = sample().index_entries(IndexScope::Resources, false, "Article");
        assert_eq!(entries[0].1, "Speedy | shopping");
        assert_eq!(entries[1].1, "Runway | article");
    }

    #[test]
    fn test_missing_keyword_ids() {
        assert_eq!(
            sample().missing_keyword_ids(),
            vec!["kw_ghost".to_string(), "kw_talent_only".to_string()]
        );
    }

    #[test]
    fn test_index_scope_parse() {
        assert_eq!(IndexScope::parse("Talents").unwrap(), IndexScope::Talents);
        assert!(IndexScope::parse("chunks").is_err());
    }
}
