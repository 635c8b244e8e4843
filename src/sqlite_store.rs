//! SQLite-backed [`HierarchyStore`] implementation.
//!
//! Hierarchy traversal uses recursive CTEs. The recursion carries a depth
//! column and stops at `max_depth`, so a parent cycle in the data cannot
//! loop forever.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use campaign_rag_core::models::{Keyword, Resource};
use campaign_rag_core::store::{names_overlap, HierarchyStore};

/// SQLite implementation of the [`HierarchyStore`] trait.
///
/// Reads the `keywords`, `resources` and `resource_keywords` tables
/// created by [`crate::migrate`]. Keyword and resource order follows the
/// `position` column assigned at import.
pub struct SqliteHierarchyStore {
    pool: SqlitePool,
}

impl SqliteHierarchyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Row counts for `(keywords, resources, talents)`.
    pub async fn counts(&self) -> Result<(i64, i64, i64)> {
        let keywords: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords")
            .fetch_one(&self.pool)
            .await?;
        let resources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(&self.pool)
            .await?;
        let talents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM talents")
            .fetch_one(&self.pool)
            .await?;
        Ok((keywords, resources, talents))
    }
}

fn keyword_from_row(row: &SqliteRow) -> Keyword {
    Keyword {
        id: row.get("id"),
        name: row.get("name"),
        parent: row.get("parent_id"),
    }
}

const SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id, depth) AS (
        SELECT id, 0 FROM keywords WHERE id = ?1
        UNION
        SELECT k.id, s.depth + 1
        FROM keywords k JOIN subtree s ON k.parent_id = s.id
        WHERE s.depth < ?2
    )
"#;

#[async_trait]
impl HierarchyStore for SqliteHierarchyStore {
    async fn get_keyword(&self, id: &str) -> Result<Option<Keyword>> {
        let row = sqlx::query("SELECT id, name, parent_id FROM keywords WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(keyword_from_row))
    }

    async fn find_keyword_by_name(&self, name: &str) -> Result<Option<Keyword>> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(
            "SELECT id, name, parent_id FROM keywords WHERE name_lc = ? ORDER BY position LIMIT 1",
        )
        .bind(&wanted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(keyword_from_row))
    }

    async fn keywords_matching(&self, needles: &[String]) -> Result<Vec<Keyword>> {
        if needles.iter().all(|n| n.trim().is_empty()) {
            return Ok(Vec::new());
        }
        Ok(self
            .all_keywords()
            .await?
            .into_iter()
            .filter(|k| needles.iter().any(|n| names_overlap(&k.name, n)))
            .collect())
    }

    async fn children_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(Keyword, u32)>> {
        let sql = format!(
            r#"{}
            SELECT k.id, k.name, k.parent_id, MIN(s.depth) AS depth
            FROM subtree s JOIN keywords k ON k.id = s.id
            WHERE k.id != ?1
            GROUP BY k.id
            ORDER BY depth, k.position
            "#,
            SUBTREE_CTE
        );
        let rows = sqlx::query(&sql)
            .bind(root_id)
            .bind(max_depth as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let depth: i64 = row.get("depth");
                (keyword_from_row(row), depth as u32)
            })
            .collect())
    }

    async fn resources_within(&self, root_id: &str, max_depth: u32) -> Result<Vec<(String, u32)>> {
        let sql = format!(
            r#"{}
            SELECT rk.resource_id AS id, MIN(s.depth) AS hops, MIN(r.position) AS pos
            FROM subtree s
            JOIN resource_keywords rk ON rk.keyword_id = s.id
            JOIN resources r ON r.id = rk.resource_id
            GROUP BY rk.resource_id
            ORDER BY hops, pos
            "#,
            SUBTREE_CTE
        );
        let rows = sqlx::query(&sql)
            .bind(root_id)
            .bind(max_depth as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let hops: i64 = row.get("hops");
                (row.get("id"), hops as u32)
            })
            .collect())
    }

    async fn resources_tagged(&self, keyword_ids: &[String]) -> Result<Vec<Resource>> {
        if keyword_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids_json = serde_json::to_string(keyword_ids)?;
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.title, r.url, r.type, tags.keyword_id
            FROM resources r
            JOIN resource_keywords tags ON tags.resource_id = r.id
            WHERE r.id IN (
                SELECT rk.resource_id FROM resource_keywords rk
                WHERE rk.keyword_id IN (SELECT value FROM json_each(?))
            )
            ORDER BY r.position, tags.keyword_id
            "#,
        )
        .bind(&ids_json)
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<Resource> = Vec::new();
        for row in &rows {
            let id: String = row.get("id");
            let keyword: String = row.get("keyword_id");
            match out.last_mut() {
                Some(last) if last.id == id => last.keywords.push(keyword),
                _ => out.push(Resource {
                    id,
                    title: row.get("title"),
                    url: row.get("url"),
                    resource_type: row.get("type"),
                    keywords: vec![keyword],
                }),
            }
        }
        Ok(out)
    }

    async fn all_keywords(&self) -> Result<Vec<Keyword>> {
        let rows = sqlx::query("SELECT id, name, parent_id FROM keywords ORDER BY position")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(keyword_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{import_manifest, propagate, Manifest};
    use crate::migrate::apply_schema;
    use campaign_rag_core::models::DEFAULT_RESOURCE_TYPE;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store_with(manifest: &str) -> SqliteHierarchyStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let manifest: Manifest = serde_json::from_str(manifest).unwrap();
        import_manifest(&pool, &manifest, DEFAULT_RESOURCE_TYPE)
            .await
            .unwrap();
        SqliteHierarchyStore::new(pool)
    }

    const CAMPAIGN: &str = r#"{
        "keywords": [
            {"id": "kw_lv", "name": "Louis Vuitton"},
            {"id": "kw_bags", "name": "LV Bags", "parent": "kw_lv"},
            {"id": "kw_press", "name": "LV Press", "parent": "kw_bags"},
            {"id": "kw_deep", "name": "Deep", "parent": "kw_press"},
            {"id": "kw_deeper", "name": "Deeper", "parent": "kw_deep"},
            {"id": "kw_kusama", "name": "Yayoi Kusama"}
        ],
        "resources": [
            {"id": "bag1", "title": "Speedy", "url": "https://x/bag1", "type": "shopping", "keywords": ["kw_bags"]},
            {"id": "news1", "title": "Show", "url": "https://x/news1", "keywords": ["kw_press", "kw_lv"]},
            {"id": "far1", "title": "Far", "url": "https://x/far1", "keywords": ["kw_deeper"]},
            {"id": "art1", "title": "Dots", "url": "https://x/art1", "keywords": ["kw_kusama", "kw_orphan"]}
        ]
    }"#;

    #[tokio::test]
    async fn test_find_by_name_case_insensitive() {
        let store = store_with(CAMPAIGN).await;
        let kw = store.find_keyword_by_name("  louis VUITTON ").await.unwrap();
        assert_eq!(kw.unwrap().id, "kw_lv");
        assert!(store.find_keyword_by_name("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_children_within_depth() {
        let store = store_with(CAMPAIGN).await;
        let kids = store.children_within("kw_lv", 3).await.unwrap();
        let ids: Vec<(&str, u32)> = kids.iter().map(|(k, d)| (k.id.as_str(), *d)).collect();
        assert_eq!(ids, vec![("kw_bags", 1), ("kw_press", 2), ("kw_deep", 3)]);
    }

    #[tokio::test]
    async fn test_resources_within_min_hops() {
        let store = store_with(CAMPAIGN).await;
        let hops = store.resources_within("kw_lv", 3).await.unwrap();
        assert_eq!(
            hops,
            vec![("news1".to_string(), 0), ("bag1".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_resources_tagged_carries_all_tags() {
        let store = store_with(CAMPAIGN).await;
        let res = store
            .resources_tagged(&["kw_press".to_string(), "kw_lv".to_string()])
            .await
            .unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].id, "news1");
        assert_eq!(res[0].resource_type, "news");
        assert_eq!(res[0].keywords, vec!["kw_lv", "kw_press"]);
    }

    #[tokio::test]
    async fn test_placeholder_keyword_created() {
        let store = store_with(CAMPAIGN).await;
        let kw = store.get_keyword("kw_orphan").await.unwrap().unwrap();
        assert_eq!(kw.name, "kw_orphan");
        assert!(kw.parent.is_none());
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let store = store_with(
            r#"{"keywords": [
                {"id": "a", "name": "A", "parent": "b"},
                {"id": "b", "name": "B", "parent": "a"}
            ]}"#,
        )
        .await;
        let kids = store.children_within("a", 10).await.unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].0.id, "b");
    }

    #[tokio::test]
    async fn test_keywords_matching_store_order() {
        let store = store_with(CAMPAIGN).await;
        let hits = store
            .keywords_matching(&["louis vuitton bags".to_string(), "lv".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["kw_lv", "kw_bags", "kw_press"]);
    }

    #[tokio::test]
    async fn test_propagate_shopping_down_subtree() {
        let store = store_with(CAMPAIGN).await;
        let added = propagate(
            store.pool(),
            &["kw_lv".to_string()],
            &["shopping".to_string()],
        )
        .await
        .unwrap();
        // bag1 gains every subtree keyword except the one it already had
        assert_eq!(added, 4);
        let tagged = store
            .resources_tagged(&["kw_deeper".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = tagged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bag1", "far1"]);
    }

    #[tokio::test]
    async fn test_reimport_upserts() {
        let store = store_with(CAMPAIGN).await;
        let update: Manifest = serde_json::from_str(
            r#"{"resources": [{"id": "bag1", "title": "Neverfull", "type": "shopping", "keywords": ["kw_kusama"]}]}"#,
        )
        .unwrap();
        import_manifest(store.pool(), &update, DEFAULT_RESOURCE_TYPE)
            .await
            .unwrap();
        let res = store
            .resources_tagged(&["kw_kusama".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = res.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["bag1", "art1"]);
        assert_eq!(res[0].title.as_deref(), Some("Neverfull"));
        let (keywords, resources, _) = store.counts().await.unwrap();
        assert_eq!((keywords, resources), (7, 4));
    }

    #[tokio::test]
    async fn test_import_applies_default_type() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let manifest: Manifest = serde_json::from_str(CAMPAIGN).unwrap();
        import_manifest(&pool, &manifest, "Article").await.unwrap();
        let store = SqliteHierarchyStore::new(pool);

        let res = store
            .resources_tagged(&["kw_lv".to_string(), "kw_bags".to_string()])
            .await
            .unwrap();
        let types: Vec<(&str, &str)> = res
            .iter()
            .map(|r| (r.id.as_str(), r.resource_type.as_str()))
            .collect();
        assert_eq!(types, vec![("bag1", "shopping"), ("news1", "article")]);
    }
}
