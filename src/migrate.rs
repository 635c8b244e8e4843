use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the campaign graph schema on an open pool. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Keyword hierarchy. `position` preserves manifest order for name matching.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS keywords (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_lc TEXT NOT NULL,
            parent_id TEXT,
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            title TEXT,
            url TEXT,
            type TEXT NOT NULL DEFAULT 'news',
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_keywords (
            resource_id TEXT NOT NULL,
            keyword_id TEXT NOT NULL,
            PRIMARY KEY (resource_id, keyword_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Talents are stored for indexing and inspection but never ranked.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS talents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT,
            url TEXT,
            position INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS talent_keywords (
            talent_id TEXT NOT NULL,
            keyword_id TEXT NOT NULL,
            PRIMARY KEY (talent_id, keyword_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_parent ON keywords(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_keywords_name_lc ON keywords(name_lc)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resource_keywords_keyword ON resource_keywords(keyword_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_talent_keywords_keyword ON talent_keywords(keyword_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
