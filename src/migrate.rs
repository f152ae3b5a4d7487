use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Items are append-only; (source, source_id) is the natural key.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            title TEXT,
            body TEXT,
            url TEXT NOT NULL,
            author TEXT,
            created_at INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(source, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one analysis per item.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL UNIQUE,
            fit_score INTEGER NOT NULL,
            urgency_score INTEGER NOT NULL,
            use_case TEXT NOT NULL,
            reasoning TEXT NOT NULL DEFAULT '',
            problem_summary TEXT NOT NULL DEFAULT '',
            model_used TEXT NOT NULL,
            analyzed_at INTEGER NOT NULL,
            FOREIGN KEY (item_id) REFERENCES items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS digests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            digest_date TEXT NOT NULL,
            generated_at INTEGER NOT NULL,
            content TEXT NOT NULL,
            opportunities_count INTEGER NOT NULL,
            patterns_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_created_at ON items(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_source ON items(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_analyzed_at ON analysis(analyzed_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_use_case ON analysis(use_case)")
        .execute(pool)
        .await?;

    Ok(())
}
