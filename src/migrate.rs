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

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Patterns: keywords and template as JSON, embedding as f32 LE BLOB
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            keywords_json TEXT NOT NULL,
            embedding BLOB,
            template_json TEXT NOT NULL,
            success_rate REAL NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Model-synthesized candidates awaiting promotion
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidates (
            signature TEXT PRIMARY KEY,
            candidate_json TEXT NOT NULL,
            positive_votes INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patterns_category ON patterns(category)")
        .execute(pool)
        .await?;

    Ok(())
}
