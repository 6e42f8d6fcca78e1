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

/// Create the catalog schema. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Tag lists are JSON arrays; embedding is a little-endian f32 BLOB,
    // NULL when generation failed.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            best_use_case TEXT NOT NULL,
            template_type TEXT NOT NULL DEFAULT 'starter'
                CHECK (template_type IN ('starter', 'mve', 'addon')),
            library_tags TEXT NOT NULL DEFAULT '[]',
            architecture_tags TEXT NOT NULL DEFAULT '[]',
            github_url TEXT NOT NULL,
            notes TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_type ON templates(template_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_title ON templates(title)")
        .execute(pool)
        .await?;

    Ok(())
}
