//! SQLite-backed [`TemplateStore`] implementation.
//!
//! Vectors are stored as BLOBs and compared in Rust (brute-force cosine),
//! which is adequate for a curated catalog of a few thousand rows. Substring
//! matching also runs in Rust over the type-filtered rows: SQLite's `lower()`
//! only folds ASCII, and a plain `contains` keeps `%` and `_` literal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use template_search_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use template_search_core::models::{NewTemplate, Template, TemplateType};
use template_search_core::store::{TemplateFilter, TemplateStore};

const COLUMNS: &str = "id, title, description, best_use_case, template_type, library_tags, \
                       architecture_tags, github_url, notes, embedding, created_at, updated_at";

/// SQLite implementation of the [`TemplateStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_template(row: &SqliteRow) -> Result<Template> {
    let template_type: String = row.get("template_type");
    let library_tags: String = row.get("library_tags");
    let architecture_tags: String = row.get("architecture_tags");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(Template {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        best_use_case: row.get("best_use_case"),
        template_type: template_type.parse::<TemplateType>()?,
        library_tags: serde_json::from_str(&library_tags)
            .with_context(|| "Invalid library_tags column")?,
        architecture_tags: serde_json::from_str(&architecture_tags)
            .with_context(|| "Invalid architecture_tags column")?,
        github_url: row.get("github_url"),
        notes: row.get("notes"),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn type_param(filter: TemplateFilter) -> Option<&'static str> {
    filter.template_type.map(|t| t.as_str())
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        min_similarity: f64,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<(Template, f64)>> {
        let sql = format!(
            "SELECT {} FROM templates \
             WHERE embedding IS NOT NULL AND (? IS NULL OR template_type = ?)",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(type_param(filter))
            .bind(type_param(filter))
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<(Template, f64)> = Vec::new();
        let mut mismatched = 0usize;
        for row in &rows {
            let template = row_to_template(row)?;
            let Some(vec) = template.embedding.as_deref() else {
                continue;
            };
            if vec.len() != query_vec.len() {
                mismatched += 1;
                continue;
            }
            let sim = cosine_similarity(query_vec, vec) as f64;
            if sim >= min_similarity {
                hits.push((template, 1.0 - sim));
            }
        }
        if mismatched > 0 {
            debug!(
                mismatched,
                expected = query_vec.len(),
                "skipped embeddings with a different dimensionality; run `tsearch embed rebuild`"
            );
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn substring_search(
        &self,
        pattern: &str,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<Template>> {
        let needle = pattern.to_lowercase();
        let sql = format!(
            "SELECT {} FROM templates WHERE (? IS NULL OR template_type = ?) ORDER BY id",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(type_param(filter))
            .bind(type_param(filter))
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::new();
        for row in &rows {
            if hits.len() as i64 >= limit {
                break;
            }
            let template = row_to_template(row)?;
            if template.contains_lowercase(&needle) {
                hits.push(template);
            }
        }
        Ok(hits)
    }

    async fn insert_template(&self, new: &NewTemplate, embedding: Option<&[f32]>) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO templates (title, description, best_use_case, template_type,
                                   library_tags, architecture_tags, github_url, notes,
                                   embedding, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.best_use_case)
        .bind(new.template_type.as_str())
        .bind(serde_json::to_string(&new.library_tags)?)
        .bind(serde_json::to_string(&new.architecture_tags)?)
        .bind(&new.github_url)
        .bind(&new.notes)
        .bind(embedding.map(vec_to_blob))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let sql = format!("SELECT {} FROM templates WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_template).transpose()
    }

    async fn list_templates(&self, filter: TemplateFilter, limit: i64) -> Result<Vec<Template>> {
        let sql = format!(
            "SELECT {} FROM templates WHERE (? IS NULL OR template_type = ?) ORDER BY id LIMIT ?",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(type_param(filter))
            .bind(type_param(filter))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_template).collect()
    }

    async fn update_template(
        &self,
        id: i64,
        new: &NewTemplate,
        embedding: Option<&[f32]>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE templates
            SET title = ?, description = ?, best_use_case = ?, template_type = ?,
                library_tags = ?, architecture_tags = ?, github_url = ?, notes = ?,
                embedding = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.best_use_case)
        .bind(new.template_type.as_str())
        .bind(serde_json::to_string(&new.library_tags)?)
        .bind(serde_json::to_string(&new.architecture_tags)?)
        .bind(&new.github_url)
        .bind(&new.notes)
        .bind(embedding.map(vec_to_blob))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_template(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_embedding(&self, id: i64, vector: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE templates SET embedding = ?, updated_at = ? WHERE id = ?")
                .bind(vec_to_blob(vector))
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("template not found: {}", id);
        }
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE templates SET embedding = NULL WHERE embedding IS NOT NULL")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn templates_missing_embedding(&self, limit: i64) -> Result<Vec<Template>> {
        let sql = format!(
            "SELECT {} FROM templates WHERE embedding IS NULL ORDER BY id LIMIT ?",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_template).collect()
    }
}
