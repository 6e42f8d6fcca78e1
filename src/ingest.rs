//! Write path: catalog import and embedding backfill.
//!
//! Embedding failures never block a write. A template whose embedding could
//! not be generated is stored with a NULL vector, stays searchable by
//! keyword, and is picked up later by `tsearch embed pending`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use template_search_core::embedding::EmbeddingProvider;
use template_search_core::store::TemplateStore;
use template_search_core::{NewTemplate, Template};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: usize,
    pub embedded: usize,
    pub without_embedding: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillStats {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Read a JSON array of templates.
pub fn read_templates(path: &Path) -> Result<Vec<NewTemplate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let templates: Vec<NewTemplate> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON array of templates", path.display()))?;
    Ok(templates)
}

/// Embed a batch, returning one optional vector per input. A failed call or
/// a vector of the wrong length yields `None` for the affected entries.
async fn embed_batch(provider: &dyn EmbeddingProvider, texts: &[String]) -> Vec<Option<Vec<f32>>> {
    if !provider.is_enabled() {
        return vec![None; texts.len()];
    }

    match provider.embed(texts).await {
        Ok(vectors) if vectors.len() == texts.len() => vectors
            .into_iter()
            .map(|v| {
                if provider.dims() > 0 && v.len() != provider.dims() {
                    warn!(
                        got = v.len(),
                        expected = provider.dims(),
                        "embedding has wrong dimensionality, storing NULL"
                    );
                    None
                } else {
                    Some(v)
                }
            })
            .collect(),
        Ok(vectors) => {
            warn!(
                got = vectors.len(),
                expected = texts.len(),
                "embedding batch returned wrong number of vectors"
            );
            vec![None; texts.len()]
        }
        Err(e) => {
            warn!(error = %e, batch = texts.len(), "embedding batch failed");
            vec![None; texts.len()]
        }
    }
}

/// Embed one template for the write API. Degrades to `None` like an import.
pub async fn embed_one(provider: &dyn EmbeddingProvider, template: &NewTemplate) -> Option<Vec<f32>> {
    embed_batch(provider, &[template.embedding_text()])
        .await
        .pop()
        .flatten()
}

/// Validate and insert `templates`, embedding them in batches of
/// `batch_size`. Validation runs over the whole set before anything is
/// written.
pub async fn import_into(
    store: &dyn TemplateStore,
    provider: &dyn EmbeddingProvider,
    templates: &[NewTemplate],
    batch_size: usize,
) -> Result<ImportStats> {
    for (i, t) in templates.iter().enumerate() {
        t.validate()
            .with_context(|| format!("template #{} ({:?}) is invalid", i + 1, t.title))?;
    }

    let mut stats = ImportStats::default();
    for batch in templates.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|t| t.embedding_text()).collect();
        let vectors = embed_batch(provider, &texts).await;

        for (template, vector) in batch.iter().zip(vectors) {
            let id = store.insert_template(template, vector.as_deref()).await?;
            stats.imported += 1;
            if vector.is_some() {
                stats.embedded += 1;
            } else {
                stats.without_embedding += 1;
                if provider.is_enabled() {
                    warn!(id, title = %template.title, "stored without embedding");
                }
            }
        }
    }

    Ok(stats)
}

/// Embed every template in `pending`, in batches of `batch_size`.
pub async fn backfill(
    store: &dyn TemplateStore,
    provider: &dyn EmbeddingProvider,
    pending: &[Template],
    batch_size: usize,
) -> Result<BackfillStats> {
    let mut stats = BackfillStats {
        pending: pending.len(),
        ..BackfillStats::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|t| t.embedding_text()).collect();
        let vectors = embed_batch(provider, &texts).await;

        for (template, vector) in batch.iter().zip(vectors) {
            match vector {
                Some(v) => {
                    store.set_embedding(template.id, &v).await?;
                    stats.embedded += 1;
                }
                None => stats.failed += 1,
            }
        }
    }

    Ok(stats)
}

/// `tsearch import <file>`
pub async fn import_templates(config: &Config, path: &Path) -> Result<ImportStats> {
    let templates = read_templates(path)?;
    let provider = create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteStore::new(pool);

    if !provider.is_enabled() {
        info!("embedding provider disabled; importing without vectors");
    }

    let stats = import_into(
        &store,
        provider.as_ref(),
        &templates,
        config.embedding.batch_size,
    )
    .await?;

    println!("import {}", path.display());
    println!("  imported: {}", stats.imported);
    println!("  embedded: {}", stats.embedded);
    println!("  without embedding: {}", stats.without_embedding);

    store.pool().close().await;
    Ok(stats)
}

/// `tsearch embed pending`
pub async fn embed_pending(config: &Config, limit: Option<i64>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = create_provider(&config.embedding)?;
    let store = SqliteStore::new(db::connect(config).await?);
    let pending = store
        .templates_missing_embedding(limit.unwrap_or(i64::MAX))
        .await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  templates needing embeddings: {}", pending.len());
        store.pool().close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all templates up to date");
        store.pool().close().await;
        return Ok(());
    }

    let stats = backfill(
        &store,
        provider.as_ref(),
        &pending,
        config.embedding.batch_size,
    )
    .await?;

    println!("embed pending");
    println!("  total pending: {}", stats.pending);
    println!("  embedded: {}", stats.embedded);
    println!("  failed: {}", stats.failed);

    store.pool().close().await;
    Ok(())
}

/// `tsearch embed rebuild`: clear every stored vector, then backfill.
pub async fn embed_rebuild(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = create_provider(&config.embedding)?;
    let store = SqliteStore::new(db::connect(config).await?);

    let cleared = store.clear_embeddings().await?;
    println!("embed rebuild: cleared {} embeddings", cleared);

    let pending = store.templates_missing_embedding(i64::MAX).await?;
    let stats = backfill(
        &store,
        provider.as_ref(),
        &pending,
        config.embedding.batch_size,
    )
    .await?;

    println!("  total templates: {}", stats.pending);
    println!("  embedded: {}", stats.embedded);
    println!("  failed: {}", stats.failed);

    store.pool().close().await;
    Ok(())
}
