//! In-memory [`TemplateStore`] implementation for testing.
//!
//! Templates live in a `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity; substring search uses Unicode lowercasing,
//! as the SQLite store does.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{NewTemplate, Template};

use super::{TemplateFilter, TemplateStore};

/// In-memory template catalog.
pub struct InMemoryStore {
    templates: RwLock<Vec<Template>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(Vec::new()),
        }
    }

    /// Build a store from fully-formed templates, keeping their ids.
    pub fn with_templates(templates: Vec<Template>) -> Self {
        Self {
            templates: RwLock::new(templates),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Template>>> {
        self.templates
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Template>>> {
        self.templates
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cap(limit: i64) -> usize {
    limit.max(0) as usize
}

#[async_trait]
impl TemplateStore for InMemoryStore {
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        min_similarity: f64,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<(Template, f64)>> {
        let templates = self.read()?;
        let mut hits: Vec<(Template, f64)> = templates
            .iter()
            .filter(|t| filter.matches(t))
            .filter_map(|t| {
                let vec = t.embedding.as_ref().filter(|v| v.len() == query_vec.len())?;
                let sim = cosine_similarity(query_vec, vec) as f64;
                (sim >= min_similarity).then(|| (t.clone(), 1.0 - sim))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(cap(limit));
        Ok(hits)
    }

    async fn substring_search(
        &self,
        pattern: &str,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<Template>> {
        let needle = pattern.to_lowercase();
        let templates = self.read()?;
        let mut hits: Vec<Template> = templates
            .iter()
            .filter(|t| filter.matches(t) && t.contains_lowercase(&needle))
            .cloned()
            .collect();
        hits.sort_by_key(|t| t.id);
        hits.truncate(cap(limit));
        Ok(hits)
    }

    async fn insert_template(&self, new: &NewTemplate, embedding: Option<&[f32]>) -> Result<i64> {
        let mut templates = self.write()?;
        let id = templates.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let now = chrono::Utc::now().timestamp();
        templates.push(Template {
            id,
            title: new.title.clone(),
            description: new.description.clone(),
            best_use_case: new.best_use_case.clone(),
            template_type: new.template_type,
            library_tags: new.library_tags.clone(),
            architecture_tags: new.architecture_tags.clone(),
            github_url: new.github_url.clone(),
            notes: new.notes.clone(),
            embedding: embedding.map(<[f32]>::to_vec),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        Ok(self.read()?.iter().find(|t| t.id == id).cloned())
    }

    async fn list_templates(&self, filter: TemplateFilter, limit: i64) -> Result<Vec<Template>> {
        let templates = self.read()?;
        let mut all: Vec<Template> = templates
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        all.sort_by_key(|t| t.id);
        all.truncate(cap(limit));
        Ok(all)
    }

    async fn update_template(
        &self,
        id: i64,
        new: &NewTemplate,
        embedding: Option<&[f32]>,
    ) -> Result<bool> {
        let mut templates = self.write()?;
        let Some(template) = templates.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        template.title = new.title.clone();
        template.description = new.description.clone();
        template.best_use_case = new.best_use_case.clone();
        template.template_type = new.template_type;
        template.library_tags = new.library_tags.clone();
        template.architecture_tags = new.architecture_tags.clone();
        template.github_url = new.github_url.clone();
        template.notes = new.notes.clone();
        template.embedding = embedding.map(<[f32]>::to_vec);
        template.updated_at = chrono::Utc::now().timestamp();
        Ok(true)
    }

    async fn delete_template(&self, id: i64) -> Result<bool> {
        let mut templates = self.write()?;
        let before = templates.len();
        templates.retain(|t| t.id != id);
        Ok(templates.len() < before)
    }

    async fn set_embedding(&self, id: i64, vector: &[f32]) -> Result<()> {
        let mut templates = self.write()?;
        let template = templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("template not found: {}", id))?;
        template.embedding = Some(vector.to_vec());
        template.updated_at = chrono::Utc::now().timestamp();
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<u64> {
        let mut templates = self.write()?;
        let mut cleared = 0;
        for t in templates.iter_mut().filter(|t| t.embedding.is_some()) {
            t.embedding = None;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn templates_missing_embedding(&self, limit: i64) -> Result<Vec<Template>> {
        let templates = self.read()?;
        let mut missing: Vec<Template> = templates
            .iter()
            .filter(|t| t.embedding.is_none())
            .cloned()
            .collect();
        missing.sort_by_key(|t| t.id);
        missing.truncate(cap(limit));
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateType;

    fn new_template(title: &str, template_type: TemplateType, tags: &[&str]) -> NewTemplate {
        NewTemplate {
            title: title.to_string(),
            description: format!("{} description", title),
            best_use_case: "Prototyping".to_string(),
            template_type,
            library_tags: tags.iter().map(|s| s.to_string()).collect(),
            architecture_tags: Vec::new(),
            github_url: format!("https://github.com/example/{}", title),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryStore::new();
        let a = store
            .insert_template(&new_template("a", TemplateType::Starter, &[]), None)
            .await
            .unwrap();
        let b = store
            .insert_template(&new_template("b", TemplateType::Starter, &[]), None)
            .await
            .unwrap();
        assert!(b > a);
        assert_eq!(store.get_template(b).await.unwrap().unwrap().title, "b");
        assert!(store.get_template(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nearest_neighbors_skips_missing_embeddings_and_thresholds() {
        let store = InMemoryStore::new();
        let close = store
            .insert_template(
                &new_template("close", TemplateType::Starter, &[]),
                Some(&[1.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .insert_template(
                &new_template("far", TemplateType::Starter, &[]),
                Some(&[0.0, 1.0]),
            )
            .await
            .unwrap();
        store
            .insert_template(&new_template("none", TemplateType::Starter, &[]), None)
            .await
            .unwrap();

        let hits = store
            .nearest_neighbors(&[1.0, 0.1], 0.5, 10, TemplateFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, close);
        assert!(hits[0].1 < 0.01);
    }

    #[tokio::test]
    async fn test_substring_search_is_case_insensitive_and_covers_tags() {
        let store = InMemoryStore::new();
        store
            .insert_template(
                &new_template("Shop Starter", TemplateType::Starter, &["stripe"]),
                None,
            )
            .await
            .unwrap();
        store
            .insert_template(
                &new_template("Blog", TemplateType::Addon, &["mdx", "Stripe-Checkout"]),
                None,
            )
            .await
            .unwrap();

        let hits = store
            .substring_search("STRIPE", 10, TemplateFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let addons = store
            .substring_search("stripe", 10, TemplateFilter::by_type(Some(TemplateType::Addon)))
            .await
            .unwrap();
        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].title, "Blog");

        let joined = store
            .substring_search("mdx stripe", 10, TemplateFilter::default())
            .await
            .unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[tokio::test]
    async fn test_substring_search_folds_non_ascii_case() {
        let store = InMemoryStore::new();
        let id = store
            .insert_template(&new_template("ÉCOLE Kit", TemplateType::Starter, &[]), None)
            .await
            .unwrap();

        let hits = store
            .substring_search("école", 10, TemplateFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_skips_mismatched_dimensions() {
        let store = InMemoryStore::new();
        store
            .insert_template(
                &new_template("old model", TemplateType::Starter, &[]),
                Some(&[1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        let current = store
            .insert_template(
                &new_template("new model", TemplateType::Starter, &[]),
                Some(&[0.0, 1.0]),
            )
            .await
            .unwrap();

        let hits = store
            .nearest_neighbors(&[1.0, 0.0], 0.0, 10, TemplateFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, current);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = InMemoryStore::new();
        let id = store
            .insert_template(&new_template("a", TemplateType::Starter, &[]), Some(&[1.0]))
            .await
            .unwrap();

        let renamed = new_template("b", TemplateType::Addon, &["stripe"]);
        assert!(store.update_template(id, &renamed, None).await.unwrap());
        let t = store.get_template(id).await.unwrap().unwrap();
        assert_eq!(t.title, "b");
        assert_eq!(t.template_type, TemplateType::Addon);
        assert!(t.embedding.is_none());
        assert!(!store.update_template(999, &renamed, None).await.unwrap());

        assert!(store.delete_template(id).await.unwrap());
        assert!(store.get_template(id).await.unwrap().is_none());
        assert!(!store.delete_template(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_backfill_helpers() {
        let store = InMemoryStore::new();
        let id = store
            .insert_template(&new_template("a", TemplateType::Mve, &[]), None)
            .await
            .unwrap();
        assert_eq!(store.templates_missing_embedding(10).await.unwrap().len(), 1);

        store.set_embedding(id, &[0.3, 0.4]).await.unwrap();
        assert!(store.templates_missing_embedding(10).await.unwrap().is_empty());

        assert_eq!(store.clear_embeddings().await.unwrap(), 1);
        assert_eq!(store.templates_missing_embedding(10).await.unwrap().len(), 1);
        assert!(store.set_embedding(42, &[1.0]).await.is_err());
    }
}
