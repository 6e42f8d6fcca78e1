//! Storage abstraction for Template Search.
//!
//! The [`TemplateStore`] trait exposes the two independent query primitives
//! hybrid search is built on: nearest-neighbour search over stored vectors
//! and case-insensitive substring search over text fields. It also carries
//! the read and write plumbing used by the import and backfill commands.
//!
//! Implementations must be `Send + Sync` so that one handle can be shared
//! across concurrent queries. Search never writes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewTemplate, Template, TemplateType};

/// Optional restriction applied by both retrieval primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateFilter {
    pub template_type: Option<TemplateType>,
}

impl TemplateFilter {
    pub fn by_type(template_type: Option<TemplateType>) -> Self {
        Self { template_type }
    }

    pub fn matches(&self, template: &Template) -> bool {
        self.template_type
            .map_or(true, |t| t == template.template_type)
    }
}

/// Abstract storage backend for the template catalog.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`nearest_neighbors`](TemplateStore::nearest_neighbors) | Cosine nearest-neighbour search |
/// | [`substring_search`](TemplateStore::substring_search) | Case-insensitive substring search |
/// | [`insert_template`](TemplateStore::insert_template) | Insert a template, optionally with its vector |
/// | [`get_template`](TemplateStore::get_template) | Retrieve one template by id |
/// | [`list_templates`](TemplateStore::list_templates) | Unranked listing |
/// | [`update_template`](TemplateStore::update_template) | Replace a template's fields and vector |
/// | [`delete_template`](TemplateStore::delete_template) | Remove a template |
/// | [`set_embedding`](TemplateStore::set_embedding) | Store or replace a template's vector |
/// | [`clear_embeddings`](TemplateStore::clear_embeddings) | Null every stored vector |
/// | [`templates_missing_embedding`](TemplateStore::templates_missing_embedding) | Rows awaiting backfill |
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Templates whose stored vector has cosine similarity to `query_vec`
    /// of at least `min_similarity`, paired with their cosine distance,
    /// closest first, at most `limit` rows. Templates without an embedding,
    /// or whose embedding has a different length than `query_vec`, never
    /// appear.
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        min_similarity: f64,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<(Template, f64)>>;

    /// Templates whose title, description, best use case, or space-joined
    /// tag lists contain `pattern`, ignoring case (Unicode lowercasing).
    /// At most `limit` rows, ordered by id.
    async fn substring_search(
        &self,
        pattern: &str,
        limit: i64,
        filter: TemplateFilter,
    ) -> Result<Vec<Template>>;

    /// Insert a template and return its assigned id.
    async fn insert_template(&self, new: &NewTemplate, embedding: Option<&[f32]>) -> Result<i64>;

    async fn get_template(&self, id: i64) -> Result<Option<Template>>;

    /// All templates matching `filter`, ordered by id, at most `limit` rows.
    async fn list_templates(&self, filter: TemplateFilter, limit: i64) -> Result<Vec<Template>>;

    /// Replace every field of template `id` and its vector (`None` clears
    /// it). Returns `false` when no such template exists.
    async fn update_template(
        &self,
        id: i64,
        new: &NewTemplate,
        embedding: Option<&[f32]>,
    ) -> Result<bool>;

    /// Returns `false` when no such template exists.
    async fn delete_template(&self, id: i64) -> Result<bool>;

    async fn set_embedding(&self, id: i64, vector: &[f32]) -> Result<()>;

    /// Null every stored vector. Returns the number of rows affected.
    async fn clear_embeddings(&self) -> Result<u64>;

    /// Templates with a null embedding, ordered by id, at most `limit` rows.
    async fn templates_missing_embedding(&self, limit: i64) -> Result<Vec<Template>>;
}
