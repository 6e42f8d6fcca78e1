//! Hybrid search engine.
//!
//! [`HybridEngine`] owns a store handle and an embedding provider handle and
//! is the single search implementation behind the CLI, the HTTP search route
//! and the `search_templates` tool.
//!
//! # Pipeline
//!
//! ```text
//! SearchRequest ──validate──┬── vector_search ──┐
//!                           │  (embed + kNN)    ├── merge ── Vec<RankedResult>
//!                           └── keyword_search ─┘
//! ```
//!
//! Both paths run concurrently with `tokio::join!` and each requests `limit`
//! rows. The embedding call runs under `tokio::time::timeout`. A failure on
//! the vector path is a [`VectorRetrieval::Degraded`] value, not an error:
//! the query continues keyword-only. Only when the keyword path also fails
//! does the engine return [`SearchError::Unavailable`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use template_search_core::embedding::{embed_query, similarity_percent, EmbeddingProvider};
use template_search_core::search::{merge, summarize, SearchRequest, VectorHit};
use template_search_core::store::{TemplateFilter, TemplateStore};
use template_search_core::{RankedResult, SearchError, Template};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Tunables applied to every query.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Upper bound on the query-time embedding call.
    pub embed_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(10),
        }
    }
}

/// Why the vector path contributed nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorFailure {
    /// No embedding provider is configured.
    Disabled,
    /// The provider returned an error.
    Provider(String),
    /// The provider did not answer within the configured timeout.
    Timeout(Duration),
    /// The nearest-neighbour query failed.
    Store(String),
}

impl fmt::Display for VectorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorFailure::Disabled => f.write_str("embedding provider disabled"),
            VectorFailure::Provider(msg) => write!(f, "embedding failed: {}", msg),
            VectorFailure::Timeout(d) => write!(f, "embedding timed out after {:?}", d),
            VectorFailure::Store(msg) => write!(f, "vector query failed: {}", msg),
        }
    }
}

/// Outcome of the vector path.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorRetrieval {
    Hits(Vec<VectorHit>),
    Degraded(VectorFailure),
}

impl VectorRetrieval {
    pub fn is_degraded(&self) -> bool {
        matches!(self, VectorRetrieval::Degraded(_))
    }
}

pub struct HybridEngine {
    store: Arc<dyn TemplateStore>,
    provider: Arc<dyn EmbeddingProvider>,
    options: EngineOptions,
}

impl HybridEngine {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        provider: Arc<dyn EmbeddingProvider>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Open the configured database and embedding provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let provider = create_provider(&config.embedding)?;
        Ok(Self::new(
            Arc::new(SqliteStore::new(pool)),
            provider,
            EngineOptions {
                embed_timeout: config.retrieval.embed_timeout(),
            },
        ))
    }

    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed the query and fetch semantically similar templates, best first.
    pub async fn vector_search(&self, req: &SearchRequest) -> VectorRetrieval {
        if !self.provider.is_enabled() {
            debug!("vector retrieval skipped: provider disabled");
            return VectorRetrieval::Degraded(VectorFailure::Disabled);
        }

        let timeout = self.options.embed_timeout;
        let query_vec =
            match tokio::time::timeout(timeout, embed_query(self.provider.as_ref(), &req.query))
                .await
            {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    warn!(error = %e, "query embedding failed, continuing keyword-only");
                    return VectorRetrieval::Degraded(VectorFailure::Provider(e.to_string()));
                }
                Err(_) => {
                    warn!(?timeout, "query embedding timed out, continuing keyword-only");
                    return VectorRetrieval::Degraded(VectorFailure::Timeout(timeout));
                }
            };

        let filter = TemplateFilter::by_type(req.template_type);
        match self
            .store
            .nearest_neighbors(&query_vec, req.min_similarity, req.limit, filter)
            .await
        {
            Ok(rows) => VectorRetrieval::Hits(
                rows.into_iter()
                    .map(|(template, distance)| VectorHit {
                        template,
                        similarity: similarity_percent(distance),
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "vector query failed, continuing keyword-only");
                VectorRetrieval::Degraded(VectorFailure::Store(e.to_string()))
            }
        }
    }

    /// Case-insensitive substring match over text fields and tags.
    pub async fn keyword_search(&self, req: &SearchRequest) -> Result<Vec<Template>> {
        self.store
            .substring_search(
                &req.query,
                req.limit,
                TemplateFilter::by_type(req.template_type),
            )
            .await
    }

    /// Run a hybrid query.
    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<RankedResult>, SearchError> {
        req.validate()?;

        let (vector, keyword) = tokio::join!(self.vector_search(req), self.keyword_search(req));

        let keyword_hits = match (keyword, &vector) {
            (Ok(hits), _) => hits,
            (Err(e), VectorRetrieval::Degraded(failure)) => {
                warn!(error = %e, vector = %failure, "both retrieval paths failed");
                return Err(SearchError::Unavailable {
                    vector: failure.to_string(),
                    keyword: e.to_string(),
                });
            }
            (Err(e), VectorRetrieval::Hits(_)) => {
                warn!(error = %e, "keyword query failed, continuing vector-only");
                Vec::new()
            }
        };

        let vector_hits = match vector {
            VectorRetrieval::Hits(hits) => hits,
            VectorRetrieval::Degraded(_) => Vec::new(),
        };

        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            "retrieval complete"
        );

        let results = merge(vector_hits, keyword_hits, req.limit as usize);
        let stats = summarize(&results);
        info!(
            query = %req.query,
            total = stats.total(),
            both = stats.both,
            vector_only = stats.vector,
            keyword_only = stats.fulltext,
            "search complete"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use template_search_core::store::memory::InMemoryStore;
    use template_search_core::{MatchType, NewTemplate, TemplateType};

    struct FixedProvider(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("quota exceeded")
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Wraps the in-memory store and fails the selected primitives.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_vector: bool,
        fail_keyword: bool,
    }

    #[async_trait]
    impl TemplateStore for FlakyStore {
        async fn nearest_neighbors(
            &self,
            query_vec: &[f32],
            min_similarity: f64,
            limit: i64,
            filter: TemplateFilter,
        ) -> Result<Vec<(Template, f64)>> {
            if self.fail_vector {
                anyhow::bail!("connection refused");
            }
            self.inner
                .nearest_neighbors(query_vec, min_similarity, limit, filter)
                .await
        }
        async fn substring_search(
            &self,
            pattern: &str,
            limit: i64,
            filter: TemplateFilter,
        ) -> Result<Vec<Template>> {
            if self.fail_keyword {
                anyhow::bail!("connection refused");
            }
            self.inner.substring_search(pattern, limit, filter).await
        }
        async fn insert_template(&self, new: &NewTemplate, e: Option<&[f32]>) -> Result<i64> {
            self.inner.insert_template(new, e).await
        }
        async fn get_template(&self, id: i64) -> Result<Option<Template>> {
            self.inner.get_template(id).await
        }
        async fn list_templates(&self, f: TemplateFilter, limit: i64) -> Result<Vec<Template>> {
            self.inner.list_templates(f, limit).await
        }
        async fn update_template(
            &self,
            id: i64,
            new: &NewTemplate,
            e: Option<&[f32]>,
        ) -> Result<bool> {
            self.inner.update_template(id, new, e).await
        }
        async fn delete_template(&self, id: i64) -> Result<bool> {
            self.inner.delete_template(id).await
        }
        async fn set_embedding(&self, id: i64, v: &[f32]) -> Result<()> {
            self.inner.set_embedding(id, v).await
        }
        async fn clear_embeddings(&self) -> Result<u64> {
            self.inner.clear_embeddings().await
        }
        async fn templates_missing_embedding(&self, limit: i64) -> Result<Vec<Template>> {
            self.inner.templates_missing_embedding(limit).await
        }
    }

    fn template(id: i64, title: &str, tags: &[&str], embedding: Option<Vec<f32>>) -> Template {
        Template {
            id,
            title: title.to_string(),
            description: format!("{} template", title),
            best_use_case: String::new(),
            template_type: TemplateType::Starter,
            library_tags: tags.iter().map(|s| s.to_string()).collect(),
            architecture_tags: Vec::new(),
            github_url: String::new(),
            notes: None,
            embedding,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Unit vector with cosine similarity `sim` to `[1, 0]`.
    fn at(sim: f32) -> Option<Vec<f32>> {
        Some(vec![sim, (1.0 - sim * sim).sqrt()])
    }

    fn build_engine(
        templates: Vec<Template>,
        provider: Arc<dyn EmbeddingProvider>,
        fail_vector: bool,
        fail_keyword: bool,
    ) -> HybridEngine {
        let store = FlakyStore {
            inner: InMemoryStore::with_templates(templates),
            fail_vector,
            fail_keyword,
        };
        HybridEngine::new(
            Arc::new(store),
            provider,
            EngineOptions {
                embed_timeout: Duration::from_millis(50),
            },
        )
    }

    fn ecommerce_catalog() -> Vec<Template> {
        vec![
            template(1, "Storefront", &["e-commerce"], at(0.92)),
            template(2, "Marketplace", &["payments"], at(0.80)),
            template(3, "Checkout Kit", &["e-commerce"], None),
            template(4, "Blog", &["mdx"], at(0.10)),
        ]
    }

    #[tokio::test]
    async fn test_hybrid_order_both_vector_fulltext() {
        let engine = build_engine(
            ecommerce_catalog(),
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            false,
        );
        let results = engine.search(&SearchRequest::new("e-commerce")).await.unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.template.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(results[0].match_type, MatchType::Both);
        assert!((results[0].similarity - 92.0).abs() < 0.01);
        assert_eq!(results[1].match_type, MatchType::Vector);
        assert!((results[1].similarity - 80.0).abs() < 0.01);
        assert_eq!(results[2].match_type, MatchType::Fulltext);
        assert_eq!(results[2].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_keyword_only_document_without_embedding() {
        let engine = build_engine(
            vec![template(1, "Next.js Commerce", &["shop"], None)],
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            false,
        );
        let results = engine.search(&SearchRequest::new("shop")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template.id, 1);
        assert_eq!(results[0].match_type, MatchType::Fulltext);
        assert_eq!(results[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_limit_one_keeps_best_both() {
        let engine = build_engine(
            vec![
                template(1, "Shop A", &["shop"], at(0.88)),
                template(2, "Shop B", &["shop"], at(0.95)),
            ],
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            false,
        );
        let results = engine
            .search(&SearchRequest::new("shop").with_limit(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template.id, 2);
        assert_eq!(results[0].match_type, MatchType::Both);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_keyword() {
        let engine = build_engine(ecommerce_catalog(), Arc::new(FailingProvider), false, false);

        let vector = engine.vector_search(&SearchRequest::new("e-commerce")).await;
        assert!(matches!(
            vector,
            VectorRetrieval::Degraded(VectorFailure::Provider(ref m)) if m.contains("quota")
        ));

        let results = engine.search(&SearchRequest::new("e-commerce")).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.template.id).collect();
        // Keyword-only entries are ordered by title.
        assert_eq!(ids, vec![3, 1]);
        assert!(results.iter().all(|r| r.match_type == MatchType::Fulltext));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let engine = build_engine(ecommerce_catalog(), Arc::new(SlowProvider), false, false);
        let vector = engine.vector_search(&SearchRequest::new("e-commerce")).await;
        assert_eq!(
            vector,
            VectorRetrieval::Degraded(VectorFailure::Timeout(Duration::from_millis(50)))
        );

        let results = engine.search(&SearchRequest::new("e-commerce")).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_provider_skips_vector_path() {
        let engine = build_engine(
            ecommerce_catalog(),
            Arc::new(crate::embedding::DisabledProvider),
            false,
            false,
        );
        let vector = engine.vector_search(&SearchRequest::new("blog")).await;
        assert_eq!(vector, VectorRetrieval::Degraded(VectorFailure::Disabled));
    }

    #[tokio::test]
    async fn test_keyword_store_failure_keeps_vector_results() {
        let engine = build_engine(
            ecommerce_catalog(),
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            true,
        );
        let results = engine.search(&SearchRequest::new("e-commerce")).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.template.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(results.iter().all(|r| r.match_type == MatchType::Vector));
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_unavailable() {
        let engine = build_engine(
            ecommerce_catalog(),
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            true,
            true,
        );
        let err = engine
            .search(&SearchRequest::new("e-commerce"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "search_unavailable");

        // A provider failure plus a keyword failure is also total failure.
        let engine = build_engine(ecommerce_catalog(), Arc::new(FailingProvider), false, true);
        let err = engine
            .search(&SearchRequest::new("e-commerce"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_no_matches_is_empty_success() {
        let engine = build_engine(
            ecommerce_catalog(),
            Arc::new(FixedProvider(vec![0.0, -1.0])),
            false,
            false,
        );
        let results = engine.search(&SearchRequest::new("zzz")).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejected_before_retrieval() {
        let engine = build_engine(ecommerce_catalog(), Arc::new(FailingProvider), true, true);
        let err = engine.search(&SearchRequest::new("  ")).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
        let err = engine
            .search(&SearchRequest::new("shop").with_limit(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_type_filter_applies_to_both_paths() {
        let mut catalog = ecommerce_catalog();
        catalog[0].template_type = TemplateType::Addon;
        let engine = build_engine(
            catalog,
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            false,
        );
        let results = engine
            .search(&SearchRequest::new("e-commerce").with_type(Some(TemplateType::Addon)))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].template.id, 1);
        assert_eq!(results[0].match_type, MatchType::Both);
    }

    #[tokio::test]
    async fn test_keyword_match_ignores_non_ascii_case() {
        let engine = build_engine(
            vec![template(1, "École Starter", &[], None)],
            Arc::new(crate::embedding::DisabledProvider),
            false,
            false,
        );
        let results = engine.search(&SearchRequest::new("ÉCOLE")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Fulltext);
    }

    #[tokio::test]
    async fn test_stale_dimension_vectors_are_not_matched() {
        let engine = build_engine(
            vec![template(1, "Legacy", &[], Some(vec![1.0, 0.0, 0.0]))],
            Arc::new(FixedProvider(vec![1.0, 0.0])),
            false,
            false,
        );
        let results = engine
            .search(&SearchRequest::new("zzz").with_min_similarity(0.0))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
