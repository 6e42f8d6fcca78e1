//! Hybrid merge & rank.
//!
//! The retrieval paths (vector and keyword) run elsewhere; this module owns
//! the request contract and the pure step that turns their two result sets
//! into one ranked list.
//!
//! # Merge Algorithm
//!
//! 1. Append every vector hit, in incoming order, as `vector` with its
//!    similarity percentage.
//! 2. For every keyword hit: if the id was already seen, upgrade that entry
//!    to `both` (similarity kept); otherwise append it as `fulltext` with
//!    similarity `0`.
//! 3. Stable sort: `both` < `vector` < `fulltext`; within `both`/`vector`
//!    similarity descending; within `fulltext` title ascending (byte order).
//! 4. Truncate to `limit`.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Deserialize;

use crate::error::SearchError;
use crate::models::{MatchType, RankedResult, Template, TemplateType};

pub const DEFAULT_LIMIT: i64 = 25;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.65;

/// One search invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "type", default)]
    pub template_type: Option<TemplateType>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn default_min_similarity() -> f64 {
    DEFAULT_MIN_SIMILARITY
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            template_type: None,
            limit: DEFAULT_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    pub fn with_type(mut self, template_type: Option<TemplateType>) -> Self {
        self.template_type = template_type;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Reject requests that must not reach the store.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.query.trim().is_empty() {
            return Err(SearchError::Validation(
                "query must not be empty".to_string(),
            ));
        }
        if self.limit <= 0 {
            return Err(SearchError::Validation(format!(
                "limit must be > 0, got {}",
                self.limit
            )));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(SearchError::Validation(format!(
                "minSimilarity must be in [0.0, 1.0], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// A vector-retrieval hit with its similarity already converted to a
/// percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub template: Template,
    pub similarity: f64,
}

/// Merge vector and keyword results into one ranked, deduplicated list of at
/// most `limit` entries.
pub fn merge(
    vector_hits: Vec<VectorHit>,
    keyword_hits: Vec<Template>,
    limit: usize,
) -> Vec<RankedResult> {
    let mut results: Vec<RankedResult> = Vec::with_capacity(vector_hits.len() + keyword_hits.len());
    let mut seen: HashMap<i64, usize> = HashMap::new();

    for hit in vector_hits {
        if seen.contains_key(&hit.template.id) {
            continue;
        }
        seen.insert(hit.template.id, results.len());
        results.push(RankedResult {
            template: hit.template,
            similarity: hit.similarity,
            match_type: MatchType::Vector,
        });
    }

    for template in keyword_hits {
        match seen.get(&template.id) {
            Some(&idx) => {
                // A repeated keyword hit must not promote a keyword-only entry.
                if results[idx].match_type == MatchType::Vector {
                    results[idx].match_type = MatchType::Both;
                }
            }
            None => {
                seen.insert(template.id, results.len());
                results.push(RankedResult {
                    template,
                    similarity: 0.0,
                    match_type: MatchType::Fulltext,
                });
            }
        }
    }

    results.sort_by(compare_ranked);
    results.truncate(limit);
    results
}

/// Ordering used by [`merge`]. `sort_by` is stable, so entries that compare
/// equal keep their accumulation order.
pub fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    a.match_type
        .priority()
        .cmp(&b.match_type.priority())
        .then_with(|| match a.match_type {
            MatchType::Fulltext => a.template.title.cmp(&b.template.title),
            MatchType::Both | MatchType::Vector => b.similarity.total_cmp(&a.similarity),
        })
}

/// Per-match-type counts of a result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub both: usize,
    pub vector: usize,
    pub fulltext: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.both + self.vector + self.fulltext
    }
}

pub fn summarize(results: &[RankedResult]) -> MergeStats {
    results
        .iter()
        .fold(MergeStats::default(), |mut stats, r| {
            match r.match_type {
                MatchType::Both => stats.both += 1,
                MatchType::Vector => stats.vector += 1,
                MatchType::Fulltext => stats.fulltext += 1,
            }
            stats
        })
}
