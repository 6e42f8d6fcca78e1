//! Caller-visible errors.
//!
//! A failing embedding provider, or a store failure on one retrieval path,
//! degrades a query instead of failing it and is never represented here.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// Input rejected before the store was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A lookup named a template that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Neither retrieval path produced a result set.
    #[error("search unavailable (vector: {vector}; keyword: {keyword})")]
    Unavailable { vector: String, keyword: String },
}

impl SearchError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "bad_request",
            SearchError::NotFound(_) => "not_found",
            SearchError::Unavailable { .. } => "search_unavailable",
        }
    }
}
