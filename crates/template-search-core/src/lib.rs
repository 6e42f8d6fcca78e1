//! # Template Search Core
//!
//! Shared, runtime-free logic for Template Search: the catalog data model,
//! the store and embedding-provider abstractions, vector utilities, and the
//! hybrid merge & rank algorithm.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Retrieval concurrency and timeouts live in the
//! `template-search` app crate, which drives [`search::merge`] once both
//! retrieval paths have returned.

pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;

pub use error::SearchError;
pub use models::{MatchType, NewTemplate, RankedResult, Template, TemplateType};
