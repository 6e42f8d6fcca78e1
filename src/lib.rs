//! # Template Search
//!
//! Hybrid semantic and keyword search over a catalog of project templates.
//!
//! A query runs two independent retrievals against the same SQLite catalog,
//! embedding similarity and case-insensitive substring matching, and merges
//! them into one ranked, deduplicated list where every result records how
//! it matched (`vector`, `fulltext` or `both`).
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   query ──────▶ │ HybridEngine │ ──▶ Vec<RankedResult>
//!                 └──┬────────┬──┘
//!          embed+kNN │        │ substring
//!                    ▼        ▼
//!             ┌────────────────────┐
//!             │  SQLite templates  │
//!             └────────────────────┘
//!        used by: CLI (tsearch) · HTTP API · MCP tools
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tsearch init
//! tsearch import templates.json
//! tsearch search "e-commerce with stripe"
//! tsearch serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`db`] | Connection pool |
//! | [`migrate`] | Schema |
//! | [`sqlite_store`] | SQLite `TemplateStore` |
//! | [`embedding`] | Embedding providers |
//! | [`engine`] | Hybrid search engine |
//! | [`ingest`] | Import and embedding backfill |
//! | [`search`] | `tsearch search` |
//! | [`catalog`] | `tsearch get` / `tsearch list` |
//! | [`tools`] | Agent tools |
//! | [`github`] | Latest add-on change from GitHub |
//! | [`mcp`] | MCP bridge |
//! | [`server`] | HTTP server |
//!
//! The data model, store and provider traits, and the merge algorithm live
//! in the `template-search-core` crate.

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod github;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod tools;
