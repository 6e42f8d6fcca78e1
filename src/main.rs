//! # Template Search CLI (`tsearch`)
//!
//! ```bash
//! tsearch --config ./config/tsearch.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsearch init` | Create the SQLite database and schema |
//! | `tsearch import <file>` | Import templates from a JSON array, embedding each |
//! | `tsearch embed pending` | Backfill missing embeddings |
//! | `tsearch embed rebuild` | Clear and regenerate all embeddings |
//! | `tsearch search "<query>"` | Hybrid search |
//! | `tsearch get <id>` | Show one template |
//! | `tsearch list` | List the catalog |
//! | `tsearch serve` | Start the HTTP + MCP server |
//!
//! Logs go to stderr (`RUST_LOG`, default `template_search=info`); command
//! output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use template_search::search::SearchArgs;
use template_search::{catalog, config, ingest, migrate, search, server};
use template_search_core::TemplateType;

/// Template Search: hybrid semantic and keyword search over a catalog of
/// project templates.
#[derive(Parser)]
#[command(name = "tsearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Import templates from a JSON file.
    ///
    /// The file holds an array of objects with `title`, `description`,
    /// `bestUseCase`, `githubUrl` and optional `type`, `libraryTags`,
    /// `architectureTags`, `notes`. Templates whose embedding fails are
    /// stored without one.
    Import {
        file: PathBuf,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Hybrid search.
    Search {
        query: String,

        /// Restrict to one template type.
        #[arg(long = "type", value_parser = parse_template_type)]
        template_type: Option<TemplateType>,

        /// Maximum number of results (default from `[retrieval].default_limit`).
        #[arg(long)]
        limit: Option<i64>,

        /// Semantic similarity threshold in [0, 1] (default from config).
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one template.
    Get {
        id: i64,

        #[arg(long)]
        json: bool,
    },

    /// List the catalog, unranked.
    List {
        #[arg(long = "type", value_parser = parse_template_type)]
        template_type: Option<TemplateType>,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server (REST API, tools and MCP endpoint).
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed templates that have no embedding.
    Pending {
        /// Maximum number of templates to embed in this run.
        #[arg(long)]
        limit: Option<i64>,

        /// Show counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear and regenerate every embedding. Use after switching models.
    Rebuild,
}

fn parse_template_type(s: &str) -> Result<TemplateType, String> {
    s.parse::<TemplateType>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("template_search=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            ingest::import_templates(&cfg, &file).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                ingest::embed_pending(&cfg, limit, dry_run).await?;
            }
            EmbedAction::Rebuild => {
                ingest::embed_rebuild(&cfg).await?;
            }
        },
        Commands::Search {
            query,
            template_type,
            limit,
            min_similarity,
            json,
        } => {
            search::run_search(
                &cfg,
                SearchArgs {
                    query,
                    template_type,
                    limit,
                    min_similarity,
                    json,
                },
            )
            .await?;
        }
        Commands::Get { id, json } => {
            catalog::run_get(&cfg, id, json).await?;
        }
        Commands::List {
            template_type,
            json,
        } => {
            catalog::run_list(&cfg, template_type, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
