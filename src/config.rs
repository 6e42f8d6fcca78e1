//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/templates.sqlite"
//!
//! [retrieval]
//! default_limit = 25
//! min_similarity = 0.65
//! embed_timeout_secs = 10
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [github]
//! api_url = "https://api.github.com"
//! timeout_secs = 10
//! ```
//!
//! Only `[db]` is required. See [`load_config`] for validation rules.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result cap when the caller does not pass one.
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    /// Cosine similarity threshold for vector retrieval when the caller
    /// does not pass one.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Upper bound on the query-time embedding call.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            min_similarity: default_min_similarity(),
            embed_timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl RetrievalConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

fn default_limit() -> i64 {
    template_search_core::search::DEFAULT_LIMIT
}
fn default_min_similarity() -> f64 {
    template_search_core::search::DEFAULT_MIN_SIMILARITY
}
fn default_embed_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// GitHub REST API used for add-on change lookups.
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            timeout_secs: default_github_timeout_secs(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_github_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }

    if config.retrieval.embed_timeout_secs == 0 {
        anyhow::bail!("retrieval.embed_timeout_secs must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    if !config.github.api_url.starts_with("http://") && !config.github.api_url.starts_with("https://") {
        anyhow::bail!("github.api_url must be an http(s) URL");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/t.sqlite\"\n").unwrap();
        assert_eq!(cfg.retrieval.default_limit, 25);
        assert!((cfg.retrieval.min_similarity - 0.65).abs() < 1e-12);
        assert_eq!(cfg.retrieval.embed_timeout(), Duration::from_secs(10));
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:7340");
        assert_eq!(cfg.github.api_url, "https://api.github.com");
    }

    #[test]
    fn test_github_api_url_override() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        let cfg = parse_config(&format!("{}[github]\napi_url = \"http://127.0.0.1:9000\"\n", base)).unwrap();
        assert_eq!(cfg.github.api_url, "http://127.0.0.1:9000");
        assert!(parse_config(&format!("{}[github]\napi_url = \"api.github.com\"\n", base)).is_err());
    }

    #[test]
    fn test_rejects_bad_retrieval_values() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        assert!(parse_config(&format!("{}[retrieval]\ndefault_limit = 0\n", base)).is_err());
        assert!(parse_config(&format!("{}[retrieval]\nmin_similarity = 1.2\n", base)).is_err());
        assert!(parse_config(&format!("{}[retrieval]\nembed_timeout_secs = 0\n", base)).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_model_and_dims() {
        let base = "[db]\npath = \"x.sqlite\"\n";
        let missing_dims = format!(
            "{}[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n",
            base
        );
        assert!(parse_config(&missing_dims).is_err());

        let ok = format!(
            "{}[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
            base
        );
        let cfg = parse_config(&ok).unwrap();
        assert_eq!(cfg.embedding.dims, Some(1536));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg = "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"cohere\"\n";
        let err = parse_config(cfg).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
