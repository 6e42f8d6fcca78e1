//! Tools exposed to agents.
//!
//! A [`Tool`] is discovered through `GET /tools/list` (and MCP
//! `tools/list`) and invoked through `POST /tools/{name}` (and MCP
//! `tools/call`). Both routes dispatch through the same [`ToolRegistry`],
//! and every tool reaches the catalog through [`ToolContext`], which wraps
//! the shared [`HybridEngine`].
//!
//! Built-ins:
//!
//! | Tool | Parameters | Result |
//! |------|------------|--------|
//! | `search_templates` | `query`, `type?`, `limit?` (10), `minSimilarity?` | `{ "results": [RankedResult] }` |
//! | `get_template_details` | `templateId` | `{ "template": Template, "quickStart"?: String, "latestChange"?: LatestChange }` |
//!
//! Parameter errors are [`SearchError::Validation`] and a missing template
//! is [`SearchError::NotFound`], so callers map failures by type.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use template_search_core::search::{SearchRequest, DEFAULT_MIN_SIMILARITY};
use template_search_core::{RankedResult, SearchError, Template, TemplateType};
use tracing::warn;

use crate::engine::HybridEngine;
use crate::github::{repo_slug, GithubClient};

/// Result cap for `search_templates` when the caller passes none.
pub const TOOL_DEFAULT_LIMIT: i64 = 10;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, e.g. `"search_templates"`.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Catalog access handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    engine: Arc<HybridEngine>,
    github: Arc<GithubClient>,
}

impl ToolContext {
    pub fn new(engine: Arc<HybridEngine>, github: Arc<GithubClient>) -> Self {
        Self { engine, github }
    }

    pub fn github(&self) -> &GithubClient {
        &self.github
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<Vec<RankedResult>> {
        Ok(self.engine.search(req).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Template>> {
        self.engine.store().get_template(id).await
    }
}

pub struct SearchTemplatesTool;

#[async_trait]
impl Tool for SearchTemplatesTool {
    fn name(&self) -> &str {
        "search_templates"
    }

    fn description(&self) -> &str {
        "Search for templates (starters, minimal examples and add-ons) that fit what you want to build"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What you want to build or add"
                },
                "type": {
                    "type": "string",
                    "enum": ["starter", "mve", "addon"],
                    "description": "Restrict results to one template type"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results",
                    "default": TOOL_DEFAULT_LIMIT
                },
                "minSimilarity": {
                    "type": "number",
                    "description": "Semantic similarity threshold (0..1)",
                    "default": DEFAULT_MIN_SIMILARITY
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        let template_type = match &params["type"] {
            Value::Null => None,
            Value::String(t) => Some(t.parse::<TemplateType>()?),
            _ => return Err(invalid("type must be a string")),
        };
        let limit = match &params["limit"] {
            Value::Null => TOOL_DEFAULT_LIMIT,
            v => v.as_i64().ok_or_else(|| invalid("limit must be an integer"))?,
        };
        let min_similarity = match &params["minSimilarity"] {
            Value::Null => DEFAULT_MIN_SIMILARITY,
            v => v
                .as_f64()
                .ok_or_else(|| invalid("minSimilarity must be a number"))?,
        };

        let req = SearchRequest::new(query)
            .with_type(template_type)
            .with_limit(limit)
            .with_min_similarity(min_similarity);
        let results = ctx.search(&req).await?;

        Ok(json!({ "results": results }))
    }
}

pub struct GetTemplateDetailsTool;

#[async_trait]
impl Tool for GetTemplateDetailsTool {
    fn name(&self) -> &str {
        "get_template_details"
    }

    fn description(&self) -> &str {
        "Get full details for one template, including how to start a project from it \
         and, for add-ons, the latest commit diff showing what to apply"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "templateId": {
                    "type": "integer",
                    "description": "The id returned by search_templates"
                }
            },
            "required": ["templateId"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = params["templateId"]
            .as_i64()
            .ok_or_else(|| invalid("templateId must be an integer"))?;

        let template = ctx.get(id).await?.ok_or_else(|| {
            anyhow::Error::new(SearchError::NotFound(format!(
                "Template with ID {} not found",
                id
            )))
        })?;

        let mut body = json!({ "template": template });
        match template.template_type {
            TemplateType::Starter => {
                if let Some(cmd) = quick_start_command(&template.github_url) {
                    body["quickStart"] = Value::String(cmd);
                }
            }
            TemplateType::Addon => {
                if let Some(slug) = repo_slug(&template.github_url) {
                    match ctx.github().latest_change(&slug).await {
                        Ok(change) => body["latestChange"] = json!(change),
                        Err(e) => warn!(id, repo = %slug, error = %e, "latest change unavailable"),
                    }
                }
            }
            TemplateType::Mve => {}
        }
        Ok(body)
    }
}

fn invalid(message: &str) -> anyhow::Error {
    anyhow::Error::new(SearchError::Validation(message.to_string()))
}

/// `gh repo create` invocation for a GitHub-hosted starter, or `None` when
/// the URL is not a `github.com/<owner>/<repo>` URL.
pub fn quick_start_command(github_url: &str) -> Option<String> {
    repo_slug(github_url).map(|slug| format!("gh repo create my-project --template {}", slug))
}

/// Ordered set of tools served by the HTTP and MCP surfaces.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry pre-loaded with `search_templates` and `get_template_details`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTemplatesTool));
        registry.register(Box::new(GetTemplateDetailsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GithubConfig;
    use crate::embedding::DisabledProvider;
    use crate::engine::EngineOptions;
    use template_search_core::store::memory::InMemoryStore;

    fn template(id: i64, title: &str, template_type: TemplateType, url: &str) -> Template {
        Template {
            id,
            title: title.to_string(),
            description: "An online shop".to_string(),
            best_use_case: String::new(),
            template_type,
            library_tags: vec![],
            architecture_tags: vec![],
            github_url: url.to_string(),
            notes: None,
            embedding: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn context() -> ToolContext {
        let store = InMemoryStore::with_templates(vec![
            template(1, "Zeta Shop", TemplateType::Starter, "https://github.com/acme/zeta"),
            template(2, "Alpha Shop", TemplateType::Addon, "https://github.com/acme/alpha"),
            template(3, "Gamma Shop", TemplateType::Starter, "https://gitlab.com/acme/gamma"),
        ]);
        let engine = HybridEngine::new(
            Arc::new(store),
            Arc::new(DisabledProvider),
            EngineOptions::default(),
        );
        // Nothing listens on port 1, so add-on lookups fail fast.
        let github = GithubClient::new(&GithubConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        })
        .unwrap();
        ToolContext::new(Arc::new(engine), Arc::new(github))
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 2);
        assert!(registry.find("search_templates").is_some());
        assert!(registry.find("get_template_details").is_some());
        assert!(registry.find("search").is_none());
        for tool in registry.tools() {
            assert_eq!(tool.parameters_schema()["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_search_tool_defaults_and_ordering() {
        let ctx = context();
        let out = SearchTemplatesTool
            .execute(json!({ "query": "shop" }), &ctx)
            .await
            .unwrap();
        let titles: Vec<&str> = out["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Alpha Shop", "Gamma Shop", "Zeta Shop"]);
        assert_eq!(out["results"][0]["matchType"], "fulltext");
    }

    #[tokio::test]
    async fn test_search_tool_type_filter_and_limit() {
        let ctx = context();
        let out = SearchTemplatesTool
            .execute(json!({ "query": "shop", "type": "starter", "limit": 1 }), &ctx)
            .await
            .unwrap();
        let results = out["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["type"], "starter");
    }

    #[tokio::test]
    async fn test_search_tool_rejects_bad_params() {
        let ctx = context();
        assert!(SearchTemplatesTool
            .execute(json!({ "query": "" }), &ctx)
            .await
            .is_err());
        assert!(SearchTemplatesTool
            .execute(json!({ "query": "shop", "type": "plugin" }), &ctx)
            .await
            .is_err());
        let err = SearchTemplatesTool
            .execute(json!({ "query": "shop", "limit": "ten" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_search_tool_rejects_non_string_type() {
        let ctx = context();
        for bad in [json!(5), json!(["starter"]), json!({ "name": "addon" })] {
            let err = SearchTemplatesTool
                .execute(json!({ "query": "shop", "type": bad }), &ctx)
                .await
                .unwrap_err();
            assert_eq!(
                err.downcast_ref::<SearchError>(),
                Some(&SearchError::Validation("type must be a string".to_string()))
            );
        }

        let out = SearchTemplatesTool
            .execute(json!({ "query": "shop", "type": null }), &ctx)
            .await
            .unwrap();
        assert_eq!(out["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_details_tool() {
        let ctx = context();
        let out = GetTemplateDetailsTool
            .execute(json!({ "templateId": 1 }), &ctx)
            .await
            .unwrap();
        assert_eq!(out["template"]["title"], "Zeta Shop");
        assert_eq!(
            out["quickStart"],
            "gh repo create my-project --template acme/zeta"
        );

        let addon = GetTemplateDetailsTool
            .execute(json!({ "templateId": 2 }), &ctx)
            .await
            .unwrap();
        assert!(addon.get("quickStart").is_none());
        assert!(addon.get("latestChange").is_none());

        let err = GetTemplateDetailsTool
            .execute(json!({ "templateId": 99 }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::NotFound(_))
        ));

        let err = GetTemplateDetailsTool
            .execute(json!({ "templateId": "one" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::Validation(_))
        ));
    }

    #[test]
    fn test_quick_start_command() {
        assert_eq!(
            quick_start_command("https://github.com/vercel/commerce/").as_deref(),
            Some("gh repo create my-project --template vercel/commerce")
        );
        assert_eq!(quick_start_command("https://gitlab.com/a/b"), None);
        assert_eq!(quick_start_command("https://github.com/a/b/tree/main"), None);
    }
}
