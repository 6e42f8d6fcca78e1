//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/templates/search` | Hybrid search |
//! | `GET`  | `/api/templates` | Unranked listing, optional `?type=` |
//! | `POST` | `/api/templates` | Create a template (201) |
//! | `GET`  | `/api/templates/{id}` | One template |
//! | `PUT`  | `/api/templates/{id}` | Replace a template |
//! | `DELETE` | `/api/templates/{id}` | Delete a template |
//! | `GET`  | `/tools/list` | Registered tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request: query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `search_unavailable` (503),
//! `tool_error` (500), `internal` (500).
//!
//! Writes embed the template text with the configured provider. A provider
//! failure stores the template without a vector, as an import does.
//!
//! A search that matches nothing is `200 []`. Clients that want to show
//! something anyway can fall back to `GET /api/templates`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use template_search_core::search::SearchRequest;
use template_search_core::store::TemplateFilter;
use template_search_core::{NewTemplate, RankedResult, SearchError, Template, TemplateType};

use crate::config::{Config, RetrievalConfig};
use crate::engine::HybridEngine;
use crate::github::GithubClient;
use crate::ingest::embed_one;
use crate::mcp::McpBridge;
use crate::tools::{ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    engine: Arc<HybridEngine>,
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
    retrieval: RetrievalConfig,
}

/// Bind `[server].bind` and serve until Ctrl+C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(HybridEngine::from_config(config).await?);
    let app = build_router(engine, config)?;

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Assemble the router around an engine. Exposed for embedding the API in
/// another axum application.
pub fn build_router(engine: Arc<HybridEngine>, config: &Config) -> anyhow::Result<Router> {
    let tools = Arc::new(ToolRegistry::with_builtins());
    let github = Arc::new(GithubClient::new(&config.github)?);
    let ctx = ToolContext::new(engine.clone(), github);

    let bridge = McpBridge::new(tools.clone(), ctx.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let state = AppState {
        engine,
        tools,
        ctx,
        retrieval: config.retrieval.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/api/templates/search", post(handle_search))
        .route("/api/templates", get(handle_list).post(handle_create))
        .route(
            "/api/templates/{id}",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(state))
}

async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let status = match err {
            SearchError::Validation(_) => StatusCode::BAD_REQUEST,
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

/// Map a tool failure to a status. A [`SearchError`] keeps its own status;
/// anything else is a `tool_error`.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    match err.downcast_ref::<SearchError>() {
        Some(search_err) => {
            let mut e = AppError::from(search_err.clone());
            e.message = format!("{}: {}", tool_name, e.message);
            e
        }
        None => {
            error!(tool = tool_name, error = %err, "tool call failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "tool_error",
                message: format!("{}: {}", tool_name, err),
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| bad_request(format!("invalid template id: {}", raw)))
}

fn parse_type(raw: Option<&str>) -> Result<Option<TemplateType>, AppError> {
    raw.filter(|s| !s.is_empty())
        .map(str::parse::<TemplateType>)
        .transpose()
        .map_err(AppError::from)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/templates/search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    query: String,
    #[serde(rename = "type", default)]
    template_type: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    min_similarity: Option<f64>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<Vec<RankedResult>>, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let req = SearchRequest::new(body.query)
        .with_type(parse_type(body.template_type.as_deref())?)
        .with_limit(body.limit.unwrap_or(state.retrieval.default_limit))
        .with_min_similarity(
            body.min_similarity
                .unwrap_or(state.retrieval.min_similarity),
        );

    let results = state.engine.search(&req).await?;
    Ok(Json(results))
}

// ============ GET /api/templates ============

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "type")]
    template_type: Option<String>,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Template>>, AppError> {
    let filter = TemplateFilter::by_type(parse_type(params.template_type.as_deref())?);
    let templates = state
        .engine
        .store()
        .list_templates(filter, i64::MAX)
        .await
        .map_err(internal)?;
    Ok(Json(templates))
}

// ============ GET /api/templates/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, AppError> {
    let id = parse_id(&id)?;

    state
        .engine
        .store()
        .get_template(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("template not found: {}", id)))
}

// ============ POST /api/templates ============

/// Validate `body` and embed it. The vector is `None` when the provider is
/// disabled or failing.
async fn prepare_write(
    state: &AppState,
    body: Result<Json<NewTemplate>, JsonRejection>,
) -> Result<(NewTemplate, Option<Vec<f32>>), AppError> {
    let Json(template) = body.map_err(|e| bad_request(e.body_text()))?;
    template.validate()?;
    let provider = state.engine.provider();
    let embedding = embed_one(provider.as_ref(), &template).await;
    if embedding.is_none() && provider.is_enabled() {
        warn!(title = %template.title, "storing template without embedding");
    }
    Ok((template, embedding))
}

async fn handle_create(
    State(state): State<AppState>,
    body: Result<Json<NewTemplate>, JsonRejection>,
) -> Result<(StatusCode, Json<Template>), AppError> {
    let (template, embedding) = prepare_write(&state, body).await?;
    let store = state.engine.store();
    let id = store
        .insert_template(&template, embedding.as_deref())
        .await
        .map_err(internal)?;
    let created = store
        .get_template(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| internal(anyhow::anyhow!("template {} vanished after insert", id)))?;
    info!(id, title = %created.title, "template created");
    Ok((StatusCode::CREATED, Json(created)))
}

// ============ PUT /api/templates/{id} ============

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewTemplate>, JsonRejection>,
) -> Result<Json<Template>, AppError> {
    let id = parse_id(&id)?;
    let (template, embedding) = prepare_write(&state, body).await?;
    let store = state.engine.store();
    if !store
        .update_template(id, &template, embedding.as_deref())
        .await
        .map_err(internal)?
    {
        return Err(not_found(format!("template not found: {}", id)));
    }
    info!(id, "template updated");
    store
        .get_template(id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("template not found: {}", id)))
}

// ============ DELETE /api/templates/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_id(&id)?;
    if !state
        .engine
        .store()
        .delete_template(id)
        .await
        .map_err(internal)?
    {
        return Err(not_found(format!("template not found: {}", id)));
    }
    info!(id, "template deleted");
    Ok(Json(serde_json::json!({ "message": "Template deleted successfully" })))
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let Json(params) = body.map_err(|e| bad_request(e.body_text()))?;
    if !params.is_object() {
        return Err(bad_request("tool parameters must be a JSON object"));
    }

    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
