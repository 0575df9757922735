//! JSON tree API.
//!
//! Exposes the fetch engine over HTTP for UI and automation callers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/tree` | Fetch a lineage tree for a seed set |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "seed set must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream` (502, store failure before
//! any node was collected), `inconsistent_tree` (500, self-referential
//! lineage in the source data), `internal` (500).
//!
//! Partial results are not errors: a store failure after some nodes were
//! collected comes back as `200` with the affected direction's `truncated`
//! flag set and its `error` field populated.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use lineal_core::error::FetchError;
use lineal_core::executor::QueryExecutor;
use lineal_core::fetch::fetch_tree;
use lineal_core::models::{
    CancelFlag, DirectionOptions, DirectionStatus, LineageTree, NodeId, TimeRange, TreeNode,
    TreeOptions,
};
use lineal_core::schema::LineageSchema;

use crate::config::Config;
use crate::es::EsExecutor;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    executor: Arc<dyn QueryExecutor>,
}

impl AppState {
    pub fn new(config: Arc<Config>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { config, executor }
    }
}

/// Starts the tree API server against the configured document store.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let executor = Arc::new(EsExecutor::new(&config.store)?);
    run_server_with_executor(config, executor).await
}

/// Like [`run_server`], but with a caller-supplied executor. Used by tests
/// and by embedders that bring their own store backend.
pub async fn run_server_with_executor(
    config: &Config,
    executor: Arc<dyn QueryExecutor>,
) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let app = build_router(AppState::new(Arc::new(config.clone()), executor));

    tracing::info!(%bind, "tree API listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Assemble the router; split out so tests can bind their own listener.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tree", post(handle_tree))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"upstream"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream".to_string(),
        message: message.into(),
    }
}

fn classify_fetch_error(err: FetchError) -> AppError {
    match err {
        FetchError::InvalidOptions(message) => bad_request(message),
        FetchError::QueryExecution(source) => upstream(source.to_string()),
        FetchError::InconsistentTree(_) => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "inconsistent_tree".to_string(),
            message: err.to_string(),
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`. Used by load balancers and monitoring tools.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /tree ============

/// JSON request body for `POST /tree`.
///
/// Exactly one of `schema` (inline) or `schema_name` (configured) must be
/// given. Omitted bounds and index patterns fall back to the `[fetch]`
/// configuration section.
#[derive(Debug, Deserialize)]
pub struct TreeRequest {
    pub seeds: Vec<NodeId>,
    #[serde(default)]
    pub schema: Option<LineageSchema>,
    #[serde(default)]
    pub schema_name: Option<String>,
    pub timerange: TimeRange,
    #[serde(default)]
    pub index_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub ancestors: Option<DirectionOptions>,
    #[serde(default)]
    pub descendants: Option<DirectionOptions>,
}

/// JSON response body for `POST /tree`.
#[derive(Debug, Serialize)]
pub struct TreeResponse {
    /// Every fetched node, keyed by its identifier.
    pub nodes: BTreeMap<NodeId, TreeNode>,
    pub seeds: Vec<NodeId>,
    /// Nodes whose declared parent is absent from `nodes`.
    pub dangling: Vec<NodeId>,
    pub truncated_ancestors: bool,
    pub truncated_descendants: bool,
    pub ancestors: DirectionStatus,
    pub descendants: DirectionStatus,
}

impl From<LineageTree> for TreeResponse {
    fn from(tree: LineageTree) -> Self {
        Self {
            truncated_ancestors: tree.ancestors.truncated,
            truncated_descendants: tree.descendants.truncated,
            nodes: tree.nodes,
            seeds: tree.seeds,
            dangling: tree.dangling,
            ancestors: tree.ancestors,
            descendants: tree.descendants,
        }
    }
}

fn resolve_options(config: &Config, request: TreeRequest) -> Result<TreeOptions, AppError> {
    let schema = match (request.schema, request.schema_name) {
        (Some(_), Some(_)) => {
            return Err(bad_request("schema and schema_name are mutually exclusive"))
        }
        (Some(schema), None) => schema,
        (None, Some(name)) => config
            .schemas
            .get(&name)
            .cloned()
            .ok_or_else(|| bad_request(format!("no schema named `{}` is configured", name)))?,
        (None, None) => return Err(bad_request("either schema or schema_name is required")),
    };

    let defaults = &config.fetch;
    Ok(TreeOptions {
        seeds: request.seeds,
        schema,
        timerange: request.timerange,
        index_patterns: request
            .index_patterns
            .unwrap_or_else(|| defaults.index_patterns.clone()),
        ancestors: request.ancestors.unwrap_or(DirectionOptions {
            depth: defaults.ancestor_depth,
            limit: defaults.ancestor_limit,
        }),
        descendants: request.descendants.unwrap_or(DirectionOptions {
            depth: defaults.descendant_depth,
            limit: defaults.descendant_limit,
        }),
    })
}

/// Handler for `POST /tree`.
async fn handle_tree(
    State(state): State<AppState>,
    Json(request): Json<TreeRequest>,
) -> Result<Json<TreeResponse>, AppError> {
    let options = resolve_options(&state.config, request)?;

    let request_id = uuid::Uuid::new_v4();
    tracing::info!(%request_id, seeds = options.seeds.len(), "fetching lineage tree");

    let cancel = CancelFlag::new();
    let tree = fetch_tree(state.executor.as_ref(), &options, &cancel)
        .await
        .map_err(classify_fetch_error)?;

    tracing::info!(
        %request_id,
        nodes = tree.nodes.len(),
        dangling = tree.dangling.len(),
        truncated_ancestors = tree.ancestors.truncated,
        truncated_descendants = tree.descendants.truncated,
        "tree assembled"
    );

    Ok(Json(TreeResponse::from(tree)))
}
