//! # REST API
//!
//! Builds the axum router that exposes the node's HTTP interface: read-only
//! discovery endpoints for any external reader, plus the JSON-RPC gateway
//! (see [`crate::rpc`]) for operations. All endpoints share application
//! state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                  | Description                        |
//! |--------|---------------------------------------|------------------------------------|
//! | GET    | `/health`                             | Liveness probe                     |
//! | GET    | `/status`                             | Registry summary                   |
//! | POST   | `/rpc`                                | JSON-RPC 2.0 gateway               |
//! | GET    | `/projects[?status=]`                 | All projects, optionally filtered  |
//! | GET    | `/projects/:id`                       | One project                        |
//! | GET    | `/projects/:id/token`                 | The project's token                |
//! | GET    | `/projects/:id/vault`                 | The project's redemption vault     |
//! | GET    | `/tokens/:address/project`            | Project owning a token             |
//! | GET    | `/tokens/:address/vault`              | Vault bound to a token             |
//! | GET    | `/tokens/:address/balances/:holder`   | Token balance of a holder          |
//!
//! Amounts are rendered as decimal strings: they are `u128` base units and
//! would not survive a trip through a JSON number.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use offtake_contracts::{
    Project, ProjectId, ProjectStatus, ProjectToken, RedemptionVault, RegistryError,
};
use offtake_protocol::error::ErrorKind;
use offtake_protocol::identity::Address;

use crate::deployment::Deployment;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted registry, its ledgers and their store.
    pub deployment: Arc<RwLock<Deployment>>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(version: impl Into<String>, deployment: Deployment, metrics: SharedMetrics) -> Self {
        metrics.projects.set(deployment.registry().project_count() as i64);
        Self {
            version: version.into(),
            deployment: Arc::new(RwLock::new(deployment)),
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(crate::rpc::rpc_handler))
        .route("/projects", get(projects_handler))
        .route("/projects/:id", get(project_handler))
        .route("/projects/:id/token", get(project_token_handler))
        .route("/projects/:id/vault", get(project_vault_handler))
        .route("/tokens/:address/project", get(token_project_handler))
        .route("/tokens/:address/vault", get(token_vault_handler))
        .route("/tokens/:address/balances/:holder", get(balance_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub admin: String,
    pub projects: usize,
    pub pending: usize,
    pub approved: usize,
    pub denied: usize,
    pub vaults: usize,
    pub settlement_assets: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// A project as seen by external readers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: ProjectId,
    pub name: String,
    pub symbol: String,
    pub initial_supply: String,
    pub metadata: String,
    pub developer: String,
    pub status: String,
    pub token: Option<String>,
    pub vault: Option<String>,
    pub proposed_at: String,
    pub processed_at: Option<String>,
}

impl From<&Project> for ProjectView {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            symbol: p.symbol.clone(),
            initial_supply: p.initial_supply.to_string(),
            metadata: p.metadata.clone(),
            developer: p.developer.to_string(),
            status: p.status.to_string(),
            token: p.token.as_ref().map(Address::to_string),
            vault: p.vault.as_ref().map(Address::to_string),
            proposed_at: p.proposed_at.to_rfc3339(),
            processed_at: p.processed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// A project token's public state.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenView {
    pub address: String,
    pub project_id: ProjectId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub admin: String,
    pub total_supply: String,
    pub paused: bool,
    pub holders: usize,
    pub created_at: String,
}

impl TokenView {
    fn new(project_id: ProjectId, t: &ProjectToken) -> Self {
        Self {
            address: t.address().to_string(),
            project_id,
            name: t.name().to_string(),
            symbol: t.symbol().to_string(),
            decimals: t.decimals(),
            admin: t.admin().to_string(),
            total_supply: t.total_supply().to_string(),
            paused: t.is_paused(),
            holders: t.holder_count(),
            created_at: t.created_at().to_rfc3339(),
        }
    }
}

/// A redemption vault's public state.
#[derive(Debug, Serialize, Deserialize)]
pub struct VaultView {
    pub address: String,
    pub project_id: ProjectId,
    pub token: String,
    pub settlement_asset: String,
    pub admin: String,
    pub status: String,
    pub paused: bool,
    pub rate: String,
    pub deposited_at_activation: String,
    pub total_redeemed: String,
    pub tokens_redeemed: String,
    pub swap_count: u64,
    /// Settlement units the vault currently holds, when its asset is hosted
    /// by this node.
    pub available_settlement: Option<String>,
    pub deployed_at: String,
    pub activated_at: Option<String>,
}

impl VaultView {
    fn new(project_id: ProjectId, v: &RedemptionVault, deployment: &Deployment) -> Self {
        Self {
            address: v.address().to_string(),
            project_id,
            token: v.token().to_string(),
            settlement_asset: v.settlement_asset().to_string(),
            admin: v.admin().to_string(),
            status: v.status().to_string(),
            paused: v.is_paused(),
            rate: v.rate().to_string(),
            deposited_at_activation: v.deposited_at_activation().to_string(),
            total_redeemed: v.total_redeemed().to_string(),
            tokens_redeemed: v.tokens_redeemed().to_string(),
            swap_count: v.swap_count(),
            available_settlement: deployment
                .vault_liquidity(project_id)
                .ok()
                .map(|a| a.to_string()),
            deployed_at: v.deployed_at().to_rfc3339(),
            activated_at: v.activated_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Response payload for `GET /tokens/:address/balances/:holder`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceView {
    pub token: String,
    pub holder: String,
    pub balance: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query string of `GET /projects`.
#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    pub status: Option<String>,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn registry_error(e: RegistryError) -> Response {
    let status = match e.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(status, e)
}

fn parse_address(raw: &str) -> Result<Address, Response> {
    Address::new(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid address: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: registry summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let deployment = state.deployment.read().await;
    let registry = deployment.registry();
    let count = |s| registry.projects_by_status(s).count();

    Json(StatusResponse {
        version: state.version.clone(),
        admin: registry.admin().to_string(),
        projects: registry.project_count(),
        pending: count(ProjectStatus::Pending),
        approved: count(ProjectStatus::Approved),
        denied: count(ProjectStatus::Denied),
        vaults: registry.vaults().count(),
        settlement_assets: deployment.settlements().count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /projects[?status=pending|approved|denied]`
async fn projects_handler(
    State(state): State<AppState>,
    Query(query): Query<ProjectsQuery>,
) -> Response {
    let filter = match query.status.as_deref().map(str::parse::<ProjectStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let deployment = state.deployment.read().await;
    let views: Vec<ProjectView> = deployment
        .registry()
        .projects()
        .filter(|p| filter.map_or(true, |s| p.status == s))
        .map(ProjectView::from)
        .collect();
    Json(views).into_response()
}

/// `GET /projects/:id`
async fn project_handler(Path(id): Path<ProjectId>, State(state): State<AppState>) -> Response {
    let deployment = state.deployment.read().await;
    match deployment.registry().project(id) {
        Ok(p) => Json(ProjectView::from(p)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// `GET /projects/:id/token`
async fn project_token_handler(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
) -> Response {
    let deployment = state.deployment.read().await;
    match deployment.registry().token(id) {
        Ok(t) => Json(TokenView::new(id, t)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// `GET /projects/:id/vault`
async fn project_vault_handler(
    Path(id): Path<ProjectId>,
    State(state): State<AppState>,
) -> Response {
    let deployment = state.deployment.read().await;
    match deployment.registry().vault(id) {
        Ok(v) => Json(VaultView::new(id, v, &deployment)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// `GET /tokens/:address/project`
async fn token_project_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let token = match parse_address(&address) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let deployment = state.deployment.read().await;
    match deployment.registry().project_by_token(&token) {
        Ok(p) => Json(ProjectView::from(p)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// `GET /tokens/:address/vault`
async fn token_vault_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let token = match parse_address(&address) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let deployment = state.deployment.read().await;
    let registry = deployment.registry();
    let found = registry
        .project_by_token(&token)
        .and_then(|p| Ok((p.id, registry.vault(p.id)?)));
    match found {
        Ok((id, v)) => Json(VaultView::new(id, v, &deployment)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// `GET /tokens/:address/balances/:holder`
async fn balance_handler(
    Path((address, holder)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    let (token, holder) = match (parse_address(&address), parse_address(&holder)) {
        (Ok(t), Ok(h)) => (t, h),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    let deployment = state.deployment.read().await;
    match deployment.registry().token_by_address(&token) {
        Ok(t) => Json(BalanceView {
            token: token.to_string(),
            holder: holder.to_string(),
            balance: t.balance_of(&holder).to_string(),
        })
        .into_response(),
        Err(e) => registry_error(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
