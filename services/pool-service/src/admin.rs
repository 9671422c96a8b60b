//! Admin API for bulk account management
//!
//! Runs on a separate listener (default 127.0.0.1:9090). Every route requires
//! `Authorization: Bearer <admin token>`; with no token configured the whole
//! API answers 503.
//!
//! Endpoints:
//! - POST /admin/accounts/import: raw `identity:secret:...:refresh:client` lines
//! - POST /admin/accounts/purge-consumed: delete consumed accounts
//! - POST /admin/accounts/purge-all: delete every account
//! - GET  /admin/accounts: list accounts with status, no credentials
//! - GET  /admin/stats: counts by status

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::Secret;
use tracing::{info, warn};

use account_pool::{Pool, PoolStats, Purge};

use crate::error::ApiResult;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    pool: Arc<Pool>,
    token: Option<Arc<Secret<String>>>,
}

impl AdminState {
    pub fn new(pool: Arc<Pool>, token: Option<Secret<String>>) -> Self {
        Self {
            pool,
            token: token.map(Arc::new),
        }
    }
}

/// Build the admin axum router with all account management endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/accounts", get(list_accounts))
        .route("/admin/accounts/import", post(import_accounts))
        .route("/admin/accounts/purge-consumed", post(purge_consumed))
        .route("/admin/accounts/purge-all", post(purge_all))
        .route("/admin/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Reject requests without the configured bearer token.
async fn require_admin(State(state): State<AdminState>, request: Request, next: Next) -> Response {
    let Some(token) = state.token.as_deref() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "admin API disabled: no admin token configured",
        );
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(candidate) if token.matches(candidate) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "admin request rejected: missing or invalid bearer token");
            json_error(StatusCode::UNAUTHORIZED, "missing or invalid admin token")
        }
    }
}

/// GET /admin/accounts: ids, statuses, and lease times. Never exposes credentials.
async fn list_accounts(State(state): State<AdminState>) -> ApiResult<Json<serde_json::Value>> {
    let accounts = state.pool.accounts().await?;
    Ok(Json(serde_json::json!({ "accounts": accounts })))
}

/// POST /admin/accounts/import: body is raw text, one account per line.
///
/// Malformed lines are skipped; the response counts only inserted accounts.
async fn import_accounts(
    State(state): State<AdminState>,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let added = state.pool.bulk_import(&body).await?;
    let stats = state.pool.stats().await?;
    info!(added, total = stats.total(), "admin import completed");
    Ok(Json(serde_json::json!({ "added": added, "stats": stats })))
}

/// POST /admin/accounts/purge-consumed
async fn purge_consumed(State(state): State<AdminState>) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.pool.purge(Purge::Consumed).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// POST /admin/accounts/purge-all: also drops accounts that are currently leased.
async fn purge_all(State(state): State<AdminState>) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.pool.purge(Purge::All).await?;
    warn!(deleted, "all accounts purged");
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn stats(State(state): State<AdminState>) -> ApiResult<Json<PoolStats>> {
    Ok(Json(state.pool.stats().await?))
}
