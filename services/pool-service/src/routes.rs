//! Public pool endpoints
//!
//! - GET  /account: lease the lowest-id available account
//! - POST /verify: fetch the verification code for a leased account
//! - POST /release: hand a lease back
//! - GET  /stats: counts by status

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use account_pool::{Checkout, PoolStats, VerifyOutcome, VerifyRequest};

use crate::AppState;
use crate::error::ApiResult;

/// Body of GET /account.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckoutResponse {
    Ok {
        id: u64,
        identity: String,
        secret: String,
        refresh_credential: String,
        client_identifier: String,
    },
    Empty,
}

impl From<Checkout> for CheckoutResponse {
    fn from(checkout: Checkout) -> Self {
        match checkout {
            Checkout::Leased(account) => CheckoutResponse::Ok {
                id: account.id,
                identity: account.fields.identity,
                secret: account.fields.secret,
                refresh_credential: account.fields.refresh_credential,
                client_identifier: account.fields.client_identifier,
            },
            Checkout::Empty => CheckoutResponse::Empty,
        }
    }
}

/// Body of POST /verify. `error` is only present on collaborator failure.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::Code(code) => Self {
                code: Some(code),
                error: None,
            },
            VerifyOutcome::NotFound => Self {
                code: None,
                error: None,
            },
            VerifyOutcome::CollaboratorError(detail) => Self {
                code: None,
                error: Some(detail),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    id: u64,
}

pub async fn checkout(State(state): State<AppState>) -> ApiResult<Json<CheckoutResponse>> {
    let checkout = state.pool.leases().checkout().await?;
    Ok(Json(checkout.into()))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    let outcome = state.verifier.verify(&request).await?;
    Ok(Json(outcome.into()))
}

/// Idempotent: unknown ids and accounts that are not leased still answer ok.
pub async fn release(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.pool.leases().release(request.id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<PoolStats>> {
    Ok(Json(state.pool.stats().await?))
}
