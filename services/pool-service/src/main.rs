//! Account Pool Service
//!
//! Single-binary service that:
//! 1. Loads the account store and lease settings from config
//! 2. Serves checkout / verify / release / stats on the public listener
//! 3. Serves bulk import and purge on a separate, token-gated admin listener
//! 4. Reclaims abandoned leases in the background

mod admin;
mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use account_pool::{AccountStore, LeaseManager, Pool, Verifier};
use mail_auth::{CodeMatcher, GraphMailbox, OAuthTokenSource};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::admin::AdminState;
use crate::config::Config;
use crate::error::ApiResult;

/// How long in-flight requests may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all public handlers
#[derive(Clone)]
struct AppState {
    pool: Arc<Pool>,
    verifier: Arc<Verifier>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the public router.
///
/// Applies a concurrency limit layer based on `max_connections` and records
/// per-route request metrics.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/account", get(routes::checkout))
        .route("/verify", post(routes::verify))
        .route("/release", post(routes::release))
        .route("/stats", get(routes::stats))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting account-pool-service");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_listen_addr = %config.server.admin_listen_addr,
        store_path = %config.pool.store_path.display(),
        lease_ttl_secs = config.pool.lease_ttl_secs,
        trusted_sender = %config.verification.trusted_sender,
        admin_enabled = config.server.admin_token.is_some(),
        "configuration loaded"
    );
    if config.server.admin_token.is_none() {
        warn!("no admin token configured, admin API will answer 503");
    }

    let store = AccountStore::load(config.pool.store_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load account store from {}",
                config.pool.store_path.display()
            )
        })?;
    let store = Arc::new(store);

    let leases = Arc::new(LeaseManager::new(store, config.pool.lease_ttl()));
    let pool = Arc::new(Pool::new(leases.clone()));

    let http_client = reqwest::Client::builder()
        .timeout(config.verification.timeout())
        .build()
        .context("failed to build HTTP client")?;
    let verifier = Verifier::new(
        leases.clone(),
        Arc::new(OAuthTokenSource::new(
            http_client.clone(),
            config.verification.token_endpoint.clone(),
            config.verification.scope.clone(),
        )),
        Arc::new(GraphMailbox::new(
            http_client,
            config.verification.mailbox_endpoint.clone(),
            config.verification.page_size,
        )),
        CodeMatcher::new(config.verification.trusted_sender.clone()),
        config.verification.timeout(),
    );

    let _reaper = account_pool::spawn_reaper_task(leases, config.pool.reap_interval());

    let app_state = AppState {
        pool: pool.clone(),
        verifier: Arc::new(verifier),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };
    let app = build_router(app_state, config.server.max_connections);
    let admin_app = admin::build_admin_router(AdminState::new(pool, config.server.admin_token));

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    let admin_addr = config.server.admin_listen_addr;
    let admin_listener = TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;

    info!(addr = %listen_addr, admin_addr = %admin_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. both servers stop accepting and drain in-flight requests
    // 3. DRAIN_TIMEOUT, started at signal receipt, bounds the drain
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx.clone()));
    let admin_handle = tokio::spawn(serve(admin_listener, admin_app, shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drain = async { tokio::join!(server_handle, admin_handle) };
    match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
        Ok((public_result, admin_result)) => {
            for (name, result) in [("public", public_result), ("admin", admin_result)] {
                match result {
                    Ok(Ok(())) => info!(listener = name, "in-flight requests drained"),
                    Ok(Err(e)) => error!(listener = name, error = %e, "server error during shutdown"),
                    Err(e) => error!(listener = name, error = %e, "server task panicked"),
                }
            }
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Serve `app` until the shutdown flag flips.
async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

/// Record route, status, and latency for every request and tag the response
/// with a request id.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    metrics::record_request(&route, status, elapsed.as_secs_f64());
    debug!(
        request_id = %request_id,
        route = %route,
        status,
        duration_ms = elapsed.as_millis() as u64,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Health endpoint: pool health plus uptime.
/// Returns 200 when healthy or degraded, 503 when no account can be handed out
/// now or later.
async fn health_handler(State(state): State<AppState>) -> ApiResult<Response> {
    let health = state.pool.health().await?;
    let status_code = if health.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = serde_json::json!({
        "status": health.status,
        "accounts_total": health.accounts_total,
        "accounts_available": health.accounts_available,
        "accounts_leased": health.accounts_leased,
        "accounts_consumed": health.accounts_consumed,
        "lease_ttl_secs": state.pool.leases().lease_ttl().as_secs(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    Ok((status_code, axum::Json(body)).into_response())
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::HashMap;
    use tower::ServiceExt;

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    /// Start a mock token endpoint and Graph mailbox on one listener.
    ///
    /// `rt_1` exchanges for `at_1`, whose inbox holds a code from the trusted
    /// sender. `rt_2` exchanges for `at_2`, whose inbox has no code. Any other
    /// refresh token is rejected.
    async fn start_collaborators() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let app = axum::Router::new()
            .route(
                "/token",
                post(|axum::Form(form): axum::Form<HashMap<String, String>>| async move {
                    match form.get("refresh_token").map(String::as_str) {
                        Some("rt_1") => (
                            StatusCode::OK,
                            axum::Json(serde_json::json!({"access_token": "at_1", "expires_in": 3600})),
                        ),
                        Some("rt_2") => (
                            StatusCode::OK,
                            axum::Json(serde_json::json!({"access_token": "at_2", "expires_in": 3600})),
                        ),
                        _ => (
                            StatusCode::BAD_REQUEST,
                            axum::Json(serde_json::json!({"error": "invalid_grant"})),
                        ),
                    }
                }),
            )
            .route(
                "/me/mailFolders/inbox/messages",
                get(|headers: axum::http::HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    let messages = if auth == "Bearer at_1" {
                        serde_json::json!([{
                            "subject": "271828 is your verification code",
                            "from": {"emailAddress": {"name": "Reddit", "address": "noreply@redditmail.com"}}
                        }])
                    } else {
                        serde_json::json!([])
                    };
                    axum::Json(serde_json::json!({ "value": messages }))
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    async fn test_app(dir: &tempfile::TempDir, collaborators: &str) -> (Router, Arc<Pool>) {
        test_app_at(dir.path().join("accounts.json"), collaborators).await
    }

    async fn test_app_at(store_path: std::path::PathBuf, collaborators: &str) -> (Router, Arc<Pool>) {
        let store = AccountStore::load(store_path).await.unwrap();
        let leases = Arc::new(LeaseManager::new(Arc::new(store), Duration::from_secs(600)));
        let pool = Arc::new(Pool::new(leases.clone()));
        let client = reqwest::Client::new();
        let verifier = Verifier::new(
            leases,
            Arc::new(OAuthTokenSource::new(
                client.clone(),
                format!("{collaborators}/token"),
                mail_auth::DEFAULT_SCOPE,
            )),
            Arc::new(GraphMailbox::new(client, collaborators, 25)),
            CodeMatcher::new(mail_auth::DEFAULT_TRUSTED_SENDER),
            Duration::from_secs(5),
        );

        let state = AppState {
            pool: pool.clone(),
            verifier: Arc::new(verifier),
            prometheus: test_prometheus_handle(),
            started_at: Instant::now(),
        };
        (build_router(state, 64), pool)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn checkout_from_empty_pool_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let (status, json) = send(&app, get_req("/account")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "empty"}));
    }

    #[tokio::test]
    async fn checkout_returns_all_credential_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, "http://127.0.0.1:9").await;
        pool.bulk_import("u1@example.com:p1:rt_1:client-1").await.unwrap();

        let (status, json) = send(&app, get_req("/account")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["id"], 1);
        assert_eq!(json["identity"], "u1@example.com");
        assert_eq!(json["secret"], "p1");
        assert_eq!(json["refresh_credential"], "rt_1");
        assert_eq!(json["client_identifier"], "client-1");
    }

    #[tokio::test]
    async fn store_failure_answers_500_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("pool");
        let (app, pool) = test_app_at(sub.join("accounts.json"), "http://127.0.0.1:9").await;
        pool.bulk_import("u1:p1:r1:c1").await.unwrap();

        // Swap the store directory for a file so the next write fails
        tokio::fs::remove_dir_all(&sub).await.unwrap();
        tokio::fs::write(&sub, "not a directory").await.unwrap();

        let (status, json) = send(&app, get_req("/account")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string(), "got: {json}");
        assert!(json.get("status").is_none());

        let (status, json) = send(&app, post_json("/release", serde_json::json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::OK, "release of an available account does not write");
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn end_to_end_checkout_release_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, "http://127.0.0.1:9").await;
        pool.bulk_import("u1:p1:r1:c1\nu2:p2:r2:c2").await.unwrap();

        assert_eq!(send(&app, get_req("/account")).await.1["id"], 1);
        assert_eq!(send(&app, get_req("/account")).await.1["id"], 2);
        assert_eq!(send(&app, get_req("/account")).await.1["status"], "empty");

        let (status, json) = send(&app, post_json("/release", serde_json::json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);

        assert_eq!(send(&app, get_req("/account")).await.1["id"], 1);

        let (_, stats) = send(&app, get_req("/stats")).await;
        assert_eq!(stats, serde_json::json!({"available": 0, "leased": 2, "consumed": 0}));
    }

    #[tokio::test]
    async fn release_of_unknown_id_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let (status, json) = send(&app, post_json("/release", serde_json::json!({"id": 42}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn verify_returns_code_and_consumes_account() {
        let collaborators = start_collaborators().await;
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, &collaborators).await;
        pool.bulk_import("u1@example.com:p1:rt_1:client-1").await.unwrap();
        send(&app, get_req("/account")).await;

        let (status, json) = send(
            &app,
            post_json(
                "/verify",
                serde_json::json!({
                    "id": 1,
                    "identity": "u1@example.com",
                    "refresh_credential": "rt_1",
                    "client_identifier": "client-1"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"code": "271828"}));

        let (_, stats) = send(&app, get_req("/stats")).await;
        assert_eq!(stats["consumed"], 1);
        assert_eq!(stats["leased"], 0);
    }

    #[tokio::test]
    async fn verify_without_code_returns_null_and_keeps_lease() {
        let collaborators = start_collaborators().await;
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, &collaborators).await;
        pool.bulk_import("u2@example.com:p2:rt_2:client-2").await.unwrap();
        send(&app, get_req("/account")).await;

        let (status, json) = send(
            &app,
            post_json(
                "/verify",
                serde_json::json!({
                    "id": 1,
                    "identity": "u2@example.com",
                    "refresh_credential": "rt_2",
                    "client_identifier": "client-2"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"code": null}));
        assert_eq!(send(&app, get_req("/stats")).await.1["leased"], 1);
    }

    #[tokio::test]
    async fn verify_with_rejected_token_reports_error_detail() {
        let collaborators = start_collaborators().await;
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, &collaborators).await;
        pool.bulk_import("u3@example.com:p3:rt_revoked:client-3").await.unwrap();
        send(&app, get_req("/account")).await;

        let (status, json) = send(
            &app,
            post_json(
                "/verify",
                serde_json::json!({
                    "id": 1,
                    "identity": "u3@example.com",
                    "refresh_credential": "rt_revoked",
                    "client_identifier": "client-3"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["code"].is_null());
        assert!(
            json["error"].as_str().unwrap().contains("invalid_grant"),
            "error detail must be surfaced, got: {json}"
        );
        assert_eq!(send(&app, get_req("/stats")).await.1["leased"], 1);
    }

    #[tokio::test]
    async fn health_is_503_when_pool_has_nothing_to_give() {
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let (status, json) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");

        pool.bulk_import("u1:p1:r1:c1").await.unwrap();
        let (status, json) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["accounts_available"], 1);
        assert_eq!(json["lease_ttl_secs"], 600);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_text() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let response = app.oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let response = app.oneshot(get_req("/stats")).await.unwrap();
        let request_id = response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(request_id.starts_with("req_"));
    }

    #[tokio::test]
    async fn admin_routes_are_not_served_publicly() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = test_app(&dir, "http://127.0.0.1:9").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/accounts/purge-all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
