//! Checkout RPC surface.
//!
//! Thin HTTP wrappers over [`PoolSet`] checkout/return. The server owns the
//! outstanding leases so a caller only needs a container id to return one.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hatch_common::Params;
use hatch_core::{Lease, PoolError, PoolSet};

/// Default RPC listen port.
pub const DEFAULT_PORT: u16 = 6307;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pools: Arc<PoolSet>,
    /// Outstanding leases by container id.
    leases: Arc<DashMap<String, HeldLease>>,
}

#[derive(Clone)]
struct HeldLease {
    pool: String,
    lease: Lease,
}

impl AppState {
    pub fn new(pools: Arc<PoolSet>) -> Self {
        Self {
            pools,
            leases: Arc::new(DashMap::new()),
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pools", get(list_pools))
        .route("/pools/{name}/checkout", post(checkout))
        .route("/pools/{name}/return", post(checkin))
        .with_state(state)
}

/// Serve until the token fires, then shut down gracefully.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "rpc server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[derive(Debug, Serialize)]
struct PoolStatusResponse {
    name: String,
    target: usize,
    items: usize,
    pending: usize,
    ready: usize,
    draining: bool,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ReturnRequest {
    id: String,
}

struct ApiError(PoolError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PoolError::PoolNotFound(_) => StatusCode::NOT_FOUND,
            PoolError::Draining => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::Config(_) | PoolError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_pools(State(state): State<AppState>) -> Json<Vec<PoolStatusResponse>> {
    let statuses = state
        .pools
        .statuses()
        .into_iter()
        .map(|(name, status)| PoolStatusResponse {
            name,
            target: status.target,
            items: status.items,
            pending: status.pending,
            ready: status.ready,
            draining: status.draining,
            done: status.done,
        })
        .collect();
    Json(statuses)
}

async fn checkout(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Params>, ApiError> {
    let lease = state.pools.checkout(&name).await.map_err(ApiError)?;
    let params = lease.params.clone();
    debug!(pool = %name, container = %lease.id(), "checkout over rpc");
    state.leases.insert(
        lease.id().to_string(),
        HeldLease { pool: name, lease },
    );
    Ok(Json(params))
}

async fn checkin(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ReturnRequest>,
) -> Result<StatusCode, ApiError> {
    let Some((_, held)) = state.leases.remove(&request.id) else {
        return Err(ApiError(PoolError::PoolNotFound(format!(
            "no outstanding lease for {}",
            request.id
        ))));
    };
    debug!(pool = %name, container = %request.id, "return over rpc");
    state
        .pools
        .checkin(&held.pool, held.lease)
        .await
        .map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}
