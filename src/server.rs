// src/server.rs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use prometheus::{gather, Encoder, TextEncoder};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::data_model::{Record, UnitId};
use crate::error::Result;
use crate::store::RecordStore;

// The application state, shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub page_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub guid: String,
    #[serde(default)]
    pub page: u64,
    pub limit: Option<u64>,
}

/// Paginated read of one unit's records. `offset = page * page_size`; the
/// row count defaults to the page size when `limit` is absent.
pub async fn data_handler(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> std::result::Result<Json<Vec<Record>>, (StatusCode, String)> {
    let unit: UnitId = query
        .guid
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{}", e)))?;

    let offset = query.page.saturating_mul(state.page_size);
    let limit = query.limit.unwrap_or(state.page_size);
    debug!(unit = %unit, offset, limit, "Data query");

    state
        .store
        .query_by_unit(&unit, offset, Some(limit))
        .await
        .map(Json)
        .map_err(|e| {
            error!(unit = %unit, error = %e, "Data query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

// Axum handler for /metrics
pub async fn metrics_handler() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&gather(), &mut buffer) {
        error!("Could not encode prometheus metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not encode prometheus metrics: {}", e),
        );
    }
    match String::from_utf8(buffer) {
        Ok(s) => (StatusCode::OK, s),
        Err(e) => {
            error!("Prometheus metrics UTF-8 error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prometheus metrics UTF-8 error: {}", e),
            )
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics_handler))
        .route("/data", get(data_handler).post(data_handler))
        .with_state(state)
}

/// Binds `port` and serves until `shutdown` fires. Binding failures are
/// returned to the caller.
pub async fn run_server(port: u16, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Query server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Query server stopped");
    Ok(())
}
