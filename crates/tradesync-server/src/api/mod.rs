//! HTTP API
//!
//! One POST route per record kind, each taking a JSON array of records:
//!
//! | Route       | Kind     |
//! |-------------|----------|
//! | `/open`     | orders   |
//! | `/close`    | deals    |
//! | `/account`  | accounts |
//! | `/position` | positions (full snapshot) |
//!
//! plus `/ping` (liveness, no side effects) and `/health` (store connectivity).

pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::IngestError;
use crate::ingest::{Batch, IngestAck, IngestService};
use crate::middleware;
use crate::models::{Account, Deal, Order, Position};
use crate::store::Store;
use response::{ApiResponse, PingResponse};

/// Build the application router
pub fn router<S: Store>(service: IngestService<S>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/open", post(ingest_orders::<S>))
        .route("/close", post(ingest_deals::<S>))
        .route("/account", post(ingest_accounts::<S>))
        .route("/position", post(ingest_positions::<S>))
        .route("/ping", get(ping).post(ping))
        .route("/health", get(health::<S>))
        .with_state(service)
        .layer(middleware::body_limit_layer(config.max_body_bytes))
        .layer(middleware::tracing_layer())
}

/// Serve `service` until Ctrl+C or SIGTERM
pub async fn serve<S: Store>(config: &ServerConfig, service: IngestService<S>) -> anyhow::Result<()> {
    let app = router(service, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn submit<S: Store>(
    service: &IngestService<S>,
    batch: Batch,
) -> Result<ApiResponse<IngestAck>, IngestError> {
    batch.validate()?;
    let ack = service.ingest(batch).await?;
    Ok(ApiResponse::success(ack))
}

async fn ingest_orders<S: Store>(
    State(service): State<IngestService<S>>,
    Json(records): Json<Vec<Order>>,
) -> Result<ApiResponse<IngestAck>, IngestError> {
    submit(&service, Batch::Orders(records)).await
}

async fn ingest_deals<S: Store>(
    State(service): State<IngestService<S>>,
    Json(records): Json<Vec<Deal>>,
) -> Result<ApiResponse<IngestAck>, IngestError> {
    submit(&service, Batch::Deals(records)).await
}

async fn ingest_accounts<S: Store>(
    State(service): State<IngestService<S>>,
    Json(records): Json<Vec<Account>>,
) -> Result<ApiResponse<IngestAck>, IngestError> {
    submit(&service, Batch::Accounts(records)).await
}

async fn ingest_positions<S: Store>(
    State(service): State<IngestService<S>>,
    Json(records): Json<Vec<Position>>,
) -> Result<ApiResponse<IngestAck>, IngestError> {
    submit(&service, Batch::Positions(records)).await
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse::ok())
}

async fn health<S: Store>(State(service): State<IngestService<S>>) -> Response {
    match service.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "store": "unreachable"
                })),
            )
                .into_response()
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
