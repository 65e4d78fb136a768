//! HTTP API served from inside the confidential instance.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::error::InstanceError;
use crate::instance::protocol::{
    DERIVATION_FAILED_ERROR, ErrorResponse, HealthResponse, InitializeRequest, InitializeResponse,
    MISSING_HEADERS_ERROR, PublicKeyResponse,
};
use crate::instance::session::InstanceSession;

/// Running instance server.
pub struct InstanceServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl InstanceServer {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for InstanceServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn router(session: Arc<InstanceSession>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/initialize", post(initialize_handler))
        .route("/api/getPublicKey", get(public_key_handler))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

/// Bind `addr` and serve in a background task.
pub async fn start_server(
    addr: SocketAddr,
    session: Arc<InstanceSession>,
) -> Result<InstanceServer, InstanceError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| InstanceError::Startup(format!("Failed to bind to {addr}: {e}")))?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| InstanceError::Startup(format!("Failed to get local addr: {e}")))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app = router(session);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Instance server shutting down");
            })
            .await
        {
            tracing::error!("Instance server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Instance server listening");
    Ok(InstanceServer {
        addr: bound_addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn initialize_handler(
    State(session): State<Arc<InstanceSession>>,
    headers: HeaderMap,
) -> Response {
    let Some(request) = InitializeRequest::from_headers(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: MISSING_HEADERS_ERROR.to_string(),
            }),
        )
            .into_response();
    };

    match session.initialize(&request).await {
        Ok(public_key) => Json(InitializeResponse {
            status: "success".to_string(),
            public_key,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, wallet = %request.wallet_address, "Signer derivation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: DERIVATION_FAILED_ERROR.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn public_key_handler(State(session): State<Arc<InstanceSession>>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: session.public_key().await,
    })
}
