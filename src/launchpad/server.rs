//! Launchpad HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::launchpad::LaunchpadService;
use crate::launchpad::types::{
    AgentsResponse, ApproveSignatureRequest, ApproveTransactionRequest, DeployRequest,
    ErrorEnvelope, HealthResponse, MISSING_DEPLOY_FIELDS, StatusResponse, SuccessResponse,
};

/// Running launchpad server.
pub struct LaunchpadServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl LaunchpadServer {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for LaunchpadServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Error rendered as `{success: false, error}`: 400 for bad input, 500
/// otherwise.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(value: Error) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorEnvelope {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn body_or_bad_request<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError(Error::InvalidRequest(rejection.body_text())))
}

fn cors_layer(port: u16, allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
    ]
    .into_iter()
    .chain(allowed_origins.iter().cloned())
    .filter_map(|origin| match HeaderValue::from_str(&origin) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
            None
        }
    })
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]))
}

pub fn router(service: Arc<LaunchpadService>, port: u16, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/deploy", post(deploy_handler))
        .route("/api/deploy/stop", post(stop_handler))
        .route("/api/deploy/status", get(status_handler))
        .route("/api/approvals/signature", post(approve_signature_handler))
        .route(
            "/api/approvals/transaction",
            post(approve_transaction_handler),
        )
        .route("/api/agents", get(agents_handler))
        .layer(cors_layer(port, allowed_origins))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind `addr` and serve in a background task.
pub async fn start_server(
    addr: SocketAddr,
    service: Arc<LaunchpadService>,
    allowed_origins: &[String],
) -> std::io::Result<LaunchpadServer> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let app = router(service, bound_addr.port(), allowed_origins);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Launchpad API shutting down");
            })
            .await
        {
            tracing::error!("Launchpad API server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Launchpad API listening");
    Ok(LaunchpadServer {
        addr: bound_addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn deploy_handler(
    State(service): State<Arc<LaunchpadService>>,
    body: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body_or_bad_request(body)?;
    let (Some(wallet), Some(signer_type)) = (
        request.smart_wallet_address.filter(|v| !v.trim().is_empty()),
        request.wallet_signer_type.filter(|v| !v.trim().is_empty()),
    ) else {
        return Err(ApiError(Error::InvalidRequest(
            MISSING_DEPLOY_FIELDS.to_string(),
        )));
    };

    let response = service.deploy(wallet.trim(), signer_type.trim()).await?;
    Ok(Json(response).into_response())
}

async fn stop_handler(State(service): State<Arc<LaunchpadService>>) -> Json<SuccessResponse> {
    service.stop().await;
    Json(SuccessResponse {
        success: true,
        message: Some("Agent stopped successfully".to_string()),
    })
}

async fn status_handler(State(service): State<Arc<LaunchpadService>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        deployment: service.status().await,
    })
}

async fn approve_signature_handler(
    State(service): State<Arc<LaunchpadService>>,
    body: Result<Json<ApproveSignatureRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request = body_or_bad_request(body)?;
    service.approve_signature(&request).await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}

async fn approve_transaction_handler(
    State(service): State<Arc<LaunchpadService>>,
    body: Result<Json<ApproveTransactionRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request = body_or_bad_request(body)?;
    service.approve_transaction(&request).await?;
    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}

async fn agents_handler(
    State(service): State<Arc<LaunchpadService>>,
) -> Result<Json<AgentsResponse>, ApiError> {
    let agents = service.list_agents().await?;
    Ok(Json(AgentsResponse {
        success: true,
        agents,
    }))
}
