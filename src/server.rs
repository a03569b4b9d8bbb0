//! HTTP API
//!
//! Serves one freshly computed allocation table per `GET /portfolios`.

use crate::error::AllocatorError;
use crate::portfolio::PortfolioTable;
use crate::service::AllocationService;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Error body returned for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler error mapped to a status code and [`ErrorBody`]
#[derive(Debug)]
pub struct ApiError(pub AllocatorError);

impl From<AllocatorError> for ApiError {
    fn from(e: AllocatorError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_upstream() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("Request failed ({}): {}", status, self.0);
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

async fn index() -> &'static str {
    "Portfolio allocator. GET /portfolios for risk-profiled allocations."
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_portfolios(State(service): State<Arc<AllocationService>>) -> Result<Json<PortfolioTable>, ApiError> {
    let table = service.compute().await?;
    Ok(Json(table))
}

/// Create the API router
pub fn create_router(service: Arc<AllocationService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/portfolios", get(get_portfolios))
        .with_state(service)
}

/// Bind and serve until the process exits
pub async fn serve(service: Arc<AllocationService>, addr: &str) -> std::io::Result<()> {
    let app = create_router(service);

    tracing::info!("Allocator API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
