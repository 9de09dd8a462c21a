use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Router};

use crate::AppState;

pub mod diagnostics;
pub mod sharepoint;

/// Build the function-style API router.
/// All routes are relative; the caller mounts this under `/api`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/GetSharePointData", get(sharepoint::get_sharepoint_data))
        .route("/UserInfo", get(diagnostics::user_info))
        .route("/HealthCheck", get(diagnostics::health_check))
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
