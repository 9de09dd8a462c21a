//! SharePoint gateway. Serves a fixed SharePoint list to the ticket
//! dashboard, reading it from Microsoft Graph as the calling user via the
//! On-Behalf-Of grant.
//!
//! The binary in `main.rs` wires real HTTP collaborators; integration tests
//! in `tests/` build the same router with stubs.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod graph;
pub mod middleware;

use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::http::{header, HeaderName, Method};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::DelegatedAuthService;
use config::Config;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: Config,
    pub auth: DelegatedAuthService,
}

/// Build the full HTTP surface: `/healthz` plus the function-style API under `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    let dashboard_origin = state.config.dashboard_origin.clone();
    let timeout = state.config.request_timeout();

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api", api::api_router())
        .with_state(state)
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware::timeout_response))
                .timeout(timeout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    HeaderName::from_static(middleware::REQUEST_ID_HEADER),
                ])
                .allow_credentials(true),
        )
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
}
