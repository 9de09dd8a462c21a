//! Response-shaping middleware applied to every route.

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::any::Any;
use tower::timeout::error::Elapsed;
use tower::BoxError;
use tracing::Instrument;

use crate::errors::AppError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Injects a unique X-Request-Id into every response so callers can
/// correlate failures with gateway logs.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %req_id);

    let mut resp = next.run(req).instrument(span).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    resp
}

/// Injects security headers into every response.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    // List data is per-user; no shared caches.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );
    headers.remove(header::SERVER);

    resp
}

/// Error handler for the whole-request timeout. Answers with the same
/// plain-text 500 as every other internal failure.
pub async fn timeout_response(err: BoxError) -> Response {
    if err.is::<Elapsed>() {
        tracing::error!("Request exceeded the configured timeout");
        AppError::Internal("Error: request timed out".into()).into_response()
    } else {
        tracing::error!(error = %err, "Request failed in middleware");
        AppError::Internal(format!("Error: {}", err)).into_response()
    }
}

/// Panic handler for `CatchPanicLayer`: a plain-text 500 like any other failure.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    AppError::Internal("Error: internal server error".into()).into_response()
}
