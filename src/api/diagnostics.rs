use std::sync::Arc;

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::bearer;
use crate::errors::AppError;
use crate::AppState;

// ── Response DTOs ────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthStatus {
    /// `Healthy`, or `Degraded` when the identity configuration is incomplete.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub configuration: ConfigurationStatus,
    pub environment: EnvironmentInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationStatus {
    pub client_id_configured: bool,
    pub tenant_id_configured: bool,
    pub client_secret_configured: bool,
    pub authority: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentInfo {
    pub hostname: String,
    pub os_family: &'static str,
    pub processor_count: usize,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnonymousUserInfo {
    pub authentication_type: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Claims exactly as the token carries them: absent claims are `null` and
/// `Email` is the `email` claim only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfoResponse {
    pub authentication_type: &'static str,
    pub user_id: Option<String>,
    pub user_principal_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub tenant_id: Option<String>,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl From<&bearer::RawClaims> for UserInfoResponse {
    fn from(raw: &bearer::RawClaims) -> Self {
        Self {
            authentication_type: "User",
            user_id: raw.get_str("oid"),
            user_principal_name: raw.get_str("upn"),
            name: raw.get_str("name"),
            email: raw.get_str("email"),
            tenant_id: raw.get_str("tid"),
            audience: raw.audience(),
            issuer: raw.get_str("iss"),
            expiration_time: raw.expiry(),
            scopes: raw.scopes(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/HealthCheck. Reports configuration presence only, never values of secrets.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let ad = &state.config.azure_ad;
    let status = if ad.is_complete() { "Healthy" } else { "Degraded" };
    tracing::info!(status, "Health check");

    Json(HealthStatus {
        status,
        timestamp: Utc::now(),
        configuration: ConfigurationStatus {
            client_id_configured: !ad.client_id.trim().is_empty(),
            tenant_id_configured: !ad.tenant_id.trim().is_empty(),
            client_secret_configured: !ad.client_secret.trim().is_empty(),
            authority: ad.authority(),
            scopes: ad.scopes.clone(),
        },
        environment: EnvironmentInfo {
            hostname: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .unwrap_or_else(|_| bearer::UNKNOWN.to_string()),
            os_family: std::env::consts::FAMILY,
            processor_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}

/// GET /api/UserInfo. Echoes the caller's token claims (structural parse only).
pub async fn user_info(headers: HeaderMap) -> Result<Response, AppError> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let token = match bearer::extract_bearer(authorization) {
        Ok(token) => token,
        Err(_) => {
            return Ok(Json(AnonymousUserInfo {
                authentication_type: "Anonymous",
                message: "No user authentication detected",
                timestamp: Utc::now(),
            })
            .into_response())
        }
    };

    let raw = bearer::decode_claims(token).map_err(|e| {
        tracing::warn!(error = %e, "UserInfo received an unparsable token");
        AppError::BadRequest("Invalid JWT token format".into())
    })?;

    let info = UserInfoResponse::from(&raw);
    tracing::info!(
        user_id = info.user_id.as_deref().unwrap_or(bearer::UNKNOWN),
        "User info requested"
    );
    Ok(Json(info).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn raw(payload: &str) -> bearer::RawClaims {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let token = format!(
            "{}.{}.",
            engine.encode(r#"{"alg":"none"}"#),
            engine.encode(payload)
        );
        bearer::decode_claims(&token).unwrap()
    }

    #[test]
    fn test_missing_claims_are_null() {
        let info = UserInfoResponse::from(&raw(r#"{"oid":"u1","upn":"alice@x.com"}"#));
        let v = serde_json::to_value(&info).unwrap();

        assert_eq!(v["UserId"], "u1");
        assert_eq!(v["UserPrincipalName"], "alice@x.com");
        // No fallback from upn.
        assert!(v["Email"].is_null());
        assert!(v["Name"].is_null());
        assert!(v["ExpirationTime"].is_null());
        assert_eq!(v["Scopes"], serde_json::json!([]));
    }

    #[test]
    fn test_audience_array_and_scopes() {
        let info = UserInfoResponse::from(&raw(
            r#"{"aud":["api://gw","other"],"scp":"Sites.Read.All User.Read","exp":1700000000}"#,
        ));
        assert_eq!(info.audience.as_deref(), Some("api://gw"));
        assert_eq!(info.scopes, vec!["Sites.Read.All", "User.Read"]);
        assert_eq!(info.expiration_time.map(|t| t.timestamp()), Some(1_700_000_000));
    }
}
