//! On-Behalf-Of token exchange (RFC 7523 jwt-bearer grant as implemented by
//! the Microsoft identity platform).
//!
//! The confidential client trades the caller's token for a Graph token that
//! carries the caller's own delegated permissions. This is the only way the
//! crate obtains a Graph token: there is no client-credentials or managed
//! identity path to fall back to, so any failure here ends the request.
//!
//! No retries. A throttled or failed exchange is reported to the caller, who
//! can refresh.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroize;

use super::bearer::InboundToken;
use crate::config::{set_or_missing, AzureAdConfig};

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Authority error codes that mean the user has to go back through an
/// interactive sign-in (consent, MFA, re-login) before a token can be issued.
const INTERACTION_REQUIRED_CODES: &[&str] = &[
    "interaction_required",
    "consent_required",
    "login_required",
    "invalid_grant",
];

// ── Types ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("identity configuration is incomplete (missing: {})", .missing.join(", "))]
    ConfigurationIncomplete { missing: Vec<&'static str> },

    #[error("user interaction required before a delegated token can be issued ({code})")]
    InteractionRequired {
        code: String,
        description: Option<String>,
        /// Claims challenge the client must present on its next interactive sign-in.
        claims: Option<String>,
    },

    #[error("identity authority rejected the exchange with status {status} ({code})")]
    AuthorityServiceError {
        status: u16,
        code: String,
        description: Option<String>,
        claims: Option<String>,
    },

    #[error("unexpected token exchange failure: {0}")]
    UnexpectedExchangeFailure(String),
}

impl ExchangeError {
    /// Short machine-readable code for logs.
    pub fn code(&self) -> &str {
        match self {
            ExchangeError::ConfigurationIncomplete { .. } => "configuration_incomplete",
            ExchangeError::InteractionRequired { code, .. } => code,
            ExchangeError::AuthorityServiceError { code, .. } => code,
            ExchangeError::UnexpectedExchangeFailure(_) => "unexpected_exchange_failure",
        }
    }
}

/// The caller's token, presented to the authority as the OBO assertion.
pub struct UserAssertion(String);

impl UserAssertion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&InboundToken> for UserAssertion {
    fn from(token: &InboundToken) -> Self {
        UserAssertion(token.as_str().to_string())
    }
}

impl From<&str> for UserAssertion {
    fn from(token: &str) -> Self {
        UserAssertion(token.to_string())
    }
}

impl Drop for UserAssertion {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A Graph access token obtained for one request. Zeroed on drop.
pub struct ExchangedToken {
    access_token: String,
    expires_on: DateTime<Utc>,
}

impl ExchangedToken {
    pub fn new(access_token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_on,
        }
    }

    pub fn secret(&self) -> &str {
        &self.access_token
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }
}

impl fmt::Debug for ExchangedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("access_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl Drop for ExchangedToken {
    fn drop(&mut self) {
        self.access_token.zeroize();
    }
}

/// Trades an inbound user token for a downstream token on that user's behalf.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, assertion: &UserAssertion) -> Result<ExchangedToken, ExchangeError>;
}

// ── Confidential client ──────────────────────────────────────

/// Credentials used to authenticate the exchange request itself.
pub struct ConfidentialClient<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    token_endpoint: String,
}

impl<'a> ConfidentialClient<'a> {
    /// Fails closed when any identity field is empty.
    pub fn from_config(config: &'a AzureAdConfig) -> Result<Self, ExchangeError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ExchangeError::ConfigurationIncomplete { missing });
        }
        Ok(Self {
            client_id: config.client_id.trim(),
            client_secret: config.client_secret.trim(),
            token_endpoint: config.token_endpoint(),
        })
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    fn obo_form<'b>(&'b self, assertion: &'b UserAssertion, scope: &'b str) -> [(&'static str, &'b str); 6] {
        [
            ("grant_type", JWT_BEARER_GRANT),
            ("client_id", self.client_id),
            ("client_secret", self.client_secret),
            ("assertion", assertion.as_str()),
            ("scope", scope),
            ("requested_token_use", "on_behalf_of"),
        ]
    }
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_codes: Vec<i64>,
    #[serde(default)]
    suberror: Option<String>,
    #[serde(default)]
    claims: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
}

// Azure reports `expires_in` as a number, some proxies as a string.
fn expires_in_secs(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ── Exchanger ────────────────────────────────────────────────

/// HTTP implementation of [`TokenExchanger`] against `<authority>/oauth2/v2.0/token`.
pub struct OboExchanger {
    http: reqwest::Client,
    config: Arc<AzureAdConfig>,
}

impl OboExchanger {
    pub fn new(http: reqwest::Client, config: Arc<AzureAdConfig>) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl TokenExchanger for OboExchanger {
    async fn exchange(&self, assertion: &UserAssertion) -> Result<ExchangedToken, ExchangeError> {
        let client = match ConfidentialClient::from_config(&self.config) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(
                    client_id = set_or_missing(&self.config.client_id),
                    tenant_id = set_or_missing(&self.config.tenant_id),
                    client_secret = set_or_missing(&self.config.client_secret),
                    "Azure AD configuration is incomplete, refusing On-Behalf-Of exchange (no fallback identity)"
                );
                return Err(e);
            }
        };

        let scope = self.config.scopes.join(" ");
        tracing::info!(
            authority = %self.config.authority(),
            scopes = %self.config.scopes.join(", "),
            "Requesting On-Behalf-Of token"
        );

        let resp = self
            .http
            .post(client.token_endpoint())
            .form(&client.obo_form(assertion, &scope))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("On-Behalf-Of request to identity authority failed: {}", e);
                ExchangeError::UnexpectedExchangeFailure(format!(
                    "identity authority unreachable: {}",
                    e.without_url()
                ))
            })?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| {
            tracing::error!("Failed to read token endpoint response: {}", e);
            ExchangeError::UnexpectedExchangeFailure("failed to read token response".into())
        })?;

        if status.is_success() {
            return token_from_success(&body);
        }

        match serde_json::from_slice::<OAuthErrorResponse>(&body) {
            Ok(err) => Err(classify_error(status, err)),
            Err(_) => {
                tracing::error!(status = %status, "Token endpoint returned a non-OAuth error body");
                Err(ExchangeError::UnexpectedExchangeFailure(format!(
                    "token endpoint returned {}",
                    status
                )))
            }
        }
    }
}

fn token_from_success(body: &[u8]) -> Result<ExchangedToken, ExchangeError> {
    let parsed: TokenResponse = serde_json::from_slice(body).map_err(|e| {
        tracing::error!("Token endpoint returned an unparsable success body: {}", e);
        ExchangeError::UnexpectedExchangeFailure("unparsable token response".into())
    })?;

    if parsed.access_token.is_empty() {
        tracing::error!("Token endpoint success response carried no access_token");
        return Err(ExchangeError::UnexpectedExchangeFailure(
            "token response missing access_token".into(),
        ));
    }

    let expires_in = expires_in_secs(parsed.expires_in.as_ref()).unwrap_or(0).max(0);
    let expires_on = Utc::now() + Duration::seconds(expires_in);
    tracing::info!(expires_on = %expires_on, "Acquired On-Behalf-Of token");

    Ok(ExchangedToken::new(parsed.access_token, expires_on))
}

fn classify_error(status: StatusCode, err: OAuthErrorResponse) -> ExchangeError {
    if INTERACTION_REQUIRED_CODES.contains(&err.error.as_str()) {
        tracing::error!(
            error_code = %err.error,
            suberror = err.suberror.as_deref().unwrap_or(""),
            error_codes = ?err.error_codes,
            correlation_id = err.correlation_id.as_deref().unwrap_or(""),
            "User interaction required for On-Behalf-Of flow"
        );
        return ExchangeError::InteractionRequired {
            code: err.error,
            description: err.error_description,
            claims: err.claims,
        };
    }

    tracing::error!(
        status = %status,
        error_code = %err.error,
        error_codes = ?err.error_codes,
        claims = err.claims.as_deref().unwrap_or(""),
        correlation_id = err.correlation_id.as_deref().unwrap_or(""),
        "Identity authority service error during On-Behalf-Of flow"
    );
    ExchangeError::AuthorityServiceError {
        status: status.as_u16(),
        code: err.error,
        description: err.error_description,
        claims: err.claims,
    }
}

// ── Tests ────────────────────────────────────────────────────
