//! Delegated authentication: inbound bearer token → On-Behalf-Of exchange →
//! Graph client acting as the caller.

pub mod bearer;
pub mod credential;
pub mod obo;

use std::sync::Arc;

use thiserror::Error;

use crate::graph::{DirectoryApi, GraphClientFactory};
use bearer::{TokenError, UserClaims};
use credential::DelegatedCredential;
use obo::{ExchangeError, TokenExchanger, UserAssertion};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// The outcome of a successful authentication: who the caller claims to be
/// (for logs and the response echo) and a Graph client bound to their token.
pub struct DelegatedSession {
    pub claims: UserClaims,
    pub graph: Arc<dyn DirectoryApi>,
}

pub struct DelegatedAuthService {
    exchanger: Arc<dyn TokenExchanger>,
    graph: Arc<dyn GraphClientFactory>,
}

impl DelegatedAuthService {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, graph: Arc<dyn GraphClientFactory>) -> Self {
        Self { exchanger, graph }
    }

    /// Build a Graph client that acts as the caller identified by `authorization`.
    ///
    /// Every failure is terminal. There is no path that produces a client for
    /// any identity other than the caller's.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<DelegatedSession, AuthError> {
        tracing::info!("Starting delegated authentication");

        let (token, claims) = bearer::validate(authorization).map_err(|e| {
            match &e {
                TokenError::MissingAuthorization => {
                    tracing::error!("No Authorization header provided, access denied (no fallback identity)")
                }
                TokenError::MalformedBearer => tracing::error!(
                    header_prefix = %bearer::log_prefix(authorization.unwrap_or_default()),
                    "Invalid Authorization header format, must start with 'Bearer '"
                ),
                TokenError::UnparsableToken(reason) => {
                    tracing::error!(reason = %reason, "Invalid JWT token format provided")
                }
            }
            e
        })?;

        tracing::info!(
            token_len = token.as_str().len(),
            user_id = %claims.subject_id,
            user_name = %claims.display_name,
            tenant_id = %claims.tenant_id,
            "Processing user token"
        );

        let assertion = UserAssertion::from(&token);
        let exchanged = self.exchanger.exchange(&assertion).await.map_err(|e| {
            tracing::error!(
                error_code = e.code(),
                error = %e,
                "On-Behalf-Of exchange failed"
            );
            e
        })?;

        let graph = self.graph.for_user(DelegatedCredential::new(exchanged));
        tracing::info!(user_id = %claims.subject_id, "Created user-scoped Graph client");

        Ok(DelegatedSession { claims, graph })
    }
}
