use chrono::{DateTime, Utc};

use super::obo::ExchangedToken;

/// A bearer token as handed to an API client.
#[derive(Debug, Clone, Copy)]
pub struct AccessToken<'a> {
    pub token: &'a str,
    pub expires_on: DateTime<Utc>,
}

/// Presents a token to a downstream client on demand.
pub trait TokenCredential: Send + Sync {
    fn token(&self) -> AccessToken<'_>;
}

/// Credential backed by the token from this request's On-Behalf-Of exchange.
///
/// Never refreshes or re-exchanges: each inbound request builds its own.
#[derive(Debug)]
pub struct DelegatedCredential {
    token: ExchangedToken,
}

impl DelegatedCredential {
    pub fn new(token: ExchangedToken) -> Self {
        Self { token }
    }
}

impl TokenCredential for DelegatedCredential {
    fn token(&self) -> AccessToken<'_> {
        AccessToken {
            token: self.token.secret(),
            expires_on: self.token.expires_on(),
        }
    }
}
