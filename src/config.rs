use std::fmt;
use std::time::Duration;

use anyhow::Context;

/// Scopes requested from the authority when `AZUREAD_SCOPES` is not set.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://graph.microsoft.com/Sites.Read.All",
    "https://graph.microsoft.com/Sites.ReadWrite.All",
];

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Upstream calls a data request makes in sequence: token exchange, site, list, items.
pub const OUTBOUND_CALLS_PER_REQUEST: u32 = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub azure_ad: AzureAdConfig,
    pub graph_base_url: String,
    /// Upper bound for a whole request, including the token exchange and all Graph calls.
    pub request_timeout_secs: u64,
    /// Browser origin allowed by CORS in addition to localhost.
    pub dashboard_origin: String,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-call budget for the authority and Graph. The sequential calls of
    /// one request together fit inside [`Config::request_timeout`].
    pub fn outbound_timeout(&self) -> Duration {
        self.request_timeout() / OUTBOUND_CALLS_PER_REQUEST
    }
}

/// Confidential-client settings for the On-Behalf-Of exchange.
///
/// Empty identity fields are tolerated at load time so the process can still
/// answer health checks; the exchanger refuses to run until all three are set.
#[derive(Clone)]
pub struct AzureAdConfig {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
    pub authority_host: String,
    pub scopes: Vec<String>,
}

impl AzureAdConfig {
    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host.trim_end_matches('/'), self.tenant_id)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }

    /// Names of the required identity fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("client_secret");
        }
        if self.tenant_id.trim().is_empty() {
            missing.push("tenant_id");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

// SECURITY: the client secret must never reach a log line.
impl fmt::Debug for AzureAdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureAdConfig")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &set_or_missing(&self.client_secret))
            .field("authority_host", &self.authority_host)
            .field("scopes", &self.scopes)
            .finish()
    }
}

pub fn set_or_missing(value: &str) -> &'static str {
    if value.trim().is_empty() {
        "MISSING"
    } else {
        "SET"
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a [`Config`] from any key lookup. `load()` wires this to the process environment.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

    let scopes: Vec<String> = match var("AZUREAD_SCOPES").filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
    };

    let authority_host = var("AZUREAD_AUTHORITY_HOST")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.into());
    url::Url::parse(&authority_host)
        .with_context(|| format!("AZUREAD_AUTHORITY_HOST is not a valid URL: {}", authority_host))?;

    let graph_base_url = var("GRAPH_BASE_URL")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.into());
    url::Url::parse(&graph_base_url)
        .with_context(|| format!("GRAPH_BASE_URL is not a valid URL: {}", graph_base_url))?;

    Ok(Config {
        port: var("GATEWAY_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(7071),
        azure_ad: AzureAdConfig {
            client_id: var("AZUREAD_CLIENT_ID").unwrap_or_default(),
            tenant_id: var("AZUREAD_TENANT_ID").unwrap_or_default(),
            client_secret: var("AZUREAD_CLIENT_SECRET").unwrap_or_default(),
            authority_host,
            scopes,
        },
        graph_base_url: graph_base_url.trim_end_matches('/').to_string(),
        request_timeout_secs: var("GATEWAY_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30),
        dashboard_origin: var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let cfg = from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 7071);
        assert_eq!(cfg.graph_base_url, DEFAULT_GRAPH_BASE_URL);
        assert_eq!(cfg.azure_ad.scopes, DEFAULT_SCOPES);
        assert!(!cfg.azure_ad.is_complete());
        assert_eq!(
            cfg.azure_ad.missing_fields(),
            vec!["client_id", "client_secret", "tenant_id"]
        );
    }

    #[test]
    fn test_authority_derived_from_tenant() {
        let cfg = from_lookup(lookup(&[
            ("AZUREAD_CLIENT_ID", "client"),
            ("AZUREAD_TENANT_ID", "contoso-tenant"),
            ("AZUREAD_CLIENT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert!(cfg.azure_ad.is_complete());
        assert_eq!(
            cfg.azure_ad.authority(),
            "https://login.microsoftonline.com/contoso-tenant"
        );
        assert_eq!(
            cfg.azure_ad.token_endpoint(),
            "https://login.microsoftonline.com/contoso-tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_scopes_accept_commas_and_spaces() {
        let cfg = from_lookup(lookup(&[(
            "AZUREAD_SCOPES",
            "https://graph.microsoft.com/Sites.Read.All, https://graph.microsoft.com/User.Read",
        )]))
        .unwrap();
        assert_eq!(
            cfg.azure_ad.scopes,
            vec![
                "https://graph.microsoft.com/Sites.Read.All",
                "https://graph.microsoft.com/User.Read"
            ]
        );
    }

    #[test]
    fn test_whitespace_only_secret_counts_as_missing() {
        let cfg = from_lookup(lookup(&[
            ("AZUREAD_CLIENT_ID", "client"),
            ("AZUREAD_TENANT_ID", "tenant"),
            ("AZUREAD_CLIENT_SECRET", "   "),
        ]))
        .unwrap();
        assert_eq!(cfg.azure_ad.missing_fields(), vec!["client_secret"]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cfg = from_lookup(lookup(&[("AZUREAD_CLIENT_SECRET", "super-secret-value")])).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("SET"));
    }

    #[test]
    fn test_invalid_graph_url_rejected() {
        let result = from_lookup(lookup(&[("GRAPH_BASE_URL", "not a url")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_calls_fit_inside_request_timeout() {
        let cfg = from_lookup(lookup(&[("GATEWAY_REQUEST_TIMEOUT_SECS", "30")])).unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.outbound_timeout(), Duration::from_millis(7500));
        assert!(cfg.outbound_timeout() * OUTBOUND_CALLS_PER_REQUEST <= cfg.request_timeout());

        let cfg = from_lookup(lookup(&[("GATEWAY_REQUEST_TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(cfg.request_timeout_secs, 30);
    }
}
