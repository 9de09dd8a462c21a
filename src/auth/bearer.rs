//! Inbound bearer token: header extraction and structural claim parsing.
//!
//! The token is checked for shape only (three dot-separated base64url
//! segments, header and payload decoding to JSON objects). Signature, issuer
//! and audience are NOT verified here: the claims feed logs and the response
//! echo, while authorization is enforced by Graph through the exchanged token.
//! Never use [`UserClaims`] for an access-control decision.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder for claims the token does not carry.
pub const UNKNOWN: &str = "Unknown";

/// Longest token/header prefix that may appear in a log line.
pub const LOG_PREFIX_CHARS: usize = 20;

const BEARER_PREFIX: &str = "Bearer ";

// JWT segments are unpadded base64url, but some issuers pad anyway.
const JWT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ── Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Authorization header with Bearer token is required")]
    MissingAuthorization,

    #[error("Authorization header must start with 'Bearer ' followed by a token")]
    MalformedBearer,

    #[error("invalid JWT token format: {0}")]
    UnparsableToken(String),
}

/// The raw caller token. Lives for one request and is never stored.
#[derive(Clone)]
pub struct InboundToken(String);

impl InboundToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for InboundToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InboundToken({} bytes)", self.0.len())
    }
}

/// Identity claims read from the inbound token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserClaims {
    /// `oid`
    pub subject_id: String,
    /// `name`
    pub display_name: String,
    /// `email`, falling back to `upn`
    pub email: String,
    /// `upn`
    pub upn: String,
    /// `tid`
    pub tenant_id: String,
    /// `iss`
    pub issuer: String,
    /// `aud` (first entry when the claim is an array)
    pub audience: String,
    /// `exp`
    pub expiry: Option<DateTime<Utc>>,
    /// `scp`, space separated in the token
    pub scopes: Vec<String>,
}

// ── Header extraction ────────────────────────────────────────

/// Strip the `Bearer ` prefix (any case) and return the token.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, TokenError> {
    let header = match header {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Err(TokenError::MissingAuthorization),
    };

    let prefix = header.get(..BEARER_PREFIX.len()).ok_or(TokenError::MalformedBearer)?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(TokenError::MalformedBearer);
    }

    let token = header[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        return Err(TokenError::MalformedBearer);
    }
    Ok(token)
}

/// Extract and parse in one step.
pub fn validate(header: Option<&str>) -> Result<(InboundToken, UserClaims), TokenError> {
    let token = extract_bearer(header)?;
    let claims = parse_claims(token)?;
    Ok((InboundToken(token.to_string()), claims))
}

/// First [`LOG_PREFIX_CHARS`] characters of `value`, for diagnostics.
pub fn log_prefix(value: &str) -> String {
    match value.char_indices().nth(LOG_PREFIX_CHARS) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

// ── Claim parsing ────────────────────────────────────────────

/// Decode the token structurally and map the known claims.
pub fn parse_claims(token: &str) -> Result<UserClaims, TokenError> {
    decode_claims(token).map(|raw| raw.to_user_claims())
}

/// Decode the token structurally, leaving the payload unmapped.
pub fn decode_claims(token: &str) -> Result<RawClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::UnparsableToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }

    decode_segment(parts[0], "header")?;
    let payload = decode_segment(parts[1], "payload")?;

    // An unsecured JWT carries an empty signature; anything present must still be base64url.
    if !parts[2].is_empty() {
        JWT_ENGINE
            .decode(parts[2])
            .map_err(|e| TokenError::UnparsableToken(format!("signature decode error: {}", e)))?;
    }

    Ok(RawClaims(payload))
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>, TokenError> {
    if segment.is_empty() {
        return Err(TokenError::UnparsableToken(format!("empty {} segment", name)));
    }
    let bytes = JWT_ENGINE
        .decode(segment)
        .map_err(|e| TokenError::UnparsableToken(format!("{} decode error: {}", name, e)))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::UnparsableToken(format!("{} is not a JSON object", name))),
        Err(e) => Err(TokenError::UnparsableToken(format!("{} is not JSON: {}", name, e))),
    }
}

/// A structurally valid token payload. Lookups return `None` for absent or
/// empty claims.
#[derive(Debug, Clone)]
pub struct RawClaims(Map<String, Value>);

impl RawClaims {
    pub fn get_str(&self, name: &str) -> Option<String> {
        string_claim(&self.0, name)
    }

    /// `aud`, taking the first entry when the claim is an array.
    pub fn audience(&self) -> Option<String> {
        match self.0.get("aud") {
            Some(Value::Array(values)) => values.iter().find_map(|v| v.as_str()).map(String::from),
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("exp")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn scopes(&self) -> Vec<String> {
        self.get_str("scp")
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn to_user_claims(&self) -> UserClaims {
        let email = self.get_str("email").or_else(|| self.get_str("upn"));

        UserClaims {
            subject_id: or_unknown(self.get_str("oid")),
            display_name: or_unknown(self.get_str("name")),
            email: or_unknown(email),
            upn: or_unknown(self.get_str("upn")),
            tenant_id: or_unknown(self.get_str("tid")),
            issuer: or_unknown(self.get_str("iss")),
            audience: or_unknown(self.audience()),
            expiry: self.expiry(),
            scopes: self.scopes(),
        }
    }
}

fn string_claim(raw: &Map<String, Value>, name: &str) -> Option<String> {
    raw.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &str) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = engine.encode(payload);
        format!("{}.{}.c2lnbmF0dXJl", header, payload)
    }

    #[test]
    fn test_extract_bearer_case_insensitive() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Ok("abc"));
        assert_eq!(extract_bearer(Some("bearer abc")), Ok("abc"));
        assert_eq!(extract_bearer(Some("BEARER   abc  ")), Ok("abc"));
    }

    #[test]
    fn test_extract_bearer_missing() {
        assert_eq!(extract_bearer(None), Err(TokenError::MissingAuthorization));
        assert_eq!(extract_bearer(Some("")), Err(TokenError::MissingAuthorization));
        assert_eq!(extract_bearer(Some("   ")), Err(TokenError::MissingAuthorization));
    }

    #[test]
    fn test_extract_bearer_wrong_scheme() {
        assert_eq!(extract_bearer(Some("Basic dXNlcjpwYXNz")), Err(TokenError::MalformedBearer));
        assert_eq!(extract_bearer(Some("Bearer")), Err(TokenError::MalformedBearer));
        assert_eq!(extract_bearer(Some("Bearer    ")), Err(TokenError::MalformedBearer));
        assert_eq!(extract_bearer(Some("Bearerabc")), Err(TokenError::MalformedBearer));
        // Multi-byte input shorter than the prefix must not panic.
        assert_eq!(extract_bearer(Some("Bä")), Err(TokenError::MalformedBearer));
    }

    #[test]
    fn test_parse_full_claims() {
        let token = token_with(
            r#"{"oid":"u1","name":"Alice","email":"a@x.com","upn":"alice@x.com","tid":"t1",
                "iss":"https://sts.windows.net/t1/","aud":"api://dashboard","exp":1900000000,
                "scp":"access_as_user Sites.Read"}"#,
        );
        let claims = parse_claims(&token).unwrap();
        assert_eq!(claims.subject_id, "u1");
        assert_eq!(claims.display_name, "Alice");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.upn, "alice@x.com");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.audience, "api://dashboard");
        assert_eq!(claims.expiry.unwrap().timestamp(), 1_900_000_000);
        assert_eq!(claims.scopes, vec!["access_as_user", "Sites.Read"]);
    }

    #[test]
    fn test_email_falls_back_to_upn() {
        let claims = parse_claims(&token_with(r#"{"oid":"u2","upn":"bob@x.com"}"#)).unwrap();
        assert_eq!(claims.email, "bob@x.com");
    }

    #[test]
    fn test_missing_claims_use_sentinel() {
        let claims = parse_claims(&token_with(r#"{"sub":"only-sub"}"#)).unwrap();
        assert_eq!(claims.subject_id, UNKNOWN);
        assert_eq!(claims.display_name, UNKNOWN);
        assert_eq!(claims.email, UNKNOWN);
        assert_eq!(claims.tenant_id, UNKNOWN);
        assert!(claims.expiry.is_none());
        assert!(claims.scopes.is_empty());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let token = token_with(r#"{"oid":"u1","name":"Alice","exp":1900000000}"#);
        assert_eq!(parse_claims(&token).unwrap(), parse_claims(&token).unwrap());
    }

    #[test]
    fn test_expired_token_still_parses() {
        // Expiry is reported, not enforced; the authority rejects stale assertions.
        let claims = parse_claims(&token_with(r#"{"oid":"u1","exp":1000000000}"#)).unwrap();
        assert_eq!(claims.expiry.unwrap().timestamp(), 1_000_000_000);
    }

    #[test]
    fn test_unparsable_tokens() {
        let not_json = format!("{}.{}.sig", "eyJhbGciOiJIUzI1NiJ9", "bm90LWpzb24");
        for bad in [
            "not-a-jwt",
            "a.b",
            "a.b.c.d",
            "..",
            "!!!.???.sig",
            not_json.as_str(),
        ] {
            assert!(
                matches!(parse_claims(bad), Err(TokenError::UnparsableToken(_))),
                "expected UnparsableToken for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_payload_must_be_object() {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let token = format!(
            "{}.{}.",
            engine.encode(r#"{"alg":"none"}"#),
            engine.encode("[1,2,3]")
        );
        assert!(matches!(parse_claims(&token), Err(TokenError::UnparsableToken(_))));
    }

    #[test]
    fn test_unsigned_token_accepted_structurally() {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let token = format!(
            "{}.{}.",
            engine.encode(r#"{"alg":"none"}"#),
            engine.encode(r#"{"oid":"u9"}"#)
        );
        assert_eq!(parse_claims(&token).unwrap().subject_id, "u9");
    }

    #[test]
    fn test_validate_combines_both_steps() {
        let token = token_with(r#"{"oid":"u1"}"#);
        let header = format!("Bearer {}", token);
        let (inbound, claims) = validate(Some(&header)).unwrap();
        assert_eq!(inbound.as_str(), token);
        assert_eq!(claims.subject_id, "u1");

        assert!(matches!(
            validate(Some("Bearer garbage")),
            Err(TokenError::UnparsableToken(_))
        ));
    }

    #[test]
    fn test_log_prefix_caps_length() {
        assert_eq!(log_prefix("short"), "short");
        assert_eq!(log_prefix("Bearer eyJhbGciOiJSUzI1NiJ9.rest"), "Bearer eyJhbGciOiJSU...");
        assert_eq!(log_prefix(&"å".repeat(30)).chars().count(), LOG_PREFIX_CHARS + 3);
    }

    #[test]
    fn test_debug_hides_token() {
        let (inbound, _) = validate(Some(&format!("Bearer {}", token_with("{}")))).unwrap();
        assert!(!format!("{:?}", inbound).contains('.'));
    }
}
