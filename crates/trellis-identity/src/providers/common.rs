//! HTTP, discovery and JWT helpers shared by the provider clients

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use trellis_core::{Result, TrellisError};

/// Most pages followed when listing a user's groups
pub const MAX_GROUP_PAGES: usize = 50;

/// Outbound HTTP settings for provider calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Retries for idempotent reads; token endpoint calls are never retried
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub jwks_ttl_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 200,
            jwks_ttl_secs: 3600,
        }
    }
}

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                TrellisError::internal_error(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute an idempotent request with exponential backoff. Client errors
    /// other than 429 fail immediately.
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = self.retry_transient(request_builder).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }

    /// Retry transport failures, 5xx and 429 with exponential backoff. Any
    /// other response is returned to the caller to interpret.
    pub async fn retry_transient(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay_ms * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let Some(rb) = request_builder.try_clone() else {
                return Err(TrellisError::internal_error(
                    "Request cannot be cloned for retry",
                ));
            };

            match rb.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_server_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Ok(response);
                    }
                    debug!(attempt, %status, "Retrying provider request");
                    last_error = Some(format!("HTTP {}", status));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Retrying provider request");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(TrellisError::internal_error(format!(
            "Request failed after {} retries: {}",
            self.max_retries,
            last_error.unwrap_or_default()
        )))
    }

    /// Send a request exactly once and hand back the response whatever its
    /// status. Used for token endpoint calls.
    pub async fn send_once(&self, request_builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request_builder
            .send()
            .await
            .map_err(|e| TrellisError::internal_error(format!("Request failed: {}", e)))
    }
}

/// Turn a non-success response into an error carrying status and body
pub async fn status_error(response: reqwest::Response) -> TrellisError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    TrellisError::internal_error(format!("HTTP {} - {}", status, body))
}

/// Cache for JWKS keys
pub struct JwksCache {
    keys: RwLock<HashMap<String, CachedJwks>>,
    ttl_secs: u64,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

impl JwksCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub async fn get_or_fetch(&self, jwks_uri: &str, client: &HttpClient) -> Result<JwkSet> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.get(jwks_uri) {
                let age = (Utc::now() - cached.fetched_at).num_seconds().max(0) as u64;
                if age < self.ttl_secs {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!("Fetching JWKS from {}", jwks_uri);
        let response = client
            .execute_with_retry(client.inner().get(jwks_uri))
            .await?;

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| TrellisError::internal_error(format!("Failed to parse JWKS: {}", e)))?;

        let mut cache = self.keys.write().await;
        cache.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: jwks.clone(),
                fetched_at: Utc::now(),
            },
        );

        Ok(jwks)
    }

    pub async fn invalidate(&self, jwks_uri: &str) {
        let mut cache = self.keys.write().await;
        cache.remove(jwks_uri);
    }
}

/// JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Symmetric key material (`oct` keys)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

fn key_error(message: impl Into<String>) -> TrellisError {
    TrellisError::authentication_failed(message)
}

impl JwkSet {
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Decoding key and algorithm for the given kid. The key's own `alg`
    /// wins over the token header.
    pub fn get_decoding_key(
        &self,
        kid: &str,
        header_alg: Algorithm,
    ) -> Result<(DecodingKey, Algorithm)> {
        let jwk = self
            .find_key(kid)
            .ok_or_else(|| key_error(format!("Key with kid '{}' not found in JWKS", kid)))?;

        let alg = match jwk.alg.as_deref() {
            Some(alg) => algorithm_from_str(alg)?,
            None => header_alg,
        };

        let key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk
                    .n
                    .as_ref()
                    .ok_or_else(|| key_error("RSA key missing 'n' parameter"))?;
                let e = jwk
                    .e
                    .as_ref()
                    .ok_or_else(|| key_error("RSA key missing 'e' parameter"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| key_error(format!("Invalid RSA key: {}", e)))?
            }
            "EC" => {
                let x = jwk
                    .x
                    .as_ref()
                    .ok_or_else(|| key_error("EC key missing 'x' parameter"))?;
                let y = jwk
                    .y
                    .as_ref()
                    .ok_or_else(|| key_error("EC key missing 'y' parameter"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| key_error(format!("Invalid EC key: {}", e)))?
            }
            "oct" => {
                let k = jwk
                    .k
                    .as_ref()
                    .ok_or_else(|| key_error("oct key missing 'k' parameter"))?;
                DecodingKey::from_base64_secret(k)
                    .map_err(|e| key_error(format!("Invalid oct key: {}", e)))?
            }
            other => return Err(key_error(format!("Unsupported key type: {}", other))),
        };

        Ok((key, alg))
    }
}

/// OIDC Discovery document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

impl OidcDiscovery {
    /// Fetch discovery document from well-known endpoint
    pub async fn fetch(issuer: &str, client: &HttpClient) -> Result<Self> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        debug!("Fetching OIDC discovery from {}", url);

        let response = client.execute_with_retry(client.inner().get(&url)).await?;

        response.json().await.map_err(|e| {
            TrellisError::internal_error(format!("Failed to parse OIDC discovery: {}", e))
        })
    }
}

/// ID token claims the clients read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub iss: String,
    #[serde(default)]
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

/// Audience can be a string or array
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Self::Multiple(vec![])
    }
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Self::Single(s) => s == aud,
            Self::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }
}

/// Token endpoint success body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| now + chrono::Duration::seconds(secs))
    }
}

/// Token endpoint error body (RFC 6749 section 5.2)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorResponse {
    pub fn is_invalid_grant(&self) -> bool {
        self.error == "invalid_grant"
    }

    pub fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

/// Read an OAuth error body, tolerating providers that send something else
pub async fn oauth_error(response: reqwest::Response) -> (StatusCode, OAuthErrorResponse) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<OAuthErrorResponse>(&body).unwrap_or_else(|_| {
        warn!(%status, "Token endpoint returned a non-OAuth error body");
        OAuthErrorResponse {
            error: format!("http_{}", status.as_u16()),
            error_description: (!body.is_empty()).then_some(body),
        }
    });
    (status, parsed)
}

/// Validate a JWT token
pub fn validate_jwt<T: for<'de> Deserialize<'de>>(
    token: &str,
    decoding_key: &DecodingKey,
    validation: &Validation,
) -> Result<T> {
    let token_data = decode::<T>(token, decoding_key, validation)
        .map_err(|e| key_error(format!("Token validation failed: {}", e)))?;
    Ok(token_data.claims)
}

/// Extract kid and algorithm from a JWT header
pub fn extract_jwt_kid(token: &str) -> Result<(String, Algorithm)> {
    let header =
        decode_header(token).map_err(|e| key_error(format!("Failed to decode JWT header: {}", e)))?;

    let kid = header
        .kid
        .ok_or_else(|| key_error("JWT header missing 'kid' claim"))?;
    Ok((kid, header.alg))
}

pub fn algorithm_from_str(alg: &str) -> Result<Algorithm> {
    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(key_error(format!("Unsupported algorithm: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_forms() {
        let single: Audience = serde_json::from_str("\"client\"").unwrap();
        assert!(single.contains("client"));
        let many: Audience = serde_json::from_str("[\"a\", \"client\"]").unwrap();
        assert!(many.contains("client"));
        assert!(!many.contains("other"));
    }

    #[test]
    fn test_oauth_error_description() {
        let err: OAuthErrorResponse = serde_json::from_str(
            r#"{"error": "invalid_grant", "error_description": "token expired"}"#,
        )
        .unwrap();
        assert!(err.is_invalid_grant());
        assert_eq!(err.describe(), "invalid_grant: token expired");
    }

    #[test]
    fn test_unknown_key_type_rejected() {
        let set = JwkSet {
            keys: vec![Jwk {
                kty: "OKP".into(),
                key_use: None,
                kid: Some("k1".into()),
                alg: None,
                n: None,
                e: None,
                x: None,
                y: None,
                crv: None,
                k: None,
            }],
        };
        assert!(set.get_decoding_key("k1", Algorithm::RS256).is_err());
        assert!(set.get_decoding_key("missing", Algorithm::RS256).is_err());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(algorithm_from_str("RS256").unwrap(), Algorithm::RS256);
        assert!(algorithm_from_str("none").is_err());
    }
}
