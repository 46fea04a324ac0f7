//! Generic OpenID Connect client
//!
//! `OidcCore` speaks the protocol every supported provider shares: the
//! discovery document, the token endpoint, the userinfo endpoint and ID token
//! validation against the provider's JWKS. The kind-specific clients wrap it
//! and only differ in scopes, issuer layout and where group names come from.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::Validation;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use trellis_core::{
    AuthServerInfo, IdentityProviderClient, Provider, ProviderId, ProviderTokens, RefreshedToken,
    Result, TokenBundle, TrellisError, UserInfoClaims,
};

use super::common::*;

/// Protocol plumbing shared by all provider kinds
pub struct OidcCore {
    provider_id: ProviderId,
    issuer: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    http: HttpClient,
    jwks_cache: JwksCache,
    discovery: OnceCell<OidcDiscovery>,
}

impl OidcCore {
    pub fn new(
        provider: &Provider,
        issuer: impl Into<String>,
        redirect_uri: &str,
        scopes: Vec<String>,
        http: &HttpConfig,
    ) -> Result<Self> {
        Ok(Self {
            provider_id: provider.id,
            issuer: issuer.into().trim_end_matches('/').to_string(),
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: redirect_uri.to_string(),
            scopes,
            http: HttpClient::new(http)?,
            jwks_cache: JwksCache::new(http.jwks_ttl_secs),
            discovery: OnceCell::new(),
        })
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Discovery document, fetched on first use
    pub async fn discovery(&self) -> Result<&OidcDiscovery> {
        self.discovery
            .get_or_try_init(|| OidcDiscovery::fetch(&self.issuer, &self.http))
            .await
    }

    #[instrument(skip(self), fields(provider_id = %self.provider_id))]
    pub async fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(TrellisError::invalid_input("provider client_id is empty"));
        }
        let discovery = self.discovery().await?;
        let jwks = self
            .jwks_cache
            .get_or_fetch(&discovery.jwks_uri, &self.http)
            .await?;
        if jwks.keys.is_empty() {
            return Err(TrellisError::invalid_input(format!(
                "provider {} publishes no signing keys",
                self.issuer
            )));
        }
        Ok(())
    }

    /// Authorization URL without `state`; the caller appends its own
    pub async fn auth_server_info(&self) -> Result<AuthServerInfo> {
        let discovery = self.discovery().await?;
        let auth_url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}",
            discovery.authorization_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
        );
        Ok(AuthServerInfo {
            auth_url,
            scopes_supported: self.scopes.clone(),
        })
    }

    /// Redeem an authorization code. The email comes from the validated ID
    /// token and is empty when the provider issued none.
    #[instrument(skip(self, code), fields(provider_id = %self.provider_id))]
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        let token_endpoint = self.discovery().await?.token_endpoint.clone();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .send_once(self.http.inner().post(&token_endpoint).form(&params))
            .await?;
        if !response.status().is_success() {
            let (status, error) = oauth_error(response).await;
            debug!(%status, error = %error.error, "Code exchange rejected");
            return Err(TrellisError::authentication_failed(format!(
                "code exchange rejected: {}",
                error.describe()
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            TrellisError::authentication_failed(format!("Failed to parse token response: {}", e))
        })?;

        let email = match &token_response.id_token {
            Some(id_token) => self
                .id_token_claims(id_token)
                .await?
                .email
                .unwrap_or_default(),
            None => {
                debug!("Token response carried no ID token");
                String::new()
            }
        };

        Ok(ProviderTokens {
            tokens: TokenBundle {
                expires_at: token_response.expires_at(Utc::now()),
                access_token: token_response.access_token,
                refresh_token: token_response.refresh_token.unwrap_or_default(),
            },
            email,
        })
    }

    /// Validate an ID token against the provider's keys, issuer and our client id
    pub async fn id_token_claims(&self, id_token: &str) -> Result<IdTokenClaims> {
        let discovery = self.discovery().await?;
        let (kid, header_alg) = extract_jwt_kid(id_token)?;

        let mut jwks = self
            .jwks_cache
            .get_or_fetch(&discovery.jwks_uri, &self.http)
            .await?;
        if jwks.find_key(&kid).is_none() {
            // Keys rotated since the last fetch
            self.jwks_cache.invalidate(&discovery.jwks_uri).await;
            jwks = self
                .jwks_cache
                .get_or_fetch(&discovery.jwks_uri, &self.http)
                .await?;
        }
        let (decoding_key, alg) = jwks.get_decoding_key(&kid, header_alg)?;

        let mut validation = Validation::new(alg);
        validation.set_issuer(&[&discovery.issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.leeway = 60;

        validate_jwt(id_token, &decoding_key, &validation)
    }

    /// GET the userinfo endpoint with the access token
    pub async fn userinfo<T: DeserializeOwned>(&self, tokens: &TokenBundle) -> Result<T> {
        let endpoint = self
            .discovery()
            .await?
            .userinfo_endpoint
            .clone()
            .ok_or_else(|| {
                TrellisError::internal_error(format!(
                    "provider {} has no userinfo endpoint",
                    self.issuer
                ))
            })?;

        let response = self
            .http
            .execute_with_retry(
                self.http
                    .inner()
                    .get(&endpoint)
                    .bearer_auth(&tokens.access_token),
            )
            .await?;

        response.json().await.map_err(|e| {
            TrellisError::internal_error(format!("Failed to parse userinfo response: {}", e))
        })
    }

    /// Trade the refresh token for a new access token. A grant the provider
    /// no longer accepts means the user has to log in again.
    #[instrument(skip(self, tokens), fields(provider_id = %self.provider_id))]
    pub async fn refresh(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        if tokens.refresh_token.is_empty() {
            return Err(TrellisError::reauthentication_required(
                "no refresh token stored",
            ));
        }

        let token_endpoint = self.discovery().await?.token_endpoint.clone();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .send_once(self.http.inner().post(&token_endpoint).form(&params))
            .await
            .map_err(|e| TrellisError::authentication_failed(e.to_string()))?;
        if !response.status().is_success() {
            let (status, error) = oauth_error(response).await;
            if error.is_invalid_grant() {
                warn!(%status, "Refresh token rejected");
                return Err(TrellisError::reauthentication_required(error.describe()));
            }
            return Err(TrellisError::authentication_failed(format!(
                "token refresh failed: {}",
                error.describe()
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            TrellisError::authentication_failed(format!("Failed to parse token response: {}", e))
        })?;

        Ok(RefreshedToken {
            expires_at: token_response.expires_at(Utc::now()),
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

/// Userinfo fields read by the clients
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfoResponse {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

/// Any OIDC compliant provider; groups come from the userinfo `groups` claim
pub struct OidcClient {
    core: OidcCore,
}

impl OidcClient {
    pub const DEFAULT_SCOPES: [&'static str; 4] = ["openid", "email", "profile", "groups"];

    pub fn new(provider: &Provider, redirect_uri: &str, http: &HttpConfig) -> Result<Self> {
        let scopes = Self::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        Ok(Self {
            core: OidcCore::new(provider, provider.url.as_str(), redirect_uri, scopes, http)?,
        })
    }

    pub fn from_core(core: OidcCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl IdentityProviderClient for OidcClient {
    async fn validate(&self) -> Result<()> {
        self.core.validate().await
    }

    async fn auth_server_info(&self) -> Result<AuthServerInfo> {
        self.core.auth_server_info().await
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        self.core.exchange_code(code).await
    }

    #[instrument(skip(self, tokens), fields(provider_id = %self.core.provider_id()))]
    async fn get_user_info(&self, tokens: &TokenBundle) -> Result<UserInfoClaims> {
        let info: UserInfoResponse = self.core.userinfo(tokens).await?;
        Ok(UserInfoClaims {
            email: info.email.unwrap_or_default(),
            groups: info.groups.unwrap_or_default(),
        })
    }

    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        self.core.refresh(tokens).await
    }
}
