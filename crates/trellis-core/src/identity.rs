//! Identity provider abstractions
//!
//! A `Provider` is read-only configuration of an external identity source.
//! Each provider kind is served by a client implementing
//! `IdentityProviderClient`; the reconciliation engine is written once
//! against that contract and obtains clients through a `ClientFactory`.

use crate::{error::Result, ids::ProviderId, models::TokenBundle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Provider Types and Configuration
// =============================================================================

/// Supported identity provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenID Connect compliant provider
    Oidc,
    /// Okta Identity Platform
    Okta,
    /// Microsoft Entra ID (Azure AD)
    Azure,
    /// Google Workspace
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oidc => "oidc",
            Self::Okta => "okta",
            Self::Azure => "azure",
            Self::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::error::TrellisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "oidc" => Ok(Self::Oidc),
            "okta" => Ok(Self::Okta),
            "azure" => Ok(Self::Azure),
            "google" => Ok(Self::Google),
            other => Err(crate::error::TrellisError::invalid_input(format!(
                "unknown provider kind: {}",
                other
            ))),
        }
    }
}

/// External identity source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub kind: ProviderKind,
    /// Issuer base URL (Okta/OIDC), tenant authority (Azure) or accounts URL (Google)
    pub url: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProviderId::new(),
            name: name.into(),
            kind,
            url: url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Result of exchanging an authorization code
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub tokens: TokenBundle,
    /// Subject email taken from the ID token, when one was issued
    pub email: String,
}

/// Claims describing the authenticated subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoClaims {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Where a browser should be sent to start a login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServerInfo {
    pub auth_url: String,
    pub scopes_supported: Vec<String>,
}

/// Fresh access token returned by a refresh
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Present when the provider rotated the refresh token
    pub refresh_token: Option<String>,
}

// =============================================================================
// Provider Traits
// =============================================================================

/// Wire-protocol client for one configured provider
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Check that the provider configuration is usable
    async fn validate(&self) -> Result<()>;

    /// Authorization endpoint and supported scopes
    async fn auth_server_info(&self) -> Result<AuthServerInfo>;

    /// Exchange an authorization code for tokens and the subject's email
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens>;

    /// Fetch the subject's email and group names
    async fn get_user_info(&self, tokens: &TokenBundle) -> Result<UserInfoClaims>;

    /// Obtain a new access token. A rejected refresh token yields
    /// `TrellisError::ReauthenticationRequired`.
    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken>;
}

/// Builds the client serving a provider for a given redirect URI
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client_for(
        &self,
        provider: &Provider,
        redirect_uri: &str,
    ) -> Result<Arc<dyn IdentityProviderClient>>;
}
