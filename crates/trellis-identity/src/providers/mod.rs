//! Identity provider client implementations

#[cfg(feature = "azure")]
pub mod azure;

#[cfg(feature = "okta")]
pub mod okta;

#[cfg(feature = "google")]
pub mod google;

pub mod oidc;

mod common;

pub use common::*;

use async_trait::async_trait;
use trellis_core::{
    AuthServerInfo, IdentityProviderClient, Provider, ProviderKind, ProviderTokens,
    RefreshedToken, Result, TokenBundle, TrellisError, UserInfoClaims,
};

/// One variant per provider kind, all speaking the same client contract
pub enum ProviderClient {
    Oidc(oidc::OidcClient),
    #[cfg(feature = "okta")]
    Okta(okta::OktaClient),
    #[cfg(feature = "azure")]
    Azure(azure::AzureClient),
    #[cfg(feature = "google")]
    Google(google::GoogleClient),
}

impl ProviderClient {
    /// Build the client for a provider's kind. Kinds compiled out of this
    /// build are rejected.
    pub fn for_provider(provider: &Provider, redirect_uri: &str, http: &HttpConfig) -> Result<Self> {
        match provider.kind {
            ProviderKind::Oidc => Ok(Self::Oidc(oidc::OidcClient::new(
                provider,
                redirect_uri,
                http,
            )?)),
            #[cfg(feature = "okta")]
            ProviderKind::Okta => Ok(Self::Okta(okta::OktaClient::new(
                provider,
                redirect_uri,
                http,
            )?)),
            #[cfg(feature = "azure")]
            ProviderKind::Azure => Ok(Self::Azure(azure::AzureClient::new(
                provider,
                redirect_uri,
                http,
            )?)),
            #[cfg(feature = "google")]
            ProviderKind::Google => Ok(Self::Google(google::GoogleClient::new(
                provider,
                redirect_uri,
                http,
            )?)),
            #[allow(unreachable_patterns)]
            other => Err(TrellisError::invalid_input(format!(
                "provider kind {} is not enabled in this build",
                other
            ))),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Oidc(_) => ProviderKind::Oidc,
            #[cfg(feature = "okta")]
            Self::Okta(_) => ProviderKind::Okta,
            #[cfg(feature = "azure")]
            Self::Azure(_) => ProviderKind::Azure,
            #[cfg(feature = "google")]
            Self::Google(_) => ProviderKind::Google,
        }
    }

    fn inner(&self) -> &dyn IdentityProviderClient {
        match self {
            Self::Oidc(c) => c,
            #[cfg(feature = "okta")]
            Self::Okta(c) => c,
            #[cfg(feature = "azure")]
            Self::Azure(c) => c,
            #[cfg(feature = "google")]
            Self::Google(c) => c,
        }
    }
}

#[async_trait]
impl IdentityProviderClient for ProviderClient {
    async fn validate(&self) -> Result<()> {
        self.inner().validate().await
    }

    async fn auth_server_info(&self) -> Result<AuthServerInfo> {
        self.inner().auth_server_info().await
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        self.inner().exchange_code(code).await
    }

    async fn get_user_info(&self, tokens: &TokenBundle) -> Result<UserInfoClaims> {
        self.inner().get_user_info(tokens).await
    }

    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        self.inner().refresh_access_token(tokens).await
    }
}
