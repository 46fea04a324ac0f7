//! Okta client
//!
//! Okta serves OIDC from the org domain or from a custom authorization
//! server below it (`https://org.okta.com/oauth2/default`). Group names are
//! released through the `groups` claim when the `groups` scope is granted.

use async_trait::async_trait;
use tracing::instrument;

use trellis_core::{
    AuthServerInfo, IdentityProviderClient, Provider, ProviderTokens, RefreshedToken, Result,
    TokenBundle, UserInfoClaims,
};

use super::common::HttpConfig;
use super::oidc::{OidcCore, UserInfoResponse};

pub struct OktaClient {
    core: OidcCore,
}

impl OktaClient {
    pub const SCOPES: [&'static str; 5] = ["openid", "email", "profile", "groups", "offline_access"];

    pub fn new(provider: &Provider, redirect_uri: &str, http: &HttpConfig) -> Result<Self> {
        let scopes = Self::SCOPES.iter().map(|s| s.to_string()).collect();
        Ok(Self {
            core: OidcCore::new(provider, issuer(&provider.url), redirect_uri, scopes, http)?,
        })
    }
}

/// Okta URLs are often configured as a bare domain
fn issuer(url: &str) -> String {
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[async_trait]
impl IdentityProviderClient for OktaClient {
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
            email: info.email.or(info.preferred_username).unwrap_or_default(),
            groups: info.groups.unwrap_or_default(),
        })
    }

    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        self.core.refresh(tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_normalization() {
        assert_eq!(issuer("dev-1.okta.com"), "https://dev-1.okta.com");
        assert_eq!(
            issuer("https://dev-1.okta.com/oauth2/default"),
            "https://dev-1.okta.com/oauth2/default"
        );
    }
}
