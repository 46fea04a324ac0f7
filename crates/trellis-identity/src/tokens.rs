//! Provider token lifecycle outside the login path

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use trellis_core::{
    ClientFactory, DataStore, Filter, ProviderUser, Result, TokenBundle, TrellisError,
};

/// Keeps provider access tokens usable for callers acting on a user's behalf
#[derive(Clone)]
pub struct TokenRefresher {
    store: Arc<dyn DataStore>,
    factory: Arc<dyn ClientFactory>,
    redirect_uri: String,
    leeway: Duration,
}

impl TokenRefresher {
    pub const DEFAULT_LEEWAY_SECS: i64 = 60;

    /// `redirect_uri` selects the registered client; refreshes do not send it
    pub fn new(
        store: Arc<dyn DataStore>,
        factory: Arc<dyn ClientFactory>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            store,
            factory,
            redirect_uri: redirect_uri.into(),
            leeway: Duration::seconds(Self::DEFAULT_LEEWAY_SECS),
        }
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Refresh unconditionally and store the result. A rejected refresh
    /// token yields `ReauthenticationRequired` and leaves the stored tokens
    /// untouched.
    #[instrument(skip(self, provider_user), fields(
        identity_id = %provider_user.identity_id,
        provider_id = %provider_user.provider_id,
    ))]
    pub async fn refresh_access_token(&self, provider_user: &ProviderUser) -> Result<TokenBundle> {
        let provider = self
            .store
            .providers()
            .find(&Filter::new().by_id(provider_user.provider_id))
            .await?
            .filter(|p| p.enabled)
            .ok_or_else(|| {
                TrellisError::not_found("provider", provider_user.provider_id.to_string())
            })?;
        let client = self
            .factory
            .client_for(&provider, &self.redirect_uri)
            .await?;

        let refreshed = client.refresh_access_token(&provider_user.tokens).await?;
        let rotated = refreshed.refresh_token.is_some();
        let tokens = TokenBundle {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| provider_user.tokens.refresh_token.clone()),
            expires_at: refreshed.expires_at,
        };

        self.store
            .provider_users()
            .update_tokens(provider_user.identity_id, provider_user.provider_id, &tokens)
            .await?;

        info!(rotated, expires_at = ?tokens.expires_at, "Provider access token refreshed");
        Ok(tokens)
    }

    /// The stored access token while it stays valid beyond the leeway,
    /// otherwise a freshly refreshed one
    pub async fn access_token(&self, provider_user: &ProviderUser) -> Result<String> {
        if provider_user.tokens.is_fresh(Utc::now(), self.leeway) {
            debug!("Using cached provider access token");
            return Ok(provider_user.tokens.access_token.clone());
        }
        Ok(self.refresh_access_token(provider_user).await?.access_token)
    }
}
