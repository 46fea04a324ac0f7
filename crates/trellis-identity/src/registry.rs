//! Provider Registry - builds and caches provider clients
//!
//! A client holds the provider's discovery document and key cache, so one is
//! kept per (provider, redirect URI) and reused across logins. Only redirect
//! URIs registered with the registry are served, which bounds the cache to
//! providers times registered URIs. Editing a provider bumps its
//! `updated_at`, which makes the next lookup rebuild it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use trellis_core::{
    ClientFactory, IdentityProviderClient, Provider, ProviderId, Result, TrellisError,
};

use crate::providers::{HttpConfig, ProviderClient};

type CacheKey = (ProviderId, String);

struct CachedClient {
    provider_updated_at: DateTime<Utc>,
    client: Arc<dyn IdentityProviderClient>,
}

/// Registry of live provider clients
pub struct ProviderRegistry {
    http: HttpConfig,
    redirect_uris: HashSet<String>,
    clients: RwLock<HashMap<CacheKey, CachedClient>>,
}

impl ProviderRegistry {
    /// `redirect_uris` are the callbacks registered with the providers; any
    /// other URI is refused before a client is built
    pub fn new<I, S>(http: HttpConfig, redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            http,
            redirect_uris: redirect_uris.into_iter().map(Into::into).collect(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_registered(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.contains(redirect_uri)
    }

    /// Drop every cached client of a provider
    pub async fn evict(&self, provider_id: ProviderId) {
        let mut clients = self.clients.write().await;
        clients.retain(|(id, _), _| *id != provider_id);
        debug!(%provider_id, "Evicted provider clients");
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Build a client and check the provider answers discovery
    #[instrument(skip(self, provider), fields(provider_id = %provider.id, kind = %provider.kind))]
    pub async fn check(&self, provider: &Provider, redirect_uri: &str) -> Result<()> {
        let client = self.client_for(provider, redirect_uri).await?;
        client.validate().await
    }
}

#[async_trait]
impl ClientFactory for ProviderRegistry {
    async fn client_for(
        &self,
        provider: &Provider,
        redirect_uri: &str,
    ) -> Result<Arc<dyn IdentityProviderClient>> {
        if !self.is_registered(redirect_uri) {
            warn!(provider_id = %provider.id, "Refusing unregistered redirect URI");
            return Err(TrellisError::invalid_input("redirect URI is not registered"));
        }

        let key = (provider.id, redirect_uri.to_string());
        {
            let clients = self.clients.read().await;
            if let Some(cached) = clients.get(&key) {
                if cached.provider_updated_at == provider.updated_at {
                    return Ok(cached.client.clone());
                }
            }
        }

        let client: Arc<dyn IdentityProviderClient> =
            Arc::new(ProviderClient::for_provider(provider, redirect_uri, &self.http)?);
        info!(
            provider_id = %provider.id,
            kind = %provider.kind,
            "Built identity provider client"
        );

        let mut clients = self.clients.write().await;
        clients.insert(
            key,
            CachedClient {
                provider_updated_at: provider.updated_at,
                client: client.clone(),
            },
        );
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::ProviderKind;

    const CALLBACK: &str = "https://app/cb";
    const OTHER_CALLBACK: &str = "https://other/cb";

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(HttpConfig::default(), [CALLBACK, OTHER_CALLBACK])
    }

    fn provider(kind: ProviderKind) -> Provider {
        Provider::new("idp", kind, "https://idp.example.com", "client", "secret")
    }

    #[tokio::test]
    async fn test_clients_are_cached_per_redirect_uri() {
        let registry = registry();
        let p = provider(ProviderKind::Oidc);

        let a = registry.client_for(&p, CALLBACK).await.unwrap();
        let b = registry.client_for(&p, CALLBACK).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.client_for(&p, OTHER_CALLBACK).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_updated_provider_rebuilds_client() {
        let registry = registry();
        let mut p = provider(ProviderKind::Oidc);
        let a = registry.client_for(&p, CALLBACK).await.unwrap();

        p.updated_at = p.updated_at + chrono::Duration::seconds(1);
        let b = registry.client_for(&p, CALLBACK).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregistered_redirect_uri_is_refused() {
        let registry = registry();
        let p = provider(ProviderKind::Oidc);

        for i in 0..50 {
            let err = match registry.client_for(&p, &format!("https://evil/{}", i)).await {
                Err(err) => err,
                Ok(_) => panic!("unregistered redirect URI must be refused"),
            };
            assert!(matches!(err, TrellisError::InvalidInput { .. }));
        }
        assert!(registry.is_empty().await);

        registry.client_for(&p, CALLBACK).await.unwrap();
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_evict() {
        let registry = registry();
        let p = provider(ProviderKind::Oidc);
        let other = provider(ProviderKind::Oidc);
        registry.client_for(&p, CALLBACK).await.unwrap();
        registry.client_for(&other, CALLBACK).await.unwrap();

        registry.evict(p.id).await;
        assert_eq!(registry.len().await, 1);
    }

    #[cfg(all(feature = "okta", feature = "azure", feature = "google"))]
    #[tokio::test]
    async fn test_every_kind_builds() {
        let registry = registry();
        for kind in [
            ProviderKind::Oidc,
            ProviderKind::Okta,
            ProviderKind::Azure,
            ProviderKind::Google,
        ] {
            assert!(registry.client_for(&provider(kind), CALLBACK).await.is_ok());
        }
    }
}
