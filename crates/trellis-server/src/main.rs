//! Trellis - bootstrap binary
//!
//! Connects to PostgreSQL, applies migrations, seeds the configured identity
//! providers and checks that each enabled one answers discovery.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{AppConfig, ProviderSettings};
use trellis_access::CredentialService;
use trellis_core::{ClientFactory, DataStore, Filter, Provider};
use trellis_db::{create_pool, run_migrations, PgStore};
use trellis_identity::ProviderRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Starting Trellis v{}", env!("CARGO_PKG_VERSION"));

    info!("Connecting to PostgreSQL...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }
    let store: Arc<dyn DataStore> = Arc::new(PgStore::new(pool));

    let providers = seed_providers(store.as_ref(), &config.providers)
        .await
        .context("Failed to seed identity providers")?;

    let registry = Arc::new(ProviderRegistry::new(
        config.http.clone(),
        [config.login.redirect_uri.clone()],
    ));
    if config.login.check_providers {
        check_providers(&registry, &providers, &config.login.redirect_uri).await;
    }

    let credentials = CredentialService::new(store.clone());
    let policy = credentials
        .settings()
        .await
        .context("Failed to load password policy")?;
    info!(
        length_min = policy.length_min,
        lowercase_min = policy.lowercase_min,
        uppercase_min = policy.uppercase_min,
        number_min = policy.number_min,
        symbol_min = policy.symbol_min,
        "Password policy loaded"
    );

    info!(providers = providers.len(), "Trellis bootstrap complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,trellis=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Create configured providers, or bring stored ones with the same name in
/// line with the configuration. Returns every configured provider as stored.
async fn seed_providers(
    store: &dyn DataStore,
    configured: &[ProviderSettings],
) -> Result<Vec<Provider>> {
    let mut seeded = Vec::with_capacity(configured.len());

    for settings in configured {
        let filter = Filter::new().by_name(&settings.name);
        let existing = store.providers().find(&filter).await?;

        let provider = match existing {
            Some(mut stored) => {
                if settings.apply_to(&mut stored) {
                    let updated = store.providers().update(&stored).await?;
                    info!(provider = %updated.name, kind = %updated.kind, "Provider updated");
                    updated
                } else {
                    stored
                }
            }
            None => match store.providers().create(&settings.to_provider()).await {
                Ok(created) => {
                    info!(provider = %created.name, kind = %created.kind, "Provider created");
                    created
                }
                Err(e) if e.is_conflict() => {
                    warn!(provider = %settings.name, "Provider created concurrently; re-fetching");
                    store
                        .providers()
                        .find(&filter)
                        .await?
                        .with_context(|| format!("provider {} vanished", settings.name))?
                }
                Err(e) => return Err(e.into()),
            },
        };
        seeded.push(provider);
    }

    Ok(seeded)
}

async fn check_providers(registry: &ProviderRegistry, providers: &[Provider], redirect_uri: &str) {
    for provider in providers.iter().filter(|p| p.enabled) {
        if let Err(e) = registry.check(provider, redirect_uri).await {
            warn!(provider = %provider.name, error = %e, "Provider check failed");
            continue;
        }
        match registry.client_for(provider, redirect_uri).await {
            Ok(client) => match client.auth_server_info().await {
                Ok(info) => info!(
                    provider = %provider.name,
                    auth_url = %info.auth_url,
                    "Provider ready"
                ),
                Err(e) => warn!(provider = %provider.name, error = %e, "Provider has no login URL"),
            },
            Err(e) => warn!(provider = %provider.name, error = %e, "Provider client unavailable"),
        }
    }
}
