//! Server configuration

use anyhow::Result;
use serde::Deserialize;
use trellis_core::{Provider, ProviderKind};
use trellis_db::DatabaseConfig;
use trellis_identity::HttpConfig;

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub login: LoginSettings,
    /// Providers created or updated at start-up
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Deserialize)]
pub struct LoginSettings {
    /// Callback registered with every provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Check each enabled provider's discovery document at start-up
    #[serde(default = "default_true")]
    pub check_providers: bool,
}

#[derive(Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl ProviderSettings {
    pub fn to_provider(&self) -> Provider {
        let mut provider = Provider::new(
            &self.name,
            self.kind,
            &self.url,
            &self.client_id,
            &self.client_secret,
        );
        provider.enabled = self.enabled;
        provider
    }

    /// Copy configured fields onto a stored provider. Returns whether
    /// anything changed.
    pub fn apply_to(&self, provider: &mut Provider) -> bool {
        let changed = provider.kind != self.kind
            || provider.url != self.url
            || provider.client_id != self.client_id
            || provider.client_secret != self.client_secret
            || provider.enabled != self.enabled;
        if changed {
            provider.kind = self.kind;
            provider.url = self.url.clone();
            provider.client_id = self.client_id.clone();
            provider.client_secret = self.client_secret.clone();
            provider.enabled = self.enabled;
        }
        changed
    }
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/auth/callback".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            redirect_uri: default_redirect_uri(),
            check_providers: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // TRELLIS__DATABASE__URL and friends
            .add_source(
                config::Environment::with_prefix("TRELLIS")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config = builder
            .set_default("database.max_connections", 10)?
            .set_default("http.timeout_secs", 30)?
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> AppConfig {
        AppConfig::from_builder(
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse("");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.login.check_providers);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_providers_section() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/trellis_test"
            run_migrations = false

            [login]
            redirect_uri = "https://trellis.example.com/callback"

            [[providers]]
            name = "corp-okta"
            kind = "okta"
            url = "dev-1.okta.com"
            client_id = "abc"
            client_secret = "shh"

            [[providers]]
            name = "workspace"
            kind = "google"
            client_id = "def"
            enabled = false
            "#,
        );

        assert_eq!(config.database.url, "postgres://localhost/trellis_test");
        assert!(!config.database.run_migrations);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::Okta);
        assert!(config.providers[0].enabled);
        assert!(!config.providers[1].enabled);
        assert!(config.providers[1].url.is_empty());
        assert!(!format!("{:?}", config.providers[0]).contains("shh"));
    }

    #[test]
    fn test_apply_to_reports_changes() {
        let settings = ProviderSettings {
            name: "corp".into(),
            kind: ProviderKind::Oidc,
            url: "https://idp.example.com".into(),
            client_id: "abc".into(),
            client_secret: "shh".into(),
            enabled: true,
        };
        let mut stored = settings.to_provider();
        assert!(!settings.apply_to(&mut stored));

        stored.client_secret = "old".into();
        assert!(settings.apply_to(&mut stored));
        assert_eq!(stored.client_secret, "shh");
    }
}
