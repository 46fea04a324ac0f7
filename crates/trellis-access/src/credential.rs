//! Local password credentials
//!
//! Every password that is set is checked against the stored policy first and
//! stored only as an Argon2id hash. A password chosen by anyone other than
//! the identity itself is marked one-time so the owner must replace it.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};
use trellis_core::{
    Credential, DataStore, Filter, Identity, IdentityId, Result, Settings, TrellisError, Validate,
    Validator,
};

pub use crate::password::MAX_PASSWORD_LENGTH;
use crate::password::{generate_password, hash_password_async, needs_rehash, verify_password_async};
use crate::policy::PasswordPolicy;

/// Request to replace an identity's password
#[derive(Clone, Deserialize)]
pub struct UpdateCredentialRequest {
    pub identity_id: IdentityId,
    pub password: String,
}

impl std::fmt::Debug for UpdateCredentialRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCredentialRequest")
            .field("identity_id", &self.identity_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Validate for UpdateCredentialRequest {
    fn validate_into(&self, v: &mut Validator) {
        v.present("password", &self.password)
            .string_length("password", &self.password, 0, MAX_PASSWORD_LENGTH);
    }
}

/// A policy no password within `MAX_PASSWORD_LENGTH` could satisfy is refused
fn validate_settings(settings: &Settings) -> Result<()> {
    let mut v = Validator::new();
    let fields = [
        ("length_min", settings.length_min),
        ("lowercase_min", settings.lowercase_min),
        ("uppercase_min", settings.uppercase_min),
        ("number_min", settings.number_min),
        ("symbol_min", settings.symbol_min),
    ];
    for (field, value) in fields {
        if value as usize > MAX_PASSWORD_LENGTH {
            v.error(field, format!("must be no more than {}", MAX_PASSWORD_LENGTH));
        }
    }
    let required: u64 = fields[1..].iter().map(|(_, value)| u64::from(*value)).sum();
    if required > MAX_PASSWORD_LENGTH as u64 {
        v.error(
            "minimums",
            format!("character class minimums add up to more than {}", MAX_PASSWORD_LENGTH),
        );
    }
    Ok(v.finish()?)
}

/// Credential operations over a data store
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn DataStore>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Policy built from the currently stored settings
    pub async fn policy(&self) -> Result<PasswordPolicy> {
        let settings = self.store.settings().get().await?;
        Ok(PasswordPolicy::from_settings(&settings))
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.store.settings().get().await
    }

    /// Replace the password policy. Existing credentials are not re-checked.
    #[instrument(skip(self))]
    pub async fn save_settings(&self, settings: &Settings) -> Result<Settings> {
        validate_settings(settings)?;
        let saved = self.store.settings().save(settings).await?;
        info!("Password policy updated");
        Ok(saved)
    }

    /// Check a candidate password against the stored policy
    pub async fn check_password(&self, password: &str) -> Result<()> {
        self.policy().await?.check(password)
    }

    /// Give an identity its first credential. Without an explicit password a
    /// compliant one is generated. Returns the plaintext one-time password.
    #[instrument(skip(self, identity, password), fields(identity_id = %identity.id))]
    pub async fn create_credential(
        &self,
        identity: &Identity,
        password: Option<&str>,
    ) -> Result<String> {
        let settings = self.store.settings().get().await?;
        let password = match password {
            Some(password) => {
                PasswordPolicy::from_settings(&settings).check(password)?;
                password.to_string()
            }
            None => generate_password(&settings),
        };

        let hash = hash_password_async(password.clone()).await?;
        self.store
            .credentials()
            .create(&Credential::new(identity.id, hash, true))
            .await?;

        info!("Credential created");
        Ok(password)
    }

    /// Set a new password for `target`. The password is one-time unless the
    /// acting identity is changing its own.
    #[instrument(skip(self, acting, target, password), fields(
        acting_id = %acting.id,
        target_id = %target.id,
    ))]
    pub async fn update_credential(
        &self,
        acting: &Identity,
        target: &Identity,
        password: &str,
    ) -> Result<()> {
        let mut credential = self
            .store
            .credentials()
            .find_by_identity(target.id)
            .await?
            .ok_or_else(|| TrellisError::not_found("credential", target.id.to_string()))?;

        self.check_password(password).await?;

        credential.password_hash = hash_password_async(password.to_string()).await?;
        credential.one_time_password = acting.id != target.id;
        self.store.credentials().update(&credential).await?;

        info!(
            one_time = credential.one_time_password,
            "Credential updated"
        );
        Ok(())
    }

    /// Validate a request and apply it to the identity it names
    pub async fn update(&self, acting: &Identity, request: &UpdateCredentialRequest) -> Result<()> {
        request.validate()?;

        let target = self
            .store
            .identities()
            .find(&Filter::new().by_id(request.identity_id))
            .await?
            .ok_or_else(|| TrellisError::not_found("identity", request.identity_id.to_string()))?;

        self.update_credential(acting, &target, &request.password)
            .await
    }

    /// Check a password for an identity. Upgrades the stored hash when it was
    /// made with weaker parameters.
    #[instrument(skip(self, password))]
    pub async fn verify(&self, identity_id: IdentityId, password: &str) -> Result<Credential> {
        let mut credential = self
            .store
            .credentials()
            .find_by_identity(identity_id)
            .await?
            .ok_or_else(|| TrellisError::authentication_failed("invalid credentials"))?;

        let matches =
            verify_password_async(password.to_string(), credential.password_hash.clone()).await;
        if !matches {
            return Err(TrellisError::authentication_failed("invalid credentials"));
        }

        if needs_rehash(&credential.password_hash) {
            credential.password_hash = hash_password_async(password.to_string()).await?;
            match self.store.credentials().update(&credential).await {
                Ok(updated) => credential = updated,
                Err(e) => warn!(error = %e, "Failed to upgrade password hash"),
            }
        }

        Ok(credential)
    }
}
