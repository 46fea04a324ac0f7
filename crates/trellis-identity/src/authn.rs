//! Login through an external provider
//!
//! `Authenticator` redeems an authorization code, resolves the identity it
//! belongs to and reconciles the identity's group memberships with what the
//! provider claims. All writes of one login land in a single
//! `commit_sync`; the get-or-create steps before it are idempotent.

use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use trellis_core::{
    AuthenticationResult, ClientFactory, DataStore, Filter, Group, GroupId, Identity, Provider,
    ProviderId, ProviderUser, Result, SyncCommit, TrellisError, Validate, Validator,
};

use crate::reconcile::{diff_groups, normalize_groups};

const MAX_CODE_LENGTH: usize = 4096;
const MAX_REDIRECT_URI_LENGTH: usize = 2048;

/// Authorization code callback
#[derive(Clone, Deserialize)]
pub struct AuthenticateRequest {
    pub provider_id: ProviderId,
    pub redirect_uri: String,
    pub code: String,
}

impl std::fmt::Debug for AuthenticateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateRequest")
            .field("provider_id", &self.provider_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("code", &"<redacted>")
            .finish()
    }
}

impl Validate for AuthenticateRequest {
    fn validate_into(&self, v: &mut Validator) {
        v.required("redirect_uri", &self.redirect_uri)
            .string_length("redirect_uri", &self.redirect_uri, 0, MAX_REDIRECT_URI_LENGTH)
            .required("code", &self.code)
            .string_length("code", &self.code, 0, MAX_CODE_LENGTH);
    }
}

/// Provider failures during login surface as `AuthenticationFailed`
fn login_error(err: TrellisError) -> TrellisError {
    match err {
        err @ (TrellisError::AuthenticationFailed { .. }
        | TrellisError::ReauthenticationRequired { .. }) => err,
        other => TrellisError::authentication_failed(other.to_string()),
    }
}

/// Pick the subject's email. The code exchange is authoritative; userinfo
/// only fills in when the exchange carried none.
fn resolve_email(exchanged: &str, userinfo: &str) -> Result<String> {
    let exchanged = exchanged.trim();
    let userinfo = userinfo.trim();
    match (exchanged.is_empty(), userinfo.is_empty()) {
        (true, true) => Err(TrellisError::authentication_failed(
            "provider returned no email for the subject",
        )),
        (true, false) => Ok(userinfo.to_string()),
        (false, false) if !exchanged.eq_ignore_ascii_case(userinfo) => {
            warn!("Userinfo email does not match the ID token email");
            Err(TrellisError::authentication_failed(
                "email mismatch between token and userinfo",
            ))
        }
        _ => Ok(exchanged.to_string()),
    }
}

/// Reconciliation engine for provider logins
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn DataStore>,
    factory: Arc<dyn ClientFactory>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn DataStore>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { store, factory }
    }

    /// Log a subject in through a provider and sync its groups.
    ///
    /// An unknown or disabled provider fails with `NotFound` before any
    /// provider traffic.
    #[instrument(skip(self, request), fields(provider_id = %request.provider_id))]
    pub async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticationResult> {
        request.validate()?;

        let provider = self.enabled_provider(request.provider_id).await?;
        let client = self
            .factory
            .client_for(&provider, &request.redirect_uri)
            .await?;

        let exchanged = client
            .exchange_code(&request.code)
            .await
            .map_err(login_error)?;
        let claims = client
            .get_user_info(&exchanged.tokens)
            .await
            .map_err(login_error)?;

        let email = resolve_email(&exchanged.email, &claims.email)?;
        let claimed = normalize_groups(&claims.groups);

        let identity = self.get_or_create_identity(&email).await?;
        let mut provider_user = self
            .get_or_create_provider_user(&identity, &provider, &email)
            .await?;

        let current_groups = self.store.memberships().groups_of(identity.id).await?;
        let current: BTreeSet<String> = current_groups.iter().map(|g| g.name.clone()).collect();
        let diff = diff_groups(&provider_user.groups, &claimed, &current);

        let mut add: Vec<GroupId> = Vec::with_capacity(diff.to_add.len());
        for name in &diff.to_add {
            add.push(self.get_or_create_group(name).await?.id);
        }
        let ids_by_name: HashMap<&str, GroupId> = current_groups
            .iter()
            .map(|g| (g.name.as_str(), g.id))
            .collect();
        let remove: Vec<GroupId> = diff
            .to_remove
            .iter()
            .filter_map(|name| ids_by_name.get(name.as_str()).copied())
            .collect();

        let now = Utc::now();
        provider_user.email = email;
        provider_user.groups = claimed;
        provider_user.tokens = exchanged.tokens.clone();
        provider_user.last_update = now;

        self.store
            .memberships()
            .commit_sync(&SyncCommit {
                identity_id: identity.id,
                add,
                remove,
                provider_user,
                last_seen_at: now,
            })
            .await?;

        if diff.is_empty() {
            debug!(identity_id = %identity.id, "Group memberships already in sync");
        } else {
            info!(
                identity_id = %identity.id,
                added = ?diff.to_add,
                removed = ?diff.to_remove,
                "Group memberships reconciled"
            );
        }

        let identity = self
            .store
            .identities()
            .find(&Filter::new().by_id(identity.id))
            .await?
            .ok_or_else(|| TrellisError::not_found("identity", identity.id.to_string()))?;

        Ok(AuthenticationResult {
            identity,
            provider,
            tokens: exchanged.tokens,
        })
    }

    async fn enabled_provider(&self, provider_id: ProviderId) -> Result<Provider> {
        self.store
            .providers()
            .find(&Filter::new().by_id(provider_id))
            .await?
            .filter(|p| p.enabled)
            .ok_or_else(|| TrellisError::not_found("provider", provider_id.to_string()))
    }

    async fn get_or_create_identity(&self, email: &str) -> Result<Identity> {
        let filter = Filter::new().by_name(email);
        let identities = self.store.identities();
        if let Some(found) = identities.find(&filter).await? {
            return Ok(found);
        }

        match identities.create(&Identity::new(email)).await {
            Ok(created) => {
                info!(identity_id = %created.id, "Identity created");
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                warn!("Identity created concurrently; re-fetching");
                identities
                    .find(&filter)
                    .await?
                    .ok_or_else(|| TrellisError::not_found("identity", email))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_or_create_group(&self, name: &str) -> Result<Group> {
        let filter = Filter::new().by_name(name);
        let groups = self.store.groups();
        if let Some(found) = groups.find(&filter).await? {
            return Ok(found);
        }

        match groups.create(&Group::new(name)).await {
            Ok(created) => {
                info!(group_id = %created.id, group = %created.name, "Group created");
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                warn!(group = %name, "Group created concurrently; re-fetching");
                groups
                    .find(&filter)
                    .await?
                    .ok_or_else(|| TrellisError::not_found("group", name))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_or_create_provider_user(
        &self,
        identity: &Identity,
        provider: &Provider,
        email: &str,
    ) -> Result<ProviderUser> {
        let links = self.store.provider_users();
        if let Some(found) = links.find(identity.id, provider.id).await? {
            return Ok(found);
        }

        match links
            .create(&ProviderUser::new(identity.id, provider.id, email))
            .await
        {
            Ok(created) => {
                debug!(identity_id = %identity.id, "Provider link created");
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                warn!("Provider link created concurrently; re-fetching");
                links
                    .find(identity.id, provider.id)
                    .await?
                    .ok_or_else(|| TrellisError::not_found("provider_user", identity.id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_email() {
        assert_eq!(resolve_email("a@x.com", "").unwrap(), "a@x.com");
        assert_eq!(resolve_email("", "b@x.com").unwrap(), "b@x.com");
        assert_eq!(resolve_email("A@x.com", "a@X.com").unwrap(), "A@x.com");
        assert!(resolve_email("a@x.com", "b@x.com").is_err());
        assert!(resolve_email(" ", "").is_err());
    }

    #[test]
    fn test_request_validation() {
        let request = AuthenticateRequest {
            provider_id: ProviderId::new(),
            redirect_uri: String::new(),
            code: String::new(),
        };
        let errors = match request.validate() {
            Err(errors) => errors,
            Ok(()) => panic!("empty request must not validate"),
        };
        assert_eq!(errors.get("code").unwrap(), ["a value is required"]);
        assert_eq!(errors.get("redirect_uri").unwrap(), ["a value is required"]);
    }

    #[test]
    fn test_request_debug_hides_code() {
        let request = AuthenticateRequest {
            provider_id: ProviderId::new(),
            redirect_uri: "https://app/cb".into(),
            code: "secret-code".into(),
        };
        assert!(!format!("{:?}", request).contains("secret-code"));
    }
}
