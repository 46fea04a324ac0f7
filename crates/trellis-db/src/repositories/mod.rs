//! PostgreSQL repository implementations

mod credential;
mod filter;
mod group;
mod identity;
mod membership;
mod provider;
mod provider_user;
mod settings;

pub use credential::PgCredentialRepository;
pub use group::PgGroupRepository;
pub use identity::PgIdentityRepository;
pub use membership::PgMembershipRepository;
pub use provider::PgProviderRepository;
pub use provider_user::PgProviderUserRepository;
pub use settings::PgSettingsRepository;

use sqlx::PgPool;
use trellis_core::{
    CredentialRepository, DataStore, GroupRepository, IdentityRepository, MembershipRepository,
    ProviderRepository, ProviderUserRepository, SettingsRepository, TrellisError,
};

/// Every repository over one connection pool
pub struct PgStore {
    pool: PgPool,
    identities: PgIdentityRepository,
    groups: PgGroupRepository,
    providers: PgProviderRepository,
    provider_users: PgProviderUserRepository,
    credentials: PgCredentialRepository,
    settings: PgSettingsRepository,
    memberships: PgMembershipRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            identities: PgIdentityRepository::new(pool.clone()),
            groups: PgGroupRepository::new(pool.clone()),
            providers: PgProviderRepository::new(pool.clone()),
            provider_users: PgProviderUserRepository::new(pool.clone()),
            credentials: PgCredentialRepository::new(pool.clone()),
            settings: PgSettingsRepository::new(pool.clone()),
            memberships: PgMembershipRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DataStore for PgStore {
    fn identities(&self) -> &dyn IdentityRepository {
        &self.identities
    }

    fn groups(&self) -> &dyn GroupRepository {
        &self.groups
    }

    fn providers(&self) -> &dyn ProviderRepository {
        &self.providers
    }

    fn provider_users(&self) -> &dyn ProviderUserRepository {
        &self.provider_users
    }

    fn credentials(&self) -> &dyn CredentialRepository {
        &self.credentials
    }

    fn settings(&self) -> &dyn SettingsRepository {
        &self.settings
    }

    fn memberships(&self) -> &dyn MembershipRepository {
        &self.memberships
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> TrellisError {
    TrellisError::database_error(err.to_string())
}

/// Map a write error, reporting unique-key violations as conflicts
pub(crate) fn write_error(err: sqlx::Error, entity_type: &str, key: &str) -> TrellisError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => TrellisError::conflict(entity_type, key),
        Some(db_err) if db_err.is_foreign_key_violation() => {
            TrellisError::not_found(entity_type, key)
        }
        _ => db_error(err),
    }
}

pub(crate) fn count_from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
