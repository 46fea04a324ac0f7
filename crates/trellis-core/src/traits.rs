//! Storage traits for Trellis
//!
//! Every repository reports a duplicate unique key as
//! `TrellisError::Conflict` and never returns soft-deleted identities.

use crate::{error::Result, identity::Provider, ids::*, models::*, query::Filter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// =============================================================================
// Identity & Group Repositories
// =============================================================================

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Insert an identity; a taken name is a conflict
    async fn create(&self, identity: &Identity) -> Result<Identity>;
    /// First identity matching the filter, with groups loaded
    async fn find(&self, filter: &Filter) -> Result<Option<Identity>>;
    async fn list(&self, filter: &Filter) -> Result<Vec<Identity>>;
    /// Soft delete
    async fn delete(&self, id: IdentityId) -> Result<()>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Insert a group; a taken name is a conflict
    async fn create(&self, group: &Group) -> Result<Group>;
    async fn find(&self, filter: &Filter) -> Result<Option<Group>>;
    async fn list(&self, filter: &Filter) -> Result<Vec<Group>>;
    async fn delete(&self, id: GroupId) -> Result<()>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn create(&self, provider: &Provider) -> Result<Provider>;
    async fn find(&self, filter: &Filter) -> Result<Option<Provider>>;
    async fn list(&self, filter: &Filter) -> Result<Vec<Provider>>;
    async fn update(&self, provider: &Provider) -> Result<Provider>;
    async fn delete(&self, id: ProviderId) -> Result<()>;
}

// =============================================================================
// Provider Users
// =============================================================================

#[async_trait]
pub trait ProviderUserRepository: Send + Sync {
    /// Insert a link; an existing (identity, provider) pair is a conflict
    async fn create(&self, provider_user: &ProviderUser) -> Result<ProviderUser>;
    async fn find(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
    ) -> Result<Option<ProviderUser>>;
    async fn list(&self, filter: &Filter) -> Result<Vec<ProviderUser>>;
    /// Replace the stored tokens of an existing link
    async fn update_tokens(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
        tokens: &TokenBundle,
    ) -> Result<()>;
    async fn delete(&self, identity_id: IdentityId, provider_id: ProviderId) -> Result<()>;
}

// =============================================================================
// Credentials & Settings
// =============================================================================

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Insert a credential; an identity that already has one is a conflict
    async fn create(&self, credential: &Credential) -> Result<Credential>;
    async fn find_by_identity(&self, identity_id: IdentityId) -> Result<Option<Credential>>;
    async fn update(&self, credential: &Credential) -> Result<Credential>;
    async fn delete(&self, identity_id: IdentityId) -> Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The stored policy, or the all-zero default when none was saved
    async fn get(&self) -> Result<Settings>;
    async fn save(&self, settings: &Settings) -> Result<Settings>;
}

// =============================================================================
// Memberships
// =============================================================================

/// Everything one reconciliation writes, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct SyncCommit {
    pub identity_id: IdentityId,
    pub add: Vec<GroupId>,
    pub remove: Vec<GroupId>,
    /// Snapshot and tokens to store for the link
    pub provider_user: ProviderUser,
    pub last_seen_at: DateTime<Utc>,
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Groups the identity belongs to, by name
    async fn groups_of(&self, identity_id: IdentityId) -> Result<Vec<Group>>;
    /// Idempotent
    async fn add_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()>;
    /// Idempotent
    async fn remove_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()>;
    /// Apply membership changes, the provider user snapshot and `last_seen_at`
    /// in one transaction. Adding an existing membership or removing a missing
    /// one is not an error.
    async fn commit_sync(&self, commit: &SyncCommit) -> Result<()>;
}

/// Access to every repository of one backing store
pub trait DataStore: Send + Sync {
    fn identities(&self) -> &dyn IdentityRepository;
    fn groups(&self) -> &dyn GroupRepository;
    fn providers(&self) -> &dyn ProviderRepository;
    fn provider_users(&self) -> &dyn ProviderUserRepository;
    fn credentials(&self) -> &dyn CredentialRepository;
    fn settings(&self) -> &dyn SettingsRepository;
    fn memberships(&self) -> &dyn MembershipRepository;
}
