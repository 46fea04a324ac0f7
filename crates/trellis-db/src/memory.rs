//! In-memory store implementing every repository trait
//!
//! All state sits behind one lock, so `commit_sync` is trivially atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::instrument;

use trellis_core::{
    Credential, CredentialRepository, DataStore, Filter, Group, GroupId, GroupRepository,
    Identity, IdentityId, IdentityRepository, MembershipRepository, Provider, ProviderId,
    ProviderRepository, ProviderUser, ProviderUserRepository, Result, Settings,
    SettingsRepository, SyncCommit, TokenBundle, TrellisError,
};

#[derive(Default)]
struct State {
    identities: HashMap<IdentityId, Identity>,
    groups: HashMap<GroupId, Group>,
    providers: HashMap<ProviderId, Provider>,
    provider_users: HashMap<(IdentityId, ProviderId), ProviderUser>,
    credentials: HashMap<IdentityId, Credential>,
    settings: Option<Settings>,
    memberships: BTreeSet<(IdentityId, GroupId)>,
}

impl State {
    fn live_identity(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id).filter(|i| i.deleted_at.is_none())
    }

    fn groups_of(&self, identity_id: IdentityId) -> Vec<Group> {
        let mut groups: Vec<Group> = self
            .memberships
            .iter()
            .filter(|(member, _)| *member == identity_id)
            .filter_map(|(_, group_id)| self.groups.get(group_id).cloned())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    fn with_groups(&self, identity: &Identity) -> Identity {
        let mut identity = identity.clone();
        identity.groups = self.groups_of(identity.id);
        identity
    }
}

/// Store keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for MemoryStore {
    fn identities(&self) -> &dyn IdentityRepository {
        self
    }

    fn groups(&self) -> &dyn GroupRepository {
        self
    }

    fn providers(&self) -> &dyn ProviderRepository {
        self
    }

    fn provider_users(&self) -> &dyn ProviderUserRepository {
        self
    }

    fn credentials(&self) -> &dyn CredentialRepository {
        self
    }

    fn settings(&self) -> &dyn SettingsRepository {
        self
    }

    fn memberships(&self) -> &dyn MembershipRepository {
        self
    }
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    #[instrument(skip(self, identity), fields(name = %identity.name))]
    async fn create(&self, identity: &Identity) -> Result<Identity> {
        let mut state = self.state.write().await;
        let taken = state
            .identities
            .values()
            .any(|i| i.deleted_at.is_none() && i.name == identity.name);
        if taken {
            return Err(TrellisError::conflict("identity", &identity.name));
        }

        let mut stored = identity.clone();
        stored.groups.clear();
        state.identities.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, filter: &Filter) -> Result<Option<Identity>> {
        Ok(IdentityRepository::list(self, filter).await?.into_iter().next())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<Identity>> {
        let state = self.state.read().await;
        let live = state
            .identities
            .values()
            .filter(|i| i.deleted_at.is_none())
            .cloned();
        Ok(filter
            .apply(live)
            .iter()
            .map(|i| state.with_groups(i))
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: IdentityId) -> Result<()> {
        let mut state = self.state.write().await;
        match state.identities.get_mut(&id) {
            Some(identity) if identity.deleted_at.is_none() => {
                let now = Utc::now();
                identity.deleted_at = Some(now);
                identity.updated_at = now;
                Ok(())
            }
            _ => Err(TrellisError::not_found("identity", id.to_string())),
        }
    }
}

#[async_trait]
impl GroupRepository for MemoryStore {
    #[instrument(skip(self, group), fields(name = %group.name))]
    async fn create(&self, group: &Group) -> Result<Group> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(TrellisError::conflict("group", &group.name));
        }
        state.groups.insert(group.id, group.clone());
        Ok(group.clone())
    }

    async fn find(&self, filter: &Filter) -> Result<Option<Group>> {
        Ok(GroupRepository::list(self, filter).await?.into_iter().next())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<Group>> {
        let state = self.state.read().await;
        Ok(filter.apply(state.groups.values().cloned()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.groups.remove(&id).is_none() {
            return Err(TrellisError::not_found("group", id.to_string()));
        }
        state.memberships.retain(|(_, group_id)| *group_id != id);
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for MemoryStore {
    #[instrument(skip(self, provider), fields(name = %provider.name))]
    async fn create(&self, provider: &Provider) -> Result<Provider> {
        let mut state = self.state.write().await;
        if state.providers.values().any(|p| p.name == provider.name) {
            return Err(TrellisError::conflict("provider", &provider.name));
        }
        state.providers.insert(provider.id, provider.clone());
        Ok(provider.clone())
    }

    async fn find(&self, filter: &Filter) -> Result<Option<Provider>> {
        Ok(ProviderRepository::list(self, filter).await?.into_iter().next())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<Provider>> {
        let state = self.state.read().await;
        Ok(filter.apply(state.providers.values().cloned()))
    }

    async fn update(&self, provider: &Provider) -> Result<Provider> {
        let mut state = self.state.write().await;
        let name_taken = state
            .providers
            .values()
            .any(|p| p.id != provider.id && p.name == provider.name);
        if name_taken {
            return Err(TrellisError::conflict("provider", &provider.name));
        }
        match state.providers.get_mut(&provider.id) {
            Some(stored) => {
                *stored = provider.clone();
                stored.updated_at = Utc::now();
                Ok(stored.clone())
            }
            None => Err(TrellisError::not_found("provider", provider.id.to_string())),
        }
    }

    async fn delete(&self, id: ProviderId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.providers.remove(&id).is_none() {
            return Err(TrellisError::not_found("provider", id.to_string()));
        }
        state.provider_users.retain(|(_, provider_id), _| *provider_id != id);
        Ok(())
    }
}

#[async_trait]
impl ProviderUserRepository for MemoryStore {
    #[instrument(skip(self, provider_user), fields(
        identity_id = %provider_user.identity_id,
        provider_id = %provider_user.provider_id,
    ))]
    async fn create(&self, provider_user: &ProviderUser) -> Result<ProviderUser> {
        let mut state = self.state.write().await;
        let key = (provider_user.identity_id, provider_user.provider_id);
        if state.provider_users.contains_key(&key) {
            return Err(TrellisError::conflict(
                "provider_user",
                format!("{}/{}", key.0, key.1),
            ));
        }
        state.provider_users.insert(key, provider_user.clone());
        Ok(provider_user.clone())
    }

    async fn find(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
    ) -> Result<Option<ProviderUser>> {
        let state = self.state.read().await;
        Ok(state.provider_users.get(&(identity_id, provider_id)).cloned())
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<ProviderUser>> {
        let state = self.state.read().await;
        Ok(filter.apply(state.provider_users.values().cloned()))
    }

    #[instrument(skip(self, tokens))]
    async fn update_tokens(
        &self,
        identity_id: IdentityId,
        provider_id: ProviderId,
        tokens: &TokenBundle,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        match state.provider_users.get_mut(&(identity_id, provider_id)) {
            Some(pu) => {
                pu.tokens = tokens.clone();
                pu.last_update = Utc::now();
                Ok(())
            }
            None => Err(TrellisError::not_found(
                "provider_user",
                format!("{}/{}", identity_id, provider_id),
            )),
        }
    }

    async fn delete(&self, identity_id: IdentityId, provider_id: ProviderId) -> Result<()> {
        let mut state = self.state.write().await;
        match state.provider_users.remove(&(identity_id, provider_id)) {
            Some(_) => Ok(()),
            None => Err(TrellisError::not_found(
                "provider_user",
                format!("{}/{}", identity_id, provider_id),
            )),
        }
    }
}

#[async_trait]
impl CredentialRepository for MemoryStore {
    #[instrument(skip(self, credential), fields(identity_id = %credential.identity_id))]
    async fn create(&self, credential: &Credential) -> Result<Credential> {
        let mut state = self.state.write().await;
        if state.live_identity(credential.identity_id).is_none() {
            return Err(TrellisError::not_found(
                "identity",
                credential.identity_id.to_string(),
            ));
        }
        if state.credentials.contains_key(&credential.identity_id) {
            return Err(TrellisError::conflict(
                "credential",
                credential.identity_id.to_string(),
            ));
        }
        state
            .credentials
            .insert(credential.identity_id, credential.clone());
        Ok(credential.clone())
    }

    async fn find_by_identity(&self, identity_id: IdentityId) -> Result<Option<Credential>> {
        let state = self.state.read().await;
        Ok(state.credentials.get(&identity_id).cloned())
    }

    async fn update(&self, credential: &Credential) -> Result<Credential> {
        let mut state = self.state.write().await;
        match state.credentials.get_mut(&credential.identity_id) {
            Some(stored) => {
                *stored = credential.clone();
                stored.updated_at = Utc::now();
                Ok(stored.clone())
            }
            None => Err(TrellisError::not_found(
                "credential",
                credential.identity_id.to_string(),
            )),
        }
    }

    async fn delete(&self, identity_id: IdentityId) -> Result<()> {
        let mut state = self.state.write().await;
        match state.credentials.remove(&identity_id) {
            Some(_) => Ok(()),
            None => Err(TrellisError::not_found("credential", identity_id.to_string())),
        }
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get(&self) -> Result<Settings> {
        let state = self.state.read().await;
        Ok(state.settings.clone().unwrap_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<Settings> {
        let mut state = self.state.write().await;
        let mut saved = settings.clone();
        saved.updated_at = Some(Utc::now());
        state.settings = Some(saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn groups_of(&self, identity_id: IdentityId) -> Result<Vec<Group>> {
        let state = self.state.read().await;
        Ok(state.groups_of(identity_id))
    }

    async fn add_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.live_identity(identity_id).is_none() {
            return Err(TrellisError::not_found("identity", identity_id.to_string()));
        }
        if !state.groups.contains_key(&group_id) {
            return Err(TrellisError::not_found("group", group_id.to_string()));
        }
        state.memberships.insert((identity_id, group_id));
        Ok(())
    }

    async fn remove_membership(&self, identity_id: IdentityId, group_id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        state.memberships.remove(&(identity_id, group_id));
        Ok(())
    }

    #[instrument(skip(self, commit), fields(
        identity_id = %commit.identity_id,
        added = commit.add.len(),
        removed = commit.remove.len(),
    ))]
    async fn commit_sync(&self, commit: &SyncCommit) -> Result<()> {
        let mut state = self.state.write().await;

        // validate everything before the first write
        if state.live_identity(commit.identity_id).is_none() {
            return Err(TrellisError::not_found(
                "identity",
                commit.identity_id.to_string(),
            ));
        }
        if let Some(missing) = commit.add.iter().find(|id| !state.groups.contains_key(*id)) {
            return Err(TrellisError::not_found("group", missing.to_string()));
        }
        if !state.providers.contains_key(&commit.provider_user.provider_id) {
            return Err(TrellisError::not_found(
                "provider",
                commit.provider_user.provider_id.to_string(),
            ));
        }

        for group_id in &commit.add {
            state.memberships.insert((commit.identity_id, *group_id));
        }
        for group_id in &commit.remove {
            state.memberships.remove(&(commit.identity_id, *group_id));
        }

        let pu = &commit.provider_user;
        state
            .provider_users
            .insert((pu.identity_id, pu.provider_id), pu.clone());

        if let Some(identity) = state.identities.get_mut(&commit.identity_id) {
            identity.last_seen_at = Some(commit.last_seen_at);
            identity.updated_at = Utc::now();
        }
        Ok(())
    }
}
