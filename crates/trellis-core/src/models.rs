//! Domain models for Trellis
//!
//! Identities and groups form the local account namespace. A `ProviderUser`
//! records what the last login through one provider produced, and is the
//! state the reconciliation engine diffs against.

use crate::identity::Provider;
use crate::ids::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Identities & Groups
// =============================================================================

/// A local account, usually named by an email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    /// Unique, never empty
    pub name: String,
    /// Populated by lookups that load memberships; empty otherwise
    #[serde(default)]
    pub groups: Vec<Group>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::new(),
            name: name.into(),
            groups: vec![],
            last_seen_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn group_names(&self) -> BTreeSet<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }
}

/// A named collection of identities. Names are one flat, case-sensitive
/// namespace shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Provider links
// =============================================================================

/// Tokens issued by an identity provider
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenBundle {
    /// True when the access token is still valid for at least `leeway`
    pub fn is_fresh(&self, now: DateTime<Utc>, leeway: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => !self.access_token.is_empty() && expires_at - leeway > now,
            None => !self.access_token.is_empty(),
        }
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One identity's relationship to one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    pub identity_id: IdentityId,
    pub provider_id: ProviderId,
    pub email: String,
    /// Group names this provider reported at the last successful login
    pub groups: BTreeSet<String>,
    pub tokens: TokenBundle,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ProviderUser {
    pub fn new(identity_id: IdentityId, provider_id: ProviderId, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity_id,
            provider_id,
            email: email.into(),
            groups: BTreeSet::new(),
            tokens: TokenBundle::default(),
            last_update: now,
            created_at: now,
        }
    }
}

// =============================================================================
// Credentials & Settings
// =============================================================================

/// A local password credential; at most one per identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub identity_id: IdentityId,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Set when someone other than the owner chose the password
    pub one_time_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(identity_id: IdentityId, password_hash: String, one_time_password: bool) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::new(),
            identity_id,
            password_hash,
            one_time_password,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Process-wide password policy. A minimum of zero is not enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub length_min: u32,
    pub lowercase_min: u32,
    pub uppercase_min: u32,
    pub number_min: u32,
    pub symbol_min: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Authentication
// =============================================================================

/// Outcome of a successful provider login, handed to session creation
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// The identity with its groups loaded
    pub identity: Identity,
    pub provider: Provider,
    pub tokens: TokenBundle,
}

/// Page request; page numbers start at 1. Zero page and zero limit means "everything".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn is_unbounded(&self) -> bool {
        self.page == 0 && self.limit == 0
    }

    /// Rows skipped before this page. Computed in `u64`, where the product of
    /// two `u32`s cannot overflow.
    pub fn offset(&self) -> u64 {
        u64::from(self.limit) * u64::from(self.page.saturating_sub(1))
    }
}
