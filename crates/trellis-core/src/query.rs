//! Composable query predicates
//!
//! A `Filter` is a conjunction of independent `Selector`s. Stores translate
//! selectors into their own query language; the in-memory store evaluates
//! them directly through `Selectable`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ids::{IdentityId, ProviderId};
use crate::models::Pagination;

/// Sort key for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Name,
    CreatedAt,
}

impl OrderBy {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::CreatedAt => "created_at",
        }
    }
}

/// A single query predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    ById(Uuid),
    ByName(String),
    ByProviderId(ProviderId),
    ByIdentityId(IdentityId),
    /// Expiry in the future, or no expiry at all
    NotExpired,
    Paginate(Pagination),
    OrderBy(OrderBy),
}

/// Conjunction of selectors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    selectors: Vec<Selector>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn by_id(self, id: impl Into<Uuid>) -> Self {
        self.with(Selector::ById(id.into()))
    }

    pub fn by_name(self, name: impl Into<String>) -> Self {
        self.with(Selector::ByName(name.into()))
    }

    pub fn by_provider(self, provider_id: ProviderId) -> Self {
        self.with(Selector::ByProviderId(provider_id))
    }

    pub fn by_identity(self, identity_id: IdentityId) -> Self {
        self.with(Selector::ByIdentityId(identity_id))
    }

    pub fn not_expired(self) -> Self {
        self.with(Selector::NotExpired)
    }

    pub fn paginate(self, pagination: Pagination) -> Self {
        self.with(Selector::Paginate(pagination))
    }

    pub fn order_by(self, order: OrderBy) -> Self {
        self.with(Selector::OrderBy(order))
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// The last pagination selector, if any
    pub fn pagination(&self) -> Option<Pagination> {
        self.selectors.iter().rev().find_map(|s| match s {
            Selector::Paginate(p) => Some(*p),
            _ => None,
        })
    }

    pub fn ordering(&self) -> Vec<OrderBy> {
        self.selectors
            .iter()
            .filter_map(|s| match s {
                Selector::OrderBy(o) => Some(*o),
                _ => None,
            })
            .collect()
    }

    /// Evaluate the row predicates against a record
    pub fn matches<T: Selectable>(&self, record: &T, now: DateTime<Utc>) -> bool {
        self.selectors.iter().all(|selector| match selector {
            Selector::ById(id) => record.select_id() == Some(*id),
            Selector::ByName(name) => record.select_name() == Some(name.as_str()),
            Selector::ByProviderId(id) => record.select_provider_id() == Some(*id),
            Selector::ByIdentityId(id) => record.select_identity_id() == Some(*id),
            Selector::NotExpired => match record.select_expires_at() {
                Some(expires_at) => expires_at > now,
                None => true,
            },
            Selector::Paginate(_) | Selector::OrderBy(_) => true,
        })
    }

    /// Filter, order and page a set of records
    pub fn apply<T: Selectable>(&self, records: impl IntoIterator<Item = T>) -> Vec<T> {
        let now = Utc::now();
        let mut selected: Vec<T> = records
            .into_iter()
            .filter(|r| self.matches(r, now))
            .collect();

        let ordering = self.ordering();
        if !ordering.is_empty() {
            selected.sort_by(|a, b| {
                ordering
                    .iter()
                    .map(|o| match o {
                        OrderBy::Name => a.select_name().cmp(&b.select_name()),
                        OrderBy::CreatedAt => a.select_created_at().cmp(&b.select_created_at()),
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        match self.pagination() {
            Some(p) if !p.is_unbounded() => selected
                .into_iter()
                .skip(usize::try_from(p.offset()).unwrap_or(usize::MAX))
                .take(p.limit as usize)
                .collect(),
            _ => selected,
        }
    }
}

/// Field access used to evaluate selectors in memory. Fields an entity does
/// not have return `None`, which never matches.
pub trait Selectable {
    fn select_id(&self) -> Option<Uuid> {
        None
    }
    fn select_name(&self) -> Option<&str> {
        None
    }
    fn select_provider_id(&self) -> Option<ProviderId> {
        None
    }
    fn select_identity_id(&self) -> Option<IdentityId> {
        None
    }
    fn select_expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl Selectable for crate::models::Identity {
    fn select_id(&self) -> Option<Uuid> {
        Some(self.id.into())
    }
    fn select_name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Selectable for crate::models::Group {
    fn select_id(&self) -> Option<Uuid> {
        Some(self.id.into())
    }
    fn select_name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Selectable for crate::identity::Provider {
    fn select_id(&self) -> Option<Uuid> {
        Some(self.id.into())
    }
    fn select_name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Selectable for crate::models::ProviderUser {
    fn select_provider_id(&self) -> Option<ProviderId> {
        Some(self.provider_id)
    }
    fn select_identity_id(&self) -> Option<IdentityId> {
        Some(self.identity_id)
    }
    fn select_expires_at(&self) -> Option<DateTime<Utc>> {
        self.tokens.expires_at
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

impl Selectable for crate::models::Credential {
    fn select_id(&self) -> Option<Uuid> {
        Some(self.id.into())
    }
    fn select_identity_id(&self) -> Option<IdentityId> {
        Some(self.identity_id)
    }
    fn select_created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}
