//! Trellis Identity - provider logins and group reconciliation
//!
//! This crate provides identity provider clients for:
//! - Generic OIDC
//! - Okta
//! - Microsoft Entra ID (Azure AD)
//! - Google Workspace
//!
//! # Architecture
//!
//! Every client implements `IdentityProviderClient` from `trellis-core`, and
//! the `ProviderRegistry` hands them out through the `ClientFactory` seam.
//! The `Authenticator` is written once against that contract: it redeems an
//! authorization code, resolves the identity and reconciles its groups with
//! what the provider claims. `TokenRefresher` keeps provider access tokens
//! usable after login.

pub mod authn;
pub mod providers;
pub mod reconcile;
pub mod registry;
pub mod tokens;


#[cfg(feature = "azure")]
pub use providers::azure::AzureClient;

#[cfg(feature = "okta")]
pub use providers::okta::OktaClient;

#[cfg(feature = "google")]
pub use providers::google::GoogleClient;

pub use providers::oidc::{OidcClient, OidcCore};
pub use providers::{HttpConfig, ProviderClient};

pub use authn::{AuthenticateRequest, Authenticator};
pub use reconcile::{diff_groups, normalize_groups, GroupDiff};
pub use registry::ProviderRegistry;
pub use tokens::TokenRefresher;
