//! Trellis Access - password policy and local credentials

pub mod credential;
pub mod password;
pub mod policy;

#[cfg(test)]
mod tests;

pub use credential::{CredentialService, UpdateCredentialRequest};
pub use policy::{has_minimum_count, PasswordPolicy, Requirement};
