//! Trellis Core - Domain types and traits for identity and access management

pub mod error;
pub mod identity;
pub mod ids;
pub mod models;
pub mod query;
pub mod traits;
pub mod validation;

#[cfg(test)]
mod tests;

pub use error::*;
pub use identity::*;
pub use ids::*;
pub use models::*;
pub use query::*;
pub use traits::*;
pub use validation::{Validate, ValidationErrors, Validator};
