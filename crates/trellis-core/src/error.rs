//! Error types for Trellis

use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Every unmet password requirement, in policy order.
    #[error("password does not pass requirements: {}", violations.join(", "))]
    PolicyViolation { violations: Vec<String> },

    #[error("Reauthentication required: {message}")]
    ReauthenticationRequired { message: String },

    #[error("Conflict: {entity_type} with key {key} already exists")]
    Conflict { entity_type: String, key: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrellisError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    pub fn policy_violation(violations: Vec<String>) -> Self {
        Self::PolicyViolation { violations }
    }

    pub fn reauthentication_required(message: impl Into<String>) -> Self {
        Self::ReauthenticationRequired {
            message: message.into(),
        }
    }

    pub fn conflict(entity_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Conflict {
            entity_type: entity_type.into(),
            key: key.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;
