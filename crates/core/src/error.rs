//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Only deterministic business failures live here. Storage and transport
/// failures are modelled by the layers that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or malformed input. Raised before any write happens.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The entity does not exist in the caller's tenant.
    ///
    /// Missing and foreign entities are deliberately indistinguishable.
    #[error("not found")]
    NotFound,

    /// The request conflicts with the entity's current state
    /// (e.g. converting an estimate twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller lacks the role or tenant membership for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
