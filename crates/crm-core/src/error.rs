//! Error taxonomy shared by every domain operation.
//!
//! Adapters and infrastructure code work in `anyhow::Result`; domain
//! operations surface a [`CrmError`] so callers (HTTP, CLI) can map each
//! failure class to a response without inspecting message strings.

use std::fmt;

use thiserror::Error;

/// The kind of record a [`CrmError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Contact,
    Status,
    Edge,
    Tag,
    Interest,
    Occupation,
    Photo,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Contact => "contact",
            Entity::Status => "status",
            Entity::Edge => "edge",
            Entity::Tag => "tag",
            Entity::Interest => "interest",
            Entity::Occupation => "occupation",
            Entity::Photo => "photo",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The unit of work was aborted and nothing was committed.
    #[error("transaction failed: {0:#}")]
    Transaction(anyhow::Error),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl CrmError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        CrmError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CrmError::Invalid(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CrmError::Conflict(message.into())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CrmError::NotFound { .. } => "not_found",
            CrmError::Invalid(_) => "bad_request",
            CrmError::Conflict(_) => "conflict",
            CrmError::PayloadTooLarge(_) => "payload_too_large",
            CrmError::Transaction(_) => "transaction_failed",
            CrmError::Store(_) => "internal",
        }
    }
}

pub type CrmResult<T> = Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CrmError::not_found(Entity::Status, "abc");
        assert_eq!(err.to_string(), "status not found: abc");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_store_error_from_anyhow() {
        let err: CrmError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "internal");
        assert!(err.to_string().contains("disk full"));
    }
}
