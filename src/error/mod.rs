//! Error types for libris
//!
//! This module defines the main error type used throughout libris and the
//! mapping to stable, machine-readable GraphQL error codes so API clients can
//! distinguish failure kinds without parsing message text.

use async_graphql::ErrorExtensions;
use thiserror::Error;

use crate::loader::LoadError;

/// Result type alias for libris operations
pub type Result<T> = std::result::Result<T, LibrisError>;

/// Main error type for libris
#[derive(Error, Debug)]
pub enum LibrisError {
    /// Malformed or missing required input
    #[error("invalid input: {detail}")]
    Validation {
        detail: String,
        /// The offending input, echoed back to the caller when applicable
        invalid_input: Option<String>,
    },

    /// A mutation was attempted without an authenticated identity
    #[error("not authenticated")]
    AuthenticationRequired,

    /// Bad credential at login or token verification
    #[error("authentication failed: {0}")]
    AuthenticationInvalid(String),

    /// Store read/write error
    #[error("persistence failure: {detail}")]
    Persistence {
        detail: String,
        invalid_input: Option<String>,
    },

    /// Batched fetch collaborator unreachable
    #[error("transport failure: {0}")]
    Transport(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal plumbing failure (crypto, encoding)
    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibrisError {
    /// Build a validation error without an echoed input.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
            invalid_input: None,
        }
    }

    /// Build a validation error echoing the offending input.
    pub fn validation_with_input(detail: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
            invalid_input: Some(input.into()),
        }
    }

    /// Build a persistence error echoing the offending input.
    pub fn persistence_with_input(detail: impl Into<String>, input: impl Into<String>) -> Self {
        Self::Persistence {
            detail: detail.into(),
            invalid_input: Some(input.into()),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILURE",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::AuthenticationInvalid(_) => "AUTHENTICATION_INVALID",
            Self::Persistence { .. } => "PERSISTENCE_FAILURE",
            Self::Transport(_) => "TRANSPORT_FAILURE",
            Self::Config(_) => "CONFIG_FAILURE",
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) => "INTERNAL_FAILURE",
        }
    }

    /// The echoed invalid input, if this error carries one.
    pub fn invalid_input(&self) -> Option<&str> {
        match self {
            Self::Validation { invalid_input, .. } | Self::Persistence { invalid_input, .. } => {
                invalid_input.as_deref()
            }
            _ => None,
        }
    }
}

impl From<LoadError> for LibrisError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound => Self::Persistence {
                detail: "no record for batched lookup key".to_string(),
                invalid_input: None,
            },
            LoadError::Transport(detail) => Self::Transport(detail),
        }
    }
}

impl ErrorExtensions for LibrisError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", self.code());
            if let Some(input) = self.invalid_input() {
                ext.set("invalidInput", input);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            LibrisError::validation("missing title").code(),
            "VALIDATION_FAILURE"
        );
        assert_eq!(
            LibrisError::AuthenticationRequired.code(),
            "AUTHENTICATION_REQUIRED"
        );
        assert_eq!(
            LibrisError::AuthenticationInvalid("bad token".into()).code(),
            "AUTHENTICATION_INVALID"
        );
        assert_eq!(
            LibrisError::persistence_with_input("duplicate title", "Dune").code(),
            "PERSISTENCE_FAILURE"
        );
        assert_eq!(
            LibrisError::Transport("store unreachable".into()).code(),
            "TRANSPORT_FAILURE"
        );
    }

    #[test]
    fn invalid_input_is_echoed() {
        let err = LibrisError::persistence_with_input("duplicate title", "Dune");
        assert_eq!(err.invalid_input(), Some("Dune"));

        let gql = err.extend();
        let ext = serde_json::to_value(gql.extensions.expect("extensions should be set"))
            .expect("extensions serialize");
        assert_eq!(ext["code"], "PERSISTENCE_FAILURE");
        assert_eq!(ext["invalidInput"], "Dune");
    }

    #[test]
    fn load_errors_map_to_kinds() {
        assert_eq!(
            LibrisError::from(LoadError::NotFound).code(),
            "PERSISTENCE_FAILURE"
        );
        assert_eq!(
            LibrisError::from(LoadError::Transport("fetch failed".into())).code(),
            "TRANSPORT_FAILURE"
        );
    }
}
