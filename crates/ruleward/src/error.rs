//! Error types for the ruleward crate.

use thiserror::Error;

/// Errors returned by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested resource does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind, e.g. `PrometheusRule`.
        kind: &'static str,
        /// Namespace of the missing resource.
        namespace: String,
        /// Name of the missing resource.
        name: String,
    },

    /// A create was issued for a resource that already exists.
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: &'static str,
        /// Namespace of the existing resource.
        namespace: String,
        /// Name of the existing resource.
        name: String,
    },

    /// The backend could not be reached or refused the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if this is a not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that can occur while managing rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The request was malformed.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong with the input.
        reason: String,
    },

    /// A rule with identical content already exists.
    #[error("conflict: {reason}")]
    Conflict {
        /// Why the request conflicts.
        reason: String,
    },

    /// The referenced entity does not exist.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// The kind of entity looked up.
        resource: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// The operation is forbidden on platform-managed resources.
    #[error("not allowed: {reason}")]
    NotAllowed {
        /// Why the operation was refused.
        reason: String,
    },

    /// A storage call failed.
    #[error("{context}: {source}")]
    Store {
        /// The operation that was being performed.
        context: String,
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },

    /// A storage call exceeded its deadline.
    #[error("timed out: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// A watch stream closed; the index it fed can no longer be trusted.
    #[error("{kind} watch terminated")]
    WatchTerminated {
        /// The watched resource kind.
        kind: &'static str,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RuleError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_allowed(reason: impl Into<String>) -> Self {
        Self::NotAllowed {
            reason: reason.into(),
        }
    }

    pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// Returns true for bad-input errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns true for duplicate-content errors.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true when the entity is unknown, including store-level misses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Store { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for platform-protection violations.
    #[must_use]
    pub const fn is_not_allowed(&self) -> bool {
        matches!(self, Self::NotAllowed { .. })
    }
}

/// Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
