//! Error types for the failover status reconciler
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the resource kind, namespace or operation that failed so
//! log lines can be traced back to a specific instance.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for failover operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The API server denied the request
    #[error("forbidden: {message}")]
    Forbidden {
        /// Message reported by the API server
        message: String,
    },

    /// A requested resource does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g. "RedisFailover", "StatefulSet")
        kind: String,
        /// Namespace the lookup was made in
        namespace: String,
        /// Resource name
        name: String,
    },

    /// A cluster call exceeded its deadline
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// The call that timed out (e.g. "list instances")
        operation: String,
    },

    /// A resource could not be decoded into the expected shape
    #[error("malformed {kind}: {message}")]
    Malformed {
        /// Resource kind being decoded
        kind: String,
        /// What was wrong with it
        message: String,
    },

    /// Status cache or service-log store failure
    #[error("store error [{operation}]: {message}")]
    Store {
        /// Store operation that failed (e.g. "insert_service_log")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Invalid request or configuration
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "watch", "sync")
        context: String,
    },
}

impl Error {
    /// Create a forbidden error with the given message
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden {
            message: msg.into(),
        }
    }

    /// Create a not-found error for a namespaced resource
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a malformed-resource error
    pub fn malformed(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a store error for the given operation
    pub fn store(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the API server refused the request on authorization grounds.
    ///
    /// Matches an API 403 as well as any error whose rendered message contains
    /// "forbidden" in any case, so errors relayed through other layers are
    /// still recognised.
    pub fn is_forbidden(&self) -> bool {
        match self {
            Error::Forbidden { .. } => true,
            Error::Kube {
                source: kube::Error::Api(resp),
            } if resp.code == 403 => true,
            other => other.to_string().to_lowercase().contains("forbidden"),
        }
    }

    /// Whether the error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(resp),
            } => resp.code == 404,
            _ => false,
        }
    }
}
