//! Error types for the authentication operator
//!
//! Hard failures are `Error` values propagated with `?`. Each pipeline stage
//! wraps whatever it returns in [`Error::Stage`] so the final message reads as
//! a chain of contexts ("failed handling the route: ...").

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A typed lookup found nothing
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Resource kind (e.g. "Secret")
        kind: String,
        /// Resource name, namespaced names as "namespace/name"
        name: String,
    },

    /// HTTP transport or request error
    #[error("{context}: {source}")]
    Http {
        /// What was being attempted
        context: String,
        /// The underlying reqwest error
        source: reqwest::Error,
    },

    /// Filesystem error (trust bundles)
    #[error("{context}: {source}")]
    Io {
        /// What was being read
        context: String,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Input that cannot be used as-is (empty ingress domain, nameless object)
    #[error("validation error: {0}")]
    Validation(String),

    /// A probe reached its target but the target is unusable
    #[error("{0}")]
    Probe(String),

    /// An error wrapped with the pipeline stage that produced it
    #[error("{context}: {source}")]
    Stage {
        /// Stage description
        context: String,
        /// The wrapped error
        source: Box<Error>,
    },

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for the given kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an HTTP error with context
    pub fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a probe error with the given message
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap this error with stage context
    pub fn stage(self, context: impl Into<String>) -> Self {
        Self::Stage {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True if this error (or the error it wraps) means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            Error::Stage { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True if the API server rejected a write because of a stale resourceVersion
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            Error::Stage { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Attach stage context to a fallible result
pub trait StageExt<T> {
    /// Wrap the error, if any, with the given stage description
    fn stage(self, context: &str) -> crate::Result<T>;
}

impl<T> StageExt<T> for crate::Result<T> {
    fn stage(self, context: &str) -> crate::Result<T> {
        self.map_err(|e| e.stage(context))
    }
}

/// An error paired with the machine-readable reason reported on a Degraded condition
#[derive(Debug)]
pub struct ReasonedError {
    /// Condition reason; `None` falls back to the generic reason
    pub reason: Option<&'static str>,
    /// The underlying error
    pub error: Error,
}

impl ReasonedError {
    /// Pair an error with a reason
    pub fn new(reason: &'static str, error: Error) -> Self {
        Self {
            reason: Some(reason),
            error,
        }
    }
}

impl From<Error> for ReasonedError {
    fn from(error: Error) -> Self {
        Self {
            reason: None,
            error,
        }
    }
}
