//! Unified error type for Concord operations.
//!
//! Validation failures (`StageNotDefined`, `StageAlreadyDefined`,
//! `Configuration`) are raised before any adapter I/O. Losing a creation
//! race is reported as `ContextAlreadyExists`, never as a generic adapter
//! failure, so callers can tell "someone else won" apart from "storage is
//! broken".

use crate::codec::CodecError;
use crate::effects::{BrokerError, StorageError};
use serde::{Deserialize, Serialize};

/// Unified error type for all Concord operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ConcordError {
    /// Invalid setup detected before any adapter I/O
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the invalid setting
        message: String,
    },

    /// `create` referenced a stage type that was never defined
    #[error("Stage type '{stage_type}' is not defined")]
    StageNotDefined {
        /// Requested stage type
        stage_type: String,
    },

    /// `define` was called twice for the same stage type
    #[error("Stage type '{stage_type}' is already defined")]
    StageAlreadyDefined {
        /// Duplicated stage type
        stage_type: String,
    },

    /// Another caller created the context first
    #[error("Context '{context_id}' already exists")]
    ContextAlreadyExists {
        /// Contested context id
        context_id: String,
    },

    /// No registry record exists for the context
    #[error("Context '{context_id}' does not exist")]
    ContextNotFound {
        /// Missing context id
        context_id: String,
    },

    /// The context's stage type is not registered on this node
    #[error("Stage type '{stage_type}' of context '{context_id}' is not available on this node")]
    StageUnavailable {
        /// Context whose stage is missing
        context_id: String,
        /// Stage type recorded in the registry
        stage_type: String,
    },

    /// Underlying storage or broker failed
    #[error("Adapter failure: {message}")]
    AdapterFailure {
        /// Adapter error description
        message: String,
    },

    /// One or more resources failed to release
    #[error("Dispose failure in {resource}: {message}")]
    DisposeFailure {
        /// Resource that failed to release
        resource: String,
        /// First failure observed
        message: String,
    },

    /// Payload could not be encoded or decoded
    #[error("Codec error: {message}")]
    Codec {
        /// Codec error description
        message: String,
    },

    /// Operation is not allowed in the current lifecycle state
    #[error("Invalid lifecycle: {message}")]
    InvalidLifecycle {
        /// Description of the rejected transition
        message: String,
    },

    /// An activity is already registered under this key
    #[error("Activity '{key}' is already registered")]
    ActivityAlreadyRegistered {
        /// Duplicated key
        key: String,
    },

    /// A user-supplied hook (stage, activity, protocol) failed
    #[error("Hook '{hook}' failed: {message}")]
    Hook {
        /// Hook name
        hook: String,
        /// Failure description
        message: String,
    },
}

impl ConcordError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a stage-not-defined error
    pub fn stage_not_defined(stage_type: impl Into<String>) -> Self {
        Self::StageNotDefined {
            stage_type: stage_type.into(),
        }
    }

    /// Create a stage-already-defined error
    pub fn stage_already_defined(stage_type: impl Into<String>) -> Self {
        Self::StageAlreadyDefined {
            stage_type: stage_type.into(),
        }
    }

    /// Create a context-already-exists error
    pub fn context_already_exists(context_id: impl Into<String>) -> Self {
        Self::ContextAlreadyExists {
            context_id: context_id.into(),
        }
    }

    /// Create a context-not-found error
    pub fn context_not_found(context_id: impl Into<String>) -> Self {
        Self::ContextNotFound {
            context_id: context_id.into(),
        }
    }

    /// Create a stage-unavailable error
    pub fn stage_unavailable(context_id: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self::StageUnavailable {
            context_id: context_id.into(),
            stage_type: stage_type.into(),
        }
    }

    /// Create an adapter failure
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::AdapterFailure {
            message: message.into(),
        }
    }

    /// Create a dispose failure
    pub fn dispose_failure(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DisposeFailure {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create an invalid lifecycle error
    pub fn invalid_lifecycle(message: impl Into<String>) -> Self {
        Self::InvalidLifecycle {
            message: message.into(),
        }
    }

    /// Create an activity-already-registered error
    pub fn activity_already_registered(key: impl Into<String>) -> Self {
        Self::ActivityAlreadyRegistered { key: key.into() }
    }

    /// Create a hook failure
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Whether this error means another caller won a creation race
    pub fn is_race_lost(&self) -> bool {
        matches!(self, Self::ContextAlreadyExists { .. })
    }

    /// Whether this error came from the storage or broker adapter
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, Self::AdapterFailure { .. })
    }
}

/// Standard Result type for Concord operations
pub type Result<T> = std::result::Result<T, ConcordError>;

impl From<StorageError> for ConcordError {
    fn from(err: StorageError) -> Self {
        Self::adapter(err.to_string())
    }
}

impl From<BrokerError> for ConcordError {
    fn from(err: BrokerError) -> Self {
        Self::adapter(err.to_string())
    }
}

impl From<CodecError> for ConcordError {
    fn from(err: CodecError) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConcordError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ConcordError::context_not_found("room-1");
        assert!(matches!(err, ConcordError::ContextNotFound { .. }));
        assert_eq!(err.to_string(), "Context 'room-1' does not exist");
    }

    #[test]
    fn test_race_lost_is_distinct_from_adapter_failure() {
        let lost = ConcordError::context_already_exists("room-1");
        let broken = ConcordError::from(StorageError::WriteFailed("disk".into()));

        assert!(lost.is_race_lost());
        assert!(!lost.is_adapter_failure());
        assert!(broken.is_adapter_failure());
        assert!(!broken.is_race_lost());
    }

    #[test]
    fn test_codec_conversion() {
        let err = ConcordError::from(CodecError::Decode {
            reason: "eof".into(),
        });
        assert!(matches!(err, ConcordError::Codec { .. }));
    }
}
