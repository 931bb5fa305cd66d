//! # Engine Errors
//!
//! Every failure the engine can report, grouped the way callers react to them:
//! configuration problems are found before any remote call and are never
//! retried, remote failures carry their classification, and the remaining
//! variants describe lifecycle misuse or defects in the engine itself.

use crate::classify::ErrorClass;
use crate::diff::ChangeSet;
use crate::value::{InstanceKey, RemoteId};

/// Problems with the declared configuration, detected before remote interaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("The argument \"{attribute}\" is required, but no definition was found.")]
    MissingAttribute {
        resource_type: String,
        attribute: String,
    },

    #[error("Attribute \"{attribute}\" is {actual} characters long, at most {max} are allowed")]
    FieldTooLong {
        attribute: String,
        max: usize,
        actual: usize,
    },

    #[error("Unsupported argument \"{attribute}\" for {resource_type}")]
    UnknownAttribute {
        resource_type: String,
        attribute: String,
    },

    #[error("Attribute \"{attribute}\" expects a {expected}, got a {actual}")]
    TypeMismatch {
        attribute: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Cyclic reference between instances: {}", format_cycle(.0))]
    Cycle(Vec<InstanceKey>),

    #[error("Instance {from} references {missing}, which is not declared in this batch")]
    UndeclaredReference {
        from: InstanceKey,
        missing: InstanceKey,
    },

    #[error("Instance key {0} is declared more than once")]
    DuplicateInstance(InstanceKey),

    #[error("Instance {instance} resolves to both {existing} and {candidate}")]
    AmbiguousReference {
        instance: InstanceKey,
        existing: RemoteId,
        candidate: RemoteId,
    },

    #[error(transparent)]
    Unresolved(#[from] UnresolvedReference),
}

fn format_cycle(path: &[InstanceKey]) -> String {
    path.iter()
        .map(InstanceKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A reference whose target has not produced an identifier yet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Reference to {instance} at \"{path}\" is not resolved yet")]
pub struct UnresolvedReference {
    pub instance: InstanceKey,
    pub path: String,
}

/// A classified failure reported by the remote system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{class} ({status}): {message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub status: u16,
    pub message: String,
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}

/// Top-level error for a single resource instance.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Change requires replacing {key}; replacement of {paths:?} was not permitted")]
    ReplaceNotPermitted { key: InstanceKey, paths: Vec<String> },

    #[error("Import of {resource_type} {id} is lossy: {} attribute(s) differ after round-trip", .changes.len())]
    LossyImport {
        resource_type: String,
        id: RemoteId,
        changes: ChangeSet,
    },

    #[error("Cannot {operation} {key} while it is {phase}")]
    InvalidPhase {
        key: InstanceKey,
        operation: &'static str,
        phase: String,
    },

    #[error("Remote response for {resource_type} carries no identifier")]
    MissingIdentifier { resource_type: String },

    #[error("Reconciliation was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// The remote classification, when this error came from the remote system.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ReconcileError::Remote(e) => Some(e.class),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Remote(e) if e.is_retryable())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ReconcileError::Configuration(_))
    }
}

impl From<UnresolvedReference> for ReconcileError {
    fn from(e: UnresolvedReference) -> Self {
        ReconcileError::Configuration(ConfigurationError::Unresolved(e))
    }
}
