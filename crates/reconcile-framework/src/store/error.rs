//! Errors raised by the store plumbing itself.

use crate::gateway::RemoteFailure;
use crate::value::RemoteId;

/// Errors that can occur while talking to a [`RemoteStore`](super::RemoteStore).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Store closed")]
    Closed,
    #[error("Store dropped response channel")]
    Dropped,
    #[error("Object not found: {0}")]
    NotFound(RemoteId),
    #[error("Rejected: {0}")]
    Rejected(RemoteFailure),
}

impl From<RemoteFailure> for StoreError {
    fn from(failure: RemoteFailure) -> Self {
        StoreError::Rejected(failure)
    }
}

impl From<StoreError> for RemoteFailure {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Closed | StoreError::Dropped => {
                RemoteFailure::new(503, "Service Unavailable")
            }
            StoreError::NotFound(id) => RemoteFailure::not_found(id),
            StoreError::Rejected(failure) => failure,
        }
    }
}
