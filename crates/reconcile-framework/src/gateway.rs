//! # Remote Gateway
//!
//! The seam between the engine and whatever performs the actual remote calls.
//! The engine treats the gateway as opaque RPC: one method per lifecycle verb,
//! parameterized by resource type, returning either the full observed payload
//! or a raw failure that the [`classify`](crate::classify) module interprets.

use crate::value::{RemoteId, State};
use async_trait::async_trait;
use std::fmt::Display;

/// Raw failure returned by the remote system, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct RemoteFailure {
    pub status: u16,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Display) -> Self {
        Self::new(404, format!("Not Found: {what}"))
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.status == 410
    }
}

/// Remote lifecycle verbs.
///
/// Payloads are resolved desired states (no [`ReferenceHandle`](crate::ReferenceHandle)s);
/// successful responses carry every observed attribute, computed ones included.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn create(&self, resource_type: &str, payload: &State) -> Result<State, RemoteFailure>;

    async fn read(&self, resource_type: &str, id: RemoteId) -> Result<State, RemoteFailure>;

    async fn update(
        &self,
        resource_type: &str,
        id: RemoteId,
        payload: &State,
    ) -> Result<State, RemoteFailure>;

    async fn delete(&self, resource_type: &str, id: RemoteId) -> Result<(), RemoteFailure>;
}
