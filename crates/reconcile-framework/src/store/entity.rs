//! # RemoteObject Trait
//!
//! The contract every object kept by a [`RemoteStore`](super::RemoteStore)
//! implements. Associated types pin down the create/update payloads so a
//! source store cannot be handed a service payload, and the async hooks give
//! each object type a place to validate input the way the real remote API
//! would, answering with HTTP-style failures.
//!
//! Only `from_create_params` and `on_update` are mandatory; the other hooks
//! default to accepting everything.

use crate::gateway::RemoteFailure;
use crate::value::RemoteId;
use async_trait::async_trait;
use std::fmt::Debug;

#[async_trait]
pub trait RemoteObject: Clone + Send + Sync + 'static {
    /// Payload accepted by `POST`.
    type Create: Send + Sync + Debug;

    /// Payload accepted by `PUT`.
    type Update: Send + Sync + Debug;

    /// Dependencies injected when the store starts, e.g. clients of other
    /// stores. Use `()` if none are needed.
    type Context: Send + Sync;

    /// Builds the object from its assigned identifier and the create payload.
    fn from_create_params(id: RemoteId, params: Self::Create) -> Result<Self, RemoteFailure>;

    fn id(&self) -> RemoteId;

    /// Key that must be unique across the store, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Runs after construction, before the object is stored.
    async fn on_create(&mut self, _ctx: &Self::Context) -> Result<(), RemoteFailure> {
        Ok(())
    }

    /// Applies an update in place. The store discards the result on failure,
    /// so a rejected update leaves the stored object untouched.
    async fn on_update(
        &mut self,
        update: Self::Update,
        ctx: &Self::Context,
    ) -> Result<(), RemoteFailure>;

    /// Runs right before the object is removed.
    async fn on_delete(&self, _ctx: &Self::Context) -> Result<(), RemoteFailure> {
        Ok(())
    }
}
