//! # Store Client
//!
//! Cheap-to-clone handle for sending requests to a [`RemoteStore`](super::RemoteStore).

use super::entity::RemoteObject;
use super::error::StoreError;
use super::message::StoreRequest;
use crate::value::RemoteId;
use tokio::sync::{mpsc, oneshot};

/// Type-safe client for a [`RemoteStore`](super::RemoteStore).
///
/// Holds only the channel sender; every method sends one request and awaits
/// the reply on a oneshot channel.
pub struct StoreClient<T: RemoteObject> {
    sender: mpsc::Sender<StoreRequest<T>>,
}

// Manual impl: `T` itself does not need to be `Clone` for the handle to be.
impl<T: RemoteObject> Clone for StoreClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: RemoteObject> StoreClient<T> {
    pub fn new(sender: mpsc::Sender<StoreRequest<T>>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<R, StoreError>>) -> StoreRequest<T>,
    ) -> Result<R, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::Closed)?;
        response.await.map_err(|_| StoreError::Dropped)?
    }

    pub async fn create(&self, params: T::Create) -> Result<T, StoreError> {
        self.request(|respond_to| StoreRequest::Create { params, respond_to })
            .await
    }

    pub async fn get(&self, id: RemoteId) -> Result<Option<T>, StoreError> {
        self.request(|respond_to| StoreRequest::Get { id, respond_to })
            .await
    }

    pub async fn update(&self, id: RemoteId, update: T::Update) -> Result<T, StoreError> {
        self.request(|respond_to| StoreRequest::Update {
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete(&self, id: RemoteId) -> Result<(), StoreError> {
        self.request(|respond_to| StoreRequest::Delete { id, respond_to })
            .await
    }

    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.request(|respond_to| StoreRequest::List { respond_to })
            .await
    }
}
