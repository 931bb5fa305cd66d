//! # Store Actor
//!
//! The server half of a store: owns the objects and the receiving end of the
//! request channel, and handles one request at a time.

use super::client::StoreClient;
use super::entity::RemoteObject;
use super::error::StoreError;
use super::message::StoreRequest;
use crate::gateway::RemoteFailure;
use crate::value::RemoteId;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Actor managing every object of one remote collection.
///
/// ## Operations
///
/// * **Create**: assigns the next identifier, builds the object, runs
///   `on_create`, checks the unique key against every stored object, stores it
///   and replies with the stored copy.
/// * **Get**: replies with a clone, or `None`.
/// * **Update**: runs `on_update` on a working copy, re-checks uniqueness, and
///   only then replaces the stored object.
/// * **Delete**: runs `on_delete` and removes the object; unknown ids answer
///   [`StoreError::NotFound`].
/// * **List**: replies with every object in identifier order.
pub struct RemoteStore<T: RemoteObject> {
    receiver: mpsc::Receiver<StoreRequest<T>>,
    objects: BTreeMap<RemoteId, T>,
    next_id: u64,
}

impl<T: RemoteObject> RemoteStore<T> {
    /// Creates a store and its client. Identifiers start at 1.
    pub fn new(buffer_size: usize) -> (Self, StoreClient<T>) {
        Self::with_first_id(buffer_size, 1)
    }

    /// Creates a store whose first assigned identifier is `first_id`.
    pub fn with_first_id(buffer_size: usize, first_id: u64) -> (Self, StoreClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let store = Self {
            receiver,
            objects: BTreeMap::new(),
            next_id: first_id,
        };
        (store, StoreClient::new(sender))
    }

    fn conflict_with(&self, candidate: &T) -> Option<RemoteFailure> {
        let key = candidate.unique_key()?;
        let clash = self
            .objects
            .values()
            .any(|other| other.id() != candidate.id() && other.unique_key().as_deref() == Some(&key));
        clash.then(|| RemoteFailure::new(403, format!("Forbidden: {key} already exists")))
    }

    /// Processes requests until every client is dropped.
    ///
    /// `context` is handed to every lifecycle hook.
    pub async fn run(mut self, context: T::Context) {
        let object_type = std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("Unknown");
        info!(object_type, "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Create { params, respond_to } => {
                    debug!(object_type, ?params, "Create");
                    let id = RemoteId(self.next_id);
                    let mut object = match T::from_create_params(id, params) {
                        Ok(object) => object,
                        Err(e) => {
                            warn!(object_type, error = %e, "Create rejected");
                            let _ = respond_to.send(Err(e.into()));
                            continue;
                        }
                    };
                    if let Err(e) = object.on_create(&context).await {
                        warn!(object_type, error = %e, "on_create rejected");
                        let _ = respond_to.send(Err(e.into()));
                        continue;
                    }
                    if let Some(conflict) = self.conflict_with(&object) {
                        warn!(object_type, error = %conflict, "Create conflicts");
                        let _ = respond_to.send(Err(conflict.into()));
                        continue;
                    }
                    self.next_id += 1;
                    self.objects.insert(id, object.clone());
                    info!(object_type, %id, size = self.objects.len(), "Created");
                    let _ = respond_to.send(Ok(object));
                }
                StoreRequest::Get { id, respond_to } => {
                    let object = self.objects.get(&id).cloned();
                    debug!(object_type, %id, found = object.is_some(), "Get");
                    let _ = respond_to.send(Ok(object));
                }
                StoreRequest::Update {
                    id,
                    update,
                    respond_to,
                } => {
                    debug!(object_type, %id, ?update, "Update");
                    let Some(current) = self.objects.get(&id) else {
                        warn!(object_type, %id, "Not found");
                        let _ = respond_to.send(Err(StoreError::NotFound(id)));
                        continue;
                    };
                    let mut working = current.clone();
                    if let Err(e) = working.on_update(update, &context).await {
                        warn!(object_type, %id, error = %e, "Update rejected");
                        let _ = respond_to.send(Err(e.into()));
                        continue;
                    }
                    if let Some(conflict) = self.conflict_with(&working) {
                        warn!(object_type, %id, error = %conflict, "Update conflicts");
                        let _ = respond_to.send(Err(conflict.into()));
                        continue;
                    }
                    self.objects.insert(id, working.clone());
                    info!(object_type, %id, "Updated");
                    let _ = respond_to.send(Ok(working));
                }
                StoreRequest::Delete { id, respond_to } => {
                    debug!(object_type, %id, "Delete");
                    let Some(object) = self.objects.get(&id) else {
                        warn!(object_type, %id, "Not found");
                        let _ = respond_to.send(Err(StoreError::NotFound(id)));
                        continue;
                    };
                    if let Err(e) = object.on_delete(&context).await {
                        warn!(object_type, %id, error = %e, "on_delete rejected");
                        let _ = respond_to.send(Err(e.into()));
                        continue;
                    }
                    self.objects.remove(&id);
                    info!(object_type, %id, size = self.objects.len(), "Deleted");
                    let _ = respond_to.send(Ok(()));
                }
                StoreRequest::List { respond_to } => {
                    debug!(object_type, size = self.objects.len(), "List");
                    let _ = respond_to.send(Ok(self.objects.values().cloned().collect()));
                }
            }
        }

        info!(object_type, size = self.objects.len(), "Shutdown");
    }
}
