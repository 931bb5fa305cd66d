//! Store for ad-insertion services.
//!
//! Runs with a [`StoreClient<Source>`] as context so every service can check
//! the sources it points at when it is created or changed.

pub mod entity;

use crate::model::AdInsertion;
use reconcile_framework::{RemoteStore, StoreClient};

/// Creates the service store and its client.
pub fn new(buffer_size: usize) -> (RemoteStore<AdInsertion>, StoreClient<AdInsertion>) {
    RemoteStore::new(buffer_size)
}
