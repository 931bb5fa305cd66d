//! Store for every source kind (slates, live origins, ad servers).

pub mod entity;

use crate::model::Source;
use reconcile_framework::{RemoteStore, StoreClient};

/// Creates the source store and its client.
pub fn new(buffer_size: usize) -> (RemoteStore<Source>, StoreClient<Source>) {
    RemoteStore::new(buffer_size)
}
