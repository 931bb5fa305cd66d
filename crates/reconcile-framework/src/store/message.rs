//! Request messages exchanged between [`StoreClient`](super::StoreClient)
//! and [`RemoteStore`](super::RemoteStore).

use super::entity::RemoteObject;
use super::error::StoreError;
use crate::value::RemoteId;
use tokio::sync::oneshot;

/// One-shot channel carrying a store reply.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Lifecycle requests understood by every store.
///
/// Create and Update reply with the stored object so callers see the
/// remote-computed attributes without a second round trip.
#[derive(Debug)]
pub enum StoreRequest<T: RemoteObject> {
    Create {
        params: T::Create,
        respond_to: Response<T>,
    },
    Get {
        id: RemoteId,
        respond_to: Response<Option<T>>,
    },
    Update {
        id: RemoteId,
        update: T::Update,
        respond_to: Response<T>,
    },
    Delete {
        id: RemoteId,
        respond_to: Response<()>,
    },
    List {
        respond_to: Response<Vec<T>>,
    },
}
