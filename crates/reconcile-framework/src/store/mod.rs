//! # In-Memory Resource Store
//!
//! A generic actor that owns a collection of remote objects and serves
//! create/get/update/delete/list requests over a channel. It stands in for a
//! remote API: objects get remote-assigned identifiers, lifecycle hooks can
//! reject payloads with HTTP-style [`RemoteFailure`](crate::RemoteFailure)s,
//! and uniqueness is enforced across the whole collection.
//!
//! Each store runs in its own Tokio task and processes requests sequentially,
//! so the collection needs no locking. Dependencies on other stores (e.g. a
//! service validating the sources it points at) are injected as the store's
//! context when it is started.

pub mod actor;
pub mod client;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;

pub use actor::RemoteStore;
pub use client::StoreClient;
pub use entity::RemoteObject;
pub use error::StoreError;
pub use message::{Response, StoreRequest};
