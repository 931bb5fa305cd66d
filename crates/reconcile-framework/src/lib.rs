//! # Reconcile Framework
//!
//! A declarative reconciliation engine for remote resources. Callers describe
//! the state they want for a set of interdependent instances; the engine works
//! out the minimal create/update/replace/delete calls that move the remote
//! system there and issues them in dependency order.
//!
//! ## Layers
//!
//! 1. **State** ([`State`], [`Value`], [`Toggle`], [`ReferenceHandle`]): one tree
//!    representation for both desired and observed state.
//! 2. **Schema** ([`ResourceDescriptor`], [`SchemaRegistry`]): per-type attribute
//!    sets with presence, immutability, defaults and nested shapes.
//! 3. **Pure functions**: [`diff`], [`resolve`], [`classify`]. No I/O, easy to test.
//! 4. **Lifecycle** ([`ResourceController`]): the per-instance state machine
//!    behind the [`RemoteGateway`] seam.
//! 5. **Composition** ([`Reconciler`]): dependency graph, bounded concurrency,
//!    partial failure and cancellation for whole batches.
//!
//! The [`store`] module provides a generic in-memory resource actor for
//! building simulated remote APIs, and [`mock`] a scripted gateway for tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! let reconciler = Reconciler::new(registry, gateway)
//!     .with_options(EngineConfig::from_env()?.reconcile_options());
//!
//! let batch = Batch::new()
//!     .with(InstanceSpec::new("live", "bpkio_source_live", live))
//!     .with(InstanceSpec::new("service", "bpkio_service_ad_insertion", service));
//!
//! let report = reconciler.reconcile(&batch).await?;
//! for instance in report.iter() {
//!     println!("{} -> {:?}", instance.key, instance.result);
//! }
//! ```

pub mod classify;
pub mod config;
pub mod controller;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod import;
pub mod mock;
pub mod reconciler;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod value;

pub use classify::{classify, to_remote_error, ErrorClass};
pub use config::{ConfigError, EngineConfig};
pub use controller::{Phase, Plan, ReadOutcome, ReplacePolicy, ResourceController};
pub use diff::{diff, planned_state, Change, ChangeKind, ChangeSet};
pub use error::{ConfigurationError, ReconcileError, RemoteError, UnresolvedReference};
pub use gateway::{RemoteFailure, RemoteGateway};
pub use graph::DependencyGraph;
pub use import::import_and_verify;
pub use reconciler::{
    Action, Batch, BatchOutcome, BatchReport, CancelHandle, InstanceReport, InstanceSpec,
    PriorState, ReconcileOptions, ReconciliationResult, Reconciler,
};
pub use resolver::{resolve, IdentifierMap};
pub use schema::{AttributeSpec, Presence, ResourceDescriptor, SchemaRegistry, Shape};
pub use store::{RemoteObject, RemoteStore, StoreClient, StoreError};
pub use telemetry::setup_tracing;
pub use value::{DesiredState, InstanceKey, ObservedState, ReferenceHandle, RemoteId, State, Toggle, Value};
