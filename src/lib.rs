//! # broadpeak.io Provider
//!
//! > **Declarative management of broadpeak.io sources and services.**
//!
//! Callers describe the slates, live origins, ad servers and ad-insertion
//! services they want; the [`reconcile_framework`] engine plans and applies
//! the create/update/replace/delete calls that get the API there, in
//! dependency order.
//!
//! ## Module Tour
//!
//! ### 1. The Catalogue ([`resources`])
//! Schema descriptors for every managed resource type, and
//! [`registry`](resources::registry) to hand them to the engine.
//!
//! ### 2. The Wire ([`model`], [`codec`])
//! The API's JSON bodies as typed structs, and the descriptor-driven
//! translation between them and engine state trees.
//!
//! ### 3. The API ([`source_actor`], [`service_actor`], [`lifecycle`])
//! An in-memory stand-in for broadpeak.io built on resource stores: sources
//! and services live in their own actors, services check the sources they
//! reference, and [`BpkioApi`](lifecycle::BpkioApi) starts and stops them.
//!
//! ### 4. The Seam ([`gateway`])
//! [`ApiGateway`](gateway::ApiGateway) implements the engine's
//! `RemoteGateway` on top of the stores.
//!
//! ## Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

pub mod codec;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod resources;
pub mod service_actor;
pub mod source_actor;
