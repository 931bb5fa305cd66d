//! # Tracing Setup
//!
//! Log lines are compact and carry the instance as structured fields rather
//! than the module path:
//!
//! ```text
//! INFO Created resource_type="bpkio_source_slate" key=bpkio_source_slate.gap id=1
//! WARN Remote call failed resource_type="bpkio_service_ad_insertion" class=ReferentialRejected status=403
//! ```
//!
//! The level is taken from `RUST_LOG`; `RUST_LOG=debug` adds plans, payloads
//! and every store request.

/// Installs the global subscriber. Call once, at process start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
