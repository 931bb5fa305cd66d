//! # Resource Catalogue
//!
//! Schema descriptors for every broadpeak.io resource type the provider
//! manages. The engine is generic; this module is where the concrete
//! attribute sets, defaults, length limits and immutability rules live.

pub mod service;
pub mod source;

use reconcile_framework::SchemaRegistry;

pub const SOURCE_SLATE: &str = "bpkio_source_slate";
pub const SOURCE_LIVE: &str = "bpkio_source_live";
pub const SOURCE_AD_SERVER: &str = "bpkio_source_adserver";
pub const SERVICE_AD_INSERTION: &str = "bpkio_service_ad_insertion";

/// Longest name the API accepts for any resource.
pub const MAX_NAME_LENGTH: usize = 100;

/// Registry holding every resource type above.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(source::slate())
        .with(source::live())
        .with(source::ad_server())
        .with(service::ad_insertion())
}
