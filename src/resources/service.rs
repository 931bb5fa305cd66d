//! Ad-insertion service descriptor.

use super::{MAX_NAME_LENGTH, SERVICE_AD_INSERTION};
use reconcile_framework::{AttributeSpec, ResourceDescriptor, Shape, Toggle};

/// Mode the remote API assumes when spot-aware replacement is switched on
/// without further configuration.
pub const DEFAULT_SPOT_AWARE_MODE: &str = "french_addressable_tv";

/// `{ id = ... }` block pointing at another resource.
fn id_block(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(name).with_attribute(AttributeSpec::required("id", Shape::Int))
}

pub fn ad_insertion() -> ResourceDescriptor {
    let spot_aware = ResourceDescriptor::new("spot_aware").with_attribute(
        AttributeSpec::optional("mode", Shape::String).with_default(DEFAULT_SPOT_AWARE_MODE),
    );
    let live_ad_replacement = ResourceDescriptor::new("live_ad_replacement")
        .with_attribute(AttributeSpec::required("ad_server", Shape::object(id_block("ad_server"))))
        .with_attribute(AttributeSpec::required("gap_filler", Shape::object(id_block("gap_filler"))))
        .with_attribute(
            AttributeSpec::optional("spot_aware", Shape::toggle(spot_aware)).with_default(Toggle::Absent),
        );

    ResourceDescriptor::new(SERVICE_AD_INSERTION)
        .with_attribute(AttributeSpec::computed("id", Shape::Int))
        .with_attribute(AttributeSpec::required("name", Shape::String).max_length(MAX_NAME_LENGTH))
        .with_attribute(AttributeSpec::optional("description", Shape::String).with_default(""))
        // Moving a service to another source means a new service.
        .with_attribute(AttributeSpec::required("source", Shape::object(id_block("source"))).immutable())
        .with_attribute(AttributeSpec::required(
            "live_ad_replacement",
            Shape::object(live_ad_replacement),
        ))
        .with_attribute(AttributeSpec::required(
            "transcoding_profile",
            Shape::object(id_block("transcoding_profile")),
        ))
        .with_attribute(AttributeSpec::optional("enable_ad_transcoding", Shape::Bool).with_default(false))
        .with_attribute(AttributeSpec::computed("type", Shape::String))
        .with_attribute(AttributeSpec::computed("url", Shape::String))
}
