//! Source descriptors: slates, live origins and ad servers.

use super::{MAX_NAME_LENGTH, SOURCE_AD_SERVER, SOURCE_LIVE, SOURCE_SLATE};
use reconcile_framework::{AttributeSpec, ResourceDescriptor, Shape};

/// Attributes every source type shares.
fn common(resource_type: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(resource_type)
        .with_attribute(AttributeSpec::computed("id", Shape::Int))
        .with_attribute(AttributeSpec::required("name", Shape::String).max_length(MAX_NAME_LENGTH))
        .with_attribute(AttributeSpec::required("url", Shape::String))
        .with_attribute(AttributeSpec::optional("description", Shape::String).with_default(""))
        .with_attribute(AttributeSpec::computed("type", Shape::String))
}

pub fn slate() -> ResourceDescriptor {
    common(SOURCE_SLATE).with_attribute(AttributeSpec::computed("format", Shape::String))
}

pub fn live() -> ResourceDescriptor {
    let header = ResourceDescriptor::new("custom_header")
        .with_attribute(AttributeSpec::required("name", Shape::String))
        .with_attribute(AttributeSpec::required("value", Shape::String));
    let origin = ResourceDescriptor::new("origin")
        .with_attribute(AttributeSpec::optional("custom_headers", Shape::list(header)));

    common(SOURCE_LIVE)
        .with_attribute(AttributeSpec::optional("multi_period", Shape::Bool).with_default(false))
        .with_attribute(AttributeSpec::optional("origin", Shape::object(origin)))
        .with_attribute(AttributeSpec::computed("format", Shape::String))
}

pub fn ad_server() -> ResourceDescriptor {
    let parameter = ResourceDescriptor::new("query_parameter")
        .with_attribute(AttributeSpec::required("type", Shape::String))
        .with_attribute(AttributeSpec::required("name", Shape::String))
        .with_attribute(AttributeSpec::optional("value", Shape::String).with_default(""));

    common(SOURCE_AD_SERVER)
        .with_attribute(AttributeSpec::optional("query_parameters", Shape::list(parameter)))
}
