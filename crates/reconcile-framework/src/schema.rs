//! # Schema Model
//!
//! Static metadata describing each resource type: which attributes exist,
//! whether the caller must, may, or cannot set them, which ones force a
//! destroy/recreate when changed, and the shape of nested blocks.
//!
//! Descriptors are built once at startup, wrapped in [`Arc`], and shared
//! read-only by the diff engine, the controllers and the importer.

use crate::error::ConfigurationError;
use crate::value::{State, Toggle, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Who supplies an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// Produced by the remote system; never sent, never diffed.
    Computed,
}

/// Value shape of an attribute.
#[derive(Debug, Clone)]
pub enum Shape {
    String,
    Int,
    Bool,
    /// Ordered list of nested objects.
    List(Arc<ResourceDescriptor>),
    Object(Arc<ResourceDescriptor>),
    /// Optional block with "enabled if present, even if empty" semantics.
    Toggle(Arc<ResourceDescriptor>),
}

impl Shape {
    pub fn object(descriptor: ResourceDescriptor) -> Self {
        Shape::Object(Arc::new(descriptor))
    }

    pub fn list(descriptor: ResourceDescriptor) -> Self {
        Shape::List(Arc::new(descriptor))
    }

    pub fn toggle(descriptor: ResourceDescriptor) -> Self {
        Shape::Toggle(Arc::new(descriptor))
    }

    fn name(&self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Int => "number",
            Shape::Bool => "bool",
            Shape::List(_) => "list",
            Shape::Object(_) => "object",
            Shape::Toggle(_) => "block",
        }
    }

    /// Descriptor of the nested block, for shapes that have one.
    pub fn nested(&self) -> Option<&Arc<ResourceDescriptor>> {
        match self {
            Shape::List(d) | Shape::Object(d) | Shape::Toggle(d) => Some(d),
            _ => None,
        }
    }
}

/// One attribute of a resource type.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub presence: Presence,
    /// A change to this attribute cannot be applied in place.
    pub immutable: bool,
    pub shape: Shape,
    pub default: Option<Value>,
    pub max_length: Option<usize>,
}

impl AttributeSpec {
    fn new(name: impl Into<String>, presence: Presence, shape: Shape) -> Self {
        Self {
            name: name.into(),
            presence,
            immutable: false,
            shape,
            default: None,
            max_length: None,
        }
    }

    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Presence::Required, shape)
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Presence::Optional, shape)
    }

    pub fn computed(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Presence::Computed, shape)
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }
}

/// Attribute set of one resource type or nested block.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    resource_type: String,
    attributes: Vec<AttributeSpec>,
}

impl ResourceDescriptor {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Attributes in declaration order, which is also diff order.
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn settable(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| !a.is_computed())
    }

    pub fn computed(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.is_computed())
    }

    /// Checks a desired state before anything is sent to the remote system.
    pub fn validate(&self, desired: &State) -> Result<(), ConfigurationError> {
        self.validate_at(desired, "")
    }

    fn validate_at(&self, desired: &State, prefix: &str) -> Result<(), ConfigurationError> {
        for name in desired.keys() {
            if self.attribute(name).is_none() {
                return Err(ConfigurationError::UnknownAttribute {
                    resource_type: self.resource_type.clone(),
                    attribute: join_path(prefix, name),
                });
            }
        }

        for spec in &self.attributes {
            let path = join_path(prefix, &spec.name);
            match (desired.get(&spec.name), spec.presence) {
                (None, Presence::Required) => {
                    return Err(ConfigurationError::MissingAttribute {
                        resource_type: self.resource_type.clone(),
                        attribute: path,
                    });
                }
                // Computed values are carried through imports and ignored otherwise.
                (_, Presence::Computed) | (None, _) => {}
                (Some(value), _) => check_value(spec, value, &path)?,
            }
        }
        Ok(())
    }

    /// Fills omitted optional attributes with their declared defaults,
    /// descending into nested blocks that are present.
    pub fn apply_defaults(&self, desired: &State) -> State {
        let mut out = desired.clone();
        for spec in self.settable() {
            match out.get_mut(&spec.name) {
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(spec.name.clone(), default.clone());
                    }
                }
                Some(value) => apply_nested_defaults(&spec.shape, value),
            }
        }
        out
    }
}

fn apply_nested_defaults(shape: &Shape, value: &mut Value) {
    match (shape, value) {
        (Shape::Object(nested), Value::Object(state)) => *state = nested.apply_defaults(state),
        (Shape::List(nested), Value::List(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(state) = item {
                    *state = nested.apply_defaults(state);
                }
            }
        }
        (Shape::Toggle(nested), Value::Toggle(Toggle::EnabledWithConfig(state))) => {
            *state = nested.apply_defaults(state)
        }
        _ => {}
    }
}

fn check_value(spec: &AttributeSpec, value: &Value, path: &str) -> Result<(), ConfigurationError> {
    let mismatch = || ConfigurationError::TypeMismatch {
        attribute: path.to_string(),
        expected: spec.shape.name(),
        actual: value.kind_name(),
    };

    match (&spec.shape, value) {
        // References stand in for identifiers until they are resolved.
        (Shape::Int | Shape::String, Value::Reference(_)) => Ok(()),
        (Shape::String, Value::String(s)) => match spec.max_length {
            Some(max) if s.chars().count() > max => Err(ConfigurationError::FieldTooLong {
                attribute: path.to_string(),
                max,
                actual: s.chars().count(),
            }),
            _ => Ok(()),
        },
        (Shape::Int, Value::Int(_)) | (Shape::Bool, Value::Bool(_)) => Ok(()),
        (Shape::Object(nested), Value::Object(state)) => nested.validate_at(state, path),
        (Shape::List(nested), Value::List(items)) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{index}]");
                match item {
                    Value::Object(state) => nested.validate_at(state, &item_path)?,
                    other => {
                        return Err(ConfigurationError::TypeMismatch {
                            attribute: item_path,
                            expected: "object",
                            actual: other.kind_name(),
                        })
                    }
                }
            }
            Ok(())
        }
        (Shape::Toggle(nested), Value::Toggle(toggle)) => match toggle {
            Toggle::EnabledWithConfig(state) => nested.validate_at(state, path),
            _ => Ok(()),
        },
        _ => Err(mismatch()),
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Read-only catalogue of resource descriptors, keyed by resource type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    descriptors: HashMap<String, Arc<ResourceDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors
            .insert(descriptor.resource_type.clone(), Arc::new(descriptor));
        self
    }

    /// Returns the descriptor for `resource_type`.
    pub fn describe(&self, resource_type: &str) -> Result<Arc<ResourceDescriptor>, ConfigurationError> {
        self.descriptors
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownResourceType(resource_type.to_string()))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }
}
