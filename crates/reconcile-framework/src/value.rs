//! # State Trees
//!
//! Desired and observed state share one representation: an ordered map from
//! attribute name to [`Value`]. Nested objects are themselves [`State`]s, which
//! lets the diff engine and the resolver recurse without caring which side of
//! the reconciliation a tree came from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Remote-assigned identifier of a materialized resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(pub u64);

impl From<u32> for RemoteId {
    fn from(id: u32) -> Self {
        Self(u64::from(id))
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RemoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Caller-supplied label naming one resource instance inside a batch
/// (e.g. `bpkio_source_live.live`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey(pub String);

impl InstanceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Placeholder for "the identifier produced by instance X once it exists".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceHandle {
    pub instance: InstanceKey,
}

impl ReferenceHandle {
    pub fn to(instance: impl Into<String>) -> Self {
        Self {
            instance: InstanceKey::new(instance),
        }
    }
}

/// An optional sub-object whose presence alone switches a feature on.
///
/// `spot_aware = {}` and an omitted `spot_aware` mean different things, so the
/// two are separate variants instead of an empty-vs-missing map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "toggle", content = "config", rename_all = "snake_case")]
pub enum Toggle {
    #[default]
    Absent,
    EnabledWithDefaults,
    EnabledWithConfig(State),
}

impl Toggle {
    /// Builds a toggle from explicit configuration; an empty block collapses
    /// to [`Toggle::EnabledWithDefaults`].
    pub fn with_config(config: State) -> Self {
        if config.is_empty() {
            Toggle::EnabledWithDefaults
        } else {
            Toggle::EnabledWithConfig(config)
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Toggle::Absent)
    }

    pub fn config(&self) -> Option<&State> {
        match self {
            Toggle::EnabledWithConfig(state) => Some(state),
            _ => None,
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Object(State),
    Toggle(Toggle),
    Reference(ReferenceHandle),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&State> {
        match self {
            Value::Object(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_toggle(&self) -> Option<&Toggle> {
        match self {
            Value::Toggle(toggle) => Some(toggle),
            _ => None,
        }
    }

    /// Whether an unresolved [`ReferenceHandle`] appears anywhere below this value.
    pub fn has_reference(&self) -> bool {
        match self {
            Value::Reference(_) => true,
            Value::List(items) => items.iter().any(Value::has_reference),
            Value::Object(state) => state.has_reference(),
            Value::Toggle(Toggle::EnabledWithConfig(state)) => state.has_reference(),
            _ => false,
        }
    }

    /// Short human label of the value's shape, used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Toggle(_) => "block",
            Value::Reference(_) => "reference",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<RemoteId> for Value {
    fn from(id: RemoteId) -> Self {
        Value::Int(id.0 as i64)
    }
}

impl From<State> for Value {
    fn from(state: State) -> Self {
        Value::Object(state)
    }
}

impl From<Toggle> for Value {
    fn from(toggle: Toggle) -> Self {
        Value::Toggle(toggle)
    }
}

impl From<ReferenceHandle> for Value {
    fn from(handle: ReferenceHandle) -> Self {
        Value::Reference(handle)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Attribute tree for one resource instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, Value>);

/// The caller's declared configuration for one instance.
pub type DesiredState = State;

/// The remote system's view of one instance, computed attributes included.
pub type ObservedState = State;

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Looks up a dotted path such as `live_ad_replacement.ad_server.id`.
    /// Toggles are traversed through their configuration.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            let nested = match current {
                Value::Object(state) => state,
                Value::Toggle(Toggle::EnabledWithConfig(state)) => state,
                _ => return None,
            };
            current = nested.get(segment)?;
        }
        Some(current)
    }

    /// Reads the `id` attribute as a [`RemoteId`].
    pub fn remote_id(&self) -> Option<RemoteId> {
        match self.get("id")? {
            Value::Int(i) if *i >= 0 => Some(RemoteId(*i as u64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn has_reference(&self) -> bool {
        self.0.values().any(Value::has_reference)
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for State {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
