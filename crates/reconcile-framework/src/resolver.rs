//! # Reference Resolver
//!
//! Substitutes [`ReferenceHandle`]s with the identifiers produced by the
//! instances they point at. A missing identifier is not fatal on its own: the
//! composite reconciler reads it as "not materialized yet" and waits.

use crate::error::{ConfigurationError, UnresolvedReference};
use crate::schema::join_path;
use crate::value::{InstanceKey, ReferenceHandle, RemoteId, State, Toggle, Value};
use std::collections::HashMap;

/// Identifiers produced during a batch. Append-only: each key is bound once.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    ids: HashMap<InstanceKey, RemoteId>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to `id`. Re-binding to the same id is a no-op; binding to a
    /// different id would make the reference ambiguous and is refused.
    pub fn bind(&mut self, key: InstanceKey, id: RemoteId) -> Result<(), ConfigurationError> {
        match self.ids.get(&key) {
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(ConfigurationError::AmbiguousReference {
                instance: key,
                existing: *existing,
                candidate: id,
            }),
            None => {
                self.ids.insert(key, id);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &InstanceKey) -> Option<RemoteId> {
        self.ids.get(key).copied()
    }

    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.ids.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Every reference in `desired`, with the dotted path it sits at.
pub fn references(desired: &State) -> Vec<(String, InstanceKey)> {
    let mut found = Vec::new();
    collect_state(desired, "", &mut found);
    found
}

fn collect_state(state: &State, prefix: &str, found: &mut Vec<(String, InstanceKey)>) {
    for (name, value) in state.iter() {
        collect_value(value, &join_path(prefix, name), found);
    }
}

fn collect_value(value: &Value, path: &str, found: &mut Vec<(String, InstanceKey)>) {
    match value {
        Value::Reference(handle) => found.push((path.to_string(), handle.instance.clone())),
        Value::List(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_value(item, &format!("{path}[{index}]"), found);
            }
        }
        Value::Object(state) | Value::Toggle(Toggle::EnabledWithConfig(state)) => {
            collect_state(state, path, found)
        }
        _ => {}
    }
}

/// Returns a copy of `desired` with every reference replaced by its identifier.
pub fn resolve(desired: &State, ids: &IdentifierMap) -> Result<State, UnresolvedReference> {
    resolve_state(desired, ids, "")
}

fn resolve_state(state: &State, ids: &IdentifierMap, prefix: &str) -> Result<State, UnresolvedReference> {
    state
        .iter()
        .map(|(name, value)| {
            let path = join_path(prefix, name);
            resolve_value(value, ids, &path).map(|v| (name.clone(), v))
        })
        .collect()
}

fn resolve_value(value: &Value, ids: &IdentifierMap, path: &str) -> Result<Value, UnresolvedReference> {
    match value {
        Value::Reference(ReferenceHandle { instance }) => ids
            .get(instance)
            .map(Value::from)
            .ok_or_else(|| UnresolvedReference {
                instance: instance.clone(),
                path: path.to_string(),
            }),
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| resolve_value(item, ids, &format!("{path}[{index}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Value::Object(state) => resolve_state(state, ids, path).map(Value::Object),
        Value::Toggle(Toggle::EnabledWithConfig(state)) => resolve_state(state, ids, path)
            .map(|s| Value::Toggle(Toggle::EnabledWithConfig(s))),
        other => Ok(other.clone()),
    }
}

/// Substitutes the references that can be resolved and leaves the rest in
/// place. Used when previewing a batch before anything is materialized.
pub fn resolve_known(desired: &State, ids: &IdentifierMap) -> State {
    desired
        .iter()
        .map(|(name, value)| (name.clone(), resolve_known_value(value, ids)))
        .collect()
}

fn resolve_known_value(value: &Value, ids: &IdentifierMap) -> Value {
    match value {
        Value::Reference(ReferenceHandle { instance }) => ids
            .get(instance)
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
        Value::List(items) => Value::List(items.iter().map(|v| resolve_known_value(v, ids)).collect()),
        Value::Object(state) => Value::Object(resolve_known(state, ids)),
        Value::Toggle(Toggle::EnabledWithConfig(state)) => {
            Value::Toggle(Toggle::EnabledWithConfig(resolve_known(state, ids)))
        }
        other => other.clone(),
    }
}
