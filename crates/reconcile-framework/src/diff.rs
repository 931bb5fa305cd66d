//! # Diff Engine
//!
//! Compares a desired state against the last observed state of the same
//! instance and produces the minimal [`ChangeSet`]. Attributes are walked in
//! descriptor order; computed attributes are never compared.
//!
//! Comparison rules:
//! - scalars compare by value; an unresolved reference always differs
//! - lists compare as ordered sequences and change as a whole; an absent
//!   list equals an empty one
//! - nested objects recurse, so a change is reported at its leaf path
//! - toggles compare after expanding defaults; `Absent` and an omitted
//!   toggle are the same, `EnabledWithDefaults` is not
//! - a change under an immutable attribute (at any depth) is a `Replace`

use crate::schema::{join_path, ResourceDescriptor, Shape};
use crate::value::{State, Toggle, Value};
use serde::{Deserialize, Serialize};

/// How a single attribute change can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NoOp,
    Update,
    Replace,
}

/// One attribute-level difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub kind: ChangeKind,
}

/// Ordered attribute changes for one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Strongest kind present: `Replace` if any entry forces one.
    pub fn kind(&self) -> ChangeKind {
        self.changes
            .iter()
            .map(|c| c.kind)
            .max()
            .unwrap_or(ChangeKind::NoOp)
    }

    pub fn has_replace(&self) -> bool {
        self.kind() == ChangeKind::Replace
    }

    pub fn replace_paths(&self) -> Vec<String> {
        self.paths_of(ChangeKind::Replace)
    }

    pub fn update_paths(&self) -> Vec<String> {
        self.paths_of(ChangeKind::Update)
    }

    fn paths_of(&self, kind: ChangeKind) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.path.clone())
            .collect()
    }

    pub(crate) fn push(&mut self, change: Change) {
        self.changes.push(change);
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Computes the changes needed to move `observed` to `desired`.
pub fn diff(desired: &State, observed: &State, descriptor: &ResourceDescriptor) -> ChangeSet {
    let mut out = ChangeSet::default();
    diff_state(desired, observed, descriptor, "", false, &mut out);
    out
}

/// Desired state with computed attributes carried forward from `observed`.
pub fn planned_state(desired: &State, observed: &State, descriptor: &ResourceDescriptor) -> State {
    let mut planned = desired.clone();
    for spec in descriptor.computed() {
        if let Some(value) = observed.get(&spec.name) {
            planned.insert(spec.name.clone(), value.clone());
        }
    }
    planned
}

fn diff_state(
    desired: &State,
    observed: &State,
    descriptor: &ResourceDescriptor,
    prefix: &str,
    inherited_immutable: bool,
    out: &mut ChangeSet,
) {
    for spec in descriptor.attributes() {
        if spec.is_computed() {
            continue;
        }
        let path = join_path(prefix, &spec.name);
        let immutable = inherited_immutable || spec.immutable;
        let kind = if immutable {
            ChangeKind::Replace
        } else {
            ChangeKind::Update
        };
        let d = desired.get(&spec.name);
        let o = observed.get(&spec.name);

        match &spec.shape {
            Shape::Object(nested) => match (d, o) {
                (Some(Value::Object(ds)), Some(Value::Object(os))) => {
                    diff_state(ds, os, nested, &path, immutable, out)
                }
                (None, None) => {}
                _ => record(out, path, o, d, kind),
            },
            Shape::Toggle(nested) => {
                let expanded_d = expand_toggle(d, nested);
                let expanded_o = expand_toggle(o, nested);
                match (expanded_d, expanded_o) {
                    (Some(ds), Some(os)) => diff_state(&ds, &os, nested, &path, immutable, out),
                    (None, None) => {}
                    _ => record(out, path, o, d, kind),
                }
            }
            Shape::List(_) => {
                let dl = d.and_then(Value::as_list).unwrap_or_default();
                let ol = o.and_then(Value::as_list).unwrap_or_default();
                if dl != ol || dl.iter().any(Value::has_reference) {
                    record(out, path, o, d, kind);
                }
            }
            Shape::String | Shape::Int | Shape::Bool => {
                let pending = d.is_some_and(Value::has_reference);
                if d != o || pending {
                    record(out, path, o, d, kind);
                }
            }
        }
    }
}

/// Expands a toggle value to the configuration it stands for, or `None`
/// when the feature is off.
fn expand_toggle(value: Option<&Value>, nested: &ResourceDescriptor) -> Option<State> {
    match value.and_then(Value::as_toggle) {
        None | Some(Toggle::Absent) => None,
        Some(Toggle::EnabledWithDefaults) => Some(nested.apply_defaults(&State::new())),
        Some(Toggle::EnabledWithConfig(config)) => Some(nested.apply_defaults(config)),
    }
}

fn record(out: &mut ChangeSet, path: String, old: Option<&Value>, new: Option<&Value>, kind: ChangeKind) {
    out.push(Change {
        path,
        old: old.cloned(),
        new: new.cloned(),
        kind,
    });
}
