//! # Body Codec
//!
//! Translates between engine [`State`] trees and the camelCase JSON bodies the
//! broadpeak.io API speaks. The translation is driven by the resource
//! descriptor, so attribute shapes decide how numbers, lists and nested
//! blocks are written and read back.
//!
//! Toggle blocks travel as objects with a `mode` field; a switched-off block
//! is sent as `{"mode": "disabled"}` and read back as [`Toggle::Absent`].

use crate::model::SPOT_AWARE_DISABLED;
use reconcile_framework::{ResourceDescriptor, Shape, State, Toggle, Value};
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Attribute \"{0}\" still holds an unresolved reference")]
    Unresolved(String),
    #[error("Attribute \"{path}\" expects a {expected}")]
    Mismatch { path: String, expected: &'static str },
    #[error("Body is not a JSON object")]
    NotAnObject,
}

/// `live_ad_replacement` -> `liveAdReplacement`.
///
/// Only round-trips ASCII snake_case names without digits or doubled
/// underscores, which is what every attribute under
/// [`resources`](crate::resources) is. The typed bodies in
/// [`model`](crate::model) use serde's `rename_all = "camelCase"` and must
/// agree with this.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `liveAdReplacement` -> `live_ad_replacement`. Inverse of [`camel_case`]
/// under the same restriction.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_uppercase() {
            out.push('_');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Writes the settable attributes of `state` as a request body. Computed
/// attributes are never sent.
pub fn encode(descriptor: &ResourceDescriptor, state: &State) -> Result<Json, CodecError> {
    encode_state(descriptor, state, "").map(Json::Object)
}

/// Reads a response body back into a [`State`]. Fields the descriptor does
/// not declare are kept, so an import can tell it would lose them.
pub fn decode(descriptor: &ResourceDescriptor, body: &Json) -> Result<State, CodecError> {
    match body {
        Json::Object(map) => decode_object(descriptor, map, ""),
        _ => Err(CodecError::NotAnObject),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn expected(shape: &Shape) -> &'static str {
    match shape {
        Shape::String => "string",
        Shape::Int => "number",
        Shape::Bool => "bool",
        Shape::List(_) => "list",
        Shape::Object(_) | Shape::Toggle(_) => "object",
    }
}

fn mismatch(shape: &Shape, path: &str) -> CodecError {
    CodecError::Mismatch {
        path: path.to_string(),
        expected: expected(shape),
    }
}

fn encode_state(
    descriptor: &ResourceDescriptor,
    state: &State,
    prefix: &str,
) -> Result<Map<String, Json>, CodecError> {
    let mut body = Map::new();
    for spec in descriptor.settable() {
        if let Some(value) = state.get(&spec.name) {
            let path = join(prefix, &spec.name);
            body.insert(camel_case(&spec.name), encode_value(&spec.shape, value, &path)?);
        }
    }
    Ok(body)
}

fn encode_value(shape: &Shape, value: &Value, path: &str) -> Result<Json, CodecError> {
    match (shape, value) {
        (_, Value::Reference(_)) => Err(CodecError::Unresolved(path.to_string())),
        (Shape::String, Value::String(s)) => Ok(Json::String(s.clone())),
        (Shape::Int, Value::Int(i)) => Ok(Json::from(*i)),
        (Shape::Bool, Value::Bool(b)) => Ok(Json::Bool(*b)),
        (Shape::Object(nested), Value::Object(state)) => {
            encode_state(nested, state, path).map(Json::Object)
        }
        (Shape::List(nested), Value::List(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(state) => {
                    encode_state(nested, state, &format!("{path}[{index}]")).map(Json::Object)
                }
                _ => Err(mismatch(&Shape::Object(nested.clone()), &format!("{path}[{index}]"))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        (Shape::Toggle(nested), Value::Toggle(toggle)) => {
            let config = match toggle {
                Toggle::Absent => {
                    let mut off = Map::new();
                    off.insert("mode".to_string(), Json::from(SPOT_AWARE_DISABLED));
                    return Ok(Json::Object(off));
                }
                Toggle::EnabledWithDefaults => nested.apply_defaults(&State::new()),
                Toggle::EnabledWithConfig(config) => nested.apply_defaults(config),
            };
            encode_state(nested, &config, path).map(Json::Object)
        }
        _ => Err(mismatch(shape, path)),
    }
}

fn decode_object(
    descriptor: &ResourceDescriptor,
    map: &Map<String, Json>,
    prefix: &str,
) -> Result<State, CodecError> {
    let mut state = State::new();
    for (field, json) in map {
        if json.is_null() {
            continue;
        }
        let name = snake_case(field);
        let path = join(prefix, &name);
        let value = match descriptor.attribute(&name) {
            Some(spec) => decode_value(&spec.shape, json, &path)?,
            None => untyped(json),
        };
        state.insert(name, value);
    }
    Ok(state)
}

fn decode_value(shape: &Shape, json: &Json, path: &str) -> Result<Value, CodecError> {
    match (shape, json) {
        (Shape::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (Shape::Int, Json::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| mismatch(shape, path)),
        (Shape::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
        (Shape::Object(nested), Json::Object(map)) => {
            decode_object(nested, map, path).map(Value::Object)
        }
        (Shape::List(nested), Json::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let item_path = format!("{path}[{index}]");
                match item {
                    Json::Object(map) => decode_object(nested, map, &item_path).map(Value::Object),
                    _ => Err(mismatch(&Shape::Object(nested.clone()), &item_path)),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (Shape::Toggle(nested), Json::Object(map)) => {
            if map.get("mode").and_then(Json::as_str) == Some(SPOT_AWARE_DISABLED) {
                return Ok(Value::Toggle(Toggle::Absent));
            }
            let config = decode_object(nested, map, path)?;
            let toggle = if config == nested.apply_defaults(&State::new()) {
                Toggle::EnabledWithDefaults
            } else {
                Toggle::with_config(config)
            };
            Ok(Value::Toggle(toggle))
        }
        _ => Err(mismatch(shape, path)),
    }
}

/// Best-effort reading of a field no descriptor covers.
fn untyped(json: &Json) -> Value {
    match json {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n.as_i64().map(Value::Int).unwrap_or_else(|| Value::String(n.to_string())),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(untyped).collect()),
        Json::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (snake_case(k), untyped(v)))
                .collect(),
        ),
        Json::Null => Value::String(String::new()),
    }
}
