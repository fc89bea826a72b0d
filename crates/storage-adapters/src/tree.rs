//! Path operations on a JSON document tree.
//!
//! The root is always an object. Nulls and empty objects are never stored:
//! writing one deletes the node, and parents emptied by a delete are pruned.

use domains::{StoreError, StorePath};
use serde_json::{Map, Value};

const RESERVED: [char; 6] = ['/', '.', '#', '$', '[', ']'];

pub(crate) fn validate(path: &StorePath) -> Result<(), StoreError> {
    for segment in path.segments() {
        let reason = if segment.is_empty() {
            Some("empty segment".to_string())
        } else {
            segment
                .chars()
                .find(|c| RESERVED.contains(c) || c.is_control())
                .map(|c| format!("reserved character {c:?} in `{segment}`"))
        };
        if let Some(reason) = reason {
            return Err(StoreError::InvalidPath { path: path.to_string(), reason });
        }
    }
    Ok(())
}

/// Strips nulls and empty objects. `None` means the value amounts to a delete.
pub(crate) fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}

pub(crate) fn read(root: &Value, path: &StorePath) -> Option<Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    match node {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        value => Some(value.clone()),
    }
}

pub(crate) fn write(root: &mut Value, path: &StorePath, value: Option<Value>) {
    match value.and_then(normalize) {
        Some(value) => put(root, path.segments(), value),
        None => {
            remove(root, path.segments());
        }
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
}

fn put(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        put(child, rest, value);
    }
}

/// Returns true when `node` is left empty and should be pruned by its parent.
fn remove(node: &mut Value, segments: &[String]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *node = Value::Null;
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        map.remove(head);
    } else if let Some(child) = map.get_mut(head) {
        if remove(child, rest) {
            map.remove(head);
        }
    }
    map.is_empty()
}
