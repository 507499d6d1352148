//! Three-way merge of JSON documents.
//!
//! `base` is the object as read before a change was computed, `current` is
//! a fresh read and `desired` is `base` with our change applied. Edits made
//! on only one side are kept. A field changed on both sides to different
//! values is a conflict.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    /// Dotted path of the conflicting field
    pub path: String,
}

pub fn three_way_merge(
    base: &Value,
    current: &Value,
    desired: &Value,
) -> Result<Value, MergeConflict> {
    merge_at("", Some(base), Some(current), Some(desired))
        .map(|merged| merged.unwrap_or(Value::Null))
}

fn merge_at(
    path: &str,
    base: Option<&Value>,
    current: Option<&Value>,
    desired: Option<&Value>,
) -> Result<Option<Value>, MergeConflict> {
    if desired == base || current == desired {
        return Ok(current.cloned());
    }
    if current == base {
        return Ok(desired.cloned());
    }

    let empty = Map::new();
    match (current, desired) {
        (Some(Value::Object(cur)), Some(Value::Object(des))) => {
            let base = match base {
                Some(Value::Object(b)) => b,
                _ => &empty,
            };
            let mut keys: Vec<&String> = base.keys().chain(cur.keys()).chain(des.keys()).collect();
            keys.sort();
            keys.dedup();

            let mut merged = Map::new();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if let Some(value) = merge_at(&child, base.get(key), cur.get(key), des.get(key))? {
                    merged.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(merged)))
        }
        _ => Err(MergeConflict {
            path: if path.is_empty() {
                "<root>".to_string()
            } else {
                path.to_string()
            },
        }),
    }
}
