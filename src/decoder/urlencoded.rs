//! `application/x-www-form-urlencoded` parsing.
//!
//! Two flavours: flat (`querystring` semantics, repeated keys collect into an
//! array) and extended (bracket nesting such as `user[name]=x`, `tags[]=a`,
//! `list[0]=a`).

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Maximum bracket nesting; deeper segments stay as one literal key.
pub const MAX_DEPTH: usize = 5;

/// Highest numeric index that still builds an array instead of an object key.
pub const ARRAY_LIMIT: usize = 20;

pub fn count_pairs(input: &[u8]) -> usize {
    url::form_urlencoded::parse(input).count()
}

/// Parse with flat semantics.
pub fn parse_flat(input: &[u8]) -> BTreeMap<String, Value> {
    let mut out: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let slot = out.entry(key.into_owned()).or_insert(Value::Null);
        push_leaf(slot, value.into_owned());
    }
    out
}

/// Parse with bracket nesting.
pub fn parse_extended(input: &[u8]) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let mut segments = split_key(&key).into_iter();
        let Some(Segment::Key(root)) = segments.next() else {
            continue;
        };
        let rest: Vec<Segment> = segments.collect();
        let slot = out.entry(root).or_insert(Value::Null);
        assign(slot, &rest, value.into_owned());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Push,
}

fn split_key(key: &str) -> Vec<Segment> {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return vec![Segment::Key(key.to_string())];
    };
    let mut segments = vec![Segment::Key(key[..open].to_string())];
    let mut rest = &key[open..];
    while segments.len() <= MAX_DEPTH {
        let Some(inner_start) = rest.strip_prefix('[') else {
            break;
        };
        let Some(close) = inner_start.find(']') else {
            break;
        };
        let inner = &inner_start[..close];
        segments.push(if inner.is_empty() {
            Segment::Push
        } else {
            Segment::Key(inner.to_string())
        });
        rest = &inner_start[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Key(rest.to_string()));
    }
    segments
}

fn push_leaf(slot: &mut Value, value: String) {
    match slot {
        Value::Null => *slot = Value::String(value),
        Value::Array(items) => items.push(Value::String(value)),
        other => {
            let previous = other.take();
            *other = Value::Array(vec![previous, Value::String(value)]);
        }
    }
}

fn assign(slot: &mut Value, rest: &[Segment], value: String) {
    let Some((head, tail)) = rest.split_first() else {
        push_leaf(slot, value);
        return;
    };
    match head {
        Segment::Push => {
            ensure_array(slot);
            if let Value::Array(items) = slot {
                items.push(Value::Null);
                if let Some(last) = items.last_mut() {
                    assign(last, tail, value);
                }
            }
        }
        Segment::Key(key) => {
            if let Some(index) = array_index(slot, key) {
                if let Value::Array(items) = slot {
                    if index == items.len() {
                        items.push(Value::Null);
                    }
                    if let Some(item) = items.get_mut(index) {
                        assign(item, tail, value);
                    }
                }
                return;
            }
            ensure_object(slot);
            if let Value::Object(object) = slot {
                let child = object.entry(key.clone()).or_insert(Value::Null);
                assign(child, tail, value);
            }
        }
    }
}

/// Numeric keys address arrays while they stay contiguous and small.
fn array_index(slot: &mut Value, key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    if index > ARRAY_LIMIT {
        return None;
    }
    match slot {
        Value::Null if index == 0 => {
            *slot = Value::Array(Vec::new());
            Some(0)
        }
        Value::Array(items) if index <= items.len() => Some(index),
        _ => None,
    }
}

fn ensure_array(slot: &mut Value) {
    match slot {
        Value::Array(_) => {}
        Value::Null => *slot = Value::Array(Vec::new()),
        other => {
            let previous = other.take();
            *other = Value::Array(vec![previous]);
        }
    }
}

fn ensure_object(slot: &mut Value) {
    match slot {
        Value::Object(_) => {}
        Value::Array(items) => {
            let indexed = items
                .drain(..)
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            *slot = Value::Object(indexed);
        }
        // A scalar followed by a nested key is replaced by the object.
        _ => *slot = Value::Object(Map::new()),
    }
}
