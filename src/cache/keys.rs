//! Cache key derivation.
//!
//! Turns a structured query into a short, stable, field-order-independent
//! string identifier. Two structurally equal queries always produce the same
//! key across process runs; distinct queries collide only with the usual
//! rolling-hash probability, which is accepted for the query shapes a dev
//! server produces.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Canonical strings shorter than this are padded with trailing spaces
/// before folding, to avoid degenerate short-string hash behavior.
const MIN_CANONICAL_UNITS: usize = 13;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A query could not be serialized into a canonical form.
#[derive(Debug, Error)]
#[error("query is not representable as a cache key: {0}")]
pub struct KeyError(#[from] serde_json::Error);

/// Derive the cache key for a query.
///
/// The query is serialized to JSON with a canonical field ordering, folded
/// into a 64-bit rolling hash, and rendered in base-36.
pub fn query_key<T: Serialize>(query: &T) -> Result<String, KeyError> {
    let value = serde_json::to_value(query)?;
    let canonical = canonical_json(&value);
    Ok(to_base36(fold_canonical(&canonical)))
}

/// Render a JSON value with every object's fields emitted in one global
/// lexicographic key order.
///
/// Keys are collected from the whole structure and sorted once, rather than
/// per nesting level. Sibling objects with disjoint key sets therefore share
/// a single ordering. That is sound for the flat records brezza queries are,
/// but would not be a safe canonicalization for deeply heterogeneous nested
/// structures. Kept as-is: changing the scheme changes every derived key.
fn canonical_json(value: &Value) -> String {
    let mut keys = BTreeSet::new();
    collect_keys(value, &mut keys);
    let mut out = String::new();
    write_value(value, &keys, &mut out);
    out
}

fn collect_keys(value: &Value, keys: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                keys.insert(key.clone());
                collect_keys(nested, keys);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, keys);
            }
        }
        _ => {}
    }
}

fn write_value(value: &Value, order: &BTreeSet<String>, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut first = true;
            for key in order {
                let Some(nested) = map.get(key) else {
                    continue;
                };
                if !first {
                    out.push(',');
                }
                first = false;
                // Value::String rendering handles the key escaping.
                write_value(&Value::String(key.clone()), order, out);
                out.push(':');
                write_value(nested, order, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(item, order, out);
            }
            out.push(']');
        }
        leaf => {
            // Leaves carry no field ordering; serde_json's rendering is
            // already deterministic for them.
            out.push_str(&leaf.to_string());
        }
    }
}

/// Fold the canonical string into 64 bits with `hash = hash * 31 + unit`
/// over UTF-16 code units, in wraparound arithmetic with no seed.
fn fold_canonical(text: &str) -> u64 {
    let mut hash: u64 = 0;
    let mut units = 0usize;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(u64::from(unit));
        units += 1;
    }
    // padEnd-style normalization: trailing spaces up to the minimum length.
    while units < MIN_CANONICAL_UNITS {
        hash = hash.wrapping_mul(31).wrapping_add(u64::from(b' '));
        units += 1;
    }
    hash
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    // 64 bits never need more than 13 base-36 digits.
    let mut buf = [0u8; 13];
    let mut start = buf.len();
    while value > 0 {
        start -= 1;
        buf[start] = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&buf[start..]).into_owned()
}
