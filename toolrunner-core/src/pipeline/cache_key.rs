//! Cache key canonicalization for the Stream Pipeline's read cache.
//!
//! Resolves the open question left by the abstract design: the key is
//! `tool_name + ":" + canonical_json`, where `canonical_json` sorts object
//! keys lexicographically (via `serde_json::Value`'s `BTreeMap`-backed
//! `Map` ordering when the `preserve_order` feature is off, which this
//! workspace does not enable) and materializes every declared default
//! before hashing, so two argument shapes that differ only by an omitted
//! default collide on the same key. Grounded in the reference agent's
//! `AsyncToolPipeline::generate_cache_key`, which hashes
//! `tool_name:args.to_string()` — extended here to canonicalize before
//! hashing rather than hash the verbatim (and possibly key-order-dependent)
//! JSON text.

use crate::registry::ToolRegistry;
use serde_json::Value;

pub fn canonicalize(registry: &ToolRegistry, tool_name: &str, args: &Value) -> String {
    let materialized = registry.with_defaults(tool_name, args);
    let canonical = canonical_json(&materialized);
    format!("{tool_name}:{canonical}")
}

/// Serializes a `Value` with object keys sorted lexicographically at every
/// level. `serde_json::Value::Object` is backed by a `BTreeMap` in this
/// workspace's default feature set, so `to_string()` already emits sorted
/// keys; this function exists to make that guarantee explicit and immune to
/// a future `preserve_order` feature flip on `serde_json`.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}
