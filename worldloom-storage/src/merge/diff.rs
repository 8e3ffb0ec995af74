//! Recursive three-way document diff.
//!
//! The merged document starts from `base` and takes each side's
//! uncontested changes; paths changed differently on both sides become
//! conflicts, reported at the deepest conflicting path with dotted,
//! fully-qualified names (e.g. `config.trade.routes.north.value`).

use serde_json::Value;

/// Per-entity-type knobs for the diff.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// When set, arrays whose elements all carry this field are aligned by
    /// it instead of by index.
    pub array_identity_key: Option<&'static str>,
}

/// One conflicting path with the three observed values.
#[derive(Debug, Clone, PartialEq)]
pub struct PathConflict {
    pub path: String,
    pub base_value: Option<Value>,
    pub source_value: Option<Value>,
    pub target_value: Option<Value>,
}

/// Result of a three-way compare.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    /// Merged document; `None` when both sides removed the entity.
    /// Conflicting paths hold the base value until a resolution overwrites
    /// them.
    pub merged: Option<Value>,
    pub conflicts: Vec<PathConflict>,
}

/// Three-way compare of possibly-absent documents.
pub fn compare_documents(
    base: Option<&Value>,
    source: Option<&Value>,
    target: Option<&Value>,
    options: &DiffOptions,
) -> DiffOutcome {
    let mut conflicts = Vec::new();
    let merged = merge_values(base, source, target, "", options, &mut conflicts);
    DiffOutcome { merged, conflicts }
}

fn merge_values(
    base: Option<&Value>,
    source: Option<&Value>,
    target: Option<&Value>,
    path: &str,
    options: &DiffOptions,
    conflicts: &mut Vec<PathConflict>,
) -> Option<Value> {
    // Agreement (including both absent) and one-sided changes need no
    // recursion; this also covers both sides removing or adding equally.
    if source == target {
        return source.cloned();
    }
    if source == base {
        return target.cloned();
    }
    if target == base {
        return source.cloned();
    }

    // Changed in both, differently. Recurse where both sides are still
    // containers; anything else is a leaf conflict.
    match (source, target) {
        (Some(Value::Object(source_map)), Some(Value::Object(target_map)))
            if base.map_or(true, Value::is_object) =>
        {
            let base_map = base.and_then(Value::as_object);
            let mut merged = serde_json::Map::new();

            for key in key_union(base_map, source_map, target_map) {
                let child = merge_values(
                    base_map.and_then(|m| m.get(&key)),
                    source_map.get(&key),
                    target_map.get(&key),
                    &join(path, &key),
                    options,
                    conflicts,
                );
                if let Some(value) = child {
                    merged.insert(key, value);
                }
            }
            Some(Value::Object(merged))
        }
        (Some(Value::Array(source_arr)), Some(Value::Array(target_arr)))
            if base.map_or(true, Value::is_array) =>
        {
            let base_arr = base.and_then(Value::as_array);
            Some(merge_arrays(
                base_arr, source_arr, target_arr, path, options, conflicts,
            ))
        }
        _ => {
            conflicts.push(PathConflict {
                path: path.to_string(),
                base_value: base.cloned(),
                source_value: source.cloned(),
                target_value: target.cloned(),
            });
            // Keep the base value in place until a resolution lands.
            base.cloned()
        }
    }
}

fn merge_arrays(
    base: Option<&Vec<Value>>,
    source: &[Value],
    target: &[Value],
    path: &str,
    options: &DiffOptions,
    conflicts: &mut Vec<PathConflict>,
) -> Value {
    if let Some(key) = options.array_identity_key {
        if keyed_throughout(base, source, target, key) {
            return merge_arrays_by_key(base, source, target, key, path, options, conflicts);
        }
    }

    let base_len = base.map_or(0, |b| b.len());
    let len = base_len.max(source.len()).max(target.len());
    let mut merged = Vec::with_capacity(len);
    for index in 0..len {
        let element = merge_values(
            base.and_then(|b| b.get(index)),
            source.get(index),
            target.get(index),
            &join(path, &index.to_string()),
            options,
            conflicts,
        );
        if let Some(value) = element {
            merged.push(value);
        }
    }
    Value::Array(merged)
}

/// Keyed alignment applies only when every element on every side is an
/// object carrying the identity key.
fn keyed_throughout(base: Option<&Vec<Value>>, source: &[Value], target: &[Value], key: &str) -> bool {
    let has_key = |value: &Value| value.get(key).is_some();
    base.map_or(true, |b| b.iter().all(has_key))
        && source.iter().all(has_key)
        && target.iter().all(has_key)
}

fn merge_arrays_by_key(
    base: Option<&Vec<Value>>,
    source: &[Value],
    target: &[Value],
    key: &str,
    path: &str,
    options: &DiffOptions,
    conflicts: &mut Vec<PathConflict>,
) -> Value {
    let identity = |value: &Value| -> String {
        match value.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    };
    let index =
        |elements: &[Value]| -> Vec<(String, Value)> {
            elements
                .iter()
                .map(|el| (identity(el), el.clone()))
                .collect()
        };

    let base_index = base.map(|b| index(b)).unwrap_or_default();
    let source_index = index(source);
    let target_index = index(target);
    let lookup = |index: &[(String, Value)], id: &str| -> Option<Value> {
        index.iter().find(|(k, _)| k == id).map(|(_, v)| v.clone())
    };

    // Base order first, then source-only additions, then target-only.
    let mut order: Vec<String> = base_index.iter().map(|(k, _)| k.clone()).collect();
    for (k, _) in source_index.iter().chain(target_index.iter()) {
        if !order.contains(k) {
            order.push(k.clone());
        }
    }

    let mut merged = Vec::new();
    for id in order {
        let element = merge_values(
            lookup(&base_index, &id).as_ref(),
            lookup(&source_index, &id).as_ref(),
            lookup(&target_index, &id).as_ref(),
            &join(path, &id),
            options,
            conflicts,
        );
        if let Some(value) = element {
            merged.push(value);
        }
    }
    Value::Array(merged)
}

fn key_union(
    base: Option<&serde_json::Map<String, Value>>,
    source: &serde_json::Map<String, Value>,
    target: &serde_json::Map<String, Value>,
) -> Vec<String> {
    let mut keys: Vec<String> = base
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    for key in source.keys().chain(target.keys()) {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    keys
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// Overwrite the value at a dotted path, creating intermediate objects as
/// needed. Used to apply conflict resolutions onto a merged document.
pub fn set_path(document: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *document = value;
        return;
    }
    let mut current = document;
    for segment in path.split('.') {
        current = child_mut(current, segment);
    }
    *current = value;
}

fn child_mut<'a>(document: &'a mut Value, segment: &str) -> &'a mut Value {
    if document.is_array() {
        if let Ok(index) = segment.parse::<usize>() {
            let array = document.as_array_mut().expect("checked is_array");
            while array.len() <= index {
                array.push(Value::Null);
            }
            return &mut array[index];
        }
    }
    if !document.is_object() {
        *document = Value::Object(serde_json::Map::new());
    }
    document
        .as_object_mut()
        .expect("coerced to object")
        .entry(segment.to_string())
        .or_insert(Value::Null)
}

// ============================================================================
// TESTS
// ============================================================================
