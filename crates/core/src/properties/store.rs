use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered property store with dotted string keys.
///
/// Nested maps are flattened to dotted keys on insert, so a YAML document
/// `server: { addr: "0.0.0.0" }` is stored as `server.addr`. Values keep
/// their JSON type; scalar coercion happens at bind time, not here.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: BTreeMap<String, Value>,
}

impl Properties {
    /// Create an empty property store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a property value by exact key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check whether an exact key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set a property value. Nested objects are flattened into dotted keys.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.set_value(key.into(), value.into());
    }

    fn set_value(&mut self, key: String, value: Value) {
        match value {
            Value::Object(map) => {
                for (child, child_value) in map {
                    self.set_value(format!("{}.{}", key, child), child_value);
                }
            }
            other => {
                self.entries.insert(key, other);
            }
        }
    }

    /// Visit every entry in key order
    pub fn range(&self, mut f: impl FnMut(&str, &Value)) {
        for (key, value) in &self.entries {
            f(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every entry of `other` into this store, overwriting on conflict
    pub fn merge_from(&mut self, other: &Properties) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Rebuild the nested value under a key prefix.
    ///
    /// Returns the exact value when the key is present verbatim; otherwise
    /// gathers every `prefix.child` entry back into a nested object so that
    /// struct and map targets can bind against a subtree.
    pub fn subtree(&self, prefix: &str) -> Option<Value> {
        if let Some(value) = self.entries.get(prefix) {
            return Some(value.clone());
        }
        let dotted = format!("{}.", prefix);
        let mut root = serde_json::Map::new();
        for (key, value) in self.entries.range(dotted.clone()..) {
            let Some(rest) = key.strip_prefix(&dotted) else {
                break;
            };
            insert_nested(&mut root, rest, value.clone());
        }
        if root.is_empty() {
            None
        } else {
            Some(Value::Object(root))
        }
    }
}

fn insert_nested(map: &mut serde_json::Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(child) = slot {
                insert_nested(child, rest, value);
            }
        }
    }
}
