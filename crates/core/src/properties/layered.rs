use crate::errors::BeanError;
use crate::properties::expr::parse_literal;
use crate::properties::Properties;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Prioritized composition of property layers, highest priority first.
///
/// Layers are merged and `${key}` / `${key:=default}` reference values are
/// resolved transitively by [`LayeredProperties::flatten`]; an unresolved
/// required reference is a fatal configuration error.
#[derive(Debug, Default)]
pub struct LayeredProperties {
    layers: Vec<Properties>,
}

impl LayeredProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer with the lowest priority so far
    pub fn push(&mut self, layer: Properties) {
        self.layers.push(layer);
    }

    /// Insert a layer at an explicit priority position (0 = highest)
    pub fn insert(&mut self, index: usize, layer: Properties) {
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Find the highest-priority value for any of the given keys
    pub fn get_first(&self, keys: &[&str]) -> Option<&Value> {
        for layer in &self.layers {
            for key in keys {
                if let Some(value) = layer.get(key) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Merge all layers (highest priority wins) and resolve references.
    pub fn flatten(&self) -> Result<Properties, BeanError> {
        let mut merged: BTreeMap<String, Value> = BTreeMap::new();
        for layer in self.layers.iter().rev() {
            for (key, value) in layer.iter() {
                merged.insert(key.clone(), value.clone());
            }
        }

        let keys: Vec<String> = merged.keys().cloned().collect();
        for key in keys {
            let mut resolving = HashSet::new();
            resolve_reference(&mut merged, &key, &mut resolving)?;
        }

        let mut flat = Properties::new();
        for (key, value) in merged {
            flat.set(key, value);
        }
        Ok(flat)
    }
}

/// Resolve one key's value in place, following `${ref}` chains.
fn resolve_reference(
    merged: &mut BTreeMap<String, Value>,
    key: &str,
    resolving: &mut HashSet<String>,
) -> Result<Value, BeanError> {
    let Some(value) = merged.get(key).cloned() else {
        return Err(BeanError::property_not_found(key));
    };
    let Some(expr) = as_reference(&value) else {
        return Ok(value);
    };
    if !resolving.insert(key.to_string()) {
        return Err(BeanError::configuration(format!(
            "property reference cycle through \"{}\"",
            key
        )));
    }
    let (ref_key, default) = expr;
    let resolved = if merged.contains_key(&ref_key) {
        resolve_reference(merged, &ref_key, resolving)?
    } else if let Some(raw) = default {
        parse_literal(&raw)
    } else {
        return Err(BeanError::property_not_found(ref_key));
    };
    resolving.remove(key);
    merged.insert(key.to_string(), resolved.clone());
    Ok(resolved)
}

/// Return `(key, default)` when a value is a `${...}` reference string.
fn as_reference(value: &Value) -> Option<(String, Option<String>)> {
    let Value::String(raw) = value else {
        return None;
    };
    let inner = raw.strip_prefix("${")?.strip_suffix('}')?;
    match inner.split_once(":=") {
        Some((key, default)) => Some((key.to_string(), Some(default.to_string()))),
        None => Some((inner.to_string(), None)),
    }
}
