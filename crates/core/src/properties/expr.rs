use crate::errors::BeanError;
use crate::properties::Properties;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parsed form of a value-binding tag.
///
/// Grammar: `${key}`, `${key:=default}`, with an optional trailing `?`
/// inside the braces marking the binding optional (`${key:=[]?}`). An
/// optional binding with no default leaves the target at its
/// `Default::default()` value instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindExpr {
    pub key: String,
    pub default: Option<String>,
    pub optional: bool,
}

impl BindExpr {
    /// Check whether a tag uses the value-binding syntax
    pub fn is_value_tag(tag: &str) -> bool {
        tag.starts_with("${")
    }

    /// Parse a `${key:=default}` binding expression
    pub fn parse(tag: &str) -> Result<Self, BeanError> {
        let inner = tag
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| {
                BeanError::configuration(format!("invalid binding tag \"{}\"", tag))
            })?;

        let (inner, optional) = match inner.strip_suffix('?') {
            Some(stripped) => (stripped, true),
            None => (inner, false),
        };

        let (key, default) = match inner.split_once(":=") {
            Some((key, default)) => (key, Some(default.to_string())),
            None => (inner, None),
        };

        Ok(Self {
            key: key.to_string(),
            default,
            optional,
        })
    }
}

/// Parse a literal default into a property value: anything that reads as
/// JSON keeps its type (`3`, `true`, `[]`), the rest stays a string.
pub(crate) fn parse_literal(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Convert a property value into a typed target, coercing string scalars.
///
/// Values arriving from the command line or the environment are strings;
/// a string that parses as the target scalar is accepted, and a scalar is
/// accepted where a string target is declared.
pub fn convert<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T, BeanError> {
    let first = match serde_json::from_value::<T>(value.clone()) {
        Ok(typed) => return Ok(typed),
        Err(err) => err,
    };
    if let Value::String(raw) = value {
        if let Ok(reparsed) = serde_json::from_str::<Value>(raw) {
            if let Ok(typed) = serde_json::from_value::<T>(reparsed) {
                return Ok(typed);
            }
        }
    } else if !value.is_object() && !value.is_array() {
        let as_string = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if let Ok(typed) = serde_json::from_value::<T>(Value::String(as_string)) {
            return Ok(typed);
        }
    }
    Err(BeanError::PropertyBind {
        key: key.to_string(),
        target: std::any::type_name::<T>(),
        message: first.to_string(),
    })
}

/// Bind a single typed value out of a property snapshot.
///
/// Resolution order: exact key, then subtree rebuild (for struct and map
/// targets), then the tag's default literal; a missing required key is a
/// [`BeanError::PropertyNotFound`].
pub fn bind_value<T: DeserializeOwned + Default>(
    props: &Properties,
    tag: &str,
) -> Result<T, BeanError> {
    let expr = BindExpr::parse(tag)?;
    if expr.key.is_empty() {
        return Err(BeanError::configuration(format!(
            "value binding tag \"{}\" requires an explicit key",
            tag
        )));
    }
    if let Some(value) = props.get(&expr.key) {
        return convert(&expr.key, value);
    }
    if let Some(value) = props.subtree(&expr.key) {
        return convert(&expr.key, &value);
    }
    match expr.default {
        Some(raw) => convert(&expr.key, &parse_literal(&raw)),
        None if expr.optional => Ok(T::default()),
        None => Err(BeanError::property_not_found(expr.key)),
    }
}
