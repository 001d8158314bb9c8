use thiserror::Error;

/// Core error type for the sprout runtime.
///
/// The taxonomy follows the wiring pipeline: configuration errors carry the
/// offending key or tag, graph errors carry the participating bean names,
/// ambiguity errors carry every candidate. Absence of a bean is *not* an
/// error on the `try_*` lookup paths; it only becomes one when a required
/// binding cannot be satisfied.
#[derive(Debug, Error)]
pub enum BeanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Property \"{key}\" not found")]
    PropertyNotFound { key: String },

    #[error("Cannot bind property \"{key}\" to {target}: {message}")]
    PropertyBind {
        key: String,
        target: &'static str,
        message: String,
    },

    #[error("Bean not found: {selector}")]
    BeanNotFound { selector: String },

    #[error("Ambiguous bean reference \"{selector}\": candidates [{}]", .candidates.join(", "))]
    Ambiguous {
        selector: String,
        candidates: Vec<String>,
    },

    #[error("Ordering cycle among bean definitions: {path}")]
    OrderingCycle { path: String },

    #[error("Condition or dependency cycle among bean definitions: {path}")]
    ConditionCycle { path: String },

    #[error("Context is not wired yet; call auto_wire first")]
    NotWired,

    /// Internal worklist signal: a referenced bean definition has not been
    /// decided yet. The wiring pass re-enqueues the current definition on
    /// this; it never escapes `auto_wire`.
    #[error("Bean \"{selector}\" is not decided yet")]
    Pending { selector: String },
}

impl BeanError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new property-not-found error
    pub fn property_not_found(key: impl Into<String>) -> Self {
        Self::PropertyNotFound { key: key.into() }
    }

    /// Create a new bean-not-found error
    pub fn bean_not_found(selector: impl Into<String>) -> Self {
        Self::BeanNotFound {
            selector: selector.into(),
        }
    }

    pub(crate) fn pending(selector: impl Into<String>) -> Self {
        Self::Pending {
            selector: selector.into(),
        }
    }

    /// Check if the error is the internal defer signal
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Check if the error represents plain absence of a bean
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BeanNotFound { .. })
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
