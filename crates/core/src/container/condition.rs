use crate::container::definition::Capability;
use crate::properties::Properties;

/// Tri-state outcome of a condition evaluation.
///
/// `Undecided` means the condition references a bean whose definition has not
/// been decided yet; the wiring loop re-enqueues such definitions instead of
/// guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    True,
    False,
    Undecided,
}

/// A predicate gating whether a bean definition survives into the resolved
/// registry.
///
/// `OnBean` / `OnMissingBean` observe the *partial* resolution state at the
/// moment the owning definition is evaluated, so their truth value depends on
/// resolution order. The wiring loop defers evaluation while a referenced
/// definition is still undecided, which makes the final outcome deterministic
/// for a fixed set of definitions regardless of registration order.
#[derive(Debug, Clone)]
pub enum Condition {
    /// True iff the active profile equals the name, or the name is empty.
    OnProfile(String),
    /// True iff the key is present in the resolved property snapshot.
    OnProperty(String),
    OnMissingProperty(String),
    /// True iff a bean matching the selector has been resolved.
    OnBean(String),
    OnMissingBean(String),
    /// Empty AND is vacuously true.
    And(Vec<Condition>),
    /// Empty OR is vacuously false.
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn on_profile(name: impl Into<String>) -> Self {
        Self::OnProfile(name.into())
    }

    pub fn on_property(key: impl Into<String>) -> Self {
        Self::OnProperty(key.into())
    }

    pub fn on_missing_property(key: impl Into<String>) -> Self {
        Self::OnMissingProperty(key.into())
    }

    pub fn on_bean(selector: impl Into<String>) -> Self {
        Self::OnBean(selector.into())
    }

    pub fn on_missing_bean(selector: impl Into<String>) -> Self {
        Self::OnMissingBean(selector.into())
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against the given registry/property snapshot. Pure: does not
    /// mutate the context. Short-circuits left to right.
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> Verdict {
        match self {
            Self::OnProfile(name) => {
                if name.is_empty() || ctx.profile == name {
                    Verdict::True
                } else {
                    Verdict::False
                }
            }
            Self::OnProperty(key) => {
                if ctx.properties.contains(key) {
                    Verdict::True
                } else {
                    Verdict::False
                }
            }
            Self::OnMissingProperty(key) => {
                if ctx.properties.contains(key) {
                    Verdict::False
                } else {
                    Verdict::True
                }
            }
            Self::OnBean(raw) => {
                let selector = BeanSelector::parse(raw);
                if ctx.beans.any_resolved(&selector) {
                    Verdict::True
                } else if ctx.include_undecided && ctx.beans.any_undecided(&selector) {
                    Verdict::Undecided
                } else {
                    Verdict::False
                }
            }
            Self::OnMissingBean(raw) => {
                let selector = BeanSelector::parse(raw);
                if ctx.beans.any_resolved(&selector) {
                    Verdict::False
                } else if ctx.include_undecided && ctx.beans.any_undecided(&selector) {
                    Verdict::Undecided
                } else {
                    Verdict::True
                }
            }
            Self::And(parts) => {
                let mut undecided = false;
                for part in parts {
                    match part.evaluate(ctx) {
                        Verdict::False => return Verdict::False,
                        Verdict::Undecided => undecided = true,
                        Verdict::True => {}
                    }
                }
                if undecided {
                    Verdict::Undecided
                } else {
                    Verdict::True
                }
            }
            Self::Or(parts) => {
                let mut undecided = false;
                for part in parts {
                    match part.evaluate(ctx) {
                        Verdict::True => return Verdict::True,
                        Verdict::Undecided => undecided = true,
                        Verdict::False => {}
                    }
                }
                if undecided {
                    Verdict::Undecided
                } else {
                    Verdict::False
                }
            }
            Self::Not(inner) => match inner.evaluate(ctx) {
                Verdict::True => Verdict::False,
                Verdict::False => Verdict::True,
                Verdict::Undecided => Verdict::Undecided,
            },
        }
    }

    /// Immediate-mode check: undecided beans count as missing.
    pub fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        debug_assert!(!ctx.include_undecided);
        self.evaluate(ctx) == Verdict::True
    }
}

/// Snapshot handed to condition evaluation: active profile, flattened
/// properties, and a live view of the bean registry.
pub struct ConditionContext<'a> {
    pub profile: &'a str,
    pub properties: &'a Properties,
    pub(crate) beans: &'a dyn BeanQuery,
    /// Deferred mode: `OnBean`/`OnMissingBean` may report `Undecided`.
    pub(crate) include_undecided: bool,
}

/// Registry view consumed by `OnBean` / `OnMissingBean`.
pub(crate) trait BeanQuery {
    fn any_resolved(&self, selector: &BeanSelector) -> bool;
    fn any_undecided(&self, selector: &BeanSelector) -> bool;
}

/// Selector string used by conditions and named lookups: `*path::Type` for a
/// type-name match (suffix match on the exported capability names), anything
/// else for an exact bean name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanSelector {
    TypeName(String),
    Name(String),
}

impl BeanSelector {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('*') {
            Some(type_name) => Self::TypeName(type_name.to_string()),
            None => Self::Name(raw.to_string()),
        }
    }

    pub(crate) fn matches(&self, bean_name: &str, capabilities: &[Capability]) -> bool {
        match self {
            Self::Name(name) => bean_name == name,
            Self::TypeName(type_name) => capabilities.iter().any(|cap| {
                cap.type_name == type_name
                    || cap
                        .type_name
                        .strip_suffix(type_name.as_str())
                        .map_or(false, |head| head.ends_with("::"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedQuery {
        resolved: Vec<&'static str>,
        undecided: Vec<&'static str>,
    }

    impl BeanQuery for FixedQuery {
        fn any_resolved(&self, selector: &BeanSelector) -> bool {
            self.resolved.iter().any(|name| selector.matches(name, &[]))
        }

        fn any_undecided(&self, selector: &BeanSelector) -> bool {
            self.undecided.iter().any(|name| selector.matches(name, &[]))
        }
    }

    fn eval(cond: &Condition, profile: &str, deferred: bool, query: &FixedQuery) -> Verdict {
        let mut props = Properties::new();
        props.set("server.port", 8080);
        let ctx = ConditionContext {
            profile,
            properties: &props,
            beans: query,
            include_undecided: deferred,
        };
        cond.evaluate(&ctx)
    }

    fn empty_query() -> FixedQuery {
        FixedQuery {
            resolved: vec![],
            undecided: vec![],
        }
    }

    #[test]
    fn test_profile_matching() {
        let query = empty_query();
        let cond = Condition::on_profile("test");
        assert_eq!(eval(&cond, "test", false, &query), Verdict::True);
        assert_eq!(eval(&cond, "", false, &query), Verdict::False);
        assert_eq!(eval(&cond, "prod", false, &query), Verdict::False);
        // empty profile name matches anything
        assert_eq!(
            eval(&Condition::on_profile(""), "prod", false, &query),
            Verdict::True
        );
    }

    #[test]
    fn test_property_presence() {
        let query = empty_query();
        assert_eq!(
            eval(&Condition::on_property("server.port"), "", false, &query),
            Verdict::True
        );
        assert_eq!(
            eval(&Condition::on_property("server.host"), "", false, &query),
            Verdict::False
        );
        assert_eq!(
            eval(&Condition::on_missing_property("server.host"), "", false, &query),
            Verdict::True
        );
    }

    #[test]
    fn test_empty_and_is_true_empty_or_is_false() {
        let query = empty_query();
        assert_eq!(eval(&Condition::And(vec![]), "", false, &query), Verdict::True);
        assert_eq!(eval(&Condition::Or(vec![]), "", false, &query), Verdict::False);
    }

    #[test]
    fn test_composition_short_circuits() {
        let query = empty_query();
        let cond = Condition::on_property("server.port")
            .and(Condition::on_profile("dev"))
            .or(Condition::on_missing_property("server.host"));
        assert_eq!(eval(&cond, "", false, &query), Verdict::True);

        let negated = Condition::on_property("server.port").not();
        assert_eq!(eval(&negated, "", false, &query), Verdict::False);
    }

    #[test]
    fn test_on_bean_deferred_vs_immediate() {
        let query = FixedQuery {
            resolved: vec!["db"],
            undecided: vec!["cache"],
        };
        assert_eq!(eval(&Condition::on_bean("db"), "", true, &query), Verdict::True);
        assert_eq!(
            eval(&Condition::on_bean("cache"), "", true, &query),
            Verdict::Undecided
        );
        // immediate mode treats undecided as missing
        assert_eq!(
            eval(&Condition::on_bean("cache"), "", false, &query),
            Verdict::False
        );
        assert_eq!(
            eval(&Condition::on_missing_bean("cache"), "", false, &query),
            Verdict::True
        );
        assert_eq!(
            eval(&Condition::on_missing_bean("cache"), "", true, &query),
            Verdict::Undecided
        );
    }

    #[test]
    fn test_undecided_propagates_through_combinators() {
        let query = FixedQuery {
            resolved: vec![],
            undecided: vec!["cache"],
        };
        let and = Condition::on_bean("cache").and(Condition::on_profile(""));
        assert_eq!(eval(&and, "", true, &query), Verdict::Undecided);
        let or = Condition::on_bean("cache").or(Condition::on_profile("dev"));
        assert_eq!(eval(&or, "", true, &query), Verdict::Undecided);
        assert_eq!(
            eval(&Condition::on_bean("cache").not(), "", true, &query),
            Verdict::Undecided
        );
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(
            BeanSelector::parse("*app::Server"),
            BeanSelector::TypeName("app::Server".to_string())
        );
        assert_eq!(
            BeanSelector::parse("server"),
            BeanSelector::Name("server".to_string())
        );
    }
}
