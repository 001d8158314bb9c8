use std::any::TypeId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::container::binding::{BindArg, FactoryFn, TagGroups};
use crate::container::condition::{BeanQuery, BeanSelector, Condition, ConditionContext, Verdict};
use crate::container::definition::{Bean, BeanDefinition, BeanId, Decision, Recipe};
use crate::errors::BeanError;
use crate::properties::{bind_value, LayeredProperties, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Registration,
    Wiring,
    Wired,
}

enum Step {
    Decided,
    Deferred,
}

/// Introspection record for one surviving bean.
#[derive(Debug, Clone)]
pub struct BeanInfo {
    pub name: String,
    pub type_name: &'static str,
}

/// Owns the property state and the bean registry.
///
/// Registration and `auto_wire` take `&mut self`; after wiring the registry
/// is immutable and every lookup is `&self`, so a wired context can be shared
/// behind an `Arc` across threads without further locking.
pub struct ApplicationContext {
    profile: String,
    properties: Properties,
    snapshot: Properties,
    definitions: Vec<BeanDefinition>,
    resolved_order: Vec<usize>,
    phase: Phase,
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self {
            profile: String::new(),
            properties: Properties::new(),
            snapshot: Properties::new(),
            definitions: Vec::new(),
            resolved_order: Vec::new(),
            phase: Phase::Registration,
        }
    }

    /// Store a bean definition and return its stable handle.
    ///
    /// Panics when called after `auto_wire`; late registration is a static
    /// bug in the embedding application.
    pub fn register<T: Send + Sync + 'static>(&mut self, bean: Bean<T>) -> BeanId {
        if self.phase != Phase::Registration {
            panic!("bean registration is frozen after auto_wire");
        }
        let definition = bean.into_definition();
        debug!(bean = %definition.name, ty = definition.primary_type, "bean registered");
        self.definitions.push(definition);
        BeanId(self.definitions.len() - 1)
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.profile = profile.into();
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Set a code-level property; the highest-priority configuration layer.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if self.phase != Phase::Registration {
            panic!("properties are frozen after auto_wire");
        }
        self.properties.set(key, value);
    }

    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.bound_properties().get(key)
    }

    pub fn properties(&self) -> &Properties {
        self.bound_properties()
    }

    /// Bind a `${key}` / `${key:=default}` expression into a typed value.
    pub fn bind_property<T: DeserializeOwned + Default>(&self, tag: &str) -> Result<T, BeanError> {
        self.bind_tag(tag)
    }

    /// Bind a single parameter the same way constructor arguments bind:
    /// value tags go to the property binder, anything else is a bean lookup.
    pub fn wire<A: BindArg>(&self, tag: &str) -> Result<A, BeanError> {
        A::bind(self, tag)
    }

    /// The single resolution pass: flatten properties, order definitions by
    /// their `before`/`after` hints, then run the condition/construction
    /// worklist to a fixed point. Calling again after a successful pass is a
    /// no-op.
    pub fn auto_wire(&mut self) -> Result<(), BeanError> {
        match self.phase {
            Phase::Wired => return Ok(()),
            Phase::Wiring => {
                return Err(BeanError::configuration(
                    "a previous auto_wire call failed; the context is unusable",
                ))
            }
            Phase::Registration => {}
        }
        let mut layered = LayeredProperties::new();
        layered.push(self.properties.clone());
        self.snapshot = layered.flatten()?;
        self.phase = Phase::Wiring;

        let mut queue: VecDeque<usize> = self.hint_order()?.into_iter().collect();
        debug!(definitions = queue.len(), profile = %self.profile, "wiring beans");
        while !queue.is_empty() {
            let mut progressed = false;
            for _ in 0..queue.len() {
                let Some(idx) = queue.pop_front() else { break };
                match self.decide(idx)? {
                    Step::Decided => progressed = true,
                    Step::Deferred => queue.push_back(idx),
                }
            }
            if !progressed {
                let path = queue
                    .iter()
                    .map(|&idx| self.definitions[idx].name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(BeanError::ConditionCycle { path });
            }
        }
        self.phase = Phase::Wired;
        debug!(resolved = self.resolved_order.len(), "wiring complete");
        Ok(())
    }

    /// Exactly one live bean assignable to `T`: zero is `BeanNotFound`, more
    /// than one is `Ambiguous` with all candidate names.
    pub fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BeanError> {
        self.get_bean_named("")
    }

    pub fn get_bean_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, BeanError> {
        if self.phase != Phase::Wired {
            return Err(BeanError::NotWired);
        }
        self.find_one::<T>(name)
    }

    /// Absence-tolerant lookup; `None` covers not-found and ambiguity alike.
    pub fn try_get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_bean().ok()
    }

    pub fn try_get_bean_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.get_bean_named(name).ok()
    }

    /// All resolved beans exporting `T`, in resolution order.
    pub fn get_beans<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let target = TypeId::of::<T>();
        let mut beans = Vec::new();
        for &idx in &self.resolved_order {
            let def = &self.definitions[idx];
            let Some(cap) = def.capabilities.iter().find(|cap| cap.type_id == target) else {
                continue;
            };
            if let Decision::Resolved(value) = &def.decision {
                if let Some(bean) = cap.extract::<T>(value) {
                    beans.push(bean);
                }
            }
        }
        beans
    }

    /// Surviving definitions, in resolution order.
    pub fn bean_definitions(&self) -> Vec<BeanInfo> {
        self.resolved_order
            .iter()
            .map(|&idx| {
                let def = &self.definitions[idx];
                BeanInfo {
                    name: def.name.clone(),
                    type_name: def.primary_type,
                }
            })
            .collect()
    }

    /// Bind and call an arbitrary function with the constructor binder.
    pub fn invoke<Args, Out, F>(&self, function: F, tags: &[&str]) -> Result<Out, BeanError>
    where
        F: FactoryFn<Args, Out>,
    {
        if self.phase != Phase::Wired {
            return Err(BeanError::NotWired);
        }
        let groups = TagGroups::parse(
            tags,
            <F as FactoryFn<Args, Out>>::ARITY,
            <F as FactoryFn<Args, Out>>::VARIADIC_TAIL,
        );
        function.construct(self, &groups)
    }

    fn decide(&mut self, idx: usize) -> Result<Step, BeanError> {
        let parent = match &self.definitions[idx].recipe {
            Recipe::Method { parent, .. } => Some(*parent),
            _ => None,
        };
        if let Some(parent) = parent {
            match &self.definitions[parent.0].decision {
                Decision::Excluded => {
                    // an excluded parent takes the child with it, the child's
                    // own condition notwithstanding
                    self.definitions[idx].decision = Decision::Excluded;
                    debug!(bean = %self.definitions[idx].name, "bean excluded with its parent");
                    return Ok(Step::Decided);
                }
                Decision::Undecided => return Ok(Step::Deferred),
                Decision::Resolved(_) => {}
            }
        }

        let verdict = match &self.definitions[idx].condition {
            Some(condition) => self.evaluate_condition(condition, true),
            None => Verdict::True,
        };
        match verdict {
            Verdict::Undecided => return Ok(Step::Deferred),
            Verdict::False => {
                self.definitions[idx].decision = Decision::Excluded;
                debug!(bean = %self.definitions[idx].name, "bean excluded by condition");
                return Ok(Step::Decided);
            }
            Verdict::True => {}
        }

        let value = match self.construct(idx) {
            Ok(value) => value,
            Err(err) if err.is_pending() => return Ok(Step::Deferred),
            Err(err) => return Err(err),
        };
        self.definitions[idx].decision = Decision::Resolved(value);
        self.resolved_order.push(idx);
        debug!(bean = %self.definitions[idx].name, "bean resolved");
        Ok(Step::Decided)
    }

    fn construct(&self, idx: usize) -> Result<crate::container::definition::BeanValue, BeanError> {
        match &self.definitions[idx].recipe {
            Recipe::Instance(value) => Ok(value.clone()),
            Recipe::Factory(build) => build(self),
            Recipe::Method { parent, construct } => {
                match &self.definitions[parent.0].decision {
                    Decision::Resolved(parent_value) => construct(self, parent_value),
                    _ => Err(BeanError::pending(self.definitions[parent.0].name.clone())),
                }
            }
        }
    }

    /// Stable topological order of the registration sequence under the
    /// `before`/`after` hints; ties resolve to the lower registration index.
    fn hint_order(&self) -> Result<Vec<usize>, BeanError> {
        let n = self.definitions.len();
        fn add_edge(edges: &mut [Vec<usize>], indegree: &mut [usize], from: usize, to: usize) {
            if from != to && !edges[from].contains(&to) {
                edges[from].push(to);
                indegree[to] += 1;
            }
        }
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut indegree = vec![0usize; n];
        for (i, def) in self.definitions.iter().enumerate() {
            for raw in &def.before {
                let selector = BeanSelector::parse(raw);
                for (j, other) in self.definitions.iter().enumerate() {
                    if selector.matches(&other.name, &other.capabilities) {
                        add_edge(&mut edges, &mut indegree, i, j);
                    }
                }
            }
            for raw in &def.after {
                let selector = BeanSelector::parse(raw);
                for (j, other) in self.definitions.iter().enumerate() {
                    if selector.matches(&other.name, &other.capabilities) {
                        add_edge(&mut edges, &mut indegree, j, i);
                    }
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &edges[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }
        if order.len() != n {
            let path = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.definitions[i].name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(BeanError::OrderingCycle { path });
        }
        Ok(order)
    }

    pub(crate) fn evaluate_condition(&self, condition: &Condition, deferred: bool) -> Verdict {
        let query = RegistryQuery {
            definitions: &self.definitions,
        };
        let cctx = ConditionContext {
            profile: &self.profile,
            properties: self.bound_properties(),
            beans: &query,
            include_undecided: deferred,
        };
        condition.evaluate(&cctx)
    }

    pub(crate) fn condition_matches(&self, condition: &Condition) -> bool {
        self.evaluate_condition(condition, false) == Verdict::True
    }

    pub(crate) fn bind_tag<T: DeserializeOwned + Default>(&self, tag: &str) -> Result<T, BeanError> {
        bind_value(self.bound_properties(), tag)
    }

    fn bound_properties(&self) -> &Properties {
        match self.phase {
            Phase::Registration => &self.properties,
            _ => &self.snapshot,
        }
    }

    /// Single-candidate lookup shared by `get_bean` and reference binding.
    ///
    /// During wiring, a lookup that can still be satisfied (or made
    /// ambiguous) by an undecided definition reports `Pending` so the caller
    /// is re-queued; this keeps the outcome independent of visit order.
    pub(crate) fn find_one<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, BeanError> {
        let target = TypeId::of::<T>();
        let selector = if name.is_empty() {
            std::any::type_name::<T>().to_string()
        } else {
            name.to_string()
        };
        let mut resolved: Vec<(&BeanDefinition, Arc<T>)> = Vec::new();
        let mut undecided = 0usize;
        for def in &self.definitions {
            if !name.is_empty() && def.name != name {
                continue;
            }
            let Some(cap) = def.capabilities.iter().find(|cap| cap.type_id == target) else {
                continue;
            };
            match &def.decision {
                Decision::Resolved(value) => {
                    if let Some(bean) = cap.extract::<T>(value) {
                        resolved.push((def, bean));
                    }
                }
                Decision::Undecided => undecided += 1,
                Decision::Excluded => {}
            }
        }
        let wiring = self.phase == Phase::Wiring;
        match resolved.len() {
            1 if undecided == 0 || !wiring => Ok(resolved.swap_remove(0).1),
            1 => Err(BeanError::pending(selector)),
            0 if undecided > 0 && wiring => Err(BeanError::pending(selector)),
            0 => Err(BeanError::bean_not_found(selector)),
            _ => Err(BeanError::Ambiguous {
                selector,
                candidates: resolved.iter().map(|(def, _)| def.name.clone()).collect(),
            }),
        }
    }
}

struct RegistryQuery<'a> {
    definitions: &'a [BeanDefinition],
}

impl BeanQuery for RegistryQuery<'_> {
    fn any_resolved(&self, selector: &BeanSelector) -> bool {
        self.definitions.iter().any(|def| {
            matches!(def.decision, Decision::Resolved(_))
                && selector.matches(&def.name, &def.capabilities)
        })
    }

    fn any_undecided(&self, selector: &BeanSelector) -> bool {
        self.definitions.iter().any(|def| {
            matches!(def.decision, Decision::Undecided)
                && selector.matches(&def.name, &def.capabilities)
        })
    }
}
