use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::binding::{FactoryFn, MethodFn, OptionArg, OptionFactoryFn, TagGroups};
use crate::container::condition::Condition;
use crate::container::context::ApplicationContext;
use crate::errors::BeanError;

/// Type-erased bean instance shared by the context and every referencing bean.
pub type BeanValue = Arc<dyn Any + Send + Sync>;

/// Stable handle returned by registration, usable as a parent reference for
/// method beans and in `before`/`after` hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeanId(pub(crate) usize);

/// One abstract type a bean can be looked up as, computed at registration
/// time. The caster turns the erased instance into `Arc<U>` for the exported
/// type `U`; lookups filter this index instead of inspecting instances.
pub struct Capability {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    cast: Box<dyn Fn(&BeanValue) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>,
}

impl Capability {
    pub fn of<T, U>(cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        T: Send + Sync + 'static,
        U: ?Sized + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            cast: Box::new(move |value| {
                let concrete = value.clone().downcast::<T>().ok()?;
                Some(Box::new(cast(concrete)) as Box<dyn Any + Send + Sync>)
            }),
        }
    }

    pub fn identity<T: Send + Sync + 'static>() -> Self {
        Self::of::<T, T>(|value| value)
    }

    pub(crate) fn extract<U: ?Sized + Send + Sync + 'static>(&self, value: &BeanValue) -> Option<Arc<U>> {
        let boxed = (self.cast)(value)?;
        boxed.downcast::<Arc<U>>().ok().map(|arc| *arc)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// How a bean instance is produced.
pub(crate) enum Recipe {
    /// An object supplied at registration time.
    Instance(BeanValue),
    /// A factory function with per-parameter bindings.
    Factory(ConstructFn),
    /// A function invoked with an already-resolved parent bean as receiver.
    Method {
        parent: BeanId,
        construct: MethodConstructFn,
    },
}

pub(crate) type ConstructFn =
    Box<dyn Fn(&ApplicationContext) -> Result<BeanValue, BeanError> + Send + Sync>;
pub(crate) type MethodConstructFn =
    Box<dyn Fn(&ApplicationContext, &BeanValue) -> Result<BeanValue, BeanError> + Send + Sync>;

/// Resolution state of a registered definition. Decided at most once; the
/// final state is immutable.
pub(crate) enum Decision {
    Undecided,
    Excluded,
    Resolved(BeanValue),
}

/// Immutable-after-registration description of one constructible component.
pub(crate) struct BeanDefinition {
    pub(crate) name: String,
    pub(crate) primary_type: &'static str,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) recipe: Recipe,
    pub(crate) condition: Option<Condition>,
    pub(crate) before: Vec<String>,
    pub(crate) after: Vec<String>,
    pub(crate) decision: Decision,
}

/// Structs assembled field by field through the context's binder instead of
/// an explicit factory closure.
pub trait Autowired: Sized + Send + Sync + 'static {
    fn assemble(ctx: &ApplicationContext) -> Result<Self, BeanError>;
}

/// Typed builder for one bean definition.
pub struct Bean<T: Send + Sync + 'static> {
    name: String,
    capabilities: Vec<Capability>,
    recipe: Recipe,
    condition: Option<Condition>,
    before: Vec<String>,
    after: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Bean<T> {
    fn with_recipe(recipe: Recipe) -> Self {
        Self {
            name: default_bean_name::<T>(),
            capabilities: vec![Capability::identity::<T>()],
            recipe,
            condition: None,
            before: Vec::new(),
            after: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Register an existing object.
    pub fn object(value: T) -> Self {
        Self::with_recipe(Recipe::Instance(Arc::new(value)))
    }

    /// Register a factory function; every parameter binds with an empty tag
    /// (type lookup for references).
    pub fn factory<Args, F>(factory: F) -> Self
    where
        F: FactoryFn<Args, T>,
    {
        Self::factory_with(factory, &[])
    }

    /// Register a factory function with per-parameter binding tags.
    ///
    /// Panics on malformed tag lists (index/no-index mixing, overflow), the
    /// same way misuse of the registration API does elsewhere.
    pub fn factory_with<Args, F>(factory: F, tags: &[&str]) -> Self
    where
        F: FactoryFn<Args, T>,
    {
        let groups = TagGroups::parse(
            tags,
            <F as FactoryFn<Args, T>>::ARITY,
            <F as FactoryFn<Args, T>>::VARIADIC_TAIL,
        );
        Self::with_recipe(Recipe::Factory(Box::new(move |ctx| {
            factory
                .construct(ctx, &groups)
                .map(|value| Arc::new(value) as BeanValue)
        })))
    }

    /// Register a factory whose trailing `Vec` parameter collects
    /// option-pattern values; each option carries its own condition and is
    /// silently omitted when that condition does not match.
    pub fn factory_opts<Args, O, F>(factory: F, tags: &[&str], options: Vec<OptionArg<O>>) -> Self
    where
        O: 'static,
        F: OptionFactoryFn<Args, O, T>,
    {
        let groups = TagGroups::parse(
            tags,
            <F as OptionFactoryFn<Args, O, T>>::ARITY,
            <F as OptionFactoryFn<Args, O, T>>::VARIADIC_TAIL,
        );
        Self::with_recipe(Recipe::Factory(Box::new(move |ctx| {
            factory
                .construct(ctx, &groups, &options)
                .map(|value| Arc::new(value) as BeanValue)
        })))
    }

    /// Register a child bean produced by invoking a function with an
    /// already-resolved parent bean as receiver. The child is excluded
    /// unconditionally when the parent is excluded.
    pub fn method<P, Args, F>(parent: BeanId, method: F) -> Self
    where
        P: Send + Sync + 'static,
        F: MethodFn<P, Args, T>,
    {
        Self::method_with(parent, method, &[])
    }

    pub fn method_with<P, Args, F>(parent: BeanId, method: F, tags: &[&str]) -> Self
    where
        P: Send + Sync + 'static,
        F: MethodFn<P, Args, T>,
    {
        let groups = TagGroups::parse(
            tags,
            <F as MethodFn<P, Args, T>>::ARITY,
            <F as MethodFn<P, Args, T>>::VARIADIC_TAIL,
        );
        Self::with_recipe(Recipe::Method {
            parent,
            construct: Box::new(move |ctx, parent_value| {
                let receiver = parent_value.clone().downcast::<P>().map_err(|_| {
                    BeanError::configuration(format!(
                        "parent bean is not a {}",
                        std::any::type_name::<P>()
                    ))
                })?;
                method
                    .construct(ctx, receiver, &groups)
                    .map(|value| Arc::new(value) as BeanValue)
            }),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Export an additional lookup type, usually a trait object.
    pub fn export<U>(mut self, cast: fn(Arc<T>) -> Arc<U>) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
    {
        self.capabilities.push(Capability::of::<T, U>(cast));
        self
    }

    /// Ordering hint: resolve this definition before the selected ones.
    pub fn before(mut self, selectors: &[&str]) -> Self {
        self.before.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    /// Ordering hint: resolve this definition after the selected ones.
    pub fn after(mut self, selectors: &[&str]) -> Self {
        self.after.extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub(crate) fn into_definition(self) -> BeanDefinition {
        BeanDefinition {
            name: self.name,
            primary_type: std::any::type_name::<T>(),
            capabilities: self.capabilities,
            recipe: self.recipe,
            condition: self.condition,
            before: self.before,
            after: self.after,
            decision: Decision::Undecided,
        }
    }
}

impl<T: Autowired> Bean<T> {
    /// Register a struct assembled field by field through the binder.
    pub fn autowired() -> Self {
        Self::with_recipe(Recipe::Factory(Box::new(|ctx| {
            T::assemble(ctx).map(|value| Arc::new(value) as BeanValue)
        })))
    }
}

/// Default bean name: the last path segment of the concrete type name,
/// with any generic argument list stripped.
fn default_bean_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
