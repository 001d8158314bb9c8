use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::container::condition::Condition;
use crate::container::context::ApplicationContext;
use crate::errors::BeanError;
use crate::properties::BindExpr;

/// Per-parameter tag lists for one callable, parsed at registration time.
///
/// Tags are either all index-prefixed (`"1:${key}"`) or all unprefixed for a
/// given list; positions without a tag default to the empty tag. Only a
/// variadic tail parameter may receive more than one tag.
#[derive(Debug, Clone)]
pub struct TagGroups {
    groups: Vec<Vec<String>>,
}

impl TagGroups {
    /// Panics on malformed tag lists; tag lists are supplied at registration
    /// time, so misuse is a static bug.
    pub fn parse(tags: &[&str], arity: usize, variadic: bool) -> Self {
        let mut groups: Vec<Vec<String>> = vec![Vec::new(); arity];
        if tags.is_empty() {
            return Self { groups };
        }
        if arity == 0 {
            panic!("function takes no parameters but {} tags were given", tags.len());
        }

        let indexed = has_index(tags[0]);
        for tag in tags {
            if has_index(tag) != indexed {
                if indexed {
                    panic!("tag \"{}\" should have index", tag);
                }
                panic!("tag \"{}\" shouldn't have index", tag);
            }
        }

        if indexed {
            for tag in tags {
                let (head, rest) = tag.split_once(':').unwrap();
                let index: usize = head.parse().unwrap();
                if index >= arity {
                    panic!("indexed tag \"{}\" overflow, parameter count is {}", tag, arity);
                }
                groups[index].push(rest.to_string());
            }
        } else {
            if tags.len() > arity && !variadic {
                panic!(
                    "{} tags given but the function takes {} parameters",
                    tags.len(),
                    arity
                );
            }
            for (position, tag) in tags.iter().enumerate() {
                let slot = position.min(arity - 1);
                groups[slot].push(tag.to_string());
            }
        }

        for (index, group) in groups.iter().enumerate() {
            let tail = variadic && index + 1 == arity;
            if group.len() > 1 && !tail {
                panic!("index {} has {} tags", index, group.len());
            }
        }
        Self { groups }
    }

    pub fn group(&self, index: usize) -> &[String] {
        self.groups.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn arity(&self) -> usize {
        self.groups.len()
    }
}

fn has_index(tag: &str) -> bool {
    match tag.split_once(':') {
        Some((head, _)) => head.parse::<usize>().is_ok(),
        None => false,
    }
}

/// One bindable function parameter: either a configuration value (routed to
/// the property binder) or a bean reference (routed to the registry lookup).
pub trait BindArg: Sized {
    /// Marks a variadic tail parameter; only meaningful on the last position.
    const VARIADIC: bool = false;

    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError>;

    fn bind_group(ctx: &ApplicationContext, tags: &[String]) -> Result<Self, BeanError> {
        let tag = tags.first().map(String::as_str).unwrap_or("");
        Self::bind(ctx, tag)
    }
}

fn bind_value_tag<T: DeserializeOwned + Default>(
    ctx: &ApplicationContext,
    tag: &str,
) -> Result<T, BeanError> {
    if !BindExpr::is_value_tag(tag) {
        return Err(BeanError::configuration(format!(
            "value parameter requires a \"${{...}}\" binding tag, got \"{}\"",
            tag
        )));
    }
    ctx.bind_tag(tag)
}

macro_rules! impl_value_arg {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl BindArg for $ty {
                fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
                    bind_value_tag(ctx, tag)
                }
            }
        )+
    };
}

impl_value_arg!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);

impl<T: DeserializeOwned> BindArg for Vec<T> {
    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        bind_value_tag(ctx, tag)
    }
}

impl<T: DeserializeOwned> BindArg for HashMap<String, T> {
    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        bind_value_tag(ctx, tag)
    }
}

/// Wrapper binding a nested configuration struct from a property subtree.
#[derive(Debug, Clone, Default)]
pub struct Prop<T>(pub T);

impl<T> std::ops::Deref for Prop<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned + Default> BindArg for Prop<T> {
    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        bind_value_tag(ctx, tag).map(Prop)
    }
}

/// Required bean reference: capability lookup by `T`, optionally filtered by
/// the tag as a bean name. Zero candidates and ambiguous candidates are both
/// fatal; during wiring an undecided candidate defers the caller.
impl<T: ?Sized + Send + Sync + 'static> BindArg for Arc<T> {
    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        if BindExpr::is_value_tag(tag) {
            return Err(BeanError::configuration(format!(
                "reference parameter {} cannot use value tag \"{}\"",
                std::any::type_name::<T>(),
                tag
            )));
        }
        if let Some(name) = tag.strip_suffix('?') {
            return Err(BeanError::configuration(format!(
                "optional reference \"{}\" must bind to Option<Arc<_>>",
                name
            )));
        }
        ctx.find_one::<T>(tag)
    }
}

/// Optional bean reference: absence is a normal outcome, not an error.
impl<T: ?Sized + Send + Sync + 'static> BindArg for Option<Arc<T>> {
    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        let name = tag.strip_suffix('?').unwrap_or(tag);
        match ctx.find_one::<T>(name) {
            Ok(bean) => Ok(Some(bean)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Variadic tail parameter: zero or more tags, one bound element each.
#[derive(Debug, Clone, Default)]
pub struct VarArgs<T>(pub Vec<T>);

impl<T> std::ops::Deref for VarArgs<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T> IntoIterator for VarArgs<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T: BindArg> BindArg for VarArgs<T> {
    const VARIADIC: bool = true;

    fn bind(ctx: &ApplicationContext, tag: &str) -> Result<Self, BeanError> {
        T::bind(ctx, tag).map(|item| VarArgs(vec![item]))
    }

    fn bind_group(ctx: &ApplicationContext, tags: &[String]) -> Result<Self, BeanError> {
        let mut items = Vec::with_capacity(tags.len());
        for tag in tags {
            items.push(T::bind(ctx, tag)?);
        }
        Ok(VarArgs(items))
    }
}

macro_rules! count {
    () => (0usize);
    ($head:ident $(, $tail:ident)*) => (1usize + count!($($tail),*));
}

macro_rules! last_ty {
    ($last:ident) => ($last);
    ($head:ident, $($tail:ident),+) => (last_ty!($($tail),+));
}

/// A factory callable: binds its parameters from tag groups, then calls.
/// Implemented for functions of up to six bindable parameters returning
/// `Result`.
pub trait FactoryFn<Args, Out>: Send + Sync + 'static {
    const ARITY: usize;
    const VARIADIC_TAIL: bool;

    fn construct(&self, ctx: &ApplicationContext, tags: &TagGroups) -> Result<Out, BeanError>;
}

macro_rules! impl_factory_fn {
    () => {
        impl<Out, F> FactoryFn<(), Out> for F
        where
            F: Fn() -> Result<Out, BeanError> + Send + Sync + 'static,
        {
            const ARITY: usize = 0;
            const VARIADIC_TAIL: bool = false;

            fn construct(
                &self,
                _ctx: &ApplicationContext,
                _tags: &TagGroups,
            ) -> Result<Out, BeanError> {
                (self)()
            }
        }
    };
    ($($A:ident),+) => {
        impl<Out, F, $($A),+> FactoryFn<($($A,)+), Out> for F
        where
            F: Fn($($A),+) -> Result<Out, BeanError> + Send + Sync + 'static,
            $($A: BindArg,)+
        {
            const ARITY: usize = count!($($A),+);
            const VARIADIC_TAIL: bool = <last_ty!($($A),+) as BindArg>::VARIADIC;

            #[allow(non_snake_case)]
            fn construct(
                &self,
                ctx: &ApplicationContext,
                tags: &TagGroups,
            ) -> Result<Out, BeanError> {
                let mut slot = 0usize;
                $(
                    let $A = <$A as BindArg>::bind_group(ctx, tags.group(slot))?;
                    slot += 1;
                )+
                let _ = slot;
                (self)($($A),+)
            }
        }
    };
}

impl_factory_fn!();
impl_factory_fn!(A1);
impl_factory_fn!(A1, A2);
impl_factory_fn!(A1, A2, A3);
impl_factory_fn!(A1, A2, A3, A4);
impl_factory_fn!(A1, A2, A3, A4, A5);
impl_factory_fn!(A1, A2, A3, A4, A5, A6);

/// A callable invoked with an already-resolved parent bean as receiver, used
/// by method (child) beans.
pub trait MethodFn<P, Args, Out>: Send + Sync + 'static {
    const ARITY: usize;
    const VARIADIC_TAIL: bool;

    fn construct(
        &self,
        ctx: &ApplicationContext,
        parent: Arc<P>,
        tags: &TagGroups,
    ) -> Result<Out, BeanError>;
}

macro_rules! impl_method_fn {
    () => {
        impl<P, Out, F> MethodFn<P, (), Out> for F
        where
            P: Send + Sync + 'static,
            F: Fn(Arc<P>) -> Result<Out, BeanError> + Send + Sync + 'static,
        {
            const ARITY: usize = 0;
            const VARIADIC_TAIL: bool = false;

            fn construct(
                &self,
                _ctx: &ApplicationContext,
                parent: Arc<P>,
                _tags: &TagGroups,
            ) -> Result<Out, BeanError> {
                (self)(parent)
            }
        }
    };
    ($($A:ident),+) => {
        impl<P, Out, F, $($A),+> MethodFn<P, ($($A,)+), Out> for F
        where
            P: Send + Sync + 'static,
            F: Fn(Arc<P>, $($A),+) -> Result<Out, BeanError> + Send + Sync + 'static,
            $($A: BindArg,)+
        {
            const ARITY: usize = count!($($A),+);
            const VARIADIC_TAIL: bool = <last_ty!($($A),+) as BindArg>::VARIADIC;

            #[allow(non_snake_case)]
            fn construct(
                &self,
                ctx: &ApplicationContext,
                parent: Arc<P>,
                tags: &TagGroups,
            ) -> Result<Out, BeanError> {
                let mut slot = 0usize;
                $(
                    let $A = <$A as BindArg>::bind_group(ctx, tags.group(slot))?;
                    slot += 1;
                )+
                let _ = slot;
                (self)(parent, $($A),+)
            }
        }
    };
}

impl_method_fn!();
impl_method_fn!(A1);
impl_method_fn!(A1, A2);
impl_method_fn!(A1, A2, A3);
impl_method_fn!(A1, A2, A3, A4);

/// A factory whose trailing `Vec` parameter collects option-pattern values
/// produced by the surviving [`OptionArg`]s.
pub trait OptionFactoryFn<Args, O, Out>: Send + Sync + 'static {
    const ARITY: usize;
    const VARIADIC_TAIL: bool;

    fn construct(
        &self,
        ctx: &ApplicationContext,
        tags: &TagGroups,
        options: &[OptionArg<O>],
    ) -> Result<Out, BeanError>;
}

macro_rules! impl_option_factory_fn {
    () => {
        impl<O, Out, F> OptionFactoryFn<(), O, Out> for F
        where
            O: 'static,
            F: Fn(Vec<O>) -> Result<Out, BeanError> + Send + Sync + 'static,
        {
            const ARITY: usize = 0;
            const VARIADIC_TAIL: bool = false;

            fn construct(
                &self,
                ctx: &ApplicationContext,
                _tags: &TagGroups,
                options: &[OptionArg<O>],
            ) -> Result<Out, BeanError> {
                (self)(produce_options(ctx, options)?)
            }
        }
    };
    ($($A:ident),+) => {
        impl<O, Out, F, $($A),+> OptionFactoryFn<($($A,)+), O, Out> for F
        where
            O: 'static,
            F: Fn($($A,)+ Vec<O>) -> Result<Out, BeanError> + Send + Sync + 'static,
            $($A: BindArg,)+
        {
            const ARITY: usize = count!($($A),+);
            const VARIADIC_TAIL: bool = <last_ty!($($A),+) as BindArg>::VARIADIC;

            #[allow(non_snake_case)]
            fn construct(
                &self,
                ctx: &ApplicationContext,
                tags: &TagGroups,
                options: &[OptionArg<O>],
            ) -> Result<Out, BeanError> {
                let mut slot = 0usize;
                $(
                    let $A = <$A as BindArg>::bind_group(ctx, tags.group(slot))?;
                    slot += 1;
                )+
                let _ = slot;
                (self)($($A,)+ produce_options(ctx, options)?)
            }
        }
    };
}

impl_option_factory_fn!();
impl_option_factory_fn!(A1);
impl_option_factory_fn!(A1, A2);
impl_option_factory_fn!(A1, A2, A3);
impl_option_factory_fn!(A1, A2, A3, A4);

fn produce_options<O: 'static>(
    ctx: &ApplicationContext,
    options: &[OptionArg<O>],
) -> Result<Vec<O>, BeanError> {
    let mut values = Vec::with_capacity(options.len());
    for option in options {
        if let Some(value) = option.produce(ctx)? {
            values.push(value);
        }
    }
    Ok(values)
}

/// An option-pattern argument with its own independent condition. When the
/// condition does not match, the option is silently omitted from the call
/// list; this is not an error.
pub struct OptionArg<O> {
    condition: Option<Condition>,
    factory: Box<dyn Fn(&ApplicationContext) -> Result<O, BeanError> + Send + Sync>,
}

impl<O: 'static> OptionArg<O> {
    pub fn new<Args, F>(factory: F, tags: &[&str]) -> Self
    where
        F: FactoryFn<Args, O>,
    {
        let groups = TagGroups::parse(
            tags,
            <F as FactoryFn<Args, O>>::ARITY,
            <F as FactoryFn<Args, O>>::VARIADIC_TAIL,
        );
        Self {
            condition: None,
            factory: Box::new(move |ctx| factory.construct(ctx, &groups)),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub(crate) fn produce(&self, ctx: &ApplicationContext) -> Result<Option<O>, BeanError> {
        if let Some(condition) = &self.condition {
            if !ctx.condition_matches(condition) {
                return Ok(None);
            }
        }
        (self.factory)(ctx).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unindexed_tags_fill_positions_in_order() {
        let groups = TagGroups::parse(&["${a}", "db"], 2, false);
        assert_eq!(groups.group(0), ["${a}"]);
        assert_eq!(groups.group(1), ["db"]);
    }

    #[test]
    fn test_missing_tags_default_to_empty_group() {
        let groups = TagGroups::parse(&[], 3, false);
        assert_eq!(groups.arity(), 3);
        assert!(groups.group(0).is_empty());
        assert!(groups.group(2).is_empty());
    }

    #[test]
    fn test_indexed_tags_bind_out_of_order() {
        let groups = TagGroups::parse(&["1:${b}", "0:${a}"], 2, false);
        assert_eq!(groups.group(0), ["${a}"]);
        assert_eq!(groups.group(1), ["${b}"]);
    }

    #[test]
    fn test_variadic_tail_collects_extra_tags() {
        let groups = TagGroups::parse(&["${a}", "one", "two", "three"], 2, true);
        assert_eq!(groups.group(0), ["${a}"]);
        assert_eq!(groups.group(1), ["one", "two", "three"]);
    }

    #[test]
    fn test_indexed_variadic_tail_accepts_repeats() {
        let groups = TagGroups::parse(&["1:one", "1:two", "0:${a}"], 2, true);
        assert_eq!(groups.group(1), ["one", "two"]);
    }

    #[test]
    #[should_panic(expected = "should have index")]
    fn test_mixed_tags_after_indexed_panic() {
        TagGroups::parse(&["0:${a}", "${b}"], 2, false);
    }

    #[test]
    #[should_panic(expected = "shouldn't have index")]
    fn test_mixed_tags_after_unindexed_panic() {
        TagGroups::parse(&["${a}", "1:${b}"], 2, false);
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_indexed_tag_overflow_panics() {
        TagGroups::parse(&["2:${a}"], 2, false);
    }

    #[test]
    #[should_panic(expected = "has 2 tags")]
    fn test_duplicate_index_on_fixed_parameter_panics() {
        TagGroups::parse(&["0:${a}", "0:${b}"], 2, false);
    }

    #[test]
    #[should_panic(expected = "takes 1 parameters")]
    fn test_too_many_unindexed_tags_panic() {
        TagGroups::parse(&["${a}", "${b}"], 1, false);
    }

    #[test]
    fn test_value_tags_are_not_mistaken_for_indexed() {
        // "${a:=1}" contains ':' but its prefix is not an integer
        let groups = TagGroups::parse(&["${a:=1}"], 1, false);
        assert_eq!(groups.group(0), ["${a:=1}"]);
    }
}
