pub mod binding;
pub mod condition;
pub mod context;
pub mod definition;

pub use binding::{BindArg, FactoryFn, MethodFn, OptionArg, OptionFactoryFn, Prop, TagGroups, VarArgs};
pub use condition::{BeanSelector, Condition, ConditionContext, Verdict};
pub use context::{ApplicationContext, BeanInfo};
pub use definition::{Autowired, Bean, BeanId, Capability};
