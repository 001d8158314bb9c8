pub mod app;
pub mod container;
pub mod errors;
pub mod properties;

// Re-export key types for convenience (specific exports to avoid ambiguity)
pub use app::{Application, ApplicationEvent, BannerMode, CommandLineRunner, ShutdownHandle};
pub use container::{
    ApplicationContext, Autowired, Bean, BeanId, BeanInfo, BeanSelector, BindArg, Condition,
    OptionArg, Prop, VarArgs, Verdict,
};
pub use errors::BeanError;
pub use properties::{BindExpr, LayeredProperties, Properties};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "sprout";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
