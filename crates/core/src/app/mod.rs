pub mod application;
pub mod banner;
pub mod lifecycle;

pub use application::{Application, ApplicationEvent, CommandLineRunner};
pub use banner::BannerMode;
pub use lifecycle::ShutdownHandle;
