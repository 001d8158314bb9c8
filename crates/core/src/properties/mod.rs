pub mod expr;
pub mod layered;
pub mod store;

pub use expr::*;
pub use layered::*;
pub use store::*;
