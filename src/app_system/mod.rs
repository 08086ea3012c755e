//! Configuration, tracing, context wiring, startup and shutdown.

pub mod config;
pub mod context;
pub mod system;
pub mod tracing;

pub use self::config::*;
pub use self::context::*;
pub use self::system::*;
pub use self::tracing::*;
