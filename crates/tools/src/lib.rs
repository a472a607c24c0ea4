//! Tool registry and dispatch
//!
//! The registry is static, process-wide, and read-only after initialization.
//! Each session gets its own `ToolDispatcher` carrying the session identity,
//! so dispatches are testable in isolation and nothing is captured in hidden
//! closures.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::ToolDispatcher;
pub use registry::{registry, ToolRegistry};
