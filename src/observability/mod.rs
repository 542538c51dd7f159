//! Observability
//!
//! Structured JSON logging with typed events. Logging is read-only with
//! respect to registry and migration state and never influences routing
//! or chunk scheduling.

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};
