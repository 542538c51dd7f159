//! Control plane
//!
//! The controller wires the registry, engines, synchronizer, orchestrator,
//! and planner together behind one API used by both the HTTP surface and
//! the CLI.

mod controller;
mod errors;

pub use controller::{Controller, ReshardRequest};
pub use errors::{ControlError, ControlResult};
