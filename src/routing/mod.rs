//! Query routing
//!
//! Translates partition-key predicates into the minimal set of shards a
//! query must visit, against one immutable registry snapshot.

mod errors;
mod planner;
mod predicate;

pub use errors::{RoutingError, RoutingResult};
pub use planner::{RouteMode, RoutePlan, RouteTarget, RoutingPlanner};
pub use predicate::{CmpOp, KeyInterval, Predicate};
