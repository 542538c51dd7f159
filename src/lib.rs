//! keyspan - online resharding and routing for range-partitioned tables
//!
//! One logical table, split into contiguous key ranges across shards.
//! Applications keep reading and writing the logical table while shards
//! are attached, detached, migrated, and their schemas evolved.

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod http_server;
pub mod migrate;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod schema;
pub mod sync;
