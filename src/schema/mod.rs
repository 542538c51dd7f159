//! Logical schema catalog
//!
//! The catalog is the authoritative column set and schema version of the
//! logical table. DDL is validated here first; propagation to shards is
//! the synchronizer's job and is eventually consistent per shard.

mod ddl;
mod errors;
mod types;

pub use ddl::DdlChange;
pub use errors::{SchemaError, SchemaResult};
pub use types::{ColumnDef, ColumnType, LogicalTable};
