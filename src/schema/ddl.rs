//! DDL change types
//!
//! A `DdlChange` is issued once against the logical table and then
//! propagated to every shard by the synchronizer. Changes are recorded in
//! a per-version change log so that a shard that missed one can replay
//! every change in order.

use super::types::{ColumnDef, ColumnType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A schema change request against the logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DdlChange {
    /// Add a column (must be nullable; existing rows serve it as null)
    AddColumn {
        /// The column to add
        column: ColumnDef,
    },
    /// Drop a column (the key column cannot be dropped)
    DropColumn {
        /// Name of the column to drop
        name: String,
    },
}

impl DdlChange {
    /// Add a nullable column of the given type.
    pub fn add_nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::AddColumn {
            column: ColumnDef::nullable(name, column_type),
        }
    }

    /// Drop a column by name.
    pub fn drop_column(name: impl Into<String>) -> Self {
        Self::DropColumn { name: name.into() }
    }
}

impl fmt::Display for DdlChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlChange::AddColumn { column } => write!(
                f,
                "add column {} {}",
                column.name,
                column.column_type.type_name()
            ),
            DdlChange::DropColumn { name } => write!(f, "drop column {}", name),
        }
    }
}
