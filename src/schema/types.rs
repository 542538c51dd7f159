//! Logical table definition
//!
//! The logical table is the application-visible table whose rows are
//! distributed across shards. Its column set changes only through DDL
//! requests, and every change bumps a monotonic schema version that the
//! synchronizer propagates shard by shard.

use super::ddl::DdlChange;
use super::errors::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};

/// Supported column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// 64-bit floating point
    Float,
}

impl ColumnType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Bool => "bool",
            ColumnType::Float => "float",
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Column data type
    pub column_type: ColumnType,
    /// Whether the column accepts null
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a non-nullable string column
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::String,
            nullable: false,
        }
    }

    /// Create a non-nullable int column
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Int,
            nullable: false,
        }
    }

    /// Create a nullable column of the given type
    pub fn nullable(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }
}

/// The logical table: name, columns, partition key, schema version.
///
/// `version` increases by exactly one per applied DDL change. A query is
/// fully servable only when every consulted shard has applied this
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalTable {
    /// Table name
    pub name: String,
    /// Partition key column (primary key)
    pub key_column: String,
    /// Column definitions
    pub columns: Vec<ColumnDef>,
    /// Current schema version (monotonic)
    pub version: u64,
}

impl LogicalTable {
    /// Create a table at schema version 1.
    pub fn new(
        name: impl Into<String>,
        key_column: impl Into<String>,
        columns: Vec<ColumnDef>,
    ) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            columns,
            version: 1,
        }
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Validates the table structure itself.
    pub fn validate_structure(&self) -> SchemaResult<()> {
        let key = self.column(&self.key_column).ok_or_else(|| {
            SchemaError::invalid_table(format!(
                "key column '{}' is not defined",
                self.key_column
            ))
        })?;
        if key.nullable {
            return Err(SchemaError::invalid_table(format!(
                "key column '{}' must not be nullable",
                self.key_column
            )));
        }
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(SchemaError::DuplicateColumn {
                    column: col.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply a DDL change, returning the new schema version.
    ///
    /// The change is validated against the current column set; a rejected
    /// change leaves the table untouched.
    pub fn apply_ddl(&mut self, change: &DdlChange) -> SchemaResult<u64> {
        match change {
            DdlChange::AddColumn { column } => {
                if self.column(&column.name).is_some() {
                    return Err(SchemaError::DuplicateColumn {
                        column: column.name.clone(),
                    });
                }
                if !column.nullable {
                    // Existing rows cannot be backfilled, so added columns
                    // must accept null.
                    return Err(SchemaError::invalid_table(format!(
                        "added column '{}' must be nullable",
                        column.name
                    )));
                }
                self.columns.push(column.clone());
            }
            DdlChange::DropColumn { name } => {
                if name == &self.key_column {
                    return Err(SchemaError::KeyColumnImmutable {
                        column: name.clone(),
                    });
                }
                let pos = self
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| SchemaError::UnknownColumn {
                        column: name.clone(),
                    })?;
                self.columns.remove(pos);
            }
        }
        self.version += 1;
        Ok(self.version)
    }
}
