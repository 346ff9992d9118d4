//! In-memory tabular buffer staged before a bulk copy.

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::value::{SqlValue, StorageType};
use crate::error::{DalError, Result};

/// Destination table of a bulk copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    /// Unqualified table name, resolved against the login's default schema.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    /// Bracket-quoted form for SQL text: `[schema].[table]` or `[table]`.
    pub fn quoted(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => qualify_mssql(schema, &self.table),
            None => quote_mssql(&self.table),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => f.write_str(&self.table),
        }
    }
}

/// A typed buffer column. Optional wrappers are already removed from `storage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferColumn {
    pub name: String,
    pub storage: StorageType,
}

impl BufferColumn {
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }
}

/// Buffer column to destination column pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: String,
    pub destination: String,
}

/// Column-typed rows waiting to be copied into one table.
#[derive(Debug, Clone)]
pub struct TabularBuffer {
    destination: TableName,
    columns: Vec<BufferColumn>,
    mappings: Vec<ColumnMapping>,
    rows: Vec<Vec<SqlValue<'static>>>,
}

impl TabularBuffer {
    /// Create an empty buffer. Every column maps to the destination column of
    /// the same name.
    pub fn new(destination: TableName, columns: Vec<BufferColumn>) -> Self {
        let mappings = columns
            .iter()
            .map(|c| ColumnMapping {
                source: c.name.clone(),
                destination: c.name.clone(),
            })
            .collect();
        Self {
            destination,
            columns,
            mappings,
            rows: Vec::new(),
        }
    }

    /// Append one row, converting each value to its column's storage type.
    pub fn add_row(&mut self, values: Vec<SqlValue<'static>>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(DalError::Mapping(format!(
                "row for {} has {} values but the buffer has {} columns",
                self.destination,
                values.len(),
                self.columns.len()
            )));
        }
        let row = values
            .into_iter()
            .zip(&self.columns)
            .map(|(value, column)| {
                value.coerce(column.storage).map_err(|e| {
                    DalError::Mapping(format!("column '{}': {}", column.name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.rows.push(row);
        Ok(())
    }

    pub fn destination(&self) -> &TableName {
        &self.destination
    }

    pub fn columns(&self) -> &[BufferColumn] {
        &self.columns
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn rows(&self) -> &[Vec<SqlValue<'static>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
