//! Tables whose schema is only known at runtime.
//!
//! A [`DynamicTableEntityDefinition`] names a table and its columns. The
//! [`DynamicTableRepository`] creates and drops that table, hands out rows
//! pre-populated with the declared columns and bulk loads them.

mod repository;

pub use repository::DynamicTableRepository;

use std::collections::HashSet;
use std::fmt;

use crate::core::identifier::{validate_identifier, validate_sql_type};
use crate::core::value::{SqlValue, StorageType};
use crate::error::{DalError, Result};

/// Schema used when a definition does not name one.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Column comparisons in dynamic tables ignore case.
pub(crate) fn column_key(name: &str) -> String {
    name.to_lowercase()
}

/// SQL Server column type tag.
///
/// Variable-length types map to their `max` form, `Decimal` to
/// `decimal(28,20)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDbType {
    BigInt,
    Binary,
    Bit,
    Char,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Float,
    Int,
    Money,
    NChar,
    NVarChar,
    Real,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    Time,
    TinyInt,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    Xml,
}

impl SqlDbType {
    /// Column type emitted in `CREATE TABLE`.
    pub const fn sql_type(self) -> &'static str {
        match self {
            SqlDbType::BigInt => "bigint",
            SqlDbType::Binary => "binary(8000)",
            SqlDbType::Bit => "bit",
            SqlDbType::Char => "char(8000)",
            SqlDbType::Date => "date",
            SqlDbType::DateTime => "datetime",
            SqlDbType::DateTime2 => "datetime2(7)",
            SqlDbType::DateTimeOffset => "datetimeoffset(7)",
            SqlDbType::Decimal => "decimal(28,20)",
            SqlDbType::Float => "float",
            SqlDbType::Int => "int",
            SqlDbType::Money => "money",
            SqlDbType::NChar => "nchar(4000)",
            SqlDbType::NVarChar => "nvarchar(max)",
            SqlDbType::Real => "real",
            SqlDbType::SmallDateTime => "smalldatetime",
            SqlDbType::SmallInt => "smallint",
            SqlDbType::SmallMoney => "smallmoney",
            SqlDbType::Time => "time(7)",
            SqlDbType::TinyInt => "tinyint",
            SqlDbType::UniqueIdentifier => "uniqueidentifier",
            SqlDbType::VarBinary => "varbinary(max)",
            SqlDbType::VarChar => "varchar(max)",
            SqlDbType::Xml => "xml",
        }
    }
}

impl fmt::Display for SqlDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// One column of a dynamic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicTableColumnDefinition {
    name: String,
    storage: StorageType,
    sql_type: Option<String>,
    db_type: Option<SqlDbType>,
}

impl DynamicTableColumnDefinition {
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            storage,
            sql_type: None,
            db_type: None,
        }
    }

    /// Use an explicit SQL type such as `nvarchar(200)`.
    #[must_use]
    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    /// Use the SQL type of an engine type tag.
    #[must_use]
    pub fn with_db_type(mut self, db_type: SqlDbType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn sql_type(&self) -> Option<&str> {
        self.sql_type.as_deref()
    }

    pub fn db_type(&self) -> Option<SqlDbType> {
        self.db_type
    }

    /// SQL type used to create the column.
    ///
    /// An explicit type string wins over the engine tag, which wins over the
    /// default for the storage type.
    pub fn resolved_sql_type(&self) -> Result<&str> {
        if let Some(explicit) = &self.sql_type {
            return Ok(explicit);
        }
        if let Some(tag) = self.db_type {
            return Ok(tag.sql_type());
        }
        self.storage
            .default_sql_type()
            .ok_or_else(|| DalError::UnsupportedType {
                column: self.name.clone(),
                data_type: self.storage,
            })
    }
}

/// A table described by a runtime column list.
///
/// Construction validates the names and resolves every column type, so a
/// definition that exists can always be turned into `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicTableEntityDefinition {
    schema: String,
    table_name: String,
    columns: Vec<DynamicTableColumnDefinition>,
}

impl DynamicTableEntityDefinition {
    /// Definition in the `dbo` schema.
    pub fn new(
        table_name: impl Into<String>,
        columns: Vec<DynamicTableColumnDefinition>,
    ) -> Result<Self> {
        Self::with_schema(DEFAULT_SCHEMA, table_name, columns)
    }

    pub fn with_schema(
        schema: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<DynamicTableColumnDefinition>,
    ) -> Result<Self> {
        let definition = Self {
            schema: schema.into(),
            table_name: table_name.into(),
            columns,
        };
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.schema)?;
        validate_identifier(&self.table_name)?;

        if self.columns.is_empty() {
            return Err(DalError::Validation(format!(
                "Dynamic table '{}' declares no columns",
                self.table_name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column_key(&column.name)) {
                return Err(DalError::Validation(format!(
                    "Column '{}' is declared more than once in '{}'",
                    column.name, self.table_name
                )));
            }
            if let Some(explicit) = &column.sql_type {
                validate_sql_type(explicit)?;
            }
            column.resolved_sql_type()?;
        }
        Ok(())
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[DynamicTableColumnDefinition] {
        &self.columns
    }

    /// The declared column called `name`, ignoring case.
    pub fn column(&self, name: &str) -> Option<&DynamicTableColumnDefinition> {
        let key = column_key(name);
        self.columns.iter().find(|c| column_key(&c.name) == key)
    }
}

/// One (column, value) pair of a dynamic row. An unset value loads as NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTableCell {
    pub column: String,
    pub value: Option<SqlValue<'static>>,
}

impl DynamicTableCell {
    pub fn new(column: impl Into<String>, value: Option<SqlValue<'static>>) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// A row destined for a dynamic table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicTableRows {
    pub row_number: Option<u64>,
    pub cells: Vec<DynamicTableCell>,
}

impl DynamicTableRows {
    /// Set the value of an existing cell, matching the column name without
    /// regard to case.
    ///
    /// Rows created by the repository hold exactly the declared columns, so a
    /// name without a cell is an undeclared column.
    pub fn set(&mut self, column: &str, value: impl Into<SqlValue<'static>>) -> Result<()> {
        let key = column_key(column);
        let cell = self
            .cells
            .iter_mut()
            .find(|c| column_key(&c.column) == key)
            .ok_or(DalError::UnexpectedColumns(1))?;
        cell.value = Some(value.into());
        Ok(())
    }

    /// Value of the first cell named `column`, ignoring case.
    pub fn get(&self, column: &str) -> Option<&SqlValue<'static>> {
        let key = column_key(column);
        self.cells
            .iter()
            .find(|c| column_key(&c.column) == key)
            .and_then(|c| c.value.as_ref())
    }
}

/// Lifecycle of the table behind a [`DynamicTableRepository`].
///
/// Informational: operations are not refused based on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableState {
    #[default]
    Undefined,
    Created,
    Dropped,
}
