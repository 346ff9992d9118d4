//! Declarative entity markers.
//!
//! An entity type describes itself once with [`EntityDescriptor`]: its table
//! marker, and for every property a storage type, optional column markers and
//! an optional primary-key marker. Property order is declaration order and is
//! significant for composite keys.

use crate::core::value::{SqlValue, StorageType};
use crate::entity::mapper::MappedRow;
use crate::error::Result;

/// One declared property of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub(crate) name: String,
    pub(crate) storage: StorageType,
    pub(crate) optional: bool,
    pub(crate) columns: Vec<String>,
    pub(crate) primary_key: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            storage,
            optional: false,
            columns: Vec::new(),
            primary_key: false,
        }
    }

    /// The property holds an `Option<_>` of its storage type.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Column marker. Repeatable; the first one names the column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    /// Primary-key marker.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Bound column name, if the property carries a column marker.
    pub fn column_name(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }
}

/// Declarative description of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub(crate) type_name: String,
    pub(crate) tables: Vec<String>,
    pub(crate) properties: Vec<Property>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            tables: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Table marker. Exactly one is expected.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(name.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }
}

/// A record type mapped to one table.
///
/// ```
/// use mssql_dal::entity::{Entity, EntityDescriptor, MappedRow, Property};
/// use mssql_dal::{Result, SqlValue, StorageType, ToSqlValue};
///
/// struct Customer {
///     id: i32,
///     name: String,
///     email: Option<String>,
/// }
///
/// impl Entity for Customer {
///     fn describe() -> EntityDescriptor {
///         EntityDescriptor::new("Customer")
///             .table("Customers")
///             .property(Property::new("Id", StorageType::I32).column("CustomerId").primary_key())
///             .property(Property::new("Name", StorageType::String).column("Name"))
///             .property(Property::new("Email", StorageType::String).optional().column("Email"))
///     }
///
///     fn values(&self) -> Result<Vec<SqlValue<'static>>> {
///         Ok(vec![
///             self.id.to_sql_value()?,
///             self.name.to_sql_value()?,
///             self.email.to_sql_value()?,
///         ])
///     }
///
///     fn from_row(row: &MappedRow<'_>) -> Result<Self> {
///         Ok(Self {
///             id: row.get("Id")?,
///             name: row.get("Name")?,
///             email: row.get("Email")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Send + Sync + 'static {
    /// Declarative markers for this type.
    fn describe() -> EntityDescriptor;

    /// Property values in declaration order.
    ///
    /// A value without a SQL encoding fails the whole operation.
    fn values(&self) -> Result<Vec<SqlValue<'static>>>;

    /// Build an instance from a result row.
    fn from_row(row: &MappedRow<'_>) -> Result<Self>
    where
        Self: Sized;
}
