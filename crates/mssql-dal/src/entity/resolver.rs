//! Resolution of table, column and key metadata from entity descriptors.
//!
//! The free functions are pure and work on a descriptor. [`MetadataRegistry`]
//! runs them once per entity type and caches the result.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::core::params::normalize_parameter_name;
use crate::core::value::StorageType;
use crate::entity::descriptor::{Entity, EntityDescriptor};
use crate::error::{DalError, MetadataErrorKind, Result};

/// Composite keys span at most two columns.
const MAX_PRIMARY_KEYS: usize = 2;

/// Resolved key structure of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDetails {
    pub primary_key_name: String,
    pub primary_key_column: String,
    pub second_key_name: Option<String>,
    pub second_key_column: Option<String>,
}

impl EntityDetails {
    /// Number of key columns (1 or 2).
    pub fn key_count(&self) -> usize {
        if self.second_key_column.is_some() {
            2
        } else {
            1
        }
    }

    fn is_key_column(&self, column: &str) -> bool {
        self.primary_key_column == column || self.second_key_column.as_deref() == Some(column)
    }
}

/// A mapped property's parameter name (`@Name`) and column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumnInfo {
    pub parameter_name: String,
    pub column_name: String,
}

/// Read the single table marker.
///
/// No marker fails with [`MetadataErrorKind::MissingTableAnnotation`]. More
/// than one fails with [`MetadataErrorKind::MultipleTableAnnotations`] so the
/// message can tell the two apart; both are metadata errors for the entity.
pub fn table_name(descriptor: &EntityDescriptor) -> Result<String> {
    match descriptor.tables.as_slice() {
        [table] => Ok(table.clone()),
        [] => Err(DalError::metadata(
            &descriptor.type_name,
            MetadataErrorKind::MissingTableAnnotation,
        )),
        many => Err(DalError::metadata(
            &descriptor.type_name,
            MetadataErrorKind::MultipleTableAnnotations(many.len()),
        )),
    }
}

/// Find the primary key and optional second key, in declaration order.
pub fn entity_details(descriptor: &EntityDescriptor) -> Result<EntityDetails> {
    let keys: Vec<_> = descriptor
        .properties
        .iter()
        .filter(|p| p.primary_key)
        .collect();

    if keys.len() > MAX_PRIMARY_KEYS {
        return Err(DalError::metadata(
            &descriptor.type_name,
            MetadataErrorKind::TooManyPrimaryKeys(keys.len()),
        ));
    }

    let column_of = |name: &str, column: Option<&str>| {
        column.map(str::to_string).ok_or_else(|| {
            DalError::metadata(
                &descriptor.type_name,
                MetadataErrorKind::PrimaryKeyWithoutColumn(name.to_string()),
            )
        })
    };

    let first = keys.first().ok_or_else(|| {
        DalError::metadata(&descriptor.type_name, MetadataErrorKind::NoPrimaryKey)
    })?;

    let (second_key_name, second_key_column) = match keys.get(1) {
        Some(second) => (
            Some(second.name.clone()),
            Some(column_of(&second.name, second.column_name())?),
        ),
        None => (None, None),
    };

    Ok(EntityDetails {
        primary_key_name: first.name.clone(),
        primary_key_column: column_of(&first.name, first.column_name())?,
        second_key_name,
        second_key_column,
    })
}

/// One entry per property with a column marker, optionally without key columns.
pub fn column_info(
    descriptor: &EntityDescriptor,
    exclude_primary_key: bool,
) -> Result<Vec<TableColumnInfo>> {
    let details = if exclude_primary_key {
        Some(entity_details(descriptor)?)
    } else {
        None
    };

    Ok(descriptor
        .properties
        .iter()
        .filter_map(|p| p.column_name().map(|column| (p, column)))
        .filter(|(_, column)| details.as_ref().map_or(true, |d| !d.is_key_column(column)))
        .map(|(p, column)| TableColumnInfo {
            parameter_name: normalize_parameter_name(&p.name),
            column_name: column.to_string(),
        })
        .collect())
}

/// A property bound to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedProperty {
    pub info: TableColumnInfo,
    pub property_name: String,
    /// Position in [`Entity::values`].
    pub index: usize,
    /// Storage type with any optional wrapper removed.
    pub storage: StorageType,
    pub optional: bool,
    pub is_key: bool,
}

/// Everything the repositories need about one entity type.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub type_name: String,
    pub table_name: String,
    pub details: EntityDetails,
    pub descriptor: EntityDescriptor,
    mapped: Vec<MappedProperty>,
}

impl EntityMetadata {
    /// Resolve a descriptor. Fails on any malformed marker.
    pub fn resolve(descriptor: EntityDescriptor) -> Result<Self> {
        let table_name = table_name(&descriptor)?;
        let details = entity_details(&descriptor)?;

        let mapped = descriptor
            .properties
            .iter()
            .enumerate()
            .filter_map(|(index, p)| {
                p.column_name().map(|column| MappedProperty {
                    info: TableColumnInfo {
                        parameter_name: normalize_parameter_name(&p.name),
                        column_name: column.to_string(),
                    },
                    property_name: p.name.clone(),
                    index,
                    storage: p.storage,
                    optional: p.optional,
                    is_key: details.is_key_column(column),
                })
            })
            .collect();

        Ok(Self {
            type_name: descriptor.type_name.clone(),
            table_name,
            details,
            descriptor,
            mapped,
        })
    }

    /// Mapped properties, optionally without key columns.
    pub fn mapped(&self, exclude_primary_key: bool) -> impl Iterator<Item = &MappedProperty> {
        self.mapped
            .iter()
            .filter(move |m| !(exclude_primary_key && m.is_key))
    }

    pub fn columns(&self, exclude_primary_key: bool) -> Vec<TableColumnInfo> {
        self.mapped(exclude_primary_key).map(|m| m.info.clone()).collect()
    }

    /// Key columns in key order, with their property parameter names.
    pub fn key_columns(&self) -> Vec<TableColumnInfo> {
        let details = &self.details;
        let mut keys = vec![self.key_info(&details.primary_key_name, &details.primary_key_column)];
        if let (Some(name), Some(column)) = (&details.second_key_name, &details.second_key_column) {
            keys.push(self.key_info(name, column));
        }
        keys
    }

    fn key_info(&self, property: &str, column: &str) -> TableColumnInfo {
        TableColumnInfo {
            parameter_name: normalize_parameter_name(property),
            column_name: column.to_string(),
        }
    }

    pub fn property_count(&self) -> usize {
        self.descriptor.properties.len()
    }

    /// Fail unless the entity declares exactly `expected` key columns.
    pub fn require_keys(&self, expected: usize) -> Result<()> {
        let actual = self.details.key_count();
        if actual != expected {
            return Err(DalError::metadata(
                &self.type_name,
                MetadataErrorKind::KeyArity { expected, actual },
            ));
        }
        Ok(())
    }
}

/// Cache of resolved metadata keyed by entity type.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    cache: RwLock<HashMap<TypeId, Arc<EntityMetadata>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static MetadataRegistry {
        static GLOBAL: OnceLock<MetadataRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MetadataRegistry::new)
    }

    /// Resolve and cache `E` up front so malformed markers fail at startup.
    pub fn register<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        self.resolve::<E>()
    }

    /// Cached metadata for `E`, resolving it on first use.
    pub fn resolve<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        let key = TypeId::of::<E>();
        if let Some(found) = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(found));
        }

        let resolved = Arc::new(EntityMetadata::resolve(E::describe())?);
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Arc::clone(cache.entry(key).or_insert(resolved)))
    }

    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::descriptor::Property;

    fn customer() -> EntityDescriptor {
        EntityDescriptor::new("Customer")
            .table("Customers")
            .property(
                Property::new("Id", StorageType::I32)
                    .column("CustomerId")
                    .primary_key(),
            )
            .property(Property::new("Name", StorageType::String).column("Name"))
            .property(Property::new("Email", StorageType::String).optional().column("Email"))
            .property(Property::new("Scratch", StorageType::String))
    }

    fn order_line() -> EntityDescriptor {
        // Second key declared before the first alphabetically.
        EntityDescriptor::new("OrderLine")
            .table("OrderLines")
            .property(Property::new("Zone", StorageType::String).column("ZoneCode").primary_key())
            .property(Property::new("Line", StorageType::I32).column("LineNo").primary_key())
            .property(Property::new("Qty", StorageType::Decimal).column("Qty"))
    }

    fn kind(err: DalError) -> MetadataErrorKind {
        match err {
            DalError::Metadata { kind, .. } => kind,
            other => panic!("expected metadata error, got {:?}", other),
        }
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name(&customer()).unwrap(), "Customers");
    }

    #[test]
    fn test_table_name_missing_or_repeated() {
        let missing = EntityDescriptor::new("T");
        assert_eq!(
            kind(table_name(&missing).unwrap_err()),
            MetadataErrorKind::MissingTableAnnotation
        );
        let twice = EntityDescriptor::new("T").table("A").table("B");
        assert_eq!(
            kind(table_name(&twice).unwrap_err()),
            MetadataErrorKind::MultipleTableAnnotations(2)
        );
    }

    #[test]
    fn test_single_key_details() {
        let details = entity_details(&customer()).unwrap();
        assert_eq!(details.primary_key_name, "Id");
        assert_eq!(details.primary_key_column, "CustomerId");
        assert_eq!(details.second_key_name, None);
        assert_eq!(details.second_key_column, None);
        assert_eq!(details.key_count(), 1);
    }

    #[test]
    fn test_composite_key_follows_declaration_order() {
        let details = entity_details(&order_line()).unwrap();
        assert_eq!(details.primary_key_name, "Zone");
        assert_eq!(details.primary_key_column, "ZoneCode");
        assert_eq!(details.second_key_name.as_deref(), Some("Line"));
        assert_eq!(details.second_key_column.as_deref(), Some("LineNo"));
    }

    #[test]
    fn test_no_primary_key() {
        let d = EntityDescriptor::new("T")
            .table("T")
            .property(Property::new("A", StorageType::I32).column("A"));
        assert_eq!(kind(entity_details(&d).unwrap_err()), MetadataErrorKind::NoPrimaryKey);
    }

    #[test]
    fn test_third_primary_key_rejected() {
        let d = order_line()
            .property(Property::new("Extra", StorageType::I32).column("Extra").primary_key());
        assert_eq!(
            kind(entity_details(&d).unwrap_err()),
            MetadataErrorKind::TooManyPrimaryKeys(3)
        );
    }

    #[test]
    fn test_primary_key_without_column() {
        let d = EntityDescriptor::new("T")
            .table("T")
            .property(Property::new("Id", StorageType::I32).primary_key());
        assert_eq!(
            kind(entity_details(&d).unwrap_err()),
            MetadataErrorKind::PrimaryKeyWithoutColumn("Id".to_string())
        );
    }

    #[test]
    fn test_column_info_skips_unbound_properties() {
        let all = column_info(&customer(), false).unwrap();
        let names: Vec<_> = all.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["CustomerId", "Name", "Email"]);
        assert_eq!(all[0].parameter_name, "@Id");
    }

    #[test]
    fn test_column_info_excludes_every_key_column() {
        for descriptor in [customer(), order_line()] {
            let details = entity_details(&descriptor).unwrap();
            let cols = column_info(&descriptor, true).unwrap();
            assert!(!cols.is_empty());
            for col in cols {
                assert_ne!(col.column_name, details.primary_key_column);
                assert_ne!(Some(col.column_name), details.second_key_column);
            }
        }
    }

    #[test]
    fn test_parameter_names_replace_spaces() {
        let d = EntityDescriptor::new("T")
            .table("T")
            .property(Property::new("Id", StorageType::I32).column("Id").primary_key())
            .property(Property::new("Full Name", StorageType::String).column("FullName"));
        let cols = column_info(&d, true).unwrap();
        assert_eq!(cols[0].parameter_name, "@Full_Name");
    }

    #[test]
    fn test_first_column_marker_wins() {
        let d = EntityDescriptor::new("T")
            .table("T")
            .property(Property::new("Id", StorageType::I32).column("Id").primary_key())
            .property(Property::new("Name", StorageType::String).column("Primary").column("Alias"));
        let cols = column_info(&d, true).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].column_name, "Primary");
    }

    #[test]
    fn test_metadata_key_columns_and_arity() {
        let meta = EntityMetadata::resolve(order_line()).unwrap();
        let keys = meta.key_columns();
        assert_eq!(keys[0].column_name, "ZoneCode");
        assert_eq!(keys[0].parameter_name, "@Zone");
        assert_eq!(keys[1].column_name, "LineNo");
        assert!(meta.require_keys(2).is_ok());
        assert_eq!(
            kind(meta.require_keys(1).unwrap_err()),
            MetadataErrorKind::KeyArity { expected: 1, actual: 2 }
        );
    }
}
