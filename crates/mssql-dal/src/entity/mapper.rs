//! Entity values to parameters, result rows to entities, entities to buffers.

use crate::core::buffer::{BufferColumn, TableName, TabularBuffer};
use crate::core::convert::FromSqlValue;
use crate::core::params::{ParameterMap, ResultRow};
use crate::core::value::SqlValue;
use crate::entity::descriptor::Entity;
use crate::entity::resolver::EntityMetadata;
use crate::error::{DalError, MetadataErrorKind, Result};

fn checked_values<E: Entity>(meta: &EntityMetadata, entity: &E) -> Result<Vec<SqlValue<'static>>> {
    let values = entity.values()?;
    if values.len() != meta.property_count() {
        return Err(DalError::metadata(
            &meta.type_name,
            MetadataErrorKind::ValueCountMismatch {
                expected: meta.property_count(),
                actual: values.len(),
            },
        ));
    }
    Ok(values)
}

/// Named parameters for every mapped property of `entity`.
///
/// `None` values become typed NULLs. With `exclude_primary_key`, key columns
/// are left out, matching [`EntityMetadata::columns`].
pub fn to_parameter_map<E: Entity>(
    meta: &EntityMetadata,
    entity: &E,
    exclude_primary_key: bool,
) -> Result<ParameterMap> {
    let values = checked_values(meta, entity)?;
    let mut params = ParameterMap::new();
    for mapped in meta.mapped(exclude_primary_key) {
        params.insert(&mapped.info.parameter_name, values[mapped.index].clone());
    }
    Ok(params)
}

/// Binds result-set columns to entity properties.
///
/// A column binds to the property whose column marker matches it, ignoring
/// case. Columns no marker claims fall back to a property of the same name;
/// anything else is left unbound.
#[derive(Debug)]
pub struct ColumnBinder<'m> {
    meta: &'m EntityMetadata,
}

impl<'m> ColumnBinder<'m> {
    pub fn new(meta: &'m EntityMetadata) -> Self {
        Self { meta }
    }

    /// Property index bound to a result-set column.
    pub fn property_for_column(&self, column: &str) -> Option<usize> {
        let properties = self.meta.descriptor.properties();
        properties
            .iter()
            .position(|p| p.column_name().is_some_and(|c| c.eq_ignore_ascii_case(column)))
            .or_else(|| {
                properties
                    .iter()
                    .position(|p| p.name().eq_ignore_ascii_case(column))
            })
    }
}

/// A result row seen through an entity's column bindings.
#[derive(Debug)]
pub struct MappedRow<'a> {
    row: &'a ResultRow,
    meta: &'a EntityMetadata,
    /// Row column index per property index.
    bound: Vec<Option<usize>>,
}

impl<'a> MappedRow<'a> {
    pub fn new(row: &'a ResultRow, meta: &'a EntityMetadata) -> Self {
        let binder = ColumnBinder::new(meta);
        let mut bound = vec![None; meta.property_count()];
        for (column_index, column) in row.columns().iter().enumerate() {
            if let Some(property) = binder.property_for_column(column) {
                // The first matching column wins.
                if bound[property].is_none() {
                    bound[property] = Some(column_index);
                }
            }
        }
        Self { row, meta, bound }
    }

    /// Value bound to a property. Unbound properties read as NULL.
    pub fn value(&self, property: &str) -> Result<SqlValue<'static>> {
        let properties = self.meta.descriptor.properties();
        let index = properties
            .iter()
            .position(|p| p.name() == property)
            .ok_or_else(|| {
                DalError::Mapping(format!(
                    "{} has no property '{}'",
                    self.meta.type_name, property
                ))
            })?;

        Ok(self.bound[index]
            .and_then(|column| self.row.get(column))
            .cloned()
            .unwrap_or(SqlValue::Null(properties[index].storage())))
    }

    /// Decode the value bound to a property.
    pub fn get<T: FromSqlValue>(&self, property: &str) -> Result<T> {
        let value = self.value(property)?;
        T::from_sql_value(&value).map_err(|e| {
            DalError::Mapping(format!("{}.{}: {}", self.meta.type_name, property, e))
        })
    }

    pub fn row(&self) -> &ResultRow {
        self.row
    }
}

/// Build an entity from a result row.
pub fn map_row<E: Entity>(meta: &EntityMetadata, row: &ResultRow) -> Result<E> {
    E::from_row(&MappedRow::new(row, meta))
}

/// Stage entities for a bulk copy.
///
/// One column per non-key mapped property, typed with the property's storage
/// type (optional wrappers removed), and one row per entity.
pub fn entity_buffer<E: Entity>(
    meta: &EntityMetadata,
    table: &str,
    entities: &[E],
) -> Result<TabularBuffer> {
    let mapped: Vec<_> = meta.mapped(true).collect();
    let columns = mapped
        .iter()
        .map(|m| BufferColumn::new(&m.info.column_name, m.storage))
        .collect();

    let mut buffer = TabularBuffer::new(TableName::new(table), columns);
    for entity in entities {
        let values = checked_values(meta, entity)?;
        buffer.add_row(mapped.iter().map(|m| values[m.index].clone()).collect())?;
    }
    Ok(buffer)
}
