//! Named statement parameters and result rows.

use crate::core::convert::FromSqlValue;
use crate::core::value::SqlValue;
use crate::error::{DalError, Result};

/// Parameter marker prefix used by SQL Server.
pub const PARAMETER_MARKER: char = '@';

/// Turn a property or column name into a parameter name.
///
/// Spaces become underscores and the `@` marker is prepended.
pub fn normalize_parameter_name(name: &str) -> String {
    format!("{}{}", PARAMETER_MARKER, name.replace(' ', "_"))
}

fn with_marker(name: &str) -> String {
    if name.starts_with(PARAMETER_MARKER) {
        name.to_string()
    } else {
        format!("{}{}", PARAMETER_MARKER, name)
    }
}

/// Ordered map of named parameters (`@Name` -> value).
///
/// Names are compared case-insensitively, like SQL Server does. Inserting an
/// existing name replaces its value and keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: Vec<(String, SqlValue<'static>)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter. The `@` marker is added when missing.
    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue<'static>>) {
        let name = with_marker(name);
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<SqlValue<'static>>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue<'static>> {
        let name = with_marker(name);
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue<'static>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Parameter names in insertion order, with their `@` marker.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterMap {
    type Item = (&'a str, &'a SqlValue<'static>);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// One row returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Vec<String>,
    values: Vec<SqlValue<'static>>,
}

impl ResultRow {
    /// Build a row. `columns` and `values` must have the same length.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue<'static>>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(DalError::Mapping(format!(
                "row has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue<'static>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue<'static>> {
        self.values.get(index)
    }

    /// Value of the first column whose name matches, ignoring case.
    pub fn get_by_name(&self, column: &str) -> Option<&SqlValue<'static>> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Decode the value at `index`.
    pub fn try_get<T: FromSqlValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            DalError::Mapping(format!(
                "column index {} out of range ({} columns)",
                index,
                self.len()
            ))
        })?;
        T::from_sql_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_parameter_name() {
        assert_eq!(normalize_parameter_name("Name"), "@Name");
        assert_eq!(normalize_parameter_name("First Name"), "@First_Name");
    }

    #[test]
    fn test_insert_adds_marker_and_replaces() {
        let mut params = ParameterMap::new();
        params.insert("Name", "a");
        params.insert("@Email", "b");
        params.insert("@name", "c");

        let names: Vec<&str> = params.names().collect();
        assert_eq!(names, vec!["@Name", "@Email"]);
        assert_eq!(params.get("Name"), Some(&SqlValue::text_owned("c".to_string())));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_result_row_lookup_ignores_case() {
        let row = ResultRow::new(
            vec!["CustomerId".to_string(), "Name".to_string()],
            vec![SqlValue::I32(7), SqlValue::text_owned("Ada".to_string())],
        )
        .unwrap();
        assert_eq!(row.get_by_name("customerid"), Some(&SqlValue::I32(7)));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.try_get::<String>(1).unwrap(), "Ada");
        assert!(row.try_get::<i32>(5).is_err());
    }

    #[test]
    fn test_result_row_length_mismatch() {
        assert!(ResultRow::new(vec!["a".to_string()], vec![]).is_err());
    }
}
