//! SQL text builders.
//!
//! Builders only produce text with `@Name` placeholders. Table and column names
//! come from resolved metadata or from already-validated caller input, and are
//! always bracket-quoted here.

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::params::normalize_parameter_name;
use crate::entity::TableColumnInfo;
use crate::error::Result;

/// Default table alias used by SELECT builders.
pub const DEFAULT_ALIAS: &str = "x";

fn quoted_list(columns: &[TableColumnInfo]) -> Result<Vec<String>> {
    columns.iter().map(|c| quote_mssql(&c.column_name)).collect()
}

fn key_predicate(prefix: &str, keys: &[TableColumnInfo]) -> Result<String> {
    Ok(keys
        .iter()
        .map(|k| -> Result<String> {
            Ok(format!("{}{} = {}", prefix, quote_mssql(&k.column_name)?, k.parameter_name))
        })
        .collect::<Result<Vec<_>>>()?
        .join(" AND "))
}

/// `SELECT * FROM [Table] x`
pub fn select_all(table: &str, alias: &str) -> Result<String> {
    Ok(format!("SELECT * FROM {} {}", quote_mssql(table)?, alias))
}

/// Select rows whose key column equals one parameter.
///
/// Returns the SQL and the parameter name, which is the normalized key column
/// name.
pub fn select_by_key(table: &str, alias: &str, key_column: &str) -> Result<(String, String)> {
    let parameter = normalize_parameter_name(key_column);
    let sql = format!(
        "SELECT * FROM {} {} WHERE {}.{} = {}",
        quote_mssql(table)?,
        alias,
        alias,
        quote_mssql(key_column)?,
        parameter
    );
    Ok((sql, parameter))
}

/// Select by both columns of a composite key.
///
/// Returns the SQL and the two parameter names.
pub fn select_by_keys(
    table: &str,
    alias: &str,
    first_column: &str,
    second_column: &str,
) -> Result<(String, String, String)> {
    let first = normalize_parameter_name(first_column);
    let second = normalize_parameter_name(second_column);
    let sql = format!(
        "SELECT * FROM {table} {alias} WHERE {alias}.{c1} = {p1} AND {alias}.{c2} = {p2}",
        table = quote_mssql(table)?,
        alias = alias,
        c1 = quote_mssql(first_column)?,
        p1 = first,
        c2 = quote_mssql(second_column)?,
        p2 = second,
    );
    Ok((sql, first, second))
}

/// Insert the non-key columns and return the new key.
///
/// The identity value wins when the table has one; otherwise the inserted
/// row's key column is returned.
pub fn insert_returning_key(
    table: &str,
    key_column: &str,
    columns: &[TableColumnInfo],
) -> Result<String> {
    let output = format!(
        "OUTPUT COALESCE(SCOPE_IDENTITY(), Inserted.{})",
        quote_mssql(key_column)?
    );

    if columns.is_empty() {
        return Ok(format!(
            "INSERT INTO {} {} DEFAULT VALUES",
            quote_mssql(table)?,
            output
        ));
    }

    let params: Vec<&str> = columns.iter().map(|c| c.parameter_name.as_str()).collect();
    Ok(format!(
        "INSERT INTO {} ({}) {} VALUES({})",
        quote_mssql(table)?,
        quoted_list(columns)?.join(","),
        output,
        params.join(",")
    ))
}

/// Update every non-key column of the row identified by `keys`.
pub fn update_by_key(
    table: &str,
    keys: &[TableColumnInfo],
    columns: &[TableColumnInfo],
) -> Result<String> {
    let assignments = columns
        .iter()
        .map(|c| -> Result<String> {
            Ok(format!("{} = {}", quote_mssql(&c.column_name)?, c.parameter_name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        quote_mssql(table)?,
        assignments.join(", "),
        key_predicate("", keys)?
    ))
}

/// Delete the row identified by `keys`.
pub fn delete_by_key(table: &str, keys: &[TableColumnInfo]) -> Result<String> {
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        quote_mssql(table)?,
        key_predicate("", keys)?
    ))
}

/// Insert-or-update one row keyed on `keys`.
///
/// Keys are written on insert, so this suits natural keys. Identity-keyed
/// entities should use [`insert_returning_key`].
pub fn upsert(
    table: &str,
    keys: &[TableColumnInfo],
    columns: &[TableColumnInfo],
) -> Result<String> {
    let all: Vec<&TableColumnInfo> = keys.iter().chain(columns).collect();

    let source = all
        .iter()
        .map(|c| -> Result<String> {
            Ok(format!("{} AS {}", c.parameter_name, quote_mssql(&c.column_name)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let join_condition = keys
        .iter()
        .map(|k| -> Result<String> {
            let quoted = quote_mssql(&k.column_name)?;
            Ok(format!("target.{0} = source.{0}", quoted))
        })
        .collect::<Result<Vec<_>>>()?;

    let update_cols = columns
        .iter()
        .map(|c| -> Result<String> {
            let quoted = quote_mssql(&c.column_name)?;
            Ok(format!("{0} = source.{0}", quoted))
        })
        .collect::<Result<Vec<_>>>()?;

    let insert_cols = all
        .iter()
        .map(|c| quote_mssql(&c.column_name))
        .collect::<Result<Vec<_>>>()?;
    let source_cols: Vec<String> = insert_cols.iter().map(|c| format!("source.{}", c)).collect();

    let matched = if update_cols.is_empty() {
        String::new()
    } else {
        format!(" WHEN MATCHED THEN UPDATE SET {}", update_cols.join(", "))
    };

    // HOLDLOCK: the match and the insert must see the same key range.
    Ok(format!(
        "MERGE INTO {} WITH (HOLDLOCK) AS target USING (SELECT {}) AS source ON {}{} WHEN NOT MATCHED THEN INSERT ({}) VALUES ({});",
        quote_mssql(table)?,
        source.join(", "),
        join_condition.join(" AND "),
        matched,
        insert_cols.join(", "),
        source_cols.join(", ")
    ))
}

/// `CREATE TABLE [schema].[table] ([col] type, ...)`
///
/// `columns` pairs each column name with an already-validated SQL type.
pub fn create_table(schema: &str, table: &str, columns: &[(String, String)]) -> Result<String> {
    let defs = columns
        .iter()
        .map(|(name, sql_type)| -> Result<String> {
            Ok(format!("{} {}", quote_mssql(name)?, sql_type))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE {} ({})",
        qualify_mssql(schema, table)?,
        defs.join(", ")
    ))
}

/// `DROP TABLE [schema].[table]`
pub fn drop_table(schema: &str, table: &str) -> Result<String> {
    Ok(format!("DROP TABLE {}", qualify_mssql(schema, table)?))
}

/// Parameter names used by [`delete_many`]: `@Value0`, `@Value1`, ...
pub fn value_parameter(index: usize) -> String {
    format!("@Value{}", index)
}

/// Delete rows whose column matches any of `count` values.
///
/// `table` and `column` must already be quoted.
pub fn delete_many(quoted_table: &str, quoted_column: &str, count: usize) -> String {
    let params: Vec<String> = (0..count).map(value_parameter).collect();
    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        quoted_table,
        quoted_column,
        params.join(", ")
    )
}

/// Base tables whose name starts with `@Prefix`, taken literally.
pub fn tables_starting_with() -> &'static str {
    "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' AND LEFT(TABLE_NAME, LEN(@Prefix)) = @Prefix \
     ORDER BY TABLE_NAME"
}
