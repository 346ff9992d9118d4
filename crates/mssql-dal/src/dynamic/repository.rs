//! Repository for tables defined at runtime.

use std::collections::HashSet;

use crate::config::RepositoryConfig;
use crate::core::buffer::{BufferColumn, TableName, TabularBuffer};
use crate::core::convert::ToSqlValue;
use crate::core::identifier::guard_identifier;
use crate::core::logger::Logger;
use crate::core::params::ParameterMap;
use crate::core::traits::SqlConnection;
use crate::core::value::SqlValue;
use crate::error::{DalError, Result, SqlErrorCode};
use crate::query;
use crate::repository::{DatabaseRepository, Repository};

use super::{
    column_key, DynamicTableCell, DynamicTableEntityDefinition, DynamicTableRows, TableState,
};

/// SQL Server accepts 2100 parameters per request.
const DELETE_CHUNK_SIZE: usize = 2000;

const CREATE_TABLE: &str = "DynamicTableRepository::create_table";
const DROP_TABLE: &str = "DynamicTableRepository::drop_table";
const DROP_TABLE_IF_EXISTS: &str = "DynamicTableRepository::drop_table_if_exists";
const BULK_INSERT: &str = "DynamicTableRepository::bulk_insert";
const DELETE_MANY: &str = "DynamicTableRepository::delete_many";

/// Creates, fills and drops one runtime-defined table.
pub struct DynamicTableRepository<C: SqlConnection> {
    base: Repository<C>,
    definition: DynamicTableEntityDefinition,
    state: TableState,
}

impl<C: SqlConnection> DynamicTableRepository<C> {
    pub fn new(connection: C, definition: DynamicTableEntityDefinition) -> Self {
        Self {
            base: Repository::new(connection),
            definition,
            state: TableState::Undefined,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.base = self.base.with_logger(logger);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.base = self.base.with_config(config);
        self
    }

    pub fn definition(&self) -> &DynamicTableEntityDefinition {
        &self.definition
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// `CREATE TABLE [schema].[table]` with every declared column.
    pub async fn create_table(&mut self) -> Result<()> {
        let result = self.create_table_inner().await;
        let result = self.base.logged(CREATE_TABLE, result);
        if result.is_ok() {
            self.state = TableState::Created;
        }
        result
    }

    async fn create_table_inner(&mut self) -> Result<()> {
        let columns = self
            .definition
            .columns()
            .iter()
            .map(|c| -> Result<(String, String)> {
                Ok((c.name().to_string(), c.resolved_sql_type()?.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let sql = query::create_table(
            self.definition.schema(),
            self.definition.table_name(),
            &columns,
        )?;
        self.base
            .execute(CREATE_TABLE, &sql, &ParameterMap::new())
            .await?;
        Ok(())
    }

    /// `DROP TABLE [schema].[table]`.
    pub async fn drop_table(&mut self) -> Result<()> {
        let result = self.drop_table_inner(DROP_TABLE).await;
        let result = self.base.logged(DROP_TABLE, result);
        if result.is_ok() {
            self.state = TableState::Dropped;
        }
        result
    }

    async fn drop_table_inner(&mut self, operation: &str) -> Result<()> {
        let sql = query::drop_table(self.definition.schema(), self.definition.table_name())?;
        self.base
            .execute(operation, &sql, &ParameterMap::new())
            .await?;
        Ok(())
    }

    /// Drop the table, treating "cannot drop" (error 3701) as success.
    ///
    /// Every other error is logged and returned.
    pub async fn drop_table_if_exists(&mut self) -> Result<()> {
        let result = match self.drop_table_inner(DROP_TABLE_IF_EXISTS).await {
            Err(e) if e.is_engine_code(SqlErrorCode::DropTableError) => {
                self.base.logger().debug(
                    DROP_TABLE_IF_EXISTS,
                    &format!(
                        "dropping table '{}' did not complete, it may not exist: {}",
                        self.definition.table_name(),
                        e
                    ),
                );
                Ok(())
            }
            other => other,
        };
        let result = self.base.logged(DROP_TABLE_IF_EXISTS, result);
        if result.is_ok() {
            self.state = TableState::Dropped;
        }
        result
    }

    /// A row with one unset cell per declared column, in declaration order.
    pub fn create_row(&self) -> DynamicTableRows {
        DynamicTableRows {
            row_number: None,
            cells: self
                .definition
                .columns()
                .iter()
                .map(|c| DynamicTableCell::new(c.name(), None))
                .collect(),
        }
    }

    /// Bulk copy `rows` into the table in one transaction.
    ///
    /// Fails with [`DalError::UnexpectedColumns`] before any I/O when a row
    /// names a column outside the definition. Declared columns missing from a
    /// row load as NULL. An empty slice returns immediately.
    pub async fn bulk_insert(&mut self, rows: &[DynamicTableRows]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let result = self.bulk_insert_inner(rows).await;
        self.base.logged(BULK_INSERT, result)
    }

    async fn bulk_insert_inner(&mut self, rows: &[DynamicTableRows]) -> Result<u64> {
        let buffer = self.buffer(rows)?;
        let options = self.base.config().dynamic_bulk.clone();
        self.base.bulk_load(BULK_INSERT, &buffer, &options).await
    }

    fn buffer(&self, rows: &[DynamicTableRows]) -> Result<TabularBuffer> {
        let unexpected: HashSet<String> = rows
            .iter()
            .flat_map(|row| &row.cells)
            .filter(|cell| self.definition.column(&cell.column).is_none())
            .map(|cell| column_key(&cell.column))
            .collect();
        if !unexpected.is_empty() {
            return Err(DalError::UnexpectedColumns(unexpected.len()));
        }

        let declared = self.definition.columns();
        let mut buffer = TabularBuffer::new(
            TableName::qualified(self.definition.schema(), self.definition.table_name()),
            declared
                .iter()
                .map(|c| BufferColumn::new(c.name(), c.storage()))
                .collect(),
        );
        for row in rows {
            let values = declared
                .iter()
                .map(|c| {
                    row.get(c.name())
                        .cloned()
                        .unwrap_or(SqlValue::Null(c.storage()))
                })
                .collect();
            buffer.add_row(values)?;
        }
        Ok(buffer)
    }

    /// Delete rows of `table` whose `column` equals any of `values`.
    ///
    /// `table` and `column` are checked under the configured identifier
    /// policy before any SQL is sent. Lists longer than 2000 values are split
    /// into several statements run in one transaction. Returns the number of
    /// rows deleted.
    pub async fn delete_many<V: ToSqlValue>(
        &mut self,
        table: &str,
        column: &str,
        values: &[V],
    ) -> Result<u64> {
        let result = self.delete_many_inner(table, column, values).await;
        self.base.logged(DELETE_MANY, result)
    }

    async fn delete_many_inner<V: ToSqlValue>(
        &mut self,
        table: &str,
        column: &str,
        values: &[V],
    ) -> Result<u64> {
        let policy = self.base.config().identifier_policy;
        let table = guard_identifier(table, policy)?;
        let column = guard_identifier(column, policy)?;
        if values.is_empty() {
            return Ok(0);
        }
        let values = values
            .iter()
            .map(|value| value.to_sql_value())
            .collect::<Result<Vec<_>>>()?;

        self.base.open(DELETE_MANY).await?;
        self.base.connection_mut().begin_transaction().await?;

        let mut deleted = 0;
        for chunk in values.chunks(DELETE_CHUNK_SIZE) {
            let sql = query::delete_many(&table, &column, chunk.len());
            let params = chunk
                .iter()
                .enumerate()
                .fold(ParameterMap::new(), |params, (i, value)| {
                    params.with(&query::value_parameter(i), value.clone())
                });
            match self.base.connection_mut().execute(&sql, &params).await {
                Ok(n) => deleted += n,
                Err(e) => {
                    self.base.rollback_quietly(DELETE_MANY).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.base.connection_mut().commit().await {
            self.base.rollback_quietly(DELETE_MANY).await;
            return Err(e);
        }
        Ok(deleted)
    }
}

impl<C: SqlConnection> DatabaseRepository for DynamicTableRepository<C> {
    type Connection = C;

    fn base(&self) -> &Repository<C> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Repository<C> {
        &mut self.base
    }
}
