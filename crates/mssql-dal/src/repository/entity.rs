//! CRUD and bulk loading for typed entities.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::RepositoryConfig;
use crate::core::convert::{FromSqlValue, ToSqlValue};
use crate::core::logger::Logger;
use crate::core::params::ParameterMap;
use crate::core::traits::SqlConnection;
use crate::entity::{
    entity_buffer, map_row, to_parameter_map, Entity, EntityMetadata, MetadataRegistry,
};
use crate::error::{DalError, Result};
use crate::query;

use super::{DatabaseRepository, Repository};

/// Repository for one entity type.
///
/// Metadata comes from the process-wide [`MetadataRegistry`] unless a
/// registry is passed to [`with_registry`](Self::with_registry).
pub struct EntityRepository<E: Entity, C: SqlConnection> {
    base: Repository<C>,
    meta: Arc<EntityMetadata>,
    table: String,
    alias: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, C: SqlConnection> EntityRepository<E, C> {
    /// Resolve `E` and wrap `connection`. Fails on malformed entity markers.
    pub fn new(connection: C) -> Result<Self> {
        Self::with_registry(connection, MetadataRegistry::global())
    }

    pub fn with_registry(connection: C, registry: &MetadataRegistry) -> Result<Self> {
        let meta = registry.resolve::<E>()?;
        Ok(Self {
            base: Repository::new(connection),
            table: meta.table_name.clone(),
            alias: query::DEFAULT_ALIAS.to_string(),
            meta,
            _entity: PhantomData,
        })
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

    /// Use another table than the one named by the entity's table marker.
    #[must_use]
    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Alias used in SELECT statements (default `x`).
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }

    fn operation(&self, name: &str) -> String {
        format!("EntityRepository<{}>::{}", self.meta.type_name, name)
    }

    /// Every row of the table.
    pub async fn get_all(&mut self) -> Result<Vec<E>> {
        let op = self.operation("get_all");
        let result = self.get_all_inner(&op).await;
        self.base.logged(&op, result)
    }

    async fn get_all_inner(&mut self, op: &str) -> Result<Vec<E>> {
        let sql = query::select_all(&self.table, &self.alias)?;
        let rows = self.base.query(op, &sql, &ParameterMap::new()).await?;
        rows.iter().map(|row| map_row(&self.meta, row)).collect()
    }

    /// The row whose single primary key equals `id`.
    pub async fn get<K: ToSqlValue>(&mut self, id: K) -> Result<Option<E>> {
        let op = self.operation("get");
        let result = self.get_inner(&op, id).await;
        self.base.logged(&op, result)
    }

    async fn get_inner<K: ToSqlValue>(&mut self, op: &str, id: K) -> Result<Option<E>> {
        self.meta.require_keys(1)?;
        let id = id.to_sql_value()?;
        let (sql, param) =
            query::select_by_key(&self.table, &self.alias, &self.meta.details.primary_key_column)?;
        let params = ParameterMap::new().with(&param, id);
        let rows = self.base.query(op, &sql, &params).await?;
        rows.first().map(|row| map_row(&self.meta, row)).transpose()
    }

    /// The row matching both columns of a composite key.
    pub async fn get_by_keys<K1: ToSqlValue, K2: ToSqlValue>(
        &mut self,
        first: K1,
        second: K2,
    ) -> Result<Option<E>> {
        let op = self.operation("get_by_keys");
        let result = self
            .get_by_keys_inner(&op, first, second)
            .await;
        self.base.logged(&op, result)
    }

    async fn get_by_keys_inner<K1: ToSqlValue, K2: ToSqlValue>(
        &mut self,
        op: &str,
        first: K1,
        second: K2,
    ) -> Result<Option<E>> {
        self.meta.require_keys(2)?;
        let (first, second) = (first.to_sql_value()?, second.to_sql_value()?);
        let (first_column, second_column) = self.composite_columns()?;
        let (sql, p1, p2) =
            query::select_by_keys(&self.table, &self.alias, &first_column, &second_column)?;
        let params = ParameterMap::new().with(&p1, first).with(&p2, second);
        let rows = self.base.query(op, &sql, &params).await?;
        rows.first().map(|row| map_row(&self.meta, row)).transpose()
    }

    /// Rows of a composite-key entity whose first key equals `id`.
    pub async fn get_many_by_first_key<K: ToSqlValue>(&mut self, id: K) -> Result<Vec<E>> {
        let op = self.operation("get_many_by_first_key");
        let result = self.get_many_inner(&op, true, id).await;
        self.base.logged(&op, result)
    }

    /// Rows of a composite-key entity whose second key equals `id`.
    pub async fn get_many_by_second_key<K: ToSqlValue>(&mut self, id: K) -> Result<Vec<E>> {
        let op = self.operation("get_many_by_second_key");
        let result = self.get_many_inner(&op, false, id).await;
        self.base.logged(&op, result)
    }

    async fn get_many_inner<K: ToSqlValue>(
        &mut self,
        op: &str,
        first: bool,
        id: K,
    ) -> Result<Vec<E>> {
        self.meta.require_keys(2)?;
        let id = id.to_sql_value()?;
        let (first_column, second_column) = self.composite_columns()?;
        let column = if first { first_column } else { second_column };
        let (sql, param) = query::select_by_key(&self.table, &self.alias, &column)?;
        let params = ParameterMap::new().with(&param, id);
        let rows = self.base.query(op, &sql, &params).await?;
        rows.iter().map(|row| map_row(&self.meta, row)).collect()
    }

    fn composite_columns(&self) -> Result<(String, String)> {
        let details = &self.meta.details;
        let second = details.second_key_column.clone().ok_or_else(|| {
            DalError::Mapping(format!("{} has no second key column", self.meta.type_name))
        })?;
        Ok((details.primary_key_column.clone(), second))
    }

    /// Insert every non-key column and return the generated key.
    pub async fn insert<K: FromSqlValue>(&mut self, entity: &E) -> Result<K> {
        let op = self.operation("insert");
        let result = self.insert_inner(&op, entity).await;
        self.base.logged(&op, result)
    }

    async fn insert_inner<K: FromSqlValue>(&mut self, op: &str, entity: &E) -> Result<K> {
        self.meta.require_keys(1)?;
        let sql = query::insert_returning_key(
            &self.table,
            &self.meta.details.primary_key_column,
            &self.meta.columns(true),
        )?;
        let params = to_parameter_map(&self.meta, entity, true)?;
        let rows = self.base.query(op, &sql, &params).await?;
        let row = rows
            .first()
            .ok_or_else(|| DalError::Mapping("INSERT returned no key".to_string()))?;
        row.try_get(0)
    }

    /// Update the non-key columns of the row with the entity's key.
    pub async fn update(&mut self, entity: &E) -> Result<u64> {
        let op = self.operation("update");
        let result = self.update_inner(&op, entity).await;
        self.base.logged(&op, result)
    }

    async fn update_inner(&mut self, op: &str, entity: &E) -> Result<u64> {
        let sql = query::update_by_key(
            &self.table,
            &self.meta.key_columns(),
            &self.meta.columns(true),
        )?;
        let params = to_parameter_map(&self.meta, entity, false)?;
        self.base.execute(op, &sql, &params).await
    }

    /// Insert the entity, or update it when its key already exists.
    pub async fn upsert(&mut self, entity: &E) -> Result<u64> {
        let op = self.operation("upsert");
        let result = self.upsert_inner(&op, entity).await;
        self.base.logged(&op, result)
    }

    async fn upsert_inner(&mut self, op: &str, entity: &E) -> Result<u64> {
        let sql = query::upsert(&self.table, &self.meta.key_columns(), &self.meta.columns(true))?;
        let params = to_parameter_map(&self.meta, entity, false)?;
        self.base.execute(op, &sql, &params).await
    }

    /// Delete the row with the entity's key.
    pub async fn delete(&mut self, entity: &E) -> Result<u64> {
        let op = self.operation("delete");
        let result = self.delete_inner(&op, entity).await;
        self.base.logged(&op, result)
    }

    async fn delete_inner(&mut self, op: &str, entity: &E) -> Result<u64> {
        let keys = self.meta.key_columns();
        let sql = query::delete_by_key(&self.table, &keys)?;
        let all = to_parameter_map(&self.meta, entity, false)?;
        let mut params = ParameterMap::new();
        for key in &keys {
            let value = all.get(&key.parameter_name).cloned().ok_or_else(|| {
                DalError::Mapping(format!("no value for key {}", key.parameter_name))
            })?;
            params.insert(&key.parameter_name, value);
        }
        self.base.execute(op, &sql, &params).await
    }

    /// Bulk copy `entities` into the table in one transaction.
    ///
    /// Key columns are not sent. An empty slice returns immediately without
    /// touching the connection.
    pub async fn bulk_insert(&mut self, entities: &[E]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let op = self.operation("bulk_insert");
        let result = self.bulk_insert_inner(&op, entities).await;
        self.base.logged(&op, result)
    }

    async fn bulk_insert_inner(&mut self, op: &str, entities: &[E]) -> Result<u64> {
        let buffer = entity_buffer(&self.meta, &self.table, entities)?;
        let options = self.base.config().entity_bulk.clone();
        self.base.bulk_load(op, &buffer, &options).await
    }
}

impl<E: Entity, C: SqlConnection> DatabaseRepository for EntityRepository<E, C> {
    type Connection = C;

    fn base(&self) -> &Repository<C> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Repository<C> {
        &mut self.base
    }
}
