//! Catalog queries.

use crate::core::logger::Logger;
use crate::core::params::ParameterMap;
use crate::core::traits::SqlConnection;
use crate::error::Result;
use crate::query;

use super::{DatabaseRepository, Repository};

const TABLES_STARTING_WITH: &str = "SqlTableRepository::tables_starting_with";

/// Lists tables of the current catalog.
pub struct SqlTableRepository<C: SqlConnection> {
    base: Repository<C>,
}

impl<C: SqlConnection> SqlTableRepository<C> {
    pub fn new(connection: C) -> Self {
        Self {
            base: Repository::new(connection),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.base = self.base.with_logger(logger);
        self
    }

    /// Names of base tables starting with `keyword`.
    ///
    /// The prefix is compared literally; `%` and `_` have no special meaning.
    pub async fn tables_starting_with(&mut self, keyword: &str) -> Result<Vec<String>> {
        let result = self.tables_inner(keyword).await;
        self.base.logged(TABLES_STARTING_WITH, result)
    }

    async fn tables_inner(&mut self, keyword: &str) -> Result<Vec<String>> {
        let params = ParameterMap::new().with("@Prefix", keyword.to_string());
        let rows = self
            .base
            .query(TABLES_STARTING_WITH, query::tables_starting_with(), &params)
            .await?;
        rows.iter().map(|row| row.try_get::<String>(0)).collect()
    }
}

impl<C: SqlConnection> DatabaseRepository for SqlTableRepository<C> {
    type Connection = C;

    fn base(&self) -> &Repository<C> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Repository<C> {
        &mut self.base
    }
}
