//! Repositories over one [`SqlConnection`].
//!
//! Every repository owns a [`Repository`] base holding the connection, the
//! logger and the repository settings. Public operations log one error event
//! naming the failing operation before returning the error.

mod bulk;
mod entity;
mod tables;

pub use entity::EntityRepository;
pub use tables::SqlTableRepository;

use std::time::Duration;

use crate::config::{BulkCopyOptions, RepositoryConfig};
use crate::core::buffer::TabularBuffer;
use crate::core::logger::Logger;
use crate::core::params::{ParameterMap, ResultRow};
use crate::core::traits::SqlConnection;
use crate::error::{DalError, Result};

/// Open `connection` unless it already is, giving up after `wait`.
pub(crate) async fn open_within<C: SqlConnection>(
    connection: &mut C,
    wait: Duration,
    operation: &str,
) -> Result<()> {
    if connection.is_open() {
        return Ok(());
    }
    tokio::time::timeout(wait, connection.open())
        .await
        .map_err(|_| DalError::timeout(format!("{} (opening connection)", operation), wait))?
}

/// Connection, logger and settings shared by all repositories.
#[derive(Debug)]
pub struct Repository<C: SqlConnection> {
    connection: C,
    logger: Logger,
    config: RepositoryConfig,
}

impl<C: SqlConnection> Repository<C> {
    /// Repository with the default logger and settings.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            logger: Logger::default(),
            config: RepositoryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn database(&self) -> &str {
        self.connection.database()
    }

    /// Replace the connection with one targeting `database`.
    ///
    /// The old connection is dropped; every other setting carries over.
    pub fn use_database(&mut self, database: &str) -> Result<()> {
        let replacement = self
            .connection
            .retarget(database)
            .inspect_err(|e| self.logger.error("Repository::use_database", e))?;
        self.connection = replacement;
        self.logger.info(
            "Repository::use_database",
            &format!("switched to database {}", database),
        );
        Ok(())
    }

    /// Log a failed result under `operation` and pass it through.
    pub(crate) fn logged<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| self.logger.error(operation, e))
    }

    pub(crate) async fn open(&mut self, operation: &str) -> Result<()> {
        let wait = self.config.command_wait();
        open_within(&mut self.connection, wait, operation).await
    }

    pub(crate) async fn execute(
        &mut self,
        operation: &str,
        sql: &str,
        params: &ParameterMap,
    ) -> Result<u64> {
        self.open(operation).await?;
        self.connection.execute(sql, params).await
    }

    pub(crate) async fn query(
        &mut self,
        operation: &str,
        sql: &str,
        params: &ParameterMap,
    ) -> Result<Vec<ResultRow>> {
        self.open(operation).await?;
        self.connection.query(sql, params).await
    }

    pub(crate) async fn bulk_load(
        &mut self,
        operation: &str,
        buffer: &TabularBuffer,
        options: &BulkCopyOptions,
    ) -> Result<u64> {
        bulk::bulk_load(&mut self.connection, &self.logger, operation, buffer, options).await
    }

    pub(crate) async fn rollback_quietly(&mut self, operation: &str) {
        bulk::rollback_quietly(&mut self.connection, &self.logger, operation).await
    }
}

/// Behavior common to every repository.
pub trait DatabaseRepository {
    type Connection: SqlConnection;

    fn base(&self) -> &Repository<Self::Connection>;

    fn base_mut(&mut self) -> &mut Repository<Self::Connection>;

    /// Catalog the repository currently targets.
    fn database(&self) -> &str {
        self.base().database()
    }

    /// Point the repository at another catalog on the same server.
    fn use_database(&mut self, database: &str) -> Result<()> {
        self.base_mut().use_database(database)
    }
}
