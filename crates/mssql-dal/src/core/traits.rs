//! The SQL execution seam used by all repositories.
//!
//! Repositories never talk to a driver directly. They drive a
//! [`SqlConnection`], which the tiberius driver implements for SQL Server and
//! which tests implement with an in-memory double.

use async_trait::async_trait;

use crate::config::BulkCopyOptions;
use crate::core::buffer::TabularBuffer;
use crate::core::params::{ParameterMap, ResultRow};
use crate::error::Result;

/// One logical connection to a SQL Server catalog.
///
/// Statements use named `@Name` placeholders bound from a [`ParameterMap`].
/// At most one transaction is open at a time.
#[async_trait]
pub trait SqlConnection: Send {
    /// Catalog this connection targets.
    fn database(&self) -> &str;

    /// Whether the connection is established.
    fn is_open(&self) -> bool;

    /// Establish the connection if it is not open yet.
    async fn open(&mut self) -> Result<()>;

    /// Drop the session without talking to the server.
    ///
    /// Used when an operation was abandoned mid-stream and the wire state is
    /// unknown. The server rolls back any open transaction. The next
    /// [`open`](Self::open) starts a fresh session.
    fn reset(&mut self);

    /// A new, unopened connection with the same settings but another catalog.
    fn retarget(&self, database: &str) -> Result<Self>
    where
        Self: Sized;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &ParameterMap) -> Result<u64>;

    /// Run a query and return every row of its first result set.
    async fn query(&mut self, sql: &str, params: &ParameterMap) -> Result<Vec<ResultRow>>;

    async fn begin_transaction(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Copy every row of `buffer` into its destination table.
    ///
    /// Must run inside a transaction started with
    /// [`begin_transaction`](Self::begin_transaction). Returns rows copied.
    async fn bulk_copy(&mut self, buffer: &TabularBuffer, options: &BulkCopyOptions)
        -> Result<u64>;
}
