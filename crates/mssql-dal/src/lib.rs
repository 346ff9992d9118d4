//! # mssql-dal
//!
//! Metadata-driven data access for Microsoft SQL Server.
//!
//! This library maps typed records to tables and moves large row sets into
//! the database:
//!
//! - **Entity metadata** resolved once per type from declarative markers
//! - **Parameterized CRUD** built from that metadata, with composite keys
//! - **Transactional bulk loads** for typed entities
//! - **Dynamic tables** whose columns are only known at runtime
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_dal::dynamic::{
//!     DynamicTableColumnDefinition, DynamicTableEntityDefinition, DynamicTableRepository,
//! };
//! use mssql_dal::{DalConfig, StorageType, TiberiusConnection};
//!
//! #[tokio::main]
//! async fn main() -> mssql_dal::Result<()> {
//!     let config = DalConfig::load("dal.yaml")?;
//!     let definition = DynamicTableEntityDefinition::new(
//!         "Imports",
//!         vec![
//!             DynamicTableColumnDefinition::new("Name", StorageType::String),
//!             DynamicTableColumnDefinition::new("Amount", StorageType::Decimal),
//!         ],
//!     )?;
//!
//!     let connection = TiberiusConnection::new(config.connection);
//!     let mut repo = DynamicTableRepository::new(connection, definition)
//!         .with_config(config.repository);
//!     repo.drop_table_if_exists().await?;
//!     repo.create_table().await?;
//!
//!     let mut row = repo.create_row();
//!     row.set("Name", "first")?;
//!     row.set("Amount", "12.50")?;
//!     let copied = repo.bulk_insert(&[row]).await?;
//!     println!("Loaded {} rows", copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod dynamic;
pub mod entity;
pub mod error;
pub mod query;
pub mod repository;

// Re-exports for convenient access
pub use crate::config::{
    BulkCopyOptions, ConnectionConfig, DalConfig, IdentifierPolicy, RepositoryConfig,
};
pub use crate::core::{
    FromSqlValue, Logger, ParameterMap, ResultRow, SqlConnection, SqlValue, StorageType,
    TabularBuffer, ToSqlValue,
};
pub use drivers::mssql::TiberiusConnection;
pub use dynamic::{DynamicTableRepository, TableState};
pub use entity::{Entity, EntityDescriptor, MetadataRegistry, Property};
pub use error::{DalError, MetadataErrorKind, Result, SqlErrorCode};
pub use repository::{DatabaseRepository, EntityRepository, Repository, SqlTableRepository};
