//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DalConfig {
    /// SQL Server connection settings.
    pub connection: ConnectionConfig,

    /// Repository behavior (wait budgets, bulk copy, identifier policy).
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Initial catalog.
    pub database: String,

    /// Username (SQL authentication).
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Application name reported to the server.
    #[serde(default)]
    pub application_name: Option<String>,
}

impl ConnectionConfig {
    /// Copy of this configuration pointing at another catalog.
    ///
    /// Everything except the database name is preserved.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// How caller-supplied table and column names are checked before they are
/// placed in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Only letters are accepted.
    #[default]
    LettersOnly,
    /// Any valid identifier is accepted and bracket-quoted.
    Quoted,
}

/// Options for one bulk copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCopyOptions {
    /// Seconds to wait for the connection to open (default: 60 for entities,
    /// 30 for dynamic tables).
    #[serde(default = "default_entity_connection_wait")]
    pub connection_wait_secs: u64,

    /// Rows sent per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds allowed for the copy itself.
    #[serde(default = "default_bulk_timeout")]
    pub timeout_secs: u64,

    /// Hold an exclusive table lock for the duration of the load.
    #[serde(default = "default_true")]
    pub table_lock: bool,
}

impl BulkCopyOptions {
    /// Defaults for loading typed entities (60 second open wait).
    pub fn for_entities() -> Self {
        Self {
            connection_wait_secs: default_entity_connection_wait(),
            batch_size: default_batch_size(),
            timeout_secs: default_bulk_timeout(),
            table_lock: true,
        }
    }

    /// Defaults for loading dynamic tables (30 second open wait).
    pub fn for_dynamic_tables() -> Self {
        Self {
            connection_wait_secs: default_dynamic_connection_wait(),
            ..Self::for_entities()
        }
    }

    pub fn connection_wait(&self) -> Duration {
        Duration::from_secs(self.connection_wait_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BulkCopyOptions {
    fn default() -> Self {
        Self::for_entities()
    }
}

/// Repository behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Seconds to wait for the connection to open before CRUD and table
    /// statements (default: 30).
    #[serde(default = "default_command_wait")]
    pub command_wait_secs: u64,

    /// Bulk copy settings for typed entities.
    #[serde(
        default = "BulkCopyOptions::for_entities",
        deserialize_with = "entity_bulk_section"
    )]
    pub entity_bulk: BulkCopyOptions,

    /// Bulk copy settings for dynamic tables. Omitted fields take the
    /// dynamic defaults, not the entity ones.
    #[serde(
        default = "BulkCopyOptions::for_dynamic_tables",
        deserialize_with = "dynamic_bulk_section"
    )]
    pub dynamic_bulk: BulkCopyOptions,

    /// Check applied to caller-supplied identifiers (default: letters_only).
    #[serde(default)]
    pub identifier_policy: IdentifierPolicy,
}

impl RepositoryConfig {
    pub fn command_wait(&self) -> Duration {
        Duration::from_secs(self.command_wait_secs)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            command_wait_secs: default_command_wait(),
            entity_bulk: BulkCopyOptions::for_entities(),
            dynamic_bulk: BulkCopyOptions::for_dynamic_tables(),
            identifier_policy: IdentifierPolicy::default(),
        }
    }
}

/// A bulk copy section as written; omitted fields fall back to a profile.
#[derive(Deserialize)]
struct BulkCopySection {
    connection_wait_secs: Option<u64>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
    table_lock: Option<bool>,
}

impl BulkCopySection {
    fn over(self, defaults: BulkCopyOptions) -> BulkCopyOptions {
        BulkCopyOptions {
            connection_wait_secs: self
                .connection_wait_secs
                .unwrap_or(defaults.connection_wait_secs),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            table_lock: self.table_lock.unwrap_or(defaults.table_lock),
        }
    }
}

fn entity_bulk_section<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BulkCopyOptions, D::Error> {
    BulkCopySection::deserialize(deserializer)
        .map(|section| section.over(BulkCopyOptions::for_entities()))
}

fn dynamic_bulk_section<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BulkCopyOptions, D::Error> {
    BulkCopySection::deserialize(deserializer)
        .map(|section| section.over(BulkCopyOptions::for_dynamic_tables()))
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_command_wait() -> u64 {
    30
}

fn default_entity_connection_wait() -> u64 {
    60
}

fn default_dynamic_connection_wait() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10_000
}

fn default_bulk_timeout() -> u64 {
    3600
}
