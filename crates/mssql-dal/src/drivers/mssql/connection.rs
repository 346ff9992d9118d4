//! [`SqlConnection`] over a single tiberius client.

use std::fmt;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::{BulkCopyOptions, ConnectionConfig};
use crate::core::buffer::TabularBuffer;
use crate::core::identifier::{quote_mssql, validate_identifier};
use crate::core::params::{ParameterMap, ResultRow};
use crate::core::traits::SqlConnection;
use crate::core::value::{SqlValue, StorageType};
use crate::error::{DalError, Result};

use super::convert::{
    decode_row, row_has_oversized_strings, to_column_data, to_sql_param, DestinationColumn,
};
use super::params::bind_named;

/// SQL Server accepts 2100 parameters per request.
const MAX_PARAMETERS: usize = 2100;

/// Insertable columns in column order. Identity, computed and rowversion
/// columns are skipped, like tiberius does when it prepares a bulk insert.
const DESTINATION_COLUMNS_SQL: &str = "\
    SELECT c.name, t.name, CAST(c.scale AS int) \
    FROM sys.columns c \
    JOIN sys.types t ON c.system_type_id = t.user_type_id \
    WHERE c.object_id = OBJECT_ID(@P1) \
      AND c.is_identity = 0 AND c.is_computed = 0 AND t.name <> 'timestamp' \
    ORDER BY c.column_id";

type TdsClient = Client<Compat<TcpStream>>;

/// Exclusive table lock held until the surrounding transaction ends.
///
/// The lock is only taken when a row is read, so `TOP 0` would not do.
fn table_lock_sql(quoted_table: &str) -> String {
    format!("SELECT TOP 1 1 FROM {} WITH (TABLOCKX, HOLDLOCK)", quoted_table)
}

/// One lazily opened SQL Server connection.
pub struct TiberiusConnection {
    config: ConnectionConfig,
    client: Option<TdsClient>,
}

impl TiberiusConnection {
    /// An unopened connection. Nothing is sent until [`open`](SqlConnection::open).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));
        if let Some(name) = &self.config.application_name {
            config.application_name(name);
        }

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        if self.config.trust_server_cert {
            config.trust_cert();
        }

        config
    }

    async fn connect(&self) -> Result<TdsClient> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true).ok();
        Ok(Client::connect(config, tcp.compat_write()).await?)
    }

    async fn client(&mut self) -> Result<&mut TdsClient> {
        if self.client.is_none() {
            self.client = Some(self.connect().await?);
        }
        self.client
            .as_mut()
            .ok_or_else(|| DalError::Config("connection is not open".to_string()))
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        self.client().await?.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn destination_columns(&mut self, quoted_table: &str) -> Result<Vec<DestinationColumn>> {
        let rows = self
            .client()
            .await?
            .query(DESTINATION_COLUMNS_SQL, &[&quoted_table])
            .await?
            .into_first_result()
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = row
                .get(0)
                .ok_or_else(|| DalError::Mapping("missing column name".to_string()))?;
            let type_name: &str = row
                .get(1)
                .ok_or_else(|| DalError::Mapping("missing column type".to_string()))?;
            let scale: i32 = row.get(2).unwrap_or(0);
            columns.push(DestinationColumn {
                name: name.to_string(),
                type_name: type_name.to_lowercase(),
                scale: u8::try_from(scale).unwrap_or(0),
            });
        }

        if columns.is_empty() {
            return Err(DalError::Mapping(format!(
                "table {} does not exist or has no insertable columns",
                quoted_table
            )));
        }
        Ok(columns)
    }

    /// Align buffer rows with the destination columns.
    ///
    /// Values are converted to the destination storage type. Destination
    /// columns without a mapping receive a typed NULL. A mapping to a column
    /// the table does not have is an error.
    fn align_rows(
        buffer: &TabularBuffer,
        destination: &[DestinationColumn],
    ) -> Result<Vec<Vec<SqlValue<'static>>>> {
        for mapping in buffer.mappings() {
            if !destination
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(&mapping.destination))
            {
                return Err(DalError::Mapping(format!(
                    "column '{}' does not exist in {}",
                    mapping.destination,
                    buffer.destination()
                )));
            }
        }

        let sources = destination
            .iter()
            .map(|d| -> Result<(Option<usize>, StorageType)> {
                let source = buffer
                    .mappings()
                    .iter()
                    .find(|m| m.destination.eq_ignore_ascii_case(&d.name))
                    .and_then(|m| buffer.columns().iter().position(|c| c.name == m.source));
                Ok((source, d.storage()?))
            })
            .collect::<Result<Vec<_>>>()?;

        buffer
            .rows()
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|(source, storage)| match source {
                        Some(i) => row[*i].clone().coerce(*storage),
                        None => Ok(SqlValue::Null(*storage)),
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    async fn insert_rows_fallback(
        &mut self,
        quoted_table: &str,
        destination: &[DestinationColumn],
        rows: &[Vec<SqlValue<'static>>],
    ) -> Result<u64> {
        let col_list = destination
            .iter()
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let rows_per_batch = (MAX_PARAMETERS / destination.len().max(1)).max(1);

        let mut inserted = 0u64;
        for batch in rows.chunks(rows_per_batch) {
            let mut next = 1;
            let groups: Vec<String> = batch
                .iter()
                .map(|row| {
                    let placeholders: Vec<String> = row
                        .iter()
                        .map(|_| {
                            let p = format!("@P{}", next);
                            next += 1;
                            p
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quoted_table,
                col_list,
                groups.join(", ")
            );

            let params: Vec<Box<dyn ToSql>> = batch
                .iter()
                .flat_map(|row| row.iter().map(to_sql_param))
                .collect();
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            self.client().await?.execute(sql.as_str(), &refs).await?;
            inserted += batch.len() as u64;
        }
        Ok(inserted)
    }
}

impl fmt::Debug for TiberiusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiberiusConnection")
            .field("config", &self.config)
            .field("open", &self.client.is_some())
            .finish()
    }
}

#[async_trait]
impl SqlConnection for TiberiusConnection {
    fn database(&self) -> &str {
        &self.config.database
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        self.client().await?;
        Ok(())
    }

    fn reset(&mut self) {
        if self.client.take().is_some() {
            debug!("Dropped session to {}", self.config.database);
        }
    }

    fn retarget(&self, database: &str) -> Result<Self> {
        validate_identifier(database)?;
        Ok(Self::new(self.config.with_database(database)))
    }

    async fn execute(&mut self, sql: &str, params: &ParameterMap) -> Result<u64> {
        let (sql, values) = bind_named(sql, params)?;
        let params: Vec<Box<dyn ToSql>> = values.iter().map(to_sql_param).collect();
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let result = self.client().await?.execute(sql.as_str(), &refs).await?;
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str, params: &ParameterMap) -> Result<Vec<ResultRow>> {
        let (sql, values) = bind_named(sql, params)?;
        let params: Vec<Box<dyn ToSql>> = values.iter().map(to_sql_param).collect();
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = self
            .client()
            .await?
            .query(sql.as_str(), &refs)
            .await?
            .into_first_result()
            .await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.simple("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn bulk_copy(
        &mut self,
        buffer: &TabularBuffer,
        options: &BulkCopyOptions,
    ) -> Result<u64> {
        if buffer.is_empty() {
            return Ok(0);
        }
        let table = buffer.destination().quoted()?;
        let destination = self.destination_columns(&table).await?;
        let rows = Self::align_rows(buffer, &destination)?;

        if options.table_lock {
            self.simple(&table_lock_sql(&table)).await?;
        }

        let (oversized, bulk): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|row| row_has_oversized_strings(row));

        let mut copied = 0u64;
        let batch_size = options.batch_size.max(1);
        for batch in bulk.chunks(batch_size) {
            let client = self.client().await?;
            let mut request = client.bulk_insert(&table).await?;
            for row in batch {
                let mut token_row = TokenRow::new();
                for (value, column) in row.iter().zip(&destination) {
                    token_row.push(to_column_data(value.clone(), column)?);
                }
                request.send(token_row).await?;
            }
            request.finalize().await?;
            copied += batch.len() as u64;
            debug!("Bulk inserted {} rows into {}", batch.len(), table);
        }

        if !oversized.is_empty() {
            debug!(
                "Falling back to INSERT for {} rows with oversized strings in {}",
                oversized.len(),
                table
            );
            copied += self
                .insert_rows_fallback(&table, &destination, &oversized)
                .await?;
        }

        Ok(copied)
    }
}
