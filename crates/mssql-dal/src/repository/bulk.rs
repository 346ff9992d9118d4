//! Transactional bulk copy shared by entity and dynamic repositories.

use std::time::Duration;

use crate::config::BulkCopyOptions;
use crate::core::buffer::TabularBuffer;
use crate::core::logger::Logger;
use crate::core::traits::SqlConnection;
use crate::error::{DalError, Result};

use super::open_within;

/// Upper bound on a rollback after a failed write.
const ROLLBACK_WAIT: Duration = Duration::from_secs(30);

/// Copy `buffer` into its table inside one transaction.
///
/// Opens the connection within `options.connection_wait()`, begins a
/// transaction, runs the copy under `options.timeout()` and commits. On any
/// failure a rollback is attempted and the original error is returned. A copy
/// that times out leaves the stream mid-request, so the session is dropped
/// instead and the server discards the transaction.
pub(crate) async fn bulk_load<C: SqlConnection>(
    connection: &mut C,
    logger: &Logger,
    operation: &str,
    buffer: &TabularBuffer,
    options: &BulkCopyOptions,
) -> Result<u64> {
    open_within(connection, options.connection_wait(), operation).await?;

    logger.debug(
        operation,
        &format!(
            "bulk loading {} rows into {}.{} (batch size {})",
            buffer.row_count(),
            connection.database(),
            buffer.destination(),
            options.batch_size
        ),
    );

    connection.begin_transaction().await?;

    let outcome =
        tokio::time::timeout(options.timeout(), connection.bulk_copy(buffer, options)).await;
    let copied = match outcome {
        Ok(Ok(copied)) => copied,
        Ok(Err(e)) => {
            rollback_quietly(connection, logger, operation).await;
            return Err(e);
        }
        Err(_) => {
            logger.debug(operation, "bulk copy timed out, dropping the session");
            connection.reset();
            return Err(DalError::timeout(operation, options.timeout()));
        }
    };

    if let Err(e) = connection.commit().await {
        rollback_quietly(connection, logger, operation).await;
        return Err(e);
    }

    logger.debug(
        operation,
        &format!("bulk loaded {} rows into {}", copied, buffer.destination()),
    );
    Ok(copied)
}

pub(crate) async fn rollback_quietly<C: SqlConnection>(
    connection: &mut C,
    logger: &Logger,
    operation: &str,
) {
    match tokio::time::timeout(ROLLBACK_WAIT, connection.rollback()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => logger.debug(operation, &format!("rollback failed: {}", e)),
        Err(_) => {
            logger.debug(operation, "rollback timed out, dropping the session");
            connection.reset();
        }
    }
}
