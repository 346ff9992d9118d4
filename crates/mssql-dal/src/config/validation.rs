//! Configuration validation.

use super::{BulkCopyOptions, DalConfig};
use crate::error::{DalError, Result};

/// Validate the configuration.
pub fn validate(config: &DalConfig) -> Result<()> {
    let conn = &config.connection;
    if conn.host.is_empty() {
        return Err(DalError::Config("connection.host is required".into()));
    }
    if conn.database.is_empty() {
        return Err(DalError::Config("connection.database is required".into()));
    }
    if conn.user.is_empty() {
        return Err(DalError::Config("connection.user is required".into()));
    }
    if conn.port == 0 {
        return Err(DalError::Config("connection.port must be non-zero".into()));
    }

    let repo = &config.repository;
    if repo.command_wait_secs == 0 {
        return Err(DalError::Config(
            "repository.command_wait_secs must be at least 1".into(),
        ));
    }
    validate_bulk("repository.entity_bulk", &repo.entity_bulk)?;
    validate_bulk("repository.dynamic_bulk", &repo.dynamic_bulk)?;

    Ok(())
}

fn validate_bulk(prefix: &str, opts: &BulkCopyOptions) -> Result<()> {
    if opts.batch_size == 0 {
        return Err(DalError::Config(format!(
            "{}.batch_size must be at least 1",
            prefix
        )));
    }
    if opts.timeout_secs == 0 {
        return Err(DalError::Config(format!(
            "{}.timeout_secs must be at least 1",
            prefix
        )));
    }
    if opts.connection_wait_secs == 0 {
        return Err(DalError::Config(format!(
            "{}.connection_wait_secs must be at least 1",
            prefix
        )));
    }
    Ok(())
}
