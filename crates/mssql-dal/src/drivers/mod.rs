//! Database driver implementations of [`SqlConnection`](crate::core::SqlConnection).
//!
//! - [`mssql`]: Microsoft SQL Server over TDS (tiberius)

pub mod mssql;
