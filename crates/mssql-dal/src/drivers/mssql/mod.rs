//! Microsoft SQL Server driver built on tiberius.
//!
//! [`TiberiusConnection`] implements [`SqlConnection`](crate::core::SqlConnection)
//! over one TDS connection: named parameters are rewritten for positional
//! binding, result rows are decoded into [`ResultRow`](crate::core::ResultRow)s,
//! and bulk copies stream through TDS bulk insert.

mod connection;
mod convert;
mod params;

pub use connection::TiberiusConnection;
pub use params::bind_named;
