//! Core value types and the SQL execution seam shared by every repository.

pub mod adapters;
pub mod buffer;
pub mod convert;
pub mod identifier;
pub mod logger;
pub mod params;
pub mod traits;
pub mod value;

pub use adapters::{NullableDateTimeAdapter, NullableTimeSpanAdapter, ScalarAdapter};
pub use buffer::{BufferColumn, ColumnMapping, TableName, TabularBuffer};
pub use convert::{FromSqlValue, ToSqlValue};
pub use identifier::{
    guard_identifier, qualify_mssql, quote_mssql, validate_identifier, validate_letters_only,
    validate_sql_type,
};
pub use logger::Logger;
pub use params::{normalize_parameter_name, ParameterMap, ResultRow};
pub use traits::SqlConnection;
pub use value::{SqlValue, StorageType};
