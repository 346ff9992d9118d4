//! SQL value types shared by parameter binding, row decoding and bulk loads.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DalError, Result};

/// Storage type of a column or property, with any optional wrapper removed.
///
/// Also used as the type hint carried by NULL values so that bulk loads and
/// parameters encode them with the right wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl StorageType {
    /// SQL type used when a dynamic column declares neither an explicit SQL
    /// type string nor an engine type tag.
    ///
    /// The table is closed: types without an entry are rejected when the
    /// table definition is constructed.
    pub const fn default_sql_type(self) -> Option<&'static str> {
        match self {
            StorageType::String => Some("varchar(max)"),
            StorageType::I32 => Some("int"),
            StorageType::Decimal => Some("decimal(28,20)"),
            StorageType::Bool
            | StorageType::I16
            | StorageType::I64
            | StorageType::F32
            | StorageType::F64
            | StorageType::Bytes
            | StorageType::Uuid
            | StorageType::DateTime
            | StorageType::DateTimeOffset
            | StorageType::Date
            | StorageType::Time => None,
        }
    }
}

/// SQL value with a typed NULL.
///
/// Uses `Cow` for string and byte data so values can borrow from caller
/// buffers; use [`SqlValue::into_owned`] to detach them.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint for correct wire format encoding.
    Null(StorageType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I16(v) => SqlValue::I16(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F32(v) => SqlValue::F32(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Storage type of this value (the hint for NULLs).
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => StorageType::Bool,
            SqlValue::I16(_) => StorageType::I16,
            SqlValue::I32(_) => StorageType::I32,
            SqlValue::I64(_) => StorageType::I64,
            SqlValue::F32(_) => StorageType::F32,
            SqlValue::F64(_) => StorageType::F64,
            SqlValue::Text(_) => StorageType::String,
            SqlValue::Bytes(_) => StorageType::Bytes,
            SqlValue::Uuid(_) => StorageType::Uuid,
            SqlValue::Decimal(_) => StorageType::Decimal,
            SqlValue::DateTime(_) => StorageType::DateTime,
            SqlValue::DateTimeOffset(_) => StorageType::DateTimeOffset,
            SqlValue::Date(_) => StorageType::Date,
            SqlValue::Time(_) => StorageType::Time,
        }
    }

    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Convert this value into the given storage type.
    ///
    /// NULLs are retyped, integers widen or narrow when the value fits,
    /// text is parsed, and anything else renders to text when the target is
    /// a string column.
    pub fn coerce(self, target: StorageType) -> Result<SqlValue<'static>> {
        if self.storage_type() == target {
            return Ok(self.into_owned());
        }
        if self.is_null() {
            return Ok(SqlValue::Null(target));
        }

        let source = self.storage_type();

        let coerced = match (target, self) {
            (StorageType::String, value) => Some(SqlValue::text_owned(value.render())),

            (StorageType::Bool, SqlValue::Text(s)) => parse_bool(&s).map(SqlValue::Bool),
            (StorageType::Bool, value) => value.as_i64().map(|v| SqlValue::Bool(v != 0)),

            (StorageType::I16, value) => value
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(SqlValue::I16),
            (StorageType::I32, value) => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(SqlValue::I32),
            (StorageType::I64, value) => value.as_i64().map(SqlValue::I64),

            (StorageType::F32, value) => value.as_f64().map(|v| SqlValue::F32(v as f32)),
            (StorageType::F64, value) => value.as_f64().map(SqlValue::F64),

            (StorageType::Decimal, SqlValue::Text(s)) => {
                Decimal::from_str(s.trim()).ok().map(SqlValue::Decimal)
            }
            (StorageType::Decimal, SqlValue::F32(v)) => {
                Decimal::from_f32(v).map(SqlValue::Decimal)
            }
            (StorageType::Decimal, SqlValue::F64(v)) => {
                Decimal::from_f64(v).map(SqlValue::Decimal)
            }
            (StorageType::Decimal, value) => value.as_i64().map(|v| SqlValue::Decimal(v.into())),

            (StorageType::Uuid, SqlValue::Text(s)) => {
                Uuid::parse_str(s.trim()).ok().map(SqlValue::Uuid)
            }
            (StorageType::Bytes, SqlValue::Text(s)) => {
                Some(SqlValue::Bytes(Cow::Owned(s.into_owned().into_bytes())))
            }

            (StorageType::DateTime, SqlValue::Text(s)) => {
                parse_datetime(&s).map(SqlValue::DateTime)
            }
            (StorageType::DateTime, SqlValue::Date(d)) => {
                d.and_hms_opt(0, 0, 0).map(SqlValue::DateTime)
            }
            (StorageType::DateTime, SqlValue::DateTimeOffset(dto)) => {
                Some(SqlValue::DateTime(dto.naive_local()))
            }
            (StorageType::DateTimeOffset, SqlValue::Text(s)) => {
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(SqlValue::DateTimeOffset)
            }
            (StorageType::Date, SqlValue::Text(s)) => {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .map(SqlValue::Date)
            }
            (StorageType::Date, SqlValue::DateTime(dt)) => Some(SqlValue::Date(dt.date())),
            (StorageType::Time, SqlValue::Text(s)) => parse_time(&s).map(SqlValue::Time),
            (StorageType::Time, SqlValue::DateTime(dt)) => Some(SqlValue::Time(dt.time())),

            _ => None,
        };

        coerced.ok_or_else(|| {
            DalError::Mapping(format!("cannot convert {:?} value to {:?}", source, target))
        })
    }

    /// Integer view of numeric or textual values, when exact.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SqlValue::F64(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::F32(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view of numeric or textual values.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::F32(v) => Some(f64::from(*v)),
            SqlValue::F64(v) => Some(*v),
            SqlValue::Decimal(d) => d.to_f64(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Text rendering used when loading into string columns.
    fn render(self) -> String {
        match self {
            SqlValue::Null(_) => String::new(),
            SqlValue::Bool(v) => if v { "1" } else { "0" }.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Text(v) => v.into_owned(),
            SqlValue::Bytes(v) => String::from_utf8_lossy(&v).into_owned(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

impl From<bool> for SqlValue<'static> {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue<'static> {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue<'static> {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Uuid> for SqlValue<'static> {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue<'static> {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue<'static> {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue<'static> {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_into_owned() {
        let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
        let owned: SqlValue<'static> = borrowed.into_owned();
        assert_eq!(owned, SqlValue::Text(Cow::Owned("hello".to_string())));
    }

    #[test]
    fn test_null_keeps_type_hint() {
        let v: SqlValue<'static> = SqlValue::Null(StorageType::Decimal);
        assert!(v.is_null());
        assert_eq!(v.storage_type(), StorageType::Decimal);
    }

    #[test]
    fn test_default_sql_type_table_is_closed() {
        assert_eq!(StorageType::String.default_sql_type(), Some("varchar(max)"));
        assert_eq!(StorageType::I32.default_sql_type(), Some("int"));
        assert_eq!(StorageType::Decimal.default_sql_type(), Some("decimal(28,20)"));
        assert_eq!(StorageType::Bool.default_sql_type(), None);
        assert_eq!(StorageType::DateTime.default_sql_type(), None);
    }

    #[test]
    fn test_coerce_text_to_int() {
        let v = SqlValue::from("42").coerce(StorageType::I32).unwrap();
        assert_eq!(v, SqlValue::I32(42));
    }

    #[test]
    fn test_coerce_int_to_decimal() {
        let v = SqlValue::I32(7).coerce(StorageType::Decimal).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(7, 0)));
    }

    #[test]
    fn test_coerce_text_to_decimal() {
        let v = SqlValue::from("12.50").coerce(StorageType::Decimal).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(1250, 2)));
    }

    #[test]
    fn test_coerce_retypes_null() {
        let v = SqlValue::Null(StorageType::String)
            .coerce(StorageType::I32)
            .unwrap();
        assert_eq!(v, SqlValue::Null(StorageType::I32));
    }

    #[test]
    fn test_coerce_anything_to_text() {
        let v = SqlValue::I64(99).coerce(StorageType::String).unwrap();
        assert_eq!(v, SqlValue::text_owned("99".to_string()));
    }

    #[test]
    fn test_coerce_rejects_overflow() {
        let err = SqlValue::I64(i64::MAX).coerce(StorageType::I32).unwrap_err();
        assert!(matches!(err, DalError::Mapping(_)));
    }

    #[test]
    fn test_coerce_rejects_garbage_text() {
        assert!(SqlValue::from("abc").coerce(StorageType::I32).is_err());
    }

    #[test]
    fn test_coerce_text_to_datetime() {
        let v = SqlValue::from("2024-06-15 10:30:00")
            .coerce(StorageType::DateTime)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(v, SqlValue::DateTime(expected));
    }

    #[test]
    fn test_fractional_decimal_is_not_an_integer() {
        assert_eq!(SqlValue::Decimal(Decimal::new(15, 1)).as_i64(), None);
        assert_eq!(SqlValue::Decimal(Decimal::new(150, 1)).as_i64(), Some(15));
    }
}
