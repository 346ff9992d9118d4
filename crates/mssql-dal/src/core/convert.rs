//! Conversions between Rust scalars and [`SqlValue`].

use std::borrow::Cow;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::adapters::{NullableDateTimeAdapter, NullableTimeSpanAdapter, ScalarAdapter};
use crate::core::value::{SqlValue, StorageType};
use crate::error::{DalError, Result};

/// Convert a Rust value into a SQL value for parameters and bulk rows.
///
/// Fails with [`DalError::Mapping`] when the value has no SQL encoding, such
/// as a time span outside one day.
pub trait ToSqlValue {
    fn to_sql_value(&self) -> Result<SqlValue<'static>>;
}

/// Convert a SQL value read from a result row into a Rust value.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self>;
}

fn mismatch<T>(value: &SqlValue<'_>) -> DalError {
    if value.is_null() {
        DalError::Mapping(format!(
            "unexpected NULL for non-optional {}",
            std::any::type_name::<T>()
        ))
    } else {
        DalError::Mapping(format!(
            "cannot convert {:?} to {}",
            value.storage_type(),
            std::any::type_name::<T>()
        ))
    }
}

macro_rules! to_sql_copy {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(&self) -> Result<SqlValue<'static>> {
                    Ok(SqlValue::$variant(*self))
                }
            }
        )*
    };
}

to_sql_copy!(
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Uuid => Uuid,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
);

impl ToSqlValue for String {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        Ok(SqlValue::Text(Cow::Owned(self.clone())))
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        Ok(SqlValue::Text(Cow::Owned((*self).to_string())))
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        Ok(SqlValue::Bytes(Cow::Owned(self.clone())))
    }
}

impl ToSqlValue for SqlValue<'_> {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        Ok(self.clone().into_owned())
    }
}

impl ToSqlValue for Duration {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        NullableTimeSpanAdapter::set_value(Some(self))
    }
}

macro_rules! to_sql_optional {
    ($($ty:ty => $storage:ident),* $(,)?) => {
        $(
            impl ToSqlValue for Option<$ty> {
                fn to_sql_value(&self) -> Result<SqlValue<'static>> {
                    match self {
                        Some(v) => v.to_sql_value(),
                        None => Ok(SqlValue::Null(StorageType::$storage)),
                    }
                }
            }
        )*
    };
}

to_sql_optional!(
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    Decimal => Decimal,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
);

impl ToSqlValue for Option<NaiveDateTime> {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        NullableDateTimeAdapter::set_value(self.as_ref())
    }
}

impl ToSqlValue for Option<Duration> {
    fn to_sql_value(&self) -> Result<SqlValue<'static>> {
        NullableTimeSpanAdapter::set_value(self.as_ref())
    }
}

macro_rules! from_sql_integer {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
                    value
                        .as_i64()
                        .and_then(|v| <$ty>::try_from(v).ok())
                        .ok_or_else(|| mismatch::<$ty>(value))
                }
            }
        )*
    };
}

from_sql_integer!(i16, i32, i64);

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            other => other
                .as_i64()
                .map(|v| v != 0)
                .ok_or_else(|| mismatch::<bool>(other)),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        value
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| mismatch::<f32>(value))
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch::<f64>(value))
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Decimal(d) => Ok(*d),
            other if !other.is_null() => other
                .clone()
                .coerce(StorageType::Decimal)
                .and_then(|v| match v {
                    SqlValue::Decimal(d) => Ok(d),
                    _ => Err(mismatch::<Decimal>(other)),
                }),
            other => Err(mismatch::<Decimal>(other)),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Text(s) => Ok(s.to_string()),
            SqlValue::Null(_) => Err(mismatch::<String>(value)),
            other => match other.clone().coerce(StorageType::String)? {
                SqlValue::Text(s) => Ok(s.into_owned()),
                _ => Err(mismatch::<String>(other)),
            },
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Bytes(b) => Ok(b.to_vec()),
            other => Err(mismatch::<Vec<u8>>(other)),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Uuid(u) => Ok(*u),
            SqlValue::Text(s) => Uuid::parse_str(s).map_err(|_| mismatch::<Uuid>(value)),
            other => Err(mismatch::<Uuid>(other)),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        NullableDateTimeAdapter::parse(value)?.ok_or_else(|| mismatch::<NaiveDateTime>(value))
    }
}

impl FromSqlValue for DateTime<FixedOffset> {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::DateTimeOffset(v) => Ok(*v),
            other => Err(mismatch::<DateTime<FixedOffset>>(other)),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::DateTime(dt) => Ok(dt.date()),
            other => Err(mismatch::<NaiveDate>(other)),
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        match value {
            SqlValue::Time(t) => Ok(*t),
            other => Err(mismatch::<NaiveTime>(other)),
        }
    }
}

impl FromSqlValue for Duration {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        NullableTimeSpanAdapter::parse(value)?.ok_or_else(|| mismatch::<Duration>(value))
    }
}

impl FromSqlValue for SqlValue<'static> {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        Ok(value.clone().into_owned())
    }
}

macro_rules! from_sql_optional {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for Option<$ty> {
                fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
                    if value.is_null() {
                        Ok(None)
                    } else {
                        <$ty>::from_sql_value(value).map(Some)
                    }
                }
            }
        )*
    };
}

from_sql_optional!(
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    Decimal,
    String,
    Vec<u8>,
    Uuid,
    DateTime<FixedOffset>,
    NaiveDate,
    NaiveTime
);

impl FromSqlValue for Option<NaiveDateTime> {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        NullableDateTimeAdapter::parse(value)
    }
}

impl FromSqlValue for Option<Duration> {
    fn from_sql_value(value: &SqlValue<'_>) -> Result<Self> {
        NullableTimeSpanAdapter::parse(value)
    }
}

/// Integer key conversion used for identity values returned by INSERT.
///
/// `COALESCE(SCOPE_IDENTITY(), ...)` yields `numeric(38,0)`, so keys arrive as
/// decimals and must be narrowed.
pub(crate) fn decimal_to_i64(d: &Decimal) -> Option<i64> {
    if d.fract().is_zero() {
        d.to_i64()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_none_is_typed_null() {
        let v: Option<Decimal> = None;
        assert_eq!(v.to_sql_value().unwrap(), SqlValue::Null(StorageType::Decimal));
        let s: Option<String> = None;
        assert_eq!(s.to_sql_value().unwrap(), SqlValue::Null(StorageType::String));
    }

    #[test]
    fn test_optional_datetime_goes_through_adapter() {
        let v: Option<NaiveDateTime> = None;
        assert_eq!(v.to_sql_value().unwrap(), SqlValue::Null(StorageType::DateTime));
        let back = Option::<NaiveDateTime>::from_sql_value(&SqlValue::Null(StorageType::DateTime))
            .unwrap();
        assert_eq!(back, None);
    }

    #[test]
    fn test_optional_duration_goes_through_adapter() {
        let v = Some(Duration::minutes(90));
        let encoded = v.to_sql_value().unwrap();
        assert_eq!(
            encoded,
            SqlValue::Time(NaiveTime::from_hms_opt(1, 30, 0).unwrap())
        );
        assert_eq!(Option::<Duration>::from_sql_value(&encoded).unwrap(), v);
    }

    #[test]
    fn test_out_of_range_span_is_an_error_not_null() {
        let err = Some(Duration::hours(25)).to_sql_value().unwrap_err();
        assert!(matches!(err, DalError::Mapping(_)));
        assert!(Duration::seconds(-1).to_sql_value().is_err());
        assert!(Option::<Duration>::None.to_sql_value().unwrap().is_null());
    }

    #[test]
    fn test_identity_decimal_narrows_to_i32() {
        let v = SqlValue::Decimal(Decimal::new(17, 0));
        assert_eq!(i32::from_sql_value(&v).unwrap(), 17);
        assert_eq!(decimal_to_i64(&Decimal::new(17, 0)), Some(17));
    }

    #[test]
    fn test_null_into_non_optional_fails() {
        let err = i32::from_sql_value(&SqlValue::Null(StorageType::I32)).unwrap_err();
        assert!(err.to_string().contains("unexpected NULL"));
    }

    #[test]
    fn test_null_into_optional_is_none() {
        assert_eq!(
            Option::<i64>::from_sql_value(&SqlValue::Null(StorageType::I64)).unwrap(),
            None
        );
        assert_eq!(
            Option::<i64>::from_sql_value(&SqlValue::I32(4)).unwrap(),
            Some(4)
        );
    }

    #[test]
    fn test_string_from_number() {
        assert_eq!(String::from_sql_value(&SqlValue::I32(12)).unwrap(), "12");
    }
}
