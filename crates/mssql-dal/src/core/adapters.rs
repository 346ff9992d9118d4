//! Scalar adapters for optional date/time-like values.
//!
//! These two adapters are the only place where an absent `NaiveDateTime` or
//! `chrono::Duration` is translated to and from a database NULL. The
//! `ToSqlValue`/`FromSqlValue` impls for `Option<NaiveDateTime>` and
//! `Option<Duration>` delegate here.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::core::value::{parse_datetime, parse_time, SqlValue, StorageType};
use crate::error::{DalError, Result};

/// Two-way conversion between an optional scalar and a SQL value.
pub trait ScalarAdapter {
    type Value;

    /// Storage type used for the NULL marker.
    const STORAGE: StorageType;

    /// Encode a value as a parameter, `None` becoming a typed NULL.
    fn set_value(value: Option<&Self::Value>) -> Result<SqlValue<'static>>;

    /// Decode a column value, NULL becoming `None`.
    fn parse(value: &SqlValue<'_>) -> Result<Option<Self::Value>>;
}

/// Adapter for `Option<NaiveDateTime>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableDateTimeAdapter;

impl ScalarAdapter for NullableDateTimeAdapter {
    type Value = NaiveDateTime;

    const STORAGE: StorageType = StorageType::DateTime;

    fn set_value(value: Option<&NaiveDateTime>) -> Result<SqlValue<'static>> {
        Ok(match value {
            Some(v) => SqlValue::DateTime(*v),
            None => SqlValue::Null(Self::STORAGE),
        })
    }

    fn parse(value: &SqlValue<'_>) -> Result<Option<NaiveDateTime>> {
        match value {
            SqlValue::Null(_) => Ok(None),
            SqlValue::DateTime(v) => Ok(Some(*v)),
            SqlValue::DateTimeOffset(v) => Ok(Some(v.naive_local())),
            SqlValue::Date(d) => Ok(d.and_hms_opt(0, 0, 0)),
            SqlValue::Text(s) => parse_datetime(s).map(Some).ok_or_else(|| {
                DalError::Mapping(format!("cannot parse '{}' as a date/time", s))
            }),
            other => Err(DalError::Mapping(format!(
                "cannot convert {:?} to a date/time",
                other.storage_type()
            ))),
        }
    }
}

/// Adapter for `Option<Duration>`, stored as a SQL `time` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableTimeSpanAdapter;

impl NullableTimeSpanAdapter {
    fn to_time(span: &Duration) -> Result<NaiveTime> {
        let nanos = span
            .num_nanoseconds()
            .filter(|n| *n >= 0 && *n < 86_400 * 1_000_000_000)
            .ok_or_else(|| {
                DalError::Mapping(format!(
                    "time span {} does not fit a SQL time value (0 to 24 hours)",
                    span
                ))
            })?;
        let secs = (nanos / 1_000_000_000) as u32;
        let frac = (nanos % 1_000_000_000) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, frac)
            .ok_or_else(|| DalError::Mapping(format!("invalid time span {}", span)))
    }

    fn from_time(time: &NaiveTime) -> Duration {
        Duration::seconds(i64::from(time.num_seconds_from_midnight()))
            + Duration::nanoseconds(i64::from(time.nanosecond()))
    }
}

impl ScalarAdapter for NullableTimeSpanAdapter {
    type Value = Duration;

    const STORAGE: StorageType = StorageType::Time;

    fn set_value(value: Option<&Duration>) -> Result<SqlValue<'static>> {
        match value {
            Some(v) => Ok(SqlValue::Time(Self::to_time(v)?)),
            None => Ok(SqlValue::Null(Self::STORAGE)),
        }
    }

    fn parse(value: &SqlValue<'_>) -> Result<Option<Duration>> {
        match value {
            SqlValue::Null(_) => Ok(None),
            SqlValue::Time(t) => Ok(Some(Self::from_time(t))),
            SqlValue::Text(s) => parse_time(s)
                .map(|t| Some(Self::from_time(&t)))
                .ok_or_else(|| DalError::Mapping(format!("cannot parse '{}' as a time span", s))),
            other => Err(DalError::Mapping(format!(
                "cannot convert {:?} to a time span",
                other.storage_type()
            ))),
        }
    }
}
