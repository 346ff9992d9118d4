//! Conversions between [`SqlValue`] and tiberius parameters, bulk column data
//! and result rows.

use std::borrow::Cow;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::time::{Date, DateTime2, DateTimeOffset, SmallDateTime, Time};
use tiberius::xml::XmlData;
use tiberius::{ColumnData, FromSql, Row, ToSql};
use tracing::warn;

use crate::core::params::ResultRow;
use crate::core::value::{SqlValue, StorageType};
use crate::error::{DalError, Result};

/// Tiberius bulk insert rejects strings whose UTF-16 encoding exceeds this
/// many bytes.
pub(crate) const BULK_INSERT_STRING_LIMIT: usize = 65535;

/// `num_days_from_ce` of 1900-01-01, the epoch of `datetime` and
/// `smalldatetime`.
const DAYS_TO_1900: i32 = 693_596;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A destination column as seen by bulk copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DestinationColumn {
    pub name: String,
    /// Lower-case system type name from `sys.types`.
    pub type_name: String,
    /// Fractional digits for decimal and time types.
    pub scale: u8,
}

impl DestinationColumn {
    /// Storage type values must be converted to before encoding.
    pub fn storage(&self) -> Result<StorageType> {
        let storage = match self.type_name.as_str() {
            "bit" => StorageType::Bool,
            "tinyint" | "smallint" => StorageType::I16,
            "int" => StorageType::I32,
            "bigint" => StorageType::I64,
            "real" => StorageType::F32,
            "float" => StorageType::F64,
            "decimal" | "numeric" => StorageType::Decimal,
            "char" | "varchar" | "text" | "nchar" | "nvarchar" | "ntext" | "sysname" | "xml" => {
                StorageType::String
            }
            "binary" | "varbinary" | "image" => StorageType::Bytes,
            "uniqueidentifier" => StorageType::Uuid,
            "date" => StorageType::Date,
            "time" => StorageType::Time,
            "datetime" | "smalldatetime" | "datetime2" => StorageType::DateTime,
            "datetimeoffset" => StorageType::DateTimeOffset,
            other => {
                return Err(DalError::Mapping(format!(
                    "column '{}' has type {} which bulk copy does not support",
                    self.name, other
                )))
            }
        };
        Ok(storage)
    }
}

/// Whether a row holds a string too large for TDS bulk insert.
pub(crate) fn row_has_oversized_strings(row: &[SqlValue<'_>]) -> bool {
    row.iter().any(|value| match value {
        SqlValue::Text(s) => {
            s.chars().map(|c| c.len_utf16() * 2).sum::<usize>() > BULK_INSERT_STRING_LIMIT
        }
        _ => false,
    })
}

/// Convert a value to a statement parameter. NULLs keep their type.
pub(crate) fn to_sql_param(value: &SqlValue<'_>) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(storage) => match storage {
            StorageType::Bool => Box::new(Option::<bool>::None),
            StorageType::I16 => Box::new(Option::<i16>::None),
            StorageType::I32 => Box::new(Option::<i32>::None),
            StorageType::I64 => Box::new(Option::<i64>::None),
            StorageType::F32 => Box::new(Option::<f32>::None),
            StorageType::F64 => Box::new(Option::<f64>::None),
            StorageType::String => Box::new(Option::<String>::None),
            StorageType::Bytes => Box::new(Option::<Vec<u8>>::None),
            StorageType::Uuid => Box::new(Option::<uuid::Uuid>::None),
            StorageType::Decimal => Box::new(Option::<Decimal>::None),
            StorageType::DateTime => Box::new(Option::<NaiveDateTime>::None),
            StorageType::DateTimeOffset => Box::new(Option::<DateTime<FixedOffset>>::None),
            StorageType::Date => Box::new(Option::<NaiveDate>::None),
            StorageType::Time => Box::new(Option::<NaiveTime>::None),
        },
        SqlValue::Bool(v) => Box::new(*v),
        SqlValue::I16(v) => Box::new(*v),
        SqlValue::I32(v) => Box::new(*v),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F32(v) if !v.is_finite() => {
            warn!("Converting F32 NaN/Infinity parameter to NULL");
            Box::new(Option::<f32>::None)
        }
        SqlValue::F32(v) => Box::new(*v),
        SqlValue::F64(v) if !v.is_finite() => {
            warn!("Converting F64 NaN/Infinity parameter to NULL");
            Box::new(Option::<f64>::None)
        }
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::Text(s) => Box::new(s.to_string()),
        SqlValue::Bytes(b) => Box::new(b.to_vec()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

fn days_since_year_one(date: NaiveDate) -> Result<u32> {
    u32::try_from(date.num_days_from_ce() - 1)
        .map_err(|_| DalError::Mapping(format!("date {} is before year 1", date)))
}

fn nanos_since_midnight(time: NaiveTime) -> u64 {
    u64::from(time.num_seconds_from_midnight()) * NANOS_PER_SEC + u64::from(time.nanosecond())
}

/// `time(scale)` value: increments of 10^-scale seconds.
fn time_with_scale(time: NaiveTime, scale: u8) -> Time {
    let scale = scale.min(7);
    let divisor = 10u64.pow(9 - u32::from(scale));
    Time::new(nanos_since_midnight(time) / divisor, scale)
}

fn datetime2(dt: NaiveDateTime, scale: u8) -> Result<DateTime2> {
    Ok(DateTime2::new(
        Date::new(days_since_year_one(dt.date())?),
        time_with_scale(dt.time(), scale),
    ))
}

fn legacy_datetime(dt: NaiveDateTime) -> Result<tiberius::time::DateTime> {
    let days = dt.date().num_days_from_ce() - DAYS_TO_1900;
    // 1/300 second ticks, rounded.
    let ticks = (nanos_since_midnight(dt.time()) * 300 + NANOS_PER_SEC / 2) / NANOS_PER_SEC;
    let ticks = u32::try_from(ticks)
        .map_err(|_| DalError::Mapping(format!("time of {} out of range", dt)))?;
    Ok(tiberius::time::DateTime::new(days, ticks))
}

fn small_datetime(dt: NaiveDateTime) -> Result<SmallDateTime> {
    let out_of_range = || DalError::Mapping(format!("{} is out of smalldatetime range", dt));
    let days = u16::try_from(dt.date().num_days_from_ce() - DAYS_TO_1900)
        .map_err(|_| out_of_range())?;
    let minutes = (dt.time().num_seconds_from_midnight() + 30) / 60;
    let minutes = u16::try_from(minutes).map_err(|_| out_of_range())?;
    Ok(SmallDateTime::new(days, minutes))
}

/// Encode a value for one destination column of a bulk insert.
///
/// The value is first converted to the column's storage type, then encoded
/// with the wire type of the column.
pub(crate) fn to_column_data(
    value: SqlValue<'static>,
    column: &DestinationColumn,
) -> Result<ColumnData<'static>> {
    let value = value.coerce(column.storage()?)?;
    let data = match (column.type_name.as_str(), value) {
        ("bit", SqlValue::Bool(v)) => ColumnData::Bit(Some(v)),
        ("bit", _) => ColumnData::Bit(None),

        ("tinyint", SqlValue::I16(v)) => ColumnData::U8(Some(u8::try_from(v).map_err(|_| {
            DalError::Mapping(format!("{} does not fit tinyint column '{}'", v, column.name))
        })?)),
        ("tinyint", _) => ColumnData::U8(None),
        ("smallint", SqlValue::I16(v)) => ColumnData::I16(Some(v)),
        ("smallint", _) => ColumnData::I16(None),
        ("int", SqlValue::I32(v)) => ColumnData::I32(Some(v)),
        ("int", _) => ColumnData::I32(None),
        ("bigint", SqlValue::I64(v)) => ColumnData::I64(Some(v)),
        ("bigint", _) => ColumnData::I64(None),

        ("real", SqlValue::F32(v)) if v.is_finite() => ColumnData::F32(Some(v)),
        ("real", _) => ColumnData::F32(None),
        ("float", SqlValue::F64(v)) if v.is_finite() => ColumnData::F64(Some(v)),
        ("float", _) => ColumnData::F64(None),

        (_, SqlValue::Decimal(mut d)) => {
            d.rescale(u32::from(column.scale));
            ColumnData::Numeric(Some(Numeric::new_with_scale(
                d.mantissa(),
                d.scale() as u8,
            )))
        }
        (_, SqlValue::Null(StorageType::Decimal)) => ColumnData::Numeric(None),

        ("xml", SqlValue::Text(s)) => {
            ColumnData::Xml(Some(Cow::Owned(XmlData::new(s.into_owned()))))
        }
        ("xml", _) => ColumnData::Xml(None),
        (_, SqlValue::Text(s)) => ColumnData::String(Some(s)),
        (_, SqlValue::Null(StorageType::String)) => ColumnData::String(None),

        (_, SqlValue::Bytes(b)) => ColumnData::Binary(Some(b)),
        (_, SqlValue::Null(StorageType::Bytes)) => ColumnData::Binary(None),

        (_, SqlValue::Uuid(u)) => ColumnData::Guid(Some(u)),
        (_, SqlValue::Null(StorageType::Uuid)) => ColumnData::Guid(None),

        (_, SqlValue::Date(d)) => ColumnData::Date(Some(Date::new(days_since_year_one(d)?))),
        (_, SqlValue::Null(StorageType::Date)) => ColumnData::Date(None),

        (_, SqlValue::Time(t)) => ColumnData::Time(Some(time_with_scale(t, column.scale))),
        (_, SqlValue::Null(StorageType::Time)) => ColumnData::Time(None),

        ("datetime", SqlValue::DateTime(dt)) => ColumnData::DateTime(Some(legacy_datetime(dt)?)),
        ("datetime", _) => ColumnData::DateTime(None),
        ("smalldatetime", SqlValue::DateTime(dt)) => {
            ColumnData::SmallDateTime(Some(small_datetime(dt)?))
        }
        ("smalldatetime", _) => ColumnData::SmallDateTime(None),
        (_, SqlValue::DateTime(dt)) => ColumnData::DateTime2(Some(datetime2(dt, column.scale)?)),
        (_, SqlValue::Null(StorageType::DateTime)) => ColumnData::DateTime2(None),

        (_, SqlValue::DateTimeOffset(dto)) => {
            let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
            ColumnData::DateTimeOffset(Some(DateTimeOffset::new(
                datetime2(dto.naive_utc(), column.scale)?,
                offset_minutes,
            )))
        }
        (_, SqlValue::Null(StorageType::DateTimeOffset)) => ColumnData::DateTimeOffset(None),

        (type_name, value) => {
            return Err(DalError::Mapping(format!(
                "cannot encode {:?} for {} column '{}'",
                value.storage_type(),
                type_name,
                column.name
            )))
        }
    };
    Ok(data)
}

fn typed<T>(
    value: Option<T>,
    wrap: impl FnOnce(T) -> SqlValue<'static>,
    storage: StorageType,
) -> SqlValue<'static> {
    value.map(wrap).unwrap_or(SqlValue::Null(storage))
}

/// Decode one column of a result row.
pub(crate) fn column_data_to_value(data: &ColumnData<'static>) -> Result<SqlValue<'static>> {
    let value = match data {
        ColumnData::U8(v) => typed(*v, |v| SqlValue::I16(i16::from(v)), StorageType::I16),
        ColumnData::I16(v) => typed(*v, SqlValue::I16, StorageType::I16),
        ColumnData::I32(v) => typed(*v, SqlValue::I32, StorageType::I32),
        ColumnData::I64(v) => typed(*v, SqlValue::I64, StorageType::I64),
        ColumnData::F32(v) => typed(*v, SqlValue::F32, StorageType::F32),
        ColumnData::F64(v) => typed(*v, SqlValue::F64, StorageType::F64),
        ColumnData::Bit(v) => typed(*v, SqlValue::Bool, StorageType::Bool),
        ColumnData::String(v) => typed(
            v.as_ref(),
            |s| SqlValue::text_owned(s.to_string()),
            StorageType::String,
        ),
        ColumnData::Guid(v) => typed(*v, SqlValue::Uuid, StorageType::Uuid),
        ColumnData::Binary(v) => typed(
            v.as_ref(),
            |b| SqlValue::Bytes(Cow::Owned(b.to_vec())),
            StorageType::Bytes,
        ),
        ColumnData::Numeric(_) => {
            typed(Decimal::from_sql(data)?, SqlValue::Decimal, StorageType::Decimal)
        }
        ColumnData::Xml(v) => typed(
            v.as_ref(),
            |x| SqlValue::text_owned(x.clone().into_owned().into_string()),
            StorageType::String,
        ),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            typed(
                NaiveDateTime::from_sql(data)?,
                SqlValue::DateTime,
                StorageType::DateTime,
            )
        }
        ColumnData::Date(_) => typed(NaiveDate::from_sql(data)?, SqlValue::Date, StorageType::Date),
        ColumnData::Time(_) => typed(NaiveTime::from_sql(data)?, SqlValue::Time, StorageType::Time),
        ColumnData::DateTimeOffset(_) => typed(
            DateTime::<FixedOffset>::from_sql(data)?,
            SqlValue::DateTimeOffset,
            StorageType::DateTimeOffset,
        ),
    };
    Ok(value)
}

/// Decode a tiberius row.
pub(crate) fn decode_row(row: Row) -> Result<ResultRow> {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = row
        .into_iter()
        .map(|data| column_data_to_value(&data))
        .collect::<Result<Vec<_>>>()?;
    ResultRow::new(columns, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(type_name: &str, scale: u8) -> DestinationColumn {
        DestinationColumn {
            name: "c".to_string(),
            type_name: type_name.to_string(),
            scale,
        }
    }

    #[test]
    fn test_text_coerced_to_int_column() {
        let data = to_column_data(SqlValue::from("42"), &column("int", 0)).unwrap();
        assert!(matches!(data, ColumnData::I32(Some(42))));
    }

    #[test]
    fn test_typed_null_follows_destination() {
        let data =
            to_column_data(SqlValue::Null(StorageType::String), &column("bigint", 0)).unwrap();
        assert!(matches!(data, ColumnData::I64(None)));
        let data =
            to_column_data(SqlValue::Null(StorageType::I32), &column("nvarchar", 0)).unwrap();
        assert!(matches!(data, ColumnData::String(None)));
    }

    #[test]
    fn test_tinyint_range_checked() {
        assert!(matches!(
            to_column_data(SqlValue::I32(200), &column("tinyint", 0)).unwrap(),
            ColumnData::U8(Some(200))
        ));
        assert!(to_column_data(SqlValue::I32(300), &column("tinyint", 0)).is_err());
    }

    #[test]
    fn test_decimal_rescaled_to_column_scale() {
        let d: Decimal = "1.5".parse().unwrap();
        match to_column_data(SqlValue::Decimal(d), &column("decimal", 20)).unwrap() {
            ColumnData::Numeric(Some(n)) => assert_eq!(n.scale(), 20),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert!(matches!(
            to_column_data(SqlValue::F64(f64::NAN), &column("float", 0)).unwrap(),
            ColumnData::F64(None)
        ));
    }

    #[test]
    fn test_datetime_column_encodings() {
        let dt = NaiveDate::from_ymd_opt(1900, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        match to_column_data(SqlValue::DateTime(dt), &column("datetime", 3)).unwrap() {
            ColumnData::DateTime(Some(v)) => {
                assert_eq!(v.days(), 1);
                assert_eq!(v.seconds_fragments(), 300);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            to_column_data(SqlValue::DateTime(dt), &column("datetime2", 7)).unwrap(),
            ColumnData::DateTime2(Some(_))
        ));
        assert!(matches!(
            to_column_data(SqlValue::DateTime(dt), &column("date", 0)).unwrap(),
            ColumnData::Date(Some(_))
        ));
    }

    #[test]
    fn test_unsupported_destination_type() {
        assert!(to_column_data(SqlValue::I32(1), &column("money", 4)).is_err());
    }

    #[test]
    fn test_decode_numeric_and_null() {
        let n = Numeric::new_with_scale(12345, 2);
        let value = column_data_to_value(&ColumnData::Numeric(Some(n))).unwrap();
        assert_eq!(value, SqlValue::Decimal("123.45".parse().unwrap()));

        let value = column_data_to_value(&ColumnData::I32(None)).unwrap();
        assert_eq!(value, SqlValue::Null(StorageType::I32));
    }

    #[test]
    fn test_decode_text_and_tinyint() {
        let value = column_data_to_value(&ColumnData::String(Some(Cow::Borrowed("abc")))).unwrap();
        assert_eq!(value, SqlValue::from("abc"));
        let value = column_data_to_value(&ColumnData::U8(Some(9))).unwrap();
        assert_eq!(value, SqlValue::I16(9));
    }

    #[test]
    fn test_oversized_string_detection() {
        let small = vec![SqlValue::from("x")];
        assert!(!row_has_oversized_strings(&small));
        let big = vec![SqlValue::text_owned("a".repeat(BULK_INSERT_STRING_LIMIT / 2 + 1))];
        assert!(row_has_oversized_strings(&big));
    }
}
