//! Conversions between `SqlValue` and the `oracle` crate's bind and fetch types.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use oracle::sql_type::{OracleType, ToSql};
use rust_decimal::Decimal;

use crate::core::schema::Column;
use crate::core::value::{SqlNullType, SqlValue};
use crate::error::Result;

/// Fetch one cell of a result row.
pub(crate) fn read_value(row: &oracle::Row, idx: usize, ty: &OracleType) -> Result<SqlValue<'static>> {
    let value = match ty {
        OracleType::Number(p, 0) if *p > 0 && *p <= 18 => row
            .get::<usize, Option<i64>>(idx)?
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        OracleType::Int64 => row
            .get::<usize, Option<i64>>(idx)?
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        OracleType::Number(_, _) | OracleType::Float(_) => {
            match row.get::<usize, Option<String>>(idx)? {
                Some(s) => match Decimal::from_str(&s) {
                    Ok(d) => SqlValue::Decimal(d),
                    // Beyond 28 significant digits; keep the exact text.
                    Err(_) => SqlValue::Text(Cow::Owned(s)),
                },
                None => SqlValue::Null(SqlNullType::Decimal),
            }
        }
        OracleType::BinaryFloat => row
            .get::<usize, Option<f32>>(idx)?
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        OracleType::BinaryDouble => row
            .get::<usize, Option<f64>>(idx)?
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        OracleType::Date | OracleType::Timestamp(_) => row
            .get::<usize, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => row
            .get::<usize, Option<DateTime<FixedOffset>>>(idx)?
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => row
            .get::<usize, Option<Vec<u8>>>(idx)?
            .map(|b| SqlValue::Bytes(Cow::Owned(b)))
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        _ => row
            .get::<usize, Option<String>>(idx)?
            .map(|s| SqlValue::Text(Cow::Owned(s)))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
    };
    Ok(value)
}

/// Bind variable type for a destination column, so NULL-leading batches
/// still get the right buffer. LOBs are bound as LONG/LONG RAW, which
/// Oracle converts on insert.
pub(crate) fn bind_type(column: &Column) -> Option<OracleType> {
    let dt = column.data_type.to_uppercase();
    let ty = match dt.as_str() {
        "NUMBER" | "FLOAT" | "INTEGER" => OracleType::Number(0, 0),
        "BINARY_FLOAT" => OracleType::BinaryFloat,
        "BINARY_DOUBLE" => OracleType::BinaryDouble,
        "DATE" => OracleType::Date,
        "CLOB" | "NCLOB" | "LONG" => OracleType::Long,
        "BLOB" | "LONG RAW" => OracleType::LongRaw,
        "RAW" => OracleType::Raw(2000),
        "VARCHAR2" | "NVARCHAR2" | "CHAR" | "NCHAR" => OracleType::Varchar2(4000),
        t if t.starts_with("TIMESTAMP") && t.contains("TIME ZONE") => OracleType::TimestampTZ(9),
        t if t.starts_with("TIMESTAMP") => OracleType::Timestamp(9),
        _ => return None,
    };
    Some(ty)
}

/// Box a value as a bind parameter.
///
/// Types without a native Oracle binding (UUID, DECIMAL, TIME, JSON) are
/// bound as their text form.
pub(crate) fn to_bind(value: &SqlValue<'static>) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bytes => Box::new(None::<Vec<u8>>),
            SqlNullType::Bool | SqlNullType::I16 | SqlNullType::I32 | SqlNullType::I64 => {
                Box::new(None::<i64>)
            }
            SqlNullType::F32 | SqlNullType::F64 => Box::new(None::<f64>),
            SqlNullType::DateTime | SqlNullType::Date => Box::new(None::<NaiveDateTime>),
            SqlNullType::DateTimeOffset => Box::new(None::<DateTime<FixedOffset>>),
            _ => Box::new(None::<String>),
        },
        SqlValue::Bool(b) => Box::new(i16::from(*b)),
        SqlValue::I16(v) => Box::new(*v),
        SqlValue::I32(v) => Box::new(*v),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F32(v) => Box::new(*v),
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::Text(s) => Box::new(s.to_string()),
        SqlValue::Bytes(b) => Box::new(b.to_vec()),
        SqlValue::Uuid(u) => Box::new(u.to_string()),
        SqlValue::Decimal(d) => Box::new(d.to_string()),
        SqlValue::DateTime(v) => Box::new(*v),
        SqlValue::DateTimeOffset(v) => Box::new(*v),
        SqlValue::Date(v) => Box::new(*v),
        SqlValue::Time(v) => Box::new(v.format("%H:%M:%S%.f").to_string()),
        SqlValue::Json(v) => Box::new(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_type_for_destination_columns() {
        assert_eq!(bind_type(&Column::new("ID", "NUMBER")), Some(OracleType::Number(0, 0)));
        assert_eq!(bind_type(&Column::new("MEMO", "CLOB")), Some(OracleType::Long));
        assert_eq!(bind_type(&Column::new("IMG", "BLOB")), Some(OracleType::LongRaw));
        assert_eq!(
            bind_type(&Column::new("AT", "TIMESTAMP(6) WITH TIME ZONE")),
            Some(OracleType::TimestampTZ(9))
        );
        assert_eq!(
            bind_type(&Column::new("AT", "TIMESTAMP(6)")),
            Some(OracleType::Timestamp(9))
        );
        assert_eq!(bind_type(&Column::new("X", "XMLTYPE")), None);
    }
}
