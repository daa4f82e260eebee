//! Value and type conversion between PostgreSQL and Oracle.
//!
//! [`convert`] coerces one cell for binding on Oracle. [`map_type`] picks the
//! Oracle column type used when DDL is synthesized from a PostgreSQL catalog.
//! Both are pure.

use std::borrow::Cow;

use crate::core::value::SqlValue;

/// Oracle-side type tag of a converted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Number,
    BinaryFloat,
    BinaryDouble,
    Varchar2,
    Clob,
    Blob,
    Date,
    Timestamp,
    TimestampTz,
}

/// Result of mapping a source column type to Oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Oracle type string (e.g. "VARCHAR2(100 CHAR)", "NUMBER(1)").
    pub target_type: String,
    /// Whether this mapping loses data or precision.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}

/// Convert one source value for insertion into Oracle.
///
/// Rules, first match wins:
/// 1. NULL stays NULL.
/// 2. Dates, times and timestamps pass through.
/// 3. JSON objects and arrays become their textual JSON.
/// 4. Booleans become 0/1.
/// 5. Byte buffers pass through.
/// 6. Everything else passes through.
///
/// `declared_type` is the source column type; it never changes the value,
/// only the tag reported by [`convert_typed`].
pub fn convert(value: SqlValue<'static>, _declared_type: &str) -> SqlValue<'static> {
    match value {
        v @ SqlValue::Null(_) => v,
        v if v.is_temporal() => v,
        SqlValue::Json(json) => SqlValue::Text(Cow::Owned(json.to_string())),
        SqlValue::Bool(b) => SqlValue::I16(i16::from(b)),
        v @ SqlValue::Bytes(_) => v,
        v => v,
    }
}

/// Convert a value and report the Oracle type it should bind as.
pub fn convert_typed(value: SqlValue<'static>, declared_type: &str) -> (SqlValue<'static>, TargetType) {
    let declared = target_type_of(declared_type);
    let converted = convert(value, declared_type);
    let tag = declared.unwrap_or_else(|| tag_for_value(&converted));
    (converted, tag)
}

/// Tag implied by the declared source type, if it is one we know.
fn target_type_of(declared_type: &str) -> Option<TargetType> {
    let t = declared_type.trim().to_lowercase();
    let tag = match base_type(&t) {
        "bool" | "boolean" | "smallint" | "int2" | "integer" | "int" | "int4" | "serial"
        | "bigint" | "int8" | "bigserial" | "numeric" | "decimal" | "money" | "number" => {
            TargetType::Number
        }
        "real" | "float4" => TargetType::BinaryFloat,
        "double precision" | "float8" => TargetType::BinaryDouble,
        "varchar" | "character varying" | "char" | "character" | "bpchar" | "uuid" | "varchar2" => {
            TargetType::Varchar2
        }
        "text" | "json" | "jsonb" | "xml" | "clob" => TargetType::Clob,
        "bytea" | "blob" => TargetType::Blob,
        "date" => TargetType::Date,
        "timestamp" | "timestamp without time zone" => TargetType::Timestamp,
        "timestamptz" | "timestamp with time zone" => TargetType::TimestampTz,
        _ if is_array_type(&t) => TargetType::Clob,
        _ => return None,
    };
    Some(tag)
}

fn tag_for_value(value: &SqlValue<'_>) -> TargetType {
    match value {
        SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) | SqlValue::Decimal(_) => {
            TargetType::Number
        }
        SqlValue::Bool(_) => TargetType::Number,
        SqlValue::F32(_) => TargetType::BinaryFloat,
        SqlValue::F64(_) => TargetType::BinaryDouble,
        SqlValue::Bytes(_) => TargetType::Blob,
        SqlValue::Date(_) => TargetType::Date,
        SqlValue::DateTime(_) => TargetType::Timestamp,
        SqlValue::DateTimeOffset(_) => TargetType::TimestampTz,
        SqlValue::Json(_) => TargetType::Clob,
        SqlValue::Null(_)
        | SqlValue::Text(_)
        | SqlValue::Uuid(_)
        | SqlValue::Time(_) => TargetType::Varchar2,
    }
}

/// Strip a length/precision suffix: "varchar(20)" -> "varchar".
fn base_type(t: &str) -> &str {
    match t.find('(') {
        Some(pos) => t[..pos].trim_end(),
        None => t,
    }
}

fn is_array_type(t: &str) -> bool {
    t.starts_with('_') || t.ends_with("[]") || t == "array"
}

/// Map a PostgreSQL column type to the Oracle column type.
pub fn map_type(pg_type: &str, max_length: i32, precision: i32, scale: i32) -> TypeMapping {
    let t = pg_type.trim().to_lowercase();
    if is_array_type(&t) {
        return TypeMapping::lossy("CLOB", format!("array type {} stored as JSON text", pg_type));
    }

    match base_type(&t) {
        // Boolean
        "bool" | "boolean" => TypeMapping::lossless("NUMBER(1)"),

        // Integer types
        "smallint" | "int2" | "smallserial" => TypeMapping::lossless("NUMBER(5)"),
        "integer" | "int" | "int4" | "serial" => TypeMapping::lossless("NUMBER(10)"),
        "bigint" | "int8" | "bigserial" => TypeMapping::lossless("NUMBER(19)"),

        // Decimal/numeric
        "numeric" | "decimal" => {
            if precision > 0 && precision <= 38 {
                TypeMapping::lossless(format!("NUMBER({},{})", precision, scale.max(0)))
            } else if precision > 38 {
                TypeMapping::lossy(
                    "NUMBER",
                    format!("numeric precision {} exceeds Oracle maximum 38", precision),
                )
            } else {
                TypeMapping::lossless("NUMBER")
            }
        }
        "money" => TypeMapping::lossless("NUMBER(19,2)"),

        // Floating point
        "real" | "float4" => TypeMapping::lossless("BINARY_FLOAT"),
        "double precision" | "float8" => TypeMapping::lossless("BINARY_DOUBLE"),

        // String types
        "varchar" | "character varying" => {
            if max_length > 0 && max_length <= 4000 {
                TypeMapping::lossless(format!("VARCHAR2({} CHAR)", max_length))
            } else {
                TypeMapping::lossless("CLOB")
            }
        }
        "char" | "character" | "bpchar" => {
            if max_length > 0 && max_length <= 2000 {
                TypeMapping::lossless(format!("CHAR({} CHAR)", max_length))
            } else if max_length > 2000 {
                TypeMapping::lossless("CLOB")
            } else {
                TypeMapping::lossless("CHAR(1 CHAR)")
            }
        }
        "text" | "citext" | "name" => TypeMapping::lossless("CLOB"),

        // Structured types
        "json" | "jsonb" => TypeMapping::lossless("CLOB"),
        "xml" => TypeMapping::lossless("CLOB"),

        // Binary
        "bytea" => TypeMapping::lossless("BLOB"),

        // Identifiers and network types
        "uuid" => TypeMapping::lossless("VARCHAR2(36)"),
        "inet" | "cidr" | "macaddr" | "macaddr8" => TypeMapping::lossless("VARCHAR2(64)"),

        // Date/time types
        "date" => TypeMapping::lossless("DATE"),
        "timestamp" | "timestamp without time zone" => TypeMapping::lossless("TIMESTAMP(6)"),
        "timestamptz" | "timestamp with time zone" => {
            TypeMapping::lossless("TIMESTAMP(6) WITH TIME ZONE")
        }
        "time" | "time without time zone" => {
            TypeMapping::lossy("VARCHAR2(16)", "time of day stored as text")
        }
        "timetz" | "time with time zone" => {
            TypeMapping::lossy("VARCHAR2(32)", "time with time zone stored as text")
        }
        "interval" => TypeMapping::lossy("VARCHAR2(64)", "interval stored as text"),

        // Default fallback
        _ => TypeMapping::lossy("CLOB", format!("unmapped type {} stored as text", pg_type)),
    }
}
