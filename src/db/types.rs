//! Row decoding and type-name helpers.
//!
//! Drivers hand back rows as JSON maps so results look the same whatever the
//! backend. Decoding is done in two steps:
//! 1. `categorize_type` classifies the column's declared type
//! 2. a per-backend decoder extracts the value for that category

use crate::models::DatabaseType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Database, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Binary,
    Json,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first: "numeric" would otherwise look like a float
    if lower.contains("decimal") || lower.contains("numeric") {
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Before integers: "interval" and "point" contain "int"
    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("int") && !lower.contains("interval") && !lower.contains("point") {
        return TypeCategory::Integer;
    }
    if lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// Normalize a database type name to a more consistent format.
pub fn normalize_type_name(type_name: &str) -> String {
    let lower = type_name.trim().to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();

    match base {
        "int4" | "integer" | "int" | "mediumint" => "integer".to_string(),
        "int8" | "bigint" | "bigserial" => "bigint".to_string(),
        "int2" | "smallint" => "smallint".to_string(),
        "tinyint" => "tinyint".to_string(),
        "varchar" | "character varying" | "text" | "string" => "text".to_string(),
        "char" | "character" | "bpchar" => "char".to_string(),
        "bool" | "boolean" => "boolean".to_string(),
        "float4" | "real" | "float" => "real".to_string(),
        "float8" | "double precision" | "double" => "double".to_string(),
        "bytea" | "blob" | "binary" | "varbinary" => "binary".to_string(),
        "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone"
        | "timestamp without time zone" => "timestamp".to_string(),
        "date" => "date".to_string(),
        "time" | "timetz" => "time".to_string(),
        "json" | "jsonb" => "json".to_string(),
        _ => base.to_string(),
    }
}

/// Extract the length from a declared type such as `varchar(255)`.
pub fn declared_size(type_name: &str) -> Option<i64> {
    let start = type_name.find('(')?;
    let end = type_name[start..].find(')')? + start;
    type_name[start + 1..end]
        .split(',')
        .next()
        .and_then(|s| s.trim().parse().ok())
}

/// Binary values are returned as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// Row to JSON
// =============================================================================

/// Conversion of backend rows into JSON maps.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

// =============================================================================
// Shared Decoders
// =============================================================================

fn decode_opt<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn decode_boolean<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
{
    decode_opt::<R, bool>(row, idx)
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
{
    match decode_opt::<R, f64>(row, idx) {
        Some(v) => serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string())),
        None => JsonValue::Null,
    }
}

fn decode_binary<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    decode_opt::<R, Vec<u8>>(row, idx)
        .map(|v| encode_binary(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_temporal<'r, R, DB>(row: &'r R, idx: usize) -> JsonValue
where
    DB: Database,
    R: Row<Database = DB>,
    usize: ColumnIndex<R>,
    DateTime<Utc>: Decode<'r, DB> + Type<DB>,
    NaiveDateTime: Decode<'r, DB> + Type<DB>,
    NaiveDate: Decode<'r, DB> + Type<DB>,
    NaiveTime: Decode<'r, DB> + Type<DB>,
    String: Decode<'r, DB> + Type<DB>,
{
    if let Some(v) = decode_opt::<R, DateTime<Utc>>(row, idx) {
        return JsonValue::String(v.to_rfc3339());
    }
    if let Some(v) = decode_opt::<R, NaiveDateTime>(row, idx) {
        return JsonValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
    }
    if let Some(v) = decode_opt::<R, NaiveDate>(row, idx) {
        return JsonValue::String(v.to_string());
    }
    if let Some(v) = decode_opt::<R, NaiveTime>(row, idx) {
        return JsonValue::String(v.to_string());
    }
    decode_opt::<R, String>(row, idx)
        .map(JsonValue::String)
        .unwrap_or(JsonValue::Null)
}

/// Text cells; JSON-looking type names are parsed.
fn decode_text<'r, R>(row: &'r R, idx: usize, parse_json: bool) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
{
    match decode_opt::<R, String>(row, idx) {
        Some(v) if parse_json => serde_json::from_str(&v).unwrap_or(JsonValue::String(v)),
        Some(v) => JsonValue::String(v),
        None => JsonValue::Null,
    }
}

/// Raw DECIMAL/NUMERIC text, preserving the exact database representation.
#[derive(Debug)]
struct RawDecimal(String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_opt::<_, RawDecimal>(row, idx)
                .map(|v| JsonValue::String(v.0))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_opt::<_, JsonValue>(row, idx).unwrap_or(JsonValue::Null),
            TypeCategory::Text => decode_text(row, idx, false),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Some(v) = decode_opt::<_, i64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        // BIGINT UNSIGNED does not fit the signed path
        if let Some(v) = decode_opt::<_, u64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = decode_opt::<_, i32>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = decode_opt::<_, i8>(row, idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_opt::<_, RawDecimal>(row, idx)
                .map(|v| JsonValue::String(v.0))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_opt::<_, JsonValue>(row, idx).unwrap_or(JsonValue::Null),
            TypeCategory::Text => decode_text(row, idx, false),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Some(v) = decode_opt::<_, i64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = decode_opt::<_, i32>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = decode_opt::<_, i16>(row, idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_text(row, idx, true),
            // Expression columns carry no declared type; the value decides
            TypeCategory::Text | TypeCategory::Temporal => decode_dynamic(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        decode_opt::<_, i64>(row, idx)
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_dynamic(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Some(v) = decode_opt::<_, String>(row, idx) {
            return JsonValue::String(v);
        }
        if let Some(v) = decode_opt::<_, i64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = decode_opt::<_, f64>(row, idx) {
            return serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null);
        }
        decode_binary(row, idx)
    }
}
