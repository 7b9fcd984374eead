//! The vendor ↔ portable type conversion matrix.
//!
//! One static, read-only table of [`ColumnBinding`]s decides, for each vendor
//! type, which [`LogicalType`] a column maps to and how individual values
//! cross the boundary in either direction.
//!
//! | Vendor types | Logical | Notes |
//! |---|---|---|
//! | TINYINT, SMALLINT, INTEGER | INT | inverse range-checked |
//! | BIGINT | LONG | |
//! | FLOAT, REAL | FLOAT | a double-valued FLOAT column is narrowed to `f32` |
//! | DOUBLE | DOUBLE | |
//! | NUMERIC, DECIMAL | DOUBLE | lossy: precision beyond `f64` is lost; inverse only when exact |
//! | BOOLEAN, BIT | BOOL | |
//! | CHAR, VARCHAR, LONGVARCHAR, NCHAR, NVARCHAR, LONGNVARCHAR | STRING | |
//! | CLOB, NCLOB | STRING | materialized in memory |
//! | DATE | LONG | epoch ms at midnight UTC |
//! | TIME | LONG | ms since midnight |
//! | TIMESTAMP | LONG | epoch ms |
//! | BINARY, VARBINARY, LONGVARBINARY | BYTES | |
//! | BLOB | BYTES | materialized in memory |
//!
//! Null crosses in both directions for every bound type. Nothing is ever
//! coerced to null or zero: an unknown type, a value of the wrong shape, or a
//! value that does not fit its vendor column is an error.

use crate::error::{ConnectorError, Result};
use crate::record::Value;
use crate::schema::{ColumnCase, Field, LogicalType, NameMatching, Schema};
use crate::types::sql::{ColumnDescriptor, LargeObject, SqlType, SqlValue};
use crate::types::temporal;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

type ToPortable = fn(SqlType, SqlValue) -> Result<Value>;
type ToVendor = fn(SqlType, &Value) -> Result<SqlValue>;

/// One row of the conversion matrix.
pub struct ColumnBinding {
    pub sql_types: &'static [SqlType],
    pub logical_type: LogicalType,
    to_portable: ToPortable,
    to_vendor: ToVendor,
}

static BINDINGS: &[ColumnBinding] = &[
    ColumnBinding {
        sql_types: &[SqlType::TinyInt, SqlType::SmallInt, SqlType::Integer],
        logical_type: LogicalType::Int,
        to_portable: int_to_portable,
        to_vendor: int_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::BigInt],
        logical_type: LogicalType::Long,
        to_portable: long_to_portable,
        to_vendor: long_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Float, SqlType::Real],
        logical_type: LogicalType::Float,
        to_portable: float_to_portable,
        to_vendor: float_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Double],
        logical_type: LogicalType::Double,
        to_portable: double_to_portable,
        to_vendor: double_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Numeric, SqlType::Decimal],
        logical_type: LogicalType::Double,
        to_portable: decimal_to_portable,
        to_vendor: decimal_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Boolean, SqlType::Bit],
        logical_type: LogicalType::Bool,
        to_portable: bool_to_portable,
        to_vendor: bool_to_vendor,
    },
    ColumnBinding {
        sql_types: &[
            SqlType::Char,
            SqlType::VarChar,
            SqlType::LongVarChar,
            SqlType::NChar,
            SqlType::NVarChar,
            SqlType::LongNVarChar,
        ],
        logical_type: LogicalType::String,
        to_portable: text_to_portable,
        to_vendor: text_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Clob, SqlType::NClob],
        logical_type: LogicalType::String,
        to_portable: clob_to_portable,
        to_vendor: clob_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Date],
        logical_type: LogicalType::Long,
        to_portable: date_to_portable,
        to_vendor: date_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Time],
        logical_type: LogicalType::Long,
        to_portable: time_to_portable,
        to_vendor: time_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Timestamp],
        logical_type: LogicalType::Long,
        to_portable: timestamp_to_portable,
        to_vendor: timestamp_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Binary, SqlType::VarBinary, SqlType::LongVarBinary],
        logical_type: LogicalType::Bytes,
        to_portable: binary_to_portable,
        to_vendor: binary_to_vendor,
    },
    ColumnBinding {
        sql_types: &[SqlType::Blob],
        logical_type: LogicalType::Bytes,
        to_portable: blob_to_portable,
        to_vendor: blob_to_vendor,
    },
];

/// The binding for a vendor type.
///
/// # Errors
/// `UnsupportedTypeConversion` when no binding is registered.
pub fn binding_for(sql_type: SqlType) -> Result<&'static ColumnBinding> {
    BINDINGS
        .iter()
        .find(|b| b.sql_types.contains(&sql_type))
        .ok_or_else(|| {
            ConnectorError::UnsupportedTypeConversion(format!(
                "no binding for vendor type {sql_type} (code {})",
                sql_type.code()
            ))
        })
}

/// Logical type a vendor column maps to.
///
/// # Errors
/// `UnsupportedTypeConversion` for unbound vendor types.
pub fn logical_type_for(sql_type: SqlType) -> Result<LogicalType> {
    binding_for(sql_type).map(|b| b.logical_type)
}

/// Convert a vendor value read from a column of `sql_type`.
///
/// # Errors
/// `UnsupportedTypeConversion` for unbound types or wrongly shaped values,
/// `ValueOutOfRange` when the value cannot be represented, `Io` when a large
/// object cannot be read.
pub fn to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    let binding = binding_for(sql_type)?;
    if value.is_null() {
        return Ok(Value::Null);
    }
    (binding.to_portable)(sql_type, value)
}

/// Convert a portable value for writing into a column of `sql_type`.
///
/// # Errors
/// `UnsupportedTypeConversion` for unbound types or a value of the wrong
/// logical type, `ValueOutOfRange` when it does not fit the column.
pub fn to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    let binding = binding_for(sql_type)?;
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    (binding.to_vendor)(sql_type, value)
}

/// Portable field for a vendor column, with the column-name case applied.
///
/// # Errors
/// `UnsupportedTypeConversion` for unbound column types.
pub fn field_for_column(column: &ColumnDescriptor, case: ColumnCase) -> Result<Field> {
    Ok(Field {
        name: case.apply(&column.name).into_owned(),
        logical_type: logical_type_for(column.sql_type)?,
        nullable: column.nullable,
    })
}

/// Portable schema for a list of vendor columns.
///
/// # Errors
/// Unbound column types, or names that collide once `case` is applied.
pub fn schema_for_columns(
    name: &str,
    columns: &[ColumnDescriptor],
    case: ColumnCase,
    matching: NameMatching,
) -> Result<Schema> {
    let fields = columns
        .iter()
        .map(|c| field_for_column(c, case))
        .collect::<Result<Vec<_>>>()?;
    Schema::with_matching(name, fields, matching)
}

fn wrong_shape(sql_type: SqlType, value: &SqlValue) -> ConnectorError {
    ConnectorError::UnsupportedTypeConversion(format!(
        "{} value in a {sql_type} column",
        value.kind()
    ))
}

fn wrong_logical(sql_type: SqlType, value: &Value) -> ConnectorError {
    let kind = value
        .logical_type()
        .map_or_else(|| "null".to_string(), |t| t.to_string());
    ConnectorError::UnsupportedTypeConversion(format!("{kind} value for a {sql_type} column"))
}

fn int_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::TinyInt(v) => Ok(Value::Int(i32::from(v))),
        SqlValue::SmallInt(v) => Ok(Value::Int(i32::from(v))),
        SqlValue::Integer(v) => Ok(Value::Int(v)),
        SqlValue::BigInt(v) => i32::try_from(v)
            .map(Value::Int)
            .map_err(|_| ConnectorError::out_of_range(v, "INT")),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn int_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    let &Value::Int(v) = value else {
        return Err(wrong_logical(sql_type, value));
    };
    match sql_type {
        SqlType::TinyInt => i8::try_from(v)
            .map(SqlValue::TinyInt)
            .map_err(|_| ConnectorError::out_of_range(v, sql_type)),
        SqlType::SmallInt => i16::try_from(v)
            .map(SqlValue::SmallInt)
            .map_err(|_| ConnectorError::out_of_range(v, sql_type)),
        _ => Ok(SqlValue::Integer(v)),
    }
}

fn long_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::TinyInt(v) => Ok(Value::Long(i64::from(v))),
        SqlValue::SmallInt(v) => Ok(Value::Long(i64::from(v))),
        SqlValue::Integer(v) => Ok(Value::Long(i64::from(v))),
        SqlValue::BigInt(v) => Ok(Value::Long(v)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn long_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    value
        .as_long()
        .map(SqlValue::BigInt)
        .ok_or_else(|| wrong_logical(sql_type, value))
}

// A FLOAT column may be backed by a double on the vendor side; it is narrowed.
#[allow(clippy::cast_possible_truncation)]
fn float_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Real(v) => Ok(Value::Float(v)),
        SqlValue::Double(v) => Ok(Value::Float(v as f32)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn float_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Float(v) => Ok(SqlValue::Real(*v)),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn double_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Double(v) => Ok(Value::Double(v)),
        SqlValue::Real(v) => Ok(Value::Double(f64::from(v))),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn double_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Double(v) => Ok(SqlValue::Double(*v)),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn decimal_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Decimal(d) => d
            .to_f64()
            .map(Value::Double)
            .ok_or_else(|| ConnectorError::out_of_range(d, "DOUBLE")),
        SqlValue::Double(v) => Ok(Value::Double(v)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn decimal_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Double(v) => {
            // shortest decimal first, then the full binary expansion
            let candidates = [
                v.to_string().parse::<Decimal>().ok(),
                Decimal::from_f64(*v),
                Decimal::from_f64_retain(*v),
            ];
            let exact = candidates
                .into_iter()
                .flatten()
                .find(|d| d.to_f64() == Some(*v));
            exact
                .map(SqlValue::Decimal)
                .ok_or_else(|| ConnectorError::out_of_range(v, sql_type))
        }
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn bool_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn bool_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Bool(b) => Ok(SqlValue::Boolean(*b)),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn text_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Text(s) => Ok(Value::String(s)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn text_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn clob_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Clob(lob) => Ok(Value::String(lob.read_to_string()?)),
        SqlValue::Text(s) => Ok(Value::String(s)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn clob_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::String(s) => Ok(SqlValue::Clob(LargeObject::from_bytes(s.as_bytes()))),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn date_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Date(d) => Ok(Value::Long(temporal::date_to_millis(d))),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn date_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Long(ms) => temporal::millis_to_date(*ms).map(SqlValue::Date),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn time_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Time(t) => Ok(Value::Long(temporal::time_to_millis(t))),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn time_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Long(ms) => temporal::millis_to_time(*ms).map(SqlValue::Time),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn timestamp_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Timestamp(ts) => Ok(Value::Long(temporal::timestamp_to_millis(ts))),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn timestamp_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Long(ms) => temporal::millis_to_timestamp(*ms).map(SqlValue::Timestamp),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn binary_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Binary(b) => Ok(Value::Bytes(b)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn binary_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Bytes(b) => Ok(SqlValue::Binary(b.clone())),
        other => Err(wrong_logical(sql_type, other)),
    }
}

fn blob_to_portable(sql_type: SqlType, value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Blob(lob) => Ok(Value::Bytes(lob.read_to_vec()?)),
        SqlValue::Binary(b) => Ok(Value::Bytes(b)),
        other => Err(wrong_shape(sql_type, &other)),
    }
}

fn blob_to_vendor(sql_type: SqlType, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Bytes(b) => Ok(SqlValue::Blob(LargeObject::from_bytes(b.clone()))),
        other => Err(wrong_logical(sql_type, other)),
    }
}
