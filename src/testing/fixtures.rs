//! The `student` table and configs that read it.

use crate::config::{ConnectionConfig, SourceConfig};
use crate::driver::{MemoryDriver, MemoryTableSpec};
use crate::error::Result;
use crate::types::{ColumnDescriptor, LargeObject, SqlType, SqlValue};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;

pub const STUDENT_TABLE: &str = "student";
pub const TEST_URL: &str = "memory://sluice-test";
pub const TEST_DRIVER: &str = "memory";

/// Columns selected by [`student_import_query`]; `NOT_IMPORTED` is left out.
pub const IMPORTED_COLUMNS: [&str; 18] = [
    "ID",
    "NAME",
    "SCORE",
    "GRADUATED",
    "TINY",
    "SMALL",
    "BIG",
    "FLOAT_COL",
    "REAL_COL",
    "NUMERIC_COL",
    "DECIMAL_COL",
    "BIT_COL",
    "DATE_COL",
    "TIME_COL",
    "TIMESTAMP_COL",
    "BINARY_COL",
    "BLOB_COL",
    "CLOB_COL",
];

/// Column layout of the `student` table.
#[must_use]
pub fn student_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("ID", SqlType::Integer, false),
        ColumnDescriptor::new("NAME", SqlType::VarChar, true),
        ColumnDescriptor::new("SCORE", SqlType::Double, true),
        ColumnDescriptor::new("GRADUATED", SqlType::Boolean, true),
        ColumnDescriptor::new("TINY", SqlType::TinyInt, true),
        ColumnDescriptor::new("SMALL", SqlType::SmallInt, true),
        ColumnDescriptor::new("BIG", SqlType::BigInt, true),
        ColumnDescriptor::new("FLOAT_COL", SqlType::Float, true),
        ColumnDescriptor::new("REAL_COL", SqlType::Real, true),
        ColumnDescriptor::new("NUMERIC_COL", SqlType::Numeric, true).with_precision(10, 6),
        ColumnDescriptor::new("DECIMAL_COL", SqlType::Decimal, true).with_precision(10, 6),
        ColumnDescriptor::new("BIT_COL", SqlType::Bit, true),
        ColumnDescriptor::new("DATE_COL", SqlType::Date, true),
        ColumnDescriptor::new("TIME_COL", SqlType::Time, true),
        ColumnDescriptor::new("TIMESTAMP_COL", SqlType::Timestamp, true),
        ColumnDescriptor::new("BINARY_COL", SqlType::Binary, true),
        ColumnDescriptor::new("BLOB_COL", SqlType::Blob, true),
        ColumnDescriptor::new("CLOB_COL", SqlType::Clob, true),
        ColumnDescriptor::new("NOT_IMPORTED", SqlType::VarChar, true),
    ]
}

/// Day every student row's dates are counted from.
#[must_use]
pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}

/// Deterministic row for student `id`; every value is a function of `id`.
#[must_use]
pub fn student_row(id: i32) -> Vec<SqlValue> {
    let date = base_date() + TimeDelta::days(i64::from(id));
    let time = NaiveTime::from_hms_milli_opt(12, 30, 15, 250).unwrap_or_default();
    vec![
        SqlValue::Integer(id),
        SqlValue::Text(format!("user{id}")),
        SqlValue::Double(123.45 + f64::from(id)),
        SqlValue::Boolean(id % 2 == 0),
        SqlValue::TinyInt(i8::try_from(id % 100).unwrap_or_default()),
        SqlValue::SmallInt(i16::try_from(id).unwrap_or(i16::MAX)),
        SqlValue::BigInt(i64::from(id) * 1_000_000_000),
        SqlValue::Real(id as f32 + 0.5),
        SqlValue::Real(id as f32 * 2.0),
        SqlValue::Decimal(Decimal::new(i64::from(id) * 1_000_000 + 123_456, 6)),
        SqlValue::Decimal(Decimal::new(i64::from(id) * 100 + 25, 2)),
        SqlValue::Boolean(id % 3 == 0),
        SqlValue::Date(date),
        SqlValue::Time(time),
        SqlValue::Timestamp(NaiveDateTime::new(date, time)),
        SqlValue::Binary(format!("bin{id}").into_bytes()),
        SqlValue::Blob(LargeObject::from_bytes(format!("blob{id}").into_bytes())),
        SqlValue::Clob(LargeObject::from_bytes(format!("clob{id}").into_bytes())),
        SqlValue::Text(format!("hidden{id}")),
    ]
}

/// A [`MemoryDriver`] serving [`TEST_URL`] with students `1..=rows`.
#[must_use]
pub fn student_driver(rows: i32) -> MemoryDriver {
    let driver = MemoryDriver::new(TEST_URL);
    driver.add_table(
        MemoryTableSpec::new(STUDENT_TABLE, student_columns())
            .with_rows((1..=rows).map(student_row).collect()),
    );
    driver
}

/// Credential-free connection to [`TEST_URL`].
///
/// # Errors
/// Never for these constants.
pub fn test_connection() -> Result<ConnectionConfig> {
    ConnectionConfig::new(TEST_URL, TEST_DRIVER, None, None)
}

/// `SELECT <imported columns> FROM student WHERE $CONDITIONS`.
#[must_use]
pub fn student_import_query() -> String {
    format!(
        "SELECT {} FROM {STUDENT_TABLE} WHERE $CONDITIONS",
        IMPORTED_COLUMNS.join(", ")
    )
}

/// `SELECT MIN(ID), MAX(ID) FROM student`.
#[must_use]
pub fn student_bounding_query() -> String {
    format!("SELECT MIN(ID), MAX(ID) FROM {STUDENT_TABLE}")
}

/// Source over the student table split on `ID` into `num_splits` ranges.
///
/// # Errors
/// `InvalidSplitRange` for zero splits.
pub fn student_source_config(num_splits: usize) -> Result<SourceConfig> {
    let config = SourceConfig::new("student-import", test_connection()?, student_import_query())
        .with_splits("ID", student_bounding_query(), num_splits);
    config.validate()?;
    Ok(config)
}
