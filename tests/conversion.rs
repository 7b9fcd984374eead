//! The vendor/portable conversion matrix and byte cells.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use proptest::prelude::*;
use rust_decimal::Decimal;
use sluice::types::matrix::{logical_type_for, to_portable, to_vendor};
use sluice::types::sql::LargeObject;
use sluice::types::{bytes, field_for_column};
use sluice::{ColumnCase, ColumnDescriptor, ConnectorError, LogicalType, SqlType, SqlValue, Value};

#[test]
fn test_logical_types_per_vendor_type() -> Result<()> {
    let expected = [
        (SqlType::TinyInt, LogicalType::Int),
        (SqlType::SmallInt, LogicalType::Int),
        (SqlType::Integer, LogicalType::Int),
        (SqlType::BigInt, LogicalType::Long),
        (SqlType::Float, LogicalType::Float),
        (SqlType::Real, LogicalType::Float),
        (SqlType::Double, LogicalType::Double),
        (SqlType::Numeric, LogicalType::Double),
        (SqlType::Decimal, LogicalType::Double),
        (SqlType::Boolean, LogicalType::Bool),
        (SqlType::Bit, LogicalType::Bool),
        (SqlType::Char, LogicalType::String),
        (SqlType::VarChar, LogicalType::String),
        (SqlType::LongNVarChar, LogicalType::String),
        (SqlType::Clob, LogicalType::String),
        (SqlType::NClob, LogicalType::String),
        (SqlType::Date, LogicalType::Long),
        (SqlType::Time, LogicalType::Long),
        (SqlType::Timestamp, LogicalType::Long),
        (SqlType::Binary, LogicalType::Bytes),
        (SqlType::VarBinary, LogicalType::Bytes),
        (SqlType::Blob, LogicalType::Bytes),
    ];
    for (sql_type, logical) in expected {
        assert_eq!(logical_type_for(sql_type)?, logical, "{sql_type}");
    }
    Ok(())
}

#[test]
fn test_unregistered_type_is_rejected() {
    for sql_type in [SqlType::Other(1111), SqlType::Null] {
        let err = to_portable(sql_type, SqlValue::Integer(1)).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedTypeConversion(_)), "{err:?}");
        // even a null value needs a binding
        let err = to_portable(sql_type, SqlValue::Null).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedTypeConversion(_)), "{err:?}");
    }
}

#[test]
fn test_null_crosses_both_ways() -> Result<()> {
    for sql_type in [SqlType::Integer, SqlType::VarChar, SqlType::Date, SqlType::Blob, SqlType::Decimal] {
        assert_eq!(to_portable(sql_type, SqlValue::Null)?, Value::Null);
        assert_eq!(to_vendor(sql_type, &Value::Null)?, SqlValue::Null);
    }
    Ok(())
}

#[test]
fn test_integer_family_round_trip() -> Result<()> {
    let cases = [
        (SqlType::TinyInt, SqlValue::TinyInt(-7), Value::Int(-7)),
        (SqlType::SmallInt, SqlValue::SmallInt(300), Value::Int(300)),
        (SqlType::Integer, SqlValue::Integer(i32::MAX), Value::Int(i32::MAX)),
        (SqlType::BigInt, SqlValue::BigInt(i64::MIN), Value::Long(i64::MIN)),
    ];
    for (sql_type, vendor, portable) in cases {
        assert_eq!(to_portable(sql_type, vendor.clone())?, portable);
        assert_eq!(to_vendor(sql_type, &portable)?, vendor);
    }
    Ok(())
}

#[test]
fn test_value_out_of_range_is_not_coerced() {
    let err = to_vendor(SqlType::TinyInt, &Value::Int(300)).unwrap_err();
    assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{err:?}");

    let err = to_vendor(SqlType::SmallInt, &Value::Int(70_000)).unwrap_err();
    assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{err:?}");

    let err = to_portable(SqlType::Integer, SqlValue::BigInt(i64::from(i32::MAX) + 1)).unwrap_err();
    assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{err:?}");
}

#[test]
fn test_wrong_shape_and_wrong_logical_type() {
    let err = to_portable(SqlType::Integer, SqlValue::Text("1".into())).unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedTypeConversion(_)), "{err:?}");

    let err = to_vendor(SqlType::VarChar, &Value::Int(1)).unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedTypeConversion(_)), "{err:?}");

    let err = to_vendor(SqlType::Double, &Value::Float(1.0)).unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedTypeConversion(_)), "{err:?}");
}

#[test]
fn test_floating_and_decimal() -> Result<()> {
    assert_eq!(to_portable(SqlType::Real, SqlValue::Real(1.5))?, Value::Float(1.5));
    assert_eq!(to_portable(SqlType::Float, SqlValue::Double(2.5))?, Value::Float(2.5));
    assert_eq!(to_portable(SqlType::Double, SqlValue::Double(0.1))?, Value::Double(0.1));

    // lossy, documented: decimal reads as the nearest double
    let dec = Decimal::new(125, 1);
    assert_eq!(to_portable(SqlType::Decimal, SqlValue::Decimal(dec))?, Value::Double(12.5));
    let SqlValue::Decimal(back) = to_vendor(SqlType::Numeric, &Value::Double(0.5))? else {
        panic!("expected a decimal");
    };
    assert_eq!(back, Decimal::new(5, 1));
    assert_eq!(
        to_vendor(SqlType::Decimal, &Value::Double(0.1))?,
        SqlValue::Decimal(Decimal::new(1, 1))
    );

    // too small or too large for a decimal: rejected, never zero
    for v in [1e-30, 5e-324, -1e-40, 1e30, f64::NAN, f64::INFINITY] {
        let err = to_vendor(SqlType::Decimal, &Value::Double(v)).unwrap_err();
        assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{v}: {err:?}");
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_double_to_decimal_is_exact_or_rejected(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        match to_vendor(SqlType::Decimal, &Value::Double(v)) {
            Ok(vendor) => {
                prop_assert_eq!(to_portable(SqlType::Decimal, vendor).unwrap(), Value::Double(v));
            }
            Err(e) => prop_assert!(matches!(e, ConnectorError::ValueOutOfRange { .. }), "{:?}", e),
        }
    }

    #[test]
    fn prop_decimal_scale_doubles_round_trip(units in -1_000_000_000i64..1_000_000_000, scale in 0u32..6) {
        let v = Decimal::new(units, scale).to_string().parse::<f64>().unwrap();
        let vendor = to_vendor(SqlType::Numeric, &Value::Double(v)).unwrap();
        prop_assert_eq!(to_portable(SqlType::Numeric, vendor).unwrap(), Value::Double(v));
    }
}

#[test]
fn test_temporal_epoch_and_round_trip() -> Result<()> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    assert_eq!(to_portable(SqlType::Date, SqlValue::Date(epoch))?, Value::Long(0));
    assert_eq!(to_vendor(SqlType::Date, &Value::Long(0))?, SqlValue::Date(epoch));

    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let Value::Long(ms) = to_portable(SqlType::Date, SqlValue::Date(date))? else {
        panic!("expected LONG");
    };
    assert_eq!(ms % 86_400_000, 0);
    assert_eq!(to_vendor(SqlType::Date, &Value::Long(ms))?, SqlValue::Date(date));
    // a time of day is not silently dropped
    let err = to_vendor(SqlType::Date, &Value::Long(ms + 3_600_000)).unwrap_err();
    assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{err:?}");

    let time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap();
    let portable = to_portable(SqlType::Time, SqlValue::Time(time))?;
    assert_eq!(portable, Value::Long(86_399_999));
    assert_eq!(to_vendor(SqlType::Time, &portable)?, SqlValue::Time(time));

    let ts = NaiveDateTime::new(date, NaiveTime::from_hms_milli_opt(8, 15, 0, 42).unwrap());
    let portable = to_portable(SqlType::Timestamp, SqlValue::Timestamp(ts))?;
    assert_eq!(to_vendor(SqlType::Timestamp, &portable)?, SqlValue::Timestamp(ts));

    let before_epoch = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
    assert_eq!(
        to_portable(SqlType::Date, SqlValue::Date(before_epoch))?,
        Value::Long(-86_400_000)
    );
    Ok(())
}

#[test]
fn test_large_objects_are_materialized() -> Result<()> {
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let blob = SqlValue::Blob(LargeObject::from_bytes(payload.clone()));
    assert_eq!(to_portable(SqlType::Blob, blob)?, Value::Bytes(payload.clone()));

    let text = "héllo ".repeat(1_000);
    let clob = SqlValue::Clob(LargeObject::from_bytes(text.as_bytes()));
    assert_eq!(to_portable(SqlType::Clob, clob)?, Value::String(text.clone()));

    assert_eq!(
        to_vendor(SqlType::Blob, &Value::Bytes(payload.clone()))?,
        SqlValue::Blob(LargeObject::from_bytes(payload))
    );
    assert_eq!(
        to_vendor(SqlType::Clob, &Value::String(text.clone()))?,
        SqlValue::Clob(LargeObject::from_bytes(text.as_bytes()))
    );
    Ok(())
}

#[test]
fn test_field_for_column_applies_case() -> Result<()> {
    let column = ColumnDescriptor::new("Student_Name", SqlType::VarChar, true);
    assert_eq!(field_for_column(&column, ColumnCase::Upper)?.name, "STUDENT_NAME");
    assert_eq!(field_for_column(&column, ColumnCase::Lower)?.name, "student_name");
    let field = field_for_column(&column, ColumnCase::Exact)?;
    assert_eq!(field.name, "Student_Name");
    assert_eq!(field.logical_type, LogicalType::String);
    assert!(field.nullable);
    Ok(())
}

#[test]
fn test_byte_cells() -> Result<()> {
    let cases = [
        (Value::Bool(true), vec![0xff]),
        (Value::Int(1), vec![0, 0, 0, 1]),
        (Value::Long(-1), vec![0xff; 8]),
        (Value::Float(1.0), 1.0f32.to_bits().to_be_bytes().to_vec()),
        (Value::String("hi".into()), b"hi".to_vec()),
        (Value::Bytes(vec![1, 2, 3]), vec![1, 2, 3]),
    ];
    for (value, cell) in cases {
        assert_eq!(bytes::encode(&value), Some(cell.clone()));
        let logical = value.logical_type().unwrap();
        assert_eq!(bytes::decode(logical, &cell)?, value);
    }
    assert_eq!(bytes::encode(&Value::Null), None);

    let err = bytes::decode(LogicalType::Long, &[0, 1]).unwrap_err();
    assert!(matches!(err, ConnectorError::ValueOutOfRange { .. }), "{err:?}");
    Ok(())
}
