//! Big-endian byte cells for key-value tables.
//!
//! | Logical | Cell |
//! |---|---|
//! | BOOL | 1 byte, `0xff` true / `0x00` false |
//! | INT | 4 bytes |
//! | LONG | 8 bytes |
//! | FLOAT | 4 bytes, IEEE-754 bits |
//! | DOUBLE | 8 bytes, IEEE-754 bits |
//! | STRING | UTF-8 |
//! | BYTES | verbatim |
//!
//! Null has no cell; writers omit the column instead.

use crate::error::{ConnectorError, Result};
use crate::record::Value;
use crate::schema::LogicalType;

/// Encode a non-null value. Returns `None` for null.
#[must_use]
pub fn encode(value: &Value) -> Option<Vec<u8>> {
    let cell = match value {
        Value::Null => return None,
        Value::Bool(b) => vec![if *b { 0xff } else { 0x00 }],
        Value::Int(v) => v.to_be_bytes().to_vec(),
        Value::Long(v) => v.to_be_bytes().to_vec(),
        Value::Float(v) => v.to_bits().to_be_bytes().to_vec(),
        Value::Double(v) => v.to_bits().to_be_bytes().to_vec(),
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Bytes(b) => b.clone(),
    };
    Some(cell)
}

/// Decode a cell written for a field of `logical_type`.
///
/// # Errors
/// `ValueOutOfRange` when the cell has the wrong width or is not valid UTF-8
/// for a STRING field.
pub fn decode(logical_type: LogicalType, cell: &[u8]) -> Result<Value> {
    let width = |n: usize| -> Result<()> {
        if cell.len() == n {
            Ok(())
        } else {
            Err(ConnectorError::out_of_range(
                format!("{}-byte cell", cell.len()),
                logical_type,
            ))
        }
    };
    let value = match logical_type {
        LogicalType::Bool => {
            width(1)?;
            Value::Bool(cell[0] != 0)
        }
        LogicalType::Int => {
            width(4)?;
            Value::Int(i32::from_be_bytes(fixed(cell)))
        }
        LogicalType::Long => {
            width(8)?;
            Value::Long(i64::from_be_bytes(fixed(cell)))
        }
        LogicalType::Float => {
            width(4)?;
            Value::Float(f32::from_bits(u32::from_be_bytes(fixed(cell))))
        }
        LogicalType::Double => {
            width(8)?;
            Value::Double(f64::from_bits(u64::from_be_bytes(fixed(cell))))
        }
        LogicalType::String => Value::String(
            String::from_utf8(cell.to_vec())
                .map_err(|_| ConnectorError::out_of_range("non-UTF-8 cell", logical_type))?,
        ),
        LogicalType::Bytes => Value::Bytes(cell.to_vec()),
    };
    Ok(value)
}

// Caller has checked the width.
fn fixed<const N: usize>(cell: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&cell[..N]);
    out
}
