//! Vendor-side type codes and values.
//!
//! [`SqlType`] uses the numeric codes common to SQL drivers so a driver can
//! report any column type, including ones this crate has no binding for
//! ([`SqlType::Other`]).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// Vendor column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    NChar,
    NVarChar,
    LongNVarChar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Null,
    Blob,
    Clob,
    NClob,
    Boolean,
    /// Any code without a named variant.
    Other(i32),
}

impl SqlType {
    /// Numeric type code as reported by drivers.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Bit => -7,
            Self::TinyInt => -6,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::BigInt => -5,
            Self::Float => 6,
            Self::Real => 7,
            Self::Double => 8,
            Self::Numeric => 2,
            Self::Decimal => 3,
            Self::Char => 1,
            Self::VarChar => 12,
            Self::LongVarChar => -1,
            Self::NChar => -15,
            Self::NVarChar => -9,
            Self::LongNVarChar => -16,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Binary => -2,
            Self::VarBinary => -3,
            Self::LongVarBinary => -4,
            Self::Null => 0,
            Self::Blob => 2004,
            Self::Clob => 2005,
            Self::NClob => 2011,
            Self::Boolean => 16,
            Self::Other(code) => code,
        }
    }

    /// Inverse of [`SqlType::code`]; unknown codes become [`SqlType::Other`].
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -7 => Self::Bit,
            -6 => Self::TinyInt,
            5 => Self::SmallInt,
            4 => Self::Integer,
            -5 => Self::BigInt,
            6 => Self::Float,
            7 => Self::Real,
            8 => Self::Double,
            2 => Self::Numeric,
            3 => Self::Decimal,
            1 => Self::Char,
            12 => Self::VarChar,
            -1 => Self::LongVarChar,
            -15 => Self::NChar,
            -9 => Self::NVarChar,
            -16 => Self::LongNVarChar,
            91 => Self::Date,
            92 => Self::Time,
            93 => Self::Timestamp,
            -2 => Self::Binary,
            -3 => Self::VarBinary,
            -4 => Self::LongVarBinary,
            0 => Self::Null,
            2004 => Self::Blob,
            2005 => Self::Clob,
            2011 => Self::NClob,
            16 => Self::Boolean,
            other => Self::Other(other),
        }
    }

    /// Whether the type is an exact or approximate number.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::Integer
                | Self::BigInt
                | Self::Float
                | Self::Real
                | Self::Double
                | Self::Numeric
                | Self::Decimal
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "OTHER({code})"),
            named => {
                let s = format!("{named:?}");
                f.write_str(&s.to_uppercase())
            }
        }
    }
}

/// Source of a large object's content.
///
/// Drivers that stream LOBs implement this over their own handle; `open` may
/// be called more than once and must restart from the first byte each time.
pub trait LobSource: Send + Sync {
    /// Open a reader over the full content.
    ///
    /// # Errors
    /// Whatever the backing store reports.
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;
}

struct InlineLob(Vec<u8>);

impl LobSource for InlineLob {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(self.0.as_slice()))
    }
}

/// A BLOB or CLOB value.
///
/// Conversion to a portable value materializes the whole object in memory.
#[derive(Clone)]
pub struct LargeObject(Arc<dyn LobSource>);

impl LargeObject {
    pub fn new(source: Arc<dyn LobSource>) -> Self {
        Self(source)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(InlineLob(bytes.into())))
    }

    /// Read the full content.
    ///
    /// # Errors
    /// I/O errors from the source.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.0.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read the full content as UTF-8 text.
    ///
    /// # Errors
    /// I/O errors from the source, or `InvalidData` if the bytes are not UTF-8.
    pub fn read_to_string(&self) -> io::Result<String> {
        String::from_utf8(self.read_to_vec()?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Debug for LargeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LargeObject(..)")
    }
}

impl PartialEq for LargeObject {
    fn eq(&self, other: &Self) -> bool {
        match (self.read_to_vec(), other.read_to_vec()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// A value as produced or consumed by a driver.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Binary(Vec<u8>),
    Blob(LargeObject),
    Clob(LargeObject),
}

impl SqlValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's shape, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::TinyInt(_) => "tinyint",
            Self::SmallInt(_) => "smallint",
            Self::Integer(_) => "integer",
            Self::BigInt(_) => "bigint",
            Self::Real(_) => "real",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::Binary(_) => "binary",
            Self::Blob(_) => "blob",
            Self::Clob(_) => "clob",
        }
    }
}

/// Metadata for one result-set or table column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
            precision: None,
            scale: None,
        }
    }

    #[must_use]
    pub const fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}
