//! Portable values and schema-bound records.
//!
//! A [`Record`] pairs an `Arc<Schema>` with one [`Value`] per field, in
//! declared order. Every source yields records and every sink consumes them;
//! they serialize to JSON objects keyed by field name.
//!
//! ```
//! use sluice::{Field, LogicalType, Record, Schema, Value};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(Schema::new(
//!     "student",
//!     vec![Field::of("ID", LogicalType::Int), Field::nullable("NAME", LogicalType::String)],
//! )?);
//! let record = Record::builder(schema).set("ID", 7)?.set("NAME", "Ada")?.build()?;
//! assert_eq!(record.get("ID"), Some(&Value::Int(7)));
//! assert_eq!(record.get("NAME"), Some(&Value::String("Ada".into())));
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::error::{ConnectorError, Result};
use crate::schema::{LogicalType, Schema};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A single portable value.
///
/// Serializes to the natural JSON form (`null`, booleans, numbers, strings,
/// and byte arrays as arrays of numbers).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Logical type carried by the value, `None` for null.
    #[must_use]
    pub const fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(LogicalType::Bool),
            Self::Int(_) => Some(LogicalType::Int),
            Self::Long(_) => Some(LogicalType::Long),
            Self::Float(_) => Some(LogicalType::Float),
            Self::Double(_) => Some(LogicalType::Double),
            Self::String(_) => Some(LogicalType::String),
            Self::Bytes(_) => Some(LogicalType::Bytes),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v as i64),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A row of portable values bound to a [`Schema`].
///
/// Values are stored in the schema's declared order. Every non-null value must
/// carry the logical type of its field; nulls are accepted for any field
/// (nullability is only enforced for row keys, at write time).
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// Bind `values` to `schema`.
    ///
    /// # Errors
    /// `SchemaMismatch` if the arity differs or a value's type does not match
    /// its field.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(ConnectorError::mismatch(
                schema.name(),
                format!("expected {} values, got {}", schema.len(), values.len()),
            ));
        }
        for (field, value) in schema.fields().iter().zip(&values) {
            if let Some(t) = value.logical_type()
                && t != field.logical_type
            {
                return Err(ConnectorError::mismatch(
                    &field.name,
                    format!("value of type {t} for field of type {}", field.logical_type),
                ));
            }
        }
        Ok(Self { schema, values })
    }

    /// Start building a record field by field; unset fields stay null.
    #[must_use]
    pub fn builder(schema: Arc<Schema>) -> RecordBuilder {
        let values = vec![Value::Null; schema.len()];
        RecordBuilder { schema, values }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Look a value up by field name (honoring the schema's matching mode).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate `(field name, value)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Incremental [`Record`] construction.
pub struct RecordBuilder {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl RecordBuilder {
    /// Set a field by name.
    ///
    /// # Errors
    /// `SchemaMismatch` if the field does not exist.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| ConnectorError::mismatch(name, "no such field in schema"))?;
        self.values[idx] = value.into();
        Ok(self)
    }

    /// Finish, type-checking every value.
    ///
    /// # Errors
    /// See [`Record::new`].
    pub fn build(self) -> Result<Record> {
        Record::new(self.schema, self.values)
    }
}
