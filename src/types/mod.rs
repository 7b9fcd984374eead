//! Vendor types and the conversions between them and portable values.
//!
//! - [`sql`]: vendor type codes, vendor values and column descriptors.
//! - [`matrix`]: the static binding table mapping vendor types to logical types.
//! - [`temporal`]: epoch-millisecond encodings for DATE, TIME and TIMESTAMP.
//! - [`bytes`]: big-endian cell encoding for key-value tables.

pub mod bytes;
pub mod matrix;
pub mod sql;
pub mod temporal;

pub use matrix::{field_for_column, logical_type_for, schema_for_columns, to_portable, to_vendor};
pub use sql::{ColumnDescriptor, LargeObject, LobSource, SqlType, SqlValue};
