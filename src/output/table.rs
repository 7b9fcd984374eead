//! Key-value table sink.
//!
//! Each record becomes one row: the row-key field's value, encoded with
//! [`crate::types::bytes`], is the row key, and every other non-null field is
//! a cell named after its destination field. Writing a row merges its cells
//! into whatever the row already holds, so re-running a task is idempotent.
//!
//! # Features
//!
//! - **Row keys** - exactly one designated field; a null key is
//!   `RowKeyNullViolation`
//! - **Case-insensitive row field** - optional, for hosts whose schemas and
//!   configs disagree on case
//! - **Sparse rows** - null fields produce no cell
//! - **Pluggable tables** - anything implementing [`KeyValueTable`];
//!   [`MemoryTable`] ships for tests and embedding
//!
//! # Examples
//!
//! ```
//! use sluice::output::table::encode_row;
//! use sluice::{Field, LogicalType, Record, Schema, TableSinkConfig, Value};
//! use std::sync::Arc;
//!
//! let schema = Schema::new(
//!     "student",
//!     vec![Field::of("ID", LogicalType::Int), Field::nullable("NAME", LogicalType::String)],
//! )?;
//! let config = TableSinkConfig::new("students", schema.clone(), "ID")?;
//! let record = Record::new(Arc::new(schema), vec![Value::Int(7), Value::Null])?;
//!
//! let (row, cells) = encode_row(&config, &record)?;
//! assert_eq!(row, vec![0, 0, 0, 7]);
//! assert!(cells.is_empty());
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use super::delegating::{Conversion, SinkCapability};
use super::{JobContext, NoopCommitter, OutputCommitter, OutputFormat, RecordWriter, TaskContext};
use crate::config::{FieldProjection, TableSinkConfig};
use crate::error::{ConnectorError, Result};
use crate::record::{Record, Value};
use crate::schema::Schema;
use crate::types::bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Cells of one row, by column name.
pub type Cells = BTreeMap<String, Vec<u8>>;

/// A key-value table.
pub trait KeyValueTable: Send + Sync {
    fn name(&self) -> &str;

    /// Merge `cells` into the row at `row`.
    ///
    /// # Errors
    /// Store-specific.
    fn put(&self, row: Vec<u8>, cells: Cells) -> Result<()>;

    /// # Errors
    /// Store-specific.
    fn get(&self, row: &[u8]) -> Result<Option<Cells>>;

    /// Every row in key order.
    ///
    /// # Errors
    /// Store-specific.
    fn scan(&self) -> Result<Vec<(Vec<u8>, Cells)>>;
}

/// In-process [`KeyValueTable`]. Clones share the same rows.
#[derive(Clone, Debug, Default)]
pub struct MemoryTable {
    name: String,
    rows: Arc<Mutex<BTreeMap<Vec<u8>, Cells>>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, row: Vec<u8>, cells: Cells) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(row)
            .or_default()
            .extend(cells);
        Ok(())
    }

    fn get(&self, row: &[u8]) -> Result<Option<Cells>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(row)
            .cloned())
    }

    fn scan(&self) -> Result<Vec<(Vec<u8>, Cells)>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// [`SinkCapability`] writing records into a [`KeyValueTable`].
#[derive(Clone)]
pub struct TableSink {
    config: TableSinkConfig,
    table: Arc<dyn KeyValueTable>,
}

impl TableSink {
    /// # Errors
    /// See [`TableSinkConfig::validate`]; also `InvalidConfig` when the table's
    /// name differs from the configured one.
    pub fn new(config: TableSinkConfig, table: Arc<dyn KeyValueTable>) -> Result<Self> {
        config.validate()?;
        if table.name() != config.name {
            return Err(ConnectorError::config(
                crate::config::keys::NAME,
                format!("configured table '{}' but got '{}'", config.name, table.name()),
            ));
        }
        Ok(Self { config, table })
    }
}

/// Row key and cells for one record.
///
/// # Errors
/// `SchemaMismatch` when the record lacks the row field or a value has the
/// wrong type, `RowKeyNullViolation` for a null key, `UnmappedField` for an
/// unknown field under strict projection.
pub fn encode_row(config: &TableSinkConfig, record: &Record) -> Result<(Vec<u8>, Cells)> {
    let key_matching = config.row_field_matching();
    let destination = &config.schema;
    let mut row = None;
    let mut cells = Cells::new();
    for (name, value) in record.iter() {
        if key_matching.matches(name, &config.row_field) {
            row = Some(bytes::encode(value).ok_or_else(|| ConnectorError::RowKeyNullViolation {
                field: config.row_field.clone(),
            })?);
            continue;
        }
        let Some(field) = destination.field(name) else {
            if config.projection == FieldProjection::Strict {
                return Err(ConnectorError::UnmappedField(name.to_string()));
            }
            continue;
        };
        if let Some(actual) = value.logical_type()
            && actual != field.logical_type
        {
            return Err(ConnectorError::mismatch(
                &field.name,
                format!("value of type {actual} for a {} column", field.logical_type),
            ));
        }
        if let Some(cell) = bytes::encode(value) {
            cells.insert(field.name.clone(), cell);
        }
    }
    let row = row.ok_or_else(|| {
        ConnectorError::mismatch(&config.row_field, "row key field is missing from the record")
    })?;
    Ok((row, cells))
}

/// Rebuild a record from a stored row. Columns absent from `cells` read as
/// null.
///
/// # Errors
/// A cell that does not decode as its field's type.
pub fn decode_row(schema: &Arc<Schema>, row_field: &str, row: &[u8], cells: &Cells) -> Result<Record> {
    let values = schema
        .fields()
        .iter()
        .map(|field| {
            let cell = if field.name == row_field {
                Some(row)
            } else {
                cells.get(&field.name).map(Vec::as_slice)
            };
            cell.map_or(Ok(Value::Null), |c| bytes::decode(field.logical_type, c))
        })
        .collect::<Result<Vec<_>>>()?;
    Record::new(Arc::clone(schema), values)
}

impl SinkCapability for TableSink {
    type Key = Vec<u8>;
    type Value = Cells;

    fn create_delegate(&self, _job: &JobContext) -> Result<Arc<dyn OutputFormat<Vec<u8>, Cells>>> {
        Ok(Arc::new(TableOutputFormat {
            table: Arc::clone(&self.table),
        }))
    }

    fn conversion(&self, _task: &TaskContext) -> Result<Conversion<Vec<u8>, Cells>> {
        let config = self.config.clone();
        Ok(Arc::new(move |record: &Record| encode_row(&config, record)))
    }
}

/// Direct puts; rows are visible as soon as they are written.
pub struct TableOutputFormat {
    table: Arc<dyn KeyValueTable>,
}

impl TableOutputFormat {
    pub fn new(table: Arc<dyn KeyValueTable>) -> Self {
        Self { table }
    }
}

impl OutputFormat<Vec<u8>, Cells> for TableOutputFormat {
    fn check_output_specs(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }

    fn record_writer(&self, _task: &TaskContext) -> Result<Box<dyn RecordWriter<Vec<u8>, Cells>>> {
        Ok(Box::new(TableRecordWriter {
            table: Arc::clone(&self.table),
        }))
    }

    fn output_committer(&self, _task: &TaskContext) -> Result<Arc<dyn OutputCommitter>> {
        Ok(Arc::new(NoopCommitter))
    }
}

struct TableRecordWriter {
    table: Arc<dyn KeyValueTable>,
}

impl RecordWriter<Vec<u8>, Cells> for TableRecordWriter {
    fn write(&mut self, row: Vec<u8>, cells: Cells) -> Result<()> {
        self.table.put(row, cells)
    }

    fn close(&mut self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }
}
