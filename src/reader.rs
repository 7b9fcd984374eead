//! Reading one split of a database source.
//!
//! A [`PartitionedReader`] turns a [`Split`] into a lazy [`RecordStream`].
//! The stream owns exactly one connection and one cursor and releases both on
//! every way out: exhaustion, a fetch error, [`RecordStream::close`],
//! cancellation, or drop.
//!
//! # Features
//!
//! - **Lazy rows** - nothing is converted until the stream is pulled
//! - **Row-level errors** - a value that fails conversion yields an `Err`
//!   naming the split, row offset and column, and the stream moves on
//! - **Expected schemas** - with a configured schema, result columns are
//!   matched by name (honoring its [`NameMatching`]) and type-checked up front
//! - **Cancellation** - a shared [`CancelToken`] stops every stream observing it
//!
//! # Examples
//!
//! ```
//! use sluice::testing::{assert_no_leaks, student_driver, student_source_config};
//! use sluice::{PartitionedReader, Split};
//! use std::sync::Arc;
//!
//! # fn main() -> sluice::Result<()> {
//! let driver = student_driver(4);
//! let reader = PartitionedReader::new(Arc::new(driver.clone()), &student_source_config(1)?);
//!
//! let mut stream = reader.read(&Split::unbounded())?;
//! let first = stream.next().transpose()?;
//! assert!(first.is_some());
//! stream.close()?;
//! assert_no_leaks(&driver);
//! # Ok(())
//! # }
//! ```

use crate::config::{ConnectionConfig, SourceConfig, keys};
use crate::driver::{Connection, Driver, ResultSet};
use crate::error::{ConnectorError, Result};
use crate::query;
use crate::record::Record;
use crate::schema::{ColumnCase, NameMatching, Schema};
use crate::split::Split;
use crate::types::matrix;
use crate::types::sql::{SqlType, SqlValue};
use std::iter::FusedIterator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Cooperative cancellation shared between a host and its running readers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reads splits of one import query.
#[derive(Clone)]
pub struct PartitionedReader {
    driver: Arc<dyn Driver>,
    connection: ConnectionConfig,
    import_query: String,
    split_column: Option<String>,
    column_case: ColumnCase,
    schema: Option<Arc<Schema>>,
    record_name: String,
    cancel: CancelToken,
}

impl PartitionedReader {
    pub fn new(driver: Arc<dyn Driver>, config: &SourceConfig) -> Self {
        Self {
            driver,
            connection: config.connection.clone(),
            import_query: config.import_query.clone(),
            split_column: config.split_by.clone(),
            column_case: config.column_case,
            schema: config.schema.clone().map(Arc::new),
            record_name: config.reference_name.clone(),
            cancel: CancelToken::new(),
        }
    }

    /// Observe `token` instead of the reader's private one.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Open a stream over `split`.
    ///
    /// # Errors
    /// `Cancelled` if already cancelled, `Connection` if the database cannot
    /// be reached or rejects the query, `SchemaMismatch` if an expected field
    /// has no matching result column, `UnsupportedTypeConversion` for an
    /// unbound column type.
    pub fn read(&self, split: &Split) -> Result<RecordStream> {
        if self.cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        let predicate = match (&self.split_column, split == &Split::unbounded()) {
            (_, true) => "1 = 1".to_string(),
            (Some(column), false) => split.predicate(column),
            (None, false) => {
                return Err(ConnectorError::config(
                    keys::SPLIT_BY,
                    format!("split {split} needs a split column"),
                ));
            }
        };
        let sql = query::bounded_query(&self.import_query, &predicate);

        let mut resources = Resources {
            connection: Some(self.driver.connect(&self.connection)?),
            cursor: None,
        };
        debug!(split = %split, sql = %sql, "opening split");
        let cursor = resources.connection_mut()?.query(&sql)?;
        let cursor = resources.cursor.insert(cursor);

        let (schema, bindings) = self.bind_columns(&**cursor)?;
        Ok(RecordStream {
            split: split.to_string(),
            schema,
            bindings,
            resources,
            cancel: self.cancel.clone(),
            row: 0,
            done: false,
        })
    }

    /// Match result columns to the output schema.
    fn bind_columns(&self, cursor: &dyn ResultSet) -> Result<(Arc<Schema>, Vec<Binding>)> {
        let columns = cursor.columns();
        let Some(schema) = &self.schema else {
            let schema = matrix::schema_for_columns(
                &self.record_name,
                columns,
                self.column_case,
                NameMatching::CaseSensitive,
            )?;
            let bindings = columns
                .iter()
                .enumerate()
                .map(|(index, c)| Binding {
                    index,
                    sql_type: c.sql_type,
                    column: c.name.clone(),
                })
                .collect();
            return Ok((Arc::new(schema), bindings));
        };

        let renamed: Vec<String> = columns
            .iter()
            .map(|c| self.column_case.apply(&c.name).into_owned())
            .collect();
        let mut bindings = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let index = renamed
                .iter()
                .position(|n| *n == field.name)
                .or_else(|| renamed.iter().position(|n| schema.matching().matches(n, &field.name)))
                .ok_or_else(|| {
                    ConnectorError::mismatch(&field.name, "no result column with this name")
                })?;
            let column = &columns[index];
            let logical = matrix::logical_type_for(column.sql_type)?;
            if logical != field.logical_type {
                return Err(ConnectorError::mismatch(
                    &field.name,
                    format!(
                        "column {} of type {} reads as {logical}, field expects {}",
                        column.name, column.sql_type, field.logical_type
                    ),
                ));
            }
            bindings.push(Binding {
                index,
                sql_type: column.sql_type,
                column: column.name.clone(),
            });
        }
        Ok((Arc::clone(schema), bindings))
    }
}

struct Binding {
    index: usize,
    sql_type: SqlType,
    column: String,
}

struct Resources {
    connection: Option<Box<dyn Connection>>,
    cursor: Option<Box<dyn ResultSet>>,
}

impl Resources {
    fn connection_mut(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.connection
            .as_mut()
            .ok_or_else(|| ConnectorError::Connection("connection already released".into()))
    }

    /// Close the cursor, then the connection. Both are attempted; the first
    /// failure is returned.
    fn release(&mut self) -> Result<()> {
        let cursor = self.cursor.take().map_or(Ok(()), |mut c| c.close());
        let connection = self.connection.take().map_or(Ok(()), |mut c| c.close());
        cursor.and(connection)
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release database resources");
        }
    }
}

/// Lazy, forward-only records of one split.
///
/// A row that fails to convert yields an `Err` carrying the split, row offset
/// and column; the stream stays positioned after that row. Fetch errors and
/// cancellation end the stream.
pub struct RecordStream {
    split: String,
    schema: Arc<Schema>,
    bindings: Vec<Binding>,
    resources: Resources,
    cancel: CancelToken,
    row: u64,
    done: bool,
}

impl RecordStream {
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows fetched so far, including ones that failed to convert.
    #[must_use]
    pub const fn rows_read(&self) -> u64 {
        self.row
    }

    /// Release the connection and cursor now.
    ///
    /// # Errors
    /// The first failure reported while closing.
    pub fn close(&mut self) -> Result<()> {
        self.done = true;
        self.resources.release()
    }

    fn finish(&mut self) {
        self.done = true;
        if let Err(e) = self.resources.release() {
            warn!(split = %self.split, error = %e, "failed to release database resources");
        }
    }

    fn convert(&self, row: u64, mut values: Vec<SqlValue>) -> Result<Record> {
        let width = values.len();
        let mut out = Vec::with_capacity(self.bindings.len());
        for b in &self.bindings {
            let converted = match values.get_mut(b.index) {
                Some(v) => matrix::to_portable(b.sql_type, std::mem::replace(v, SqlValue::Null)),
                None => Err(ConnectorError::UnsupportedTypeConversion(format!(
                    "row has {width} values, no value at position {}",
                    b.index
                ))),
            };
            let value = converted.map_err(|e| ConnectorError::Conversion {
                split: self.split.clone(),
                row,
                column: b.column.clone(),
                source: Box::new(e),
            })?;
            out.push(value);
        }
        Record::new(Arc::clone(&self.schema), out)
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            debug!(split = %self.split, rows = self.row, "split cancelled");
            self.finish();
            return Some(Err(ConnectorError::Cancelled));
        }
        let fetched = match self.resources.cursor.as_mut() {
            Some(cursor) => cursor.next_row(),
            None => Ok(None),
        };
        match fetched {
            Ok(Some(values)) => {
                let row = self.row;
                self.row += 1;
                Some(self.convert(row, values))
            }
            Ok(None) => {
                debug!(split = %self.split, rows = self.row, "split exhausted");
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for RecordStream {}
