//! Database table sink.
//!
//! Records are inserted one statement per row through an injected [`Driver`].
//! Values are converted with [`to_vendor`] against the destination table's
//! column types, which are fetched once per sink and cached. Inserts are
//! visible immediately, so the committer is a no-op.
//!
//! # Features
//!
//! - **Column selection** - all table columns by default (or `columns=*`),
//!   otherwise the configured list, matched case-insensitively
//! - **Projection** - record fields without a destination column are an
//!   error unless [`FieldProjection::Subset`] is configured
//! - **Vendor-side checks** - a value that does not fit its column (300 into
//!   a TINYINT) fails the row instead of being coerced

use super::delegating::{Conversion, SinkCapability};
use super::{JobContext, NoopCommitter, OutputCommitter, OutputFormat, RecordWriter, TaskContext};
use crate::config::{DatabaseSinkConfig, FieldProjection, keys};
use crate::driver::{Connection, Driver};
use crate::error::{ConnectorError, Result};
use crate::record::Record;
use crate::types::sql::{ColumnDescriptor, SqlValue};
use crate::types::to_vendor;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// [`SinkCapability`] inserting records into a database table.
#[derive(Clone)]
pub struct DatabaseSink {
    config: DatabaseSinkConfig,
    driver: Arc<dyn Driver>,
    columns: Arc<Mutex<Option<Arc<[ColumnDescriptor]>>>>,
}

impl DatabaseSink {
    /// # Errors
    /// See [`DatabaseSinkConfig::validate`]; also `InvalidConfig` when the
    /// driver is not the configured one.
    pub fn new(config: DatabaseSinkConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        config.validate()?;
        if driver.name() != config.connection.driver {
            return Err(ConnectorError::config(
                keys::DRIVER,
                format!(
                    "configured driver '{}' but got '{}'",
                    config.connection.driver,
                    driver.name()
                ),
            ));
        }
        Ok(Self {
            config,
            driver,
            columns: Arc::default(),
        })
    }

    /// Destination columns in insert order, fetched on first use.
    ///
    /// # Errors
    /// `Connection` failures, or a configured column the table lacks.
    pub fn columns(&self) -> Result<Arc<[ColumnDescriptor]>> {
        let mut slot = self.columns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(columns) = slot.as_ref() {
            return Ok(Arc::clone(columns));
        }
        let all = with_connection(self.driver.as_ref(), &self.config, |conn| {
            conn.table_columns(&self.config.table)
        })?;
        let columns: Arc<[ColumnDescriptor]> = match &self.config.columns {
            None => all.into(),
            Some(wanted) => wanted
                .iter()
                .map(|name| {
                    all.iter()
                        .find(|c| c.name.eq_ignore_ascii_case(name))
                        .cloned()
                        .ok_or_else(|| {
                            ConnectorError::config(
                                keys::COLUMNS,
                                format!("table '{}' has no column '{name}'", self.config.table),
                            )
                        })
                })
                .collect::<Result<Vec<_>>>()?
                .into(),
        };
        debug!(table = %self.config.table, columns = columns.len(), "fetched destination columns");
        *slot = Some(Arc::clone(&columns));
        Ok(columns)
    }
}

fn with_connection<T>(
    driver: &dyn Driver,
    config: &DatabaseSinkConfig,
    f: impl FnOnce(&mut dyn Connection) -> Result<T>,
) -> Result<T> {
    let mut conn = driver.connect(&config.connection)?;
    let outcome = f(conn.as_mut());
    let closed = conn.close();
    let value = outcome?;
    closed?;
    Ok(value)
}

/// Vendor values for `record`, in `columns` order.
///
/// # Errors
/// `UnmappedField` for a field with no column under strict projection,
/// `SchemaMismatch` when a non-nullable column has no field, and conversion
/// errors from [`to_vendor`].
pub fn encode_row(
    columns: &[ColumnDescriptor],
    projection: FieldProjection,
    record: &Record,
) -> Result<Vec<SqlValue>> {
    if projection == FieldProjection::Strict
        && let Some((name, _)) = record
            .iter()
            .find(|(name, _)| !columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
    {
        return Err(ConnectorError::UnmappedField(name.to_string()));
    }
    columns
        .iter()
        .map(|column| {
            let value = record.get(&column.name).or_else(|| {
                record
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
                    .map(|(_, v)| v)
            });
            match value {
                Some(v) => to_vendor(column.sql_type, v),
                None if column.nullable => Ok(SqlValue::Null),
                None => Err(ConnectorError::mismatch(
                    &column.name,
                    "non-nullable column has no matching record field",
                )),
            }
        })
        .collect()
}

fn insert_statement(table: &str, columns: &[ColumnDescriptor]) -> String {
    let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    let params = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        params.join(", ")
    )
}

impl SinkCapability for DatabaseSink {
    type Key = ();
    type Value = Vec<SqlValue>;

    fn create_delegate(&self, _job: &JobContext) -> Result<Arc<dyn OutputFormat<(), Vec<SqlValue>>>> {
        Ok(Arc::new(DbOutputFormat {
            config: self.config.clone(),
            driver: Arc::clone(&self.driver),
            columns: self.columns()?,
        }))
    }

    fn conversion(&self, _task: &TaskContext) -> Result<Conversion<(), Vec<SqlValue>>> {
        let columns = self.columns()?;
        let projection = self.config.projection;
        Ok(Arc::new(move |record: &Record| -> Result<((), Vec<SqlValue>)> {
            Ok(((), encode_row(&columns, projection, record)?))
        }))
    }
}

/// Row-at-a-time inserts into one table.
pub struct DbOutputFormat {
    config: DatabaseSinkConfig,
    driver: Arc<dyn Driver>,
    columns: Arc<[ColumnDescriptor]>,
}

impl OutputFormat<(), Vec<SqlValue>> for DbOutputFormat {
    fn check_output_specs(&self, _job: &JobContext) -> Result<()> {
        with_connection(self.driver.as_ref(), &self.config, |conn| {
            conn.table_columns(&self.config.table).map(drop)
        })
    }

    fn record_writer(&self, task: &TaskContext) -> Result<Box<dyn RecordWriter<(), Vec<SqlValue>>>> {
        let connection = self.driver.connect(&self.config.connection)?;
        debug!(task = %task.attempt_id(), table = %self.config.table, "opened database writer");
        Ok(Box::new(DbRecordWriter {
            connection: Some(connection),
            statement: insert_statement(&self.config.table, &self.columns),
            written: 0,
        }))
    }

    fn output_committer(&self, _task: &TaskContext) -> Result<Arc<dyn OutputCommitter>> {
        Ok(Arc::new(NoopCommitter))
    }
}

struct DbRecordWriter {
    connection: Option<Box<dyn Connection>>,
    statement: String,
    written: u64,
}

impl RecordWriter<(), Vec<SqlValue>> for DbRecordWriter {
    fn write(&mut self, _key: (), row: Vec<SqlValue>) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| ConnectorError::Connection("writer is closed".to_string()))?;
        self.written += conn.execute(&self.statement, &row)?;
        Ok(())
    }

    fn close(&mut self, task: &TaskContext) -> Result<()> {
        if let Some(mut conn) = self.connection.take() {
            debug!(task = %task.attempt_id(), rows = self.written, "closing database writer");
            conn.close()?;
        }
        Ok(())
    }
}

impl Drop for DbRecordWriter {
    fn drop(&mut self) {
        if let Some(mut conn) = self.connection.take()
            && let Err(e) = conn.close()
        {
            warn!(error = %e, "failed to close database writer connection");
        }
    }
}

