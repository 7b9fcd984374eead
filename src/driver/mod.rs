//! Injected database access.
//!
//! A [`Driver`] is handed to sources and sinks at construction time; there is
//! no process-wide registry. Each partition opens its own [`Connection`] and
//! releases it when done, so connections never cross threads while in use
//! (they only need to be `Send` to be moved onto a worker).

pub mod memory;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::types::sql::{ColumnDescriptor, SqlValue};

pub use memory::{MemoryDriver, MemoryTableSpec};

/// Factory for connections to one kind of database.
pub trait Driver: Send + Sync {
    /// Name matched against [`ConnectionConfig::driver`].
    fn name(&self) -> &str;

    /// Open a connection.
    ///
    /// # Errors
    /// `Connection` when the database is unreachable or rejects the credentials.
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// One open session.
pub trait Connection: Send {
    /// Run a query and stream its rows.
    ///
    /// # Errors
    /// `Connection` when the statement is rejected.
    fn query(&mut self, sql: &str) -> Result<Box<dyn ResultSet>>;

    /// Run a statement with positional `?` parameters, returning the number of
    /// affected rows.
    ///
    /// # Errors
    /// `Connection` when the statement is rejected.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Column metadata of a table, in declared order.
    ///
    /// # Errors
    /// `Connection` when the table does not exist.
    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Release the session. Calling it again is a no-op.
    ///
    /// # Errors
    /// Whatever the database reports while closing.
    fn close(&mut self) -> Result<()>;
}

/// A forward-only cursor over query results.
pub trait ResultSet: Send {
    fn columns(&self) -> &[ColumnDescriptor];

    /// Next row, `None` once exhausted.
    ///
    /// # Errors
    /// `Connection` when fetching fails.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;

    /// Release the cursor. Calling it again is a no-op.
    ///
    /// # Errors
    /// Whatever the database reports while closing.
    fn close(&mut self) -> Result<()>;
}
