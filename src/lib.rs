//! # Sluice
//!
//! **Partitioned connectors** that move tabular records between relational
//! databases, shared file systems and key-value tables, through one portable
//! record type.
//!
//! ## Key Features
//!
//! - **Split planning** - divide a numeric column's `[min, max]` range into
//!   contiguous, non-overlapping partitions
//! - **Partitioned reads** - one connection per split, rows streamed lazily and
//!   converted to portable [`Record`]s, resources released on every exit path
//! - **Type conversion matrix** - vendor SQL types to portable logical types and
//!   back, with range checks instead of silent coercion
//! - **Delegating writer** - record-level output over sink-native formats, with
//!   lazy delegate construction and an optional header row
//! - **Sinks** - delimited text (with compression), key-value tables, database
//!   tables
//! - **File source** - glob-expanded, line-range split reads of plain or
//!   compressed files
//! - **Injected drivers** - no global registry; [`MemoryDriver`] for tests and
//!   embedding
//!
//! ## Quick Start
//!
//! ```
//! use sluice::source::DbSource;
//! use sluice::testing::{student_driver, student_source_config};
//! use std::sync::Arc;
//!
//! # fn main() -> sluice::Result<()> {
//! let driver = Arc::new(student_driver(10));
//! let source = DbSource::new(student_source_config(3)?, driver)?;
//!
//! let plan = source.plan()?;
//! assert_eq!(plan.len(), 3);
//!
//! let mut total = 0;
//! for split in &plan.splits {
//!     for record in source.read_split(split)? {
//!         let record = record?;
//!         assert!(record.get("ID").is_some());
//!         total += 1;
//!     }
//! }
//! assert_eq!(total, 10);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Splits
//!
//! A [`Split`] is a range of the split column. [`plan_splits`] divides
//! `[min, max]` into at most `n` splits: `[lo, hi)` for all but the last, which
//! is `[lo, max]`. The bounds come from the source's bounding query; an empty
//! table plans a single unbounded split.
//!
//! ### Records
//!
//! A [`Record`] is a row bound to a [`Schema`]: values in declared field
//! order, each of a [`LogicalType`] or null.
//!
//! ### Reading
//!
//! [`PartitionedReader::read`] substitutes the split's predicate into the
//! import query's `$CONDITIONS` placeholder and returns a [`RecordStream`].
//! A row that fails conversion surfaces as an `Err` carrying the split, row
//! and column; the stream carries on with the next row.
//!
//! ### Writing
//!
//! Sinks implement [`SinkCapability`]. [`DelegatingOutputFormat`] turns a
//! capability into an `OutputFormat<(), Record>` a host drives through the
//! job and task lifecycle in [`output`]. [`SinkVariant`] picks the sink.
//!
//! ## Module Overview
//!
//! - [`schema`], [`record`] - logical types, fields, schemas, records
//! - [`types`] - vendor types and values, the conversion matrix, byte cells
//! - [`split`], [`query`] - split planning and query rewriting
//! - [`driver`] - injected database access and the in-memory driver
//! - [`reader`], [`source`] - partitioned database reads
//! - [`file_source`], [`io`] - file-system reads and compression
//! - [`output`] - output contract, delegating writer, sinks
//! - [`config`] - explicit, validated configuration
//! - [`error`] - the crate error type
//! - [`testing`] - fixtures and assertions
//!
//! ## Logging
//!
//! Events go through `tracing`; the crate never installs a subscriber.

pub mod config;
pub mod driver;
pub mod error;
pub mod file_source;
pub mod io;
pub mod output;
pub mod query;
pub mod reader;
pub mod record;
pub mod schema;
pub mod source;
pub mod split;
pub mod testing;
pub mod types;

pub use config::{
    ConnectionConfig, DatabaseSinkConfig, FieldProjection, SourceConfig, TableSinkConfig,
    TextSinkConfig,
};
pub use driver::{Connection, Driver, MemoryDriver, ResultSet};
pub use error::{ConnectorError, ErrorScope, Result};
pub use file_source::{FileSource, FileSourceConfig, FileSplit};
pub use output::delegating::{DelegatingOutputFormat, SinkCapability};
pub use output::sink::SinkVariant;
pub use output::table::{KeyValueTable, MemoryTable};
pub use output::{JobContext, OutputCommitter, OutputFormat, RecordWriter, TaskContext, run_task};
pub use reader::{CancelToken, PartitionedReader, RecordStream};
pub use record::{Record, Value};
pub use schema::{ColumnCase, Field, LogicalType, NameMatching, Schema};
pub use source::DbSource;
pub use split::{BoundValue, Split, SplitBound, SplitPlan, plan_splits};
pub use types::{ColumnDescriptor, SqlType, SqlValue};
