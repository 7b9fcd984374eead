//! Sink selection.
//!
//! [`SinkVariant`] names one of the sink implementations together with what it
//! needs; [`SinkVariant::into_output_format`] wraps it in a
//! [`DelegatingOutputFormat`] so a host only ever sees
//! `OutputFormat<(), Record>`.

use super::OutputFormat;
use super::database::DatabaseSink;
use super::delegating::DelegatingOutputFormat;
use super::table::{KeyValueTable, TableSink};
#[cfg(feature = "sink-text")]
use super::text::TextSink;
use crate::config::{DatabaseSinkConfig, TableSinkConfig};
#[cfg(feature = "sink-text")]
use crate::config::TextSinkConfig;
use crate::driver::Driver;
use crate::error::Result;
use crate::record::Record;
use std::fmt;
use std::sync::Arc;

pub enum SinkVariant {
    #[cfg(feature = "sink-text")]
    Text(TextSinkConfig),
    Table {
        config: TableSinkConfig,
        table: Arc<dyn KeyValueTable>,
    },
    Database {
        config: DatabaseSinkConfig,
        driver: Arc<dyn Driver>,
    },
}

impl SinkVariant {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            #[cfg(feature = "sink-text")]
            Self::Text(_) => "text",
            Self::Table { .. } => "table",
            Self::Database { .. } => "database",
        }
    }

    /// # Errors
    /// Whatever the chosen sink's constructor rejects.
    pub fn into_output_format(self) -> Result<Box<dyn OutputFormat<(), Record>>> {
        Ok(match self {
            #[cfg(feature = "sink-text")]
            Self::Text(config) => Box::new(DelegatingOutputFormat::new(TextSink::new(config)?)),
            Self::Table { config, table } => {
                Box::new(DelegatingOutputFormat::new(TableSink::new(config, table)?))
            }
            Self::Database { config, driver } => {
                Box::new(DelegatingOutputFormat::new(DatabaseSink::new(config, driver)?))
            }
        })
    }
}

impl fmt::Debug for SinkVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinkVariant").field(&self.kind()).finish()
    }
}
