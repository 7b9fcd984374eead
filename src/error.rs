//! Error taxonomy shared by every connector.
//!
//! Errors are grouped by *when* they can happen, which decides how a host
//! should react to them:
//!
//! - **Plan** errors (bad configuration, bad bounds, schema mismatch) are raised
//!   before any partition runs; the job should never start.
//! - **Partition** errors (connection failures, cancellation, I/O) abort the
//!   partition; the host may re-run it from scratch.
//! - **Row** errors (a value that cannot be converted, a null row key) carry
//!   enough context to find the offending row and fail the enclosing partition.
//!
//! See [`ConnectorError::scope`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// When in a job's lifetime an error is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Deployment / planning time; no partition has started.
    Plan,
    /// Fatal to one partition; the host may re-execute it.
    Partition,
    /// Fatal to one record; the enclosing partition fails.
    Row,
}

/// Errors raised by planners, readers and writers.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Split bounds or split count are unusable.
    #[error("invalid split range: {0}")]
    InvalidSplitRange(String),

    /// The external store could not be reached or rejected a statement.
    #[error("connection error: {0}")]
    Connection(String),

    /// A destination field has no counterpart in the source.
    #[error("schema mismatch on field '{field}': {detail}")]
    SchemaMismatch {
        /// Name of the field that could not be matched.
        field: String,
        /// What was wrong.
        detail: String,
    },

    /// No registered conversion exists for the vendor type or value shape.
    #[error("unsupported type conversion: {0}")]
    UnsupportedTypeConversion(String),

    /// A portable value does not fit the vendor column it is written to.
    #[error("value {value} is out of range for {target}")]
    ValueOutOfRange {
        /// Rendering of the offending value.
        value: String,
        /// Vendor type (or encoding) that rejected it.
        target: String,
    },

    /// A single row failed to convert while reading a partition.
    #[error("row {row} of split {split}, column '{column}': {source}")]
    Conversion {
        /// Display form of the split being read.
        split: String,
        /// Zero-based row offset within the split.
        row: u64,
        /// Column that failed.
        column: String,
        /// Underlying failure.
        #[source]
        source: Box<ConnectorError>,
    },

    /// The designated row-key field was null.
    #[error("row key field '{field}' is null")]
    RowKeyNullViolation {
        /// Name of the row-key field.
        field: String,
    },

    /// A record field has no destination column and projection is strict.
    #[error("field '{0}' has no destination column")]
    UnmappedField(String),

    /// A configuration value is missing or invalid.
    #[error("invalid config key '{key}': {message}")]
    InvalidConfig {
        /// The configuration key.
        key: String,
        /// What was wrong with the value.
        message: String,
    },

    /// The host cancelled the task.
    #[error("task cancelled")]
    Cancelled,

    /// Local I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped failure from a file-level helper.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectorError {
    pub(crate) fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn out_of_range(value: impl ToString, target: impl ToString) -> Self {
        Self::ValueOutOfRange {
            value: value.to_string(),
            target: target.to_string(),
        }
    }

    /// Classify the error by the phase it belongs to.
    #[must_use]
    pub const fn scope(&self) -> ErrorScope {
        match self {
            Self::InvalidSplitRange(_) | Self::SchemaMismatch { .. } | Self::InvalidConfig { .. } => {
                ErrorScope::Plan
            }
            Self::Connection(_) | Self::Cancelled | Self::Io(_) | Self::Other(_) => {
                ErrorScope::Partition
            }
            Self::UnsupportedTypeConversion(_)
            | Self::ValueOutOfRange { .. }
            | Self::Conversion { .. }
            | Self::RowKeyNullViolation { .. }
            | Self::UnmappedField(_) => ErrorScope::Row,
        }
    }
}
