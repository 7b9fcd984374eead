//! Partitioned database source.
//!
//! [`DbSource`] plans splits from the bounding query and reads them, either
//! one at a time (what a host worker does) or all at once, on the `rayon`
//! pool when the `parallel-io` feature is enabled.
//!
//! Planning runs the bounding query on a connection of its own, which is
//! closed before any split is read. A source configured with a single split
//! skips the bounding query entirely.
//!
//! ```
//! use sluice::source::DbSource;
//! use sluice::testing::{student_driver, student_source_config};
//! use std::sync::Arc;
//!
//! # fn main() -> sluice::Result<()> {
//! let source = DbSource::new(student_source_config(2)?, Arc::new(student_driver(6)))?;
//! let plan = source.plan()?;
//! assert_eq!(plan.len(), 2);
//! assert_eq!(source.read_all(&plan)?.len(), 6);
//! # Ok(())
//! # }
//! ```

use crate::config::{SourceConfig, keys};
use crate::driver::{Connection, Driver};
use crate::error::{ConnectorError, Result};
use crate::query;
use crate::reader::{CancelToken, PartitionedReader, RecordStream};
use crate::record::Record;
use crate::split::{Split, SplitPlan};
use crate::types::SqlValue;
use std::sync::Arc;
use tracing::{debug, info};

/// A configured database source.
pub struct DbSource {
    config: SourceConfig,
    driver: Arc<dyn Driver>,
    cancel: CancelToken,
}

impl DbSource {
    /// Validate `config` and check it names `driver`.
    ///
    /// # Errors
    /// Anything [`SourceConfig::validate`] rejects, or `InvalidConfig` when the
    /// injected driver is not the one the config asks for.
    pub fn new(config: SourceConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        config.validate()?;
        if driver.name() != config.connection.driver {
            return Err(ConnectorError::config(
                keys::DRIVER,
                format!(
                    "config asks for driver '{}' but '{}' was supplied",
                    config.connection.driver,
                    driver.name()
                ),
            ));
        }
        Ok(Self {
            config,
            driver,
            cancel: CancelToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Token that cancels every reader created by this source.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run the bounding query and plan splits.
    ///
    /// A single-split config, or a bounding query over an empty table, plans
    /// one unbounded split.
    ///
    /// # Errors
    /// `Connection` if the bounding query fails, `InvalidSplitRange` for
    /// unusable bounds.
    pub fn plan(&self) -> Result<SplitPlan> {
        let (Some(column), Some(bounding), true) = (
            self.config.split_by.as_deref(),
            self.config.bounding_query.as_deref(),
            self.config.num_splits > 1,
        ) else {
            info!(reference = %self.config.reference_name, "planned single unbounded split");
            return Ok(SplitPlan::unbounded());
        };

        let (min, max) = self.fetch_bounds(bounding)?;
        let plan = match query::parse_bounds(min, max)? {
            None => SplitPlan {
                split_column: Some(column.to_string()),
                splits: vec![Split::unbounded()],
            },
            Some((lo, hi)) => SplitPlan::new(column, lo, hi, self.config.num_splits)?,
        };
        info!(
            reference = %self.config.reference_name,
            column,
            splits = plan.len(),
            "planned splits"
        );
        Ok(plan)
    }

    fn fetch_bounds(&self, bounding: &str) -> Result<(SqlValue, SqlValue)> {
        let mut connection = self.driver.connect(&self.config.connection)?;
        let bounds = bounds_row(connection.as_mut(), bounding);
        let closed = connection.close();
        let bounds = bounds?;
        closed?;
        Ok(bounds)
    }

    /// A reader bound to this source's cancel token.
    #[must_use]
    pub fn reader(&self) -> PartitionedReader {
        PartitionedReader::new(Arc::clone(&self.driver), &self.config).with_cancel(self.cancel.clone())
    }

    /// Open a stream over one split.
    ///
    /// # Errors
    /// See [`PartitionedReader::read`].
    pub fn read_split(&self, split: &Split) -> Result<RecordStream> {
        self.reader().read(split)
    }

    /// Read every split of `plan`, in parallel when `parallel-io` is enabled,
    /// and concatenate the records in split order.
    ///
    /// The first failing partition fails the whole read.
    ///
    /// # Errors
    /// Any error from any partition, including per-row conversion errors.
    pub fn read_all(&self, plan: &SplitPlan) -> Result<Vec<Record>> {
        let reader = self.reader();
        let read_partition = |split: &Split| -> Result<Vec<Record>> {
            let records = reader.read(split)?.collect::<Result<Vec<_>>>()?;
            debug!(split = %split, records = records.len(), "read partition");
            Ok(records)
        };
        #[cfg(feature = "parallel-io")]
        let partitions: Vec<Vec<Record>> = {
            use rayon::prelude::*;
            plan.splits
                .par_iter()
                .map(read_partition)
                .collect::<Result<_>>()?
        };
        #[cfg(not(feature = "parallel-io"))]
        let partitions: Vec<Vec<Record>> = plan
            .splits
            .iter()
            .map(read_partition)
            .collect::<Result<_>>()?;
        Ok(partitions.into_iter().flatten().collect())
    }
}

/// First row of a bounding query as `(min, max)`.
fn bounds_row(connection: &mut dyn Connection, sql: &str) -> Result<(SqlValue, SqlValue)> {
    let mut cursor = connection.query(sql)?;
    let row = cursor.next_row();
    cursor.close()?;
    let mut row = row?.ok_or_else(|| {
        ConnectorError::InvalidSplitRange("bounding query returned no rows".into())
    })?;
    if row.len() < 2 {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "bounding query returned {} columns, expected 2",
            row.len()
        )));
    }
    let max = row.swap_remove(1);
    let min = row.swap_remove(0);
    Ok((min, max))
}
