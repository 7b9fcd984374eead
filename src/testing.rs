//! Test fixtures for code built on sluice.
//!
//! - **Fixtures**: a seeded `student` table behind a [`MemoryDriver`], with one
//!   column of every vendor type the conversion matrix knows, plus matching
//!   connection and source configs.
//! - **Assertions**: resource-leak checks and column extraction for reader
//!   output.
//!
//! # Quick Start
//!
//! ```
//! use sluice::source::DbSource;
//! use sluice::testing::*;
//! use std::sync::Arc;
//!
//! # fn main() -> sluice::Result<()> {
//! let driver = student_driver(10);
//! let config = student_source_config(3)?;
//! let source = DbSource::new(config, Arc::new(driver.clone()))?;
//! let plan = source.plan()?;
//! let records = source.read_all(&plan)?;
//! assert_eq!(records.len(), 10);
//! assert_no_leaks(&driver);
//! # Ok(())
//! # }
//! ```
//!
//! [`MemoryDriver`]: crate::driver::MemoryDriver

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
