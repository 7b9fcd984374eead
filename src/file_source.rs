//! Line-oriented source over a shared file system.
//!
//! Files matching a glob are split into line ranges; each range reads as
//! records of `{offset: LONG, body: STRING}` where `offset` is the byte offset
//! of the line within the (decompressed) file. Compressed files are detected
//! by extension or magic bytes and must be decompressed from the start, so a
//! late range of a compressed file costs a scan of everything before it.
//!
//! # Features
//!
//! - **Glob input** - see [`crate::io::glob`]; files are read in sorted order
//! - **Line splits** - each file is cut into ranges of `lines_per_split` lines
//! - **Transparent decompression** - gzip, zstd, bzip2 and xz
//! - **Stable offsets** - a line's offset does not depend on how the file was
//!   split
//!
//! # Examples
//!
//! ```no_run
//! use sluice::{FileSource, FileSourceConfig};
//!
//! let source = FileSource::new(
//!     FileSourceConfig::new("exports", "/mnt/share/exports/*.txt.gz").with_lines_per_split(10_000),
//! )?;
//! let splits = source.plan()?;
//! let records = source.read_all(&splits)?;
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::config::keys;
use crate::error::{ConnectorError, Result};
use crate::io::compression::auto_detect_reader;
use crate::io::glob::input_files;
use crate::record::{Record, Value};
use crate::schema::{Field, LogicalType, Schema};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_LINES_PER_SPLIT: usize = 10_000;

/// Schema of the records a [`FileSource`] emits.
///
/// # Errors
/// Never in practice; schema construction is fallible in general.
pub fn file_record_schema() -> Result<Schema> {
    Schema::new(
        "line",
        vec![
            Field::of("offset", LogicalType::Long),
            Field::of("body", LogicalType::String),
        ],
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSourceConfig {
    pub reference_name: String,
    /// Glob pattern selecting the input files.
    pub path: String,
    pub lines_per_split: usize,
}

impl FileSourceConfig {
    pub fn new(reference_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            reference_name: reference_name.into(),
            path: path.into(),
            lines_per_split: DEFAULT_LINES_PER_SPLIT,
        }
    }

    #[must_use]
    pub const fn with_lines_per_split(mut self, lines: usize) -> Self {
        self.lines_per_split = lines;
        self
    }

    /// Read `referenceName`, `path` and the optional `linesPerSplit`.
    ///
    /// # Errors
    /// Missing keys or a non-positive split size.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };
        let reference_name = get(keys::REFERENCE_NAME)
            .ok_or_else(|| ConnectorError::config(keys::REFERENCE_NAME, "required property is missing"))?;
        let path = get(keys::PATH)
            .ok_or_else(|| ConnectorError::config(keys::PATH, "required property is missing"))?;
        let lines_per_split = match get(keys::LINES_PER_SPLIT) {
            None => DEFAULT_LINES_PER_SPLIT,
            Some(raw) => raw.parse().map_err(|_| {
                ConnectorError::config(keys::LINES_PER_SPLIT, format!("'{raw}' is not a positive integer"))
            })?,
        };
        let cfg = Self::new(reference_name, path).with_lines_per_split(lines_per_split);
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// `InvalidConfig` for an empty path or a zero split size.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ConnectorError::config(keys::PATH, "must not be empty"));
        }
        if self.lines_per_split == 0 {
            return Err(ConnectorError::config(keys::LINES_PER_SPLIT, "must be positive"));
        }
        Ok(())
    }
}

/// A `[start_line, end_line)` range of one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSplit {
    pub path: PathBuf,
    pub start_line: u64,
    pub end_line: u64,
}

/// Source reading lines from files on a shared file system.
pub struct FileSource {
    config: FileSourceConfig,
    schema: Arc<Schema>,
}

impl FileSource {
    /// # Errors
    /// See [`FileSourceConfig::validate`].
    pub fn new(config: FileSourceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            schema: Arc::new(file_record_schema()?),
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Expand the path and split every file into line ranges, files in sorted
    /// order. Empty files contribute no splits.
    ///
    /// # Errors
    /// No matching files, or a file that cannot be read.
    pub fn plan(&self) -> Result<Vec<FileSplit>> {
        let files = input_files(&self.config.path)?;
        let per_split = self.config.lines_per_split as u64;
        let mut splits = Vec::new();
        for path in files {
            let total = count_lines(&path)?;
            let mut start = 0;
            while start < total {
                let end = (start + per_split).min(total);
                splits.push(FileSplit {
                    path: path.clone(),
                    start_line: start,
                    end_line: end,
                });
                start = end;
            }
        }
        info!(
            reference = %self.config.reference_name,
            path = %self.config.path,
            splits = splits.len(),
            "planned file splits"
        );
        Ok(splits)
    }

    /// Read one split.
    ///
    /// # Errors
    /// I/O failures, or a line that is not valid UTF-8.
    pub fn read(&self, split: &FileSplit) -> Result<Vec<Record>> {
        let path = &split.path;
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let rdr = auto_detect_reader(f, path)
            .with_context(|| format!("setup decompression for {}", path.display()))?;
        let mut rdr = BufReader::new(rdr);

        let mut out = Vec::with_capacity(usize::try_from(split.end_line.saturating_sub(split.start_line)).unwrap_or(0));
        let mut buf = Vec::new();
        let mut offset: u64 = 0;
        let mut line_no: u64 = 0;
        while line_no < split.end_line {
            buf.clear();
            let n = rdr
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            if n == 0 {
                break;
            }
            if line_no >= split.start_line {
                let body = std::str::from_utf8(trim_newline(&buf)).with_context(|| {
                    format!("line {} of {} is not UTF-8", line_no + 1, path.display())
                })?;
                let at = i64::try_from(offset)
                    .map_err(|_| ConnectorError::out_of_range(offset, "LONG"))?;
                out.push(Record::new(
                    Arc::clone(&self.schema),
                    vec![Value::Long(at), Value::String(body.to_string())],
                )?);
            }
            offset += n as u64;
            line_no += 1;
        }
        debug!(path = %path.display(), start = split.start_line, records = out.len(), "read file split");
        Ok(out)
    }

    /// Read every split, in parallel when `parallel-io` is enabled, keeping
    /// split order.
    ///
    /// # Errors
    /// The first failing split.
    pub fn read_all(&self, splits: &[FileSplit]) -> Result<Vec<Record>> {
        #[cfg(feature = "parallel-io")]
        let parts: Vec<Vec<Record>> = {
            use rayon::prelude::*;
            splits
                .par_iter()
                .map(|s| self.read(s))
                .collect::<Result<_>>()?
        };
        #[cfg(not(feature = "parallel-io"))]
        let parts: Vec<Vec<Record>> = splits
            .iter()
            .map(|s| self.read(s))
            .collect::<Result<_>>()?;
        Ok(parts.into_iter().flatten().collect())
    }
}

fn count_lines(path: &Path) -> Result<u64> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    let mut rdr = BufReader::new(rdr);
    let mut total = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = rdr
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            return Ok(total);
        }
        total += 1;
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
