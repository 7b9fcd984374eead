//! Input-file discovery for the file source.
//!
//! # Features
//!
//! - **Glob patterns** - `*` within a path component, `?` for one character,
//!   `**` across directories, `[abc]` and `[!abc]` character sets
//! - **Files only** - directories and other non-regular entries are skipped
//! - **Sorted results** - the same input always plans the same line splits
//! - **Config errors** - [`input_files`] reports an empty match against the
//!   `path` key, where a host can show it next to the offending setting
//!
//! # Examples
//!
//! ```no_run
//! use sluice::io::glob::expand_glob;
//!
//! // every compressed export of the day
//! let files = expand_glob("/mnt/share/exports/2024-06-01/*.txt.gz")?;
//!
//! // hourly drops in nested directories
//! let files = expand_glob("/mnt/share/drops/**/hour=*/*.txt")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::keys;
use crate::error::{ConnectorError, Result as ConnectorResult};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Sorted regular files matching `pattern`. No match is an empty list.
///
/// # Errors
/// An invalid pattern, or a directory that cannot be read while walking.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
    let mut files = entries
        .map(|entry| entry.with_context(|| format!("walk {pattern}")))
        .filter(|entry| entry.as_ref().map_or(true, |p| p.is_file()))
        .collect::<Result<Vec<_>>>()?;
    files.sort();
    Ok(files)
}

/// Files a source configured with `pattern` reads.
///
/// # Errors
/// `InvalidConfig` on the `path` key when nothing matches; I/O failures from
/// [`expand_glob`] otherwise.
pub fn input_files(pattern: &str) -> ConnectorResult<Vec<PathBuf>> {
    let files = expand_glob(pattern)?;
    if files.is_empty() {
        return Err(ConnectorError::config(
            keys::PATH,
            format!("no files found matching {pattern}"),
        ));
    }
    Ok(files)
}
