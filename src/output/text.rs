//! Delimited text sink with two-phase file commit.
//!
//! Layout under the output directory while a job runs:
//!
//! ```text
//! out/_temporary/attempt_<job>_<task>_<n>/part-<task>.<ext>   written by an attempt
//! out/_temporary/task_<job>_<task>/part-<task>.<ext>          committed task
//! out/part-<task>.<ext>                                       committed job
//! out/_SUCCESS
//! ```
//!
//! Part files are compressed when the extension ends in a codec suffix
//! (`csv.gz`, `csv.zst`, ...).

use super::delegating::{Conversion, SinkCapability};
use super::{JobContext, OutputCommitter, OutputFormat, RecordWriter, TaskContext};
use crate::config::{FieldProjection, TextSinkConfig, keys};
use crate::error::{ConnectorError, Result};
use crate::io::compression::{CodecWriter, auto_detect_writer};
use crate::record::{Record, Value};
use anyhow::Context;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TEMPORARY: &str = "_temporary";
const SUCCESS_MARKER: &str = "_SUCCESS";

/// Render one value as a text cell. Null is empty; bytes are lowercase hex.
#[must_use]
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bytes(b) => b.iter().fold(String::with_capacity(b.len() * 2), |mut s, byte| {
            let _ = write!(s, "{byte:02x}");
            s
        }),
        other => other.to_string(),
    }
}

/// [`SinkCapability`] for delimited text.
#[derive(Clone, Debug)]
pub struct TextSink {
    config: TextSinkConfig,
}

impl TextSink {
    /// # Errors
    /// See [`TextSinkConfig::validate`].
    pub fn new(config: TextSinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn column_names(&self, record: &Record) -> Vec<String> {
        self.config.columns.clone().unwrap_or_else(|| {
            record
                .schema()
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .collect()
        })
    }
}

impl SinkCapability for TextSink {
    type Key = ();
    type Value = Vec<String>;

    fn create_delegate(&self, _job: &JobContext) -> Result<Arc<dyn OutputFormat<(), Vec<String>>>> {
        Ok(Arc::new(TextOutputFormat {
            dir: self.config.path.clone(),
            delimiter: self.config.delimiter,
            extension: self.config.extension.clone(),
        }))
    }

    fn conversion(&self, _task: &TaskContext) -> Result<Conversion<(), Vec<String>>> {
        let columns = self.config.columns.clone();
        let projection = self.config.projection;
        Ok(Arc::new(move |record: &Record| -> Result<((), Vec<String>)> {
            let Some(columns) = &columns else {
                return Ok(((), record.values().iter().map(render_cell).collect()));
            };
            if projection == FieldProjection::Strict
                && let Some((name, _)) = record
                    .iter()
                    .find(|(name, _)| !columns.iter().any(|c| c == *name))
            {
                return Err(ConnectorError::UnmappedField(name.to_string()));
            }
            let cells = columns
                .iter()
                .map(|c| record.get(c).map_or_else(String::new, render_cell))
                .collect();
            Ok(((), cells))
        }))
    }

    fn header(&self, _task: &TaskContext, first: &Record) -> Result<Option<((), Vec<String>)>> {
        Ok(self
            .config
            .write_header
            .then(|| ((), self.column_names(first))))
    }
}

/// Sink-native text output: one part file per task attempt.
pub struct TextOutputFormat {
    dir: PathBuf,
    delimiter: u8,
    extension: String,
}

impl TextOutputFormat {
    fn attempt_dir(&self, task: &TaskContext) -> PathBuf {
        self.dir.join(TEMPORARY).join(task.attempt_id())
    }
}

impl OutputFormat<(), Vec<String>> for TextOutputFormat {
    fn check_output_specs(&self, _job: &JobContext) -> Result<()> {
        let occupied = match fs::read_dir(&self.dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if occupied {
            return Err(ConnectorError::config(
                keys::PATH,
                format!("output directory {} already exists and is not empty", self.dir.display()),
            ));
        }
        Ok(())
    }

    fn record_writer(&self, task: &TaskContext) -> Result<Box<dyn RecordWriter<(), Vec<String>>>> {
        let dir = self.attempt_dir(task);
        fs::create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let path = dir.join(task.part_name(&self.extension));
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let sink = auto_detect_writer(file, &path)?;
        let writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_writer(sink);
        debug!(path = %path.display(), "opened text part file");
        Ok(Box::new(TextRecordWriter {
            writer: Some(writer),
            path,
        }))
    }

    fn output_committer(&self, _task: &TaskContext) -> Result<Arc<dyn OutputCommitter>> {
        Ok(Arc::new(FileOutputCommitter::new(&self.dir)))
    }
}

struct TextRecordWriter {
    writer: Option<csv::Writer<CodecWriter<File>>>,
    path: PathBuf,
}

impl RecordWriter<(), Vec<String>> for TextRecordWriter {
    fn write(&mut self, _key: (), row: Vec<String>) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            ConnectorError::Other(anyhow::anyhow!("write to closed part file {}", self.path.display()))
        })?;
        writer
            .write_record(&row)
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    fn close(&mut self, _task: &TaskContext) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let sink = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", self.path.display()))?;
        sink.finish()
            .with_context(|| format!("finish {}", self.path.display()))?;
        Ok(())
    }
}

impl Drop for TextRecordWriter {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(path = %self.path.display(), "part file dropped without close");
        }
    }
}

/// Two-phase commit of part files into an output directory.
#[derive(Clone, Debug)]
pub struct FileOutputCommitter {
    dir: PathBuf,
}

impl FileOutputCommitter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn temporary(&self) -> PathBuf {
        self.dir.join(TEMPORARY)
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl OutputCommitter for FileOutputCommitter {
    fn setup_job(&self, _job: &JobContext) -> Result<()> {
        let tmp = self.temporary();
        fs::create_dir_all(&tmp).with_context(|| format!("mkdir -p {}", tmp.display()))?;
        Ok(())
    }

    fn setup_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn needs_task_commit(&self, task: &TaskContext) -> Result<bool> {
        Ok(self.temporary().join(task.attempt_id()).is_dir())
    }

    fn commit_task(&self, task: &TaskContext) -> Result<()> {
        let from = self.temporary().join(task.attempt_id());
        let to = self.temporary().join(task.task_name());
        remove_dir_if_exists(&to)?;
        fs::rename(&from, &to)
            .with_context(|| format!("rename {} -> {}", from.display(), to.display()))?;
        debug!(task = %task.attempt_id(), "committed task output");
        Ok(())
    }

    fn abort_task(&self, task: &TaskContext) -> Result<()> {
        remove_dir_if_exists(&self.temporary().join(task.attempt_id()))
    }

    fn commit_job(&self, job: &JobContext) -> Result<()> {
        let tmp = self.temporary();
        let prefix = format!("task_{}_", job.job_id);
        let mut committed = 0usize;
        if tmp.is_dir() {
            let mut task_dirs: Vec<PathBuf> = fs::read_dir(&tmp)
                .with_context(|| format!("list {}", tmp.display()))?
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.is_dir()
                        && p.file_name()
                            .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
                })
                .collect();
            task_dirs.sort();
            for task_dir in task_dirs {
                for entry in fs::read_dir(&task_dir).with_context(|| format!("list {}", task_dir.display()))? {
                    let from = entry?.path();
                    let Some(name) = from.file_name() else { continue };
                    let to = self.dir.join(name);
                    fs::rename(&from, &to)
                        .with_context(|| format!("rename {} -> {}", from.display(), to.display()))?;
                    committed += 1;
                }
            }
        }
        remove_dir_if_exists(&tmp)?;
        let marker = self.dir.join(SUCCESS_MARKER);
        fs::create_dir_all(&self.dir).with_context(|| format!("mkdir -p {}", self.dir.display()))?;
        File::create(&marker).with_context(|| format!("create {}", marker.display()))?;
        info!(dir = %self.dir.display(), files = committed, "committed job output");
        Ok(())
    }

    fn abort_job(&self, _job: &JobContext) -> Result<()> {
        remove_dir_if_exists(&self.temporary())
    }
}
