//! Batch output contract and sink implementations.
//!
//! A host drives output in two levels:
//!
//! 1. per job: [`OutputFormat::check_output_specs`], then
//!    [`OutputCommitter::setup_job`], and finally `commit_job` or `abort_job`;
//! 2. per task attempt: `setup_task`, a [`RecordWriter`] fed every record and
//!    closed, then `commit_task` (if `needs_task_commit`) or `abort_task`.
//!
//! [`run_task`] performs the task-level sequence for embedders that have no
//! host of their own.

pub mod database;
pub mod delegating;
pub mod sink;
pub mod table;
#[cfg(feature = "sink-text")]
pub mod text;

use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Identity of a job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobContext {
    pub job_id: String,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

/// Identity of one attempt at one task of a job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskContext {
    pub job: JobContext,
    pub task_id: u32,
    pub attempt: u32,
}

impl TaskContext {
    pub fn new(job: &JobContext, task_id: u32, attempt: u32) -> Self {
        Self {
            job: job.clone(),
            task_id,
            attempt,
        }
    }

    /// Unique per attempt.
    #[must_use]
    pub fn attempt_id(&self) -> String {
        format!("attempt_{}_{:05}_{}", self.job.job_id, self.task_id, self.attempt)
    }

    /// Shared by every attempt of the task.
    #[must_use]
    pub fn task_name(&self) -> String {
        format!("task_{}_{:05}", self.job.job_id, self.task_id)
    }

    /// Output file name for this task.
    #[must_use]
    pub fn part_name(&self, extension: &str) -> String {
        format!("part-{:05}.{extension}", self.task_id)
    }
}

/// Writes sink-native key/value pairs for one task attempt.
pub trait RecordWriter<K, V>: Send {
    /// # Errors
    /// Conversion or sink failures.
    fn write(&mut self, key: K, value: V) -> Result<()>;

    /// Flush and release. Called once, after the last write.
    ///
    /// # Errors
    /// Flush or release failures.
    fn close(&mut self, task: &TaskContext) -> Result<()>;
}

/// Makes a task's or a job's output visible, or discards it.
pub trait OutputCommitter: Send + Sync {
    /// # Errors
    /// Sink-specific.
    fn setup_job(&self, job: &JobContext) -> Result<()>;
    /// # Errors
    /// Sink-specific.
    fn setup_task(&self, task: &TaskContext) -> Result<()>;
    /// # Errors
    /// Sink-specific.
    fn needs_task_commit(&self, task: &TaskContext) -> Result<bool>;
    /// # Errors
    /// Sink-specific.
    fn commit_task(&self, task: &TaskContext) -> Result<()>;
    /// # Errors
    /// Sink-specific.
    fn abort_task(&self, task: &TaskContext) -> Result<()>;
    /// # Errors
    /// Sink-specific.
    fn commit_job(&self, job: &JobContext) -> Result<()>;
    /// # Errors
    /// Sink-specific.
    fn abort_job(&self, job: &JobContext) -> Result<()>;
}

/// A destination for key/value pairs.
pub trait OutputFormat<K, V>: Send + Sync {
    /// Fail early when the destination cannot accept the job's output.
    ///
    /// # Errors
    /// Sink-specific.
    fn check_output_specs(&self, job: &JobContext) -> Result<()>;

    /// # Errors
    /// Sink-specific.
    fn record_writer(&self, task: &TaskContext) -> Result<Box<dyn RecordWriter<K, V>>>;

    /// # Errors
    /// Sink-specific.
    fn output_committer(&self, task: &TaskContext) -> Result<Arc<dyn OutputCommitter>>;
}

/// Committer for sinks whose writes are visible immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCommitter;

impl OutputCommitter for NoopCommitter {
    fn setup_job(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }

    fn setup_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn needs_task_commit(&self, _task: &TaskContext) -> Result<bool> {
        Ok(false)
    }

    fn commit_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn abort_task(&self, _task: &TaskContext) -> Result<()> {
        Ok(())
    }

    fn commit_job(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }

    fn abort_job(&self, _job: &JobContext) -> Result<()> {
        Ok(())
    }
}

/// Run one task attempt: write every item, close the writer, and commit the
/// task. On any failure the attempt is aborted and the error returned.
///
/// Returns the number of items written.
///
/// # Errors
/// The first failure from the committer, the writer, or `items`.
pub fn run_task<K, V, I>(format: &dyn OutputFormat<K, V>, task: &TaskContext, items: I) -> Result<u64>
where
    I: IntoIterator<Item = Result<(K, V)>>,
{
    let committer = format.output_committer(task)?;
    committer.setup_task(task)?;
    let outcome = write_all(format, task, items).and_then(|written| {
        if committer.needs_task_commit(task)? {
            committer.commit_task(task)?;
        }
        Ok(written)
    });
    if outcome.is_err()
        && let Err(e) = committer.abort_task(task)
    {
        warn!(task = %task.attempt_id(), error = %e, "failed to abort task");
    }
    outcome
}

fn write_all<K, V, I>(format: &dyn OutputFormat<K, V>, task: &TaskContext, items: I) -> Result<u64>
where
    I: IntoIterator<Item = Result<(K, V)>>,
{
    let mut writer = format.record_writer(task)?;
    let mut written = 0;
    for item in items {
        let (k, v) = match item {
            Ok(kv) => kv,
            Err(e) => {
                close_quietly(writer.as_mut(), task);
                return Err(e);
            }
        };
        if let Err(e) = writer.write(k, v) {
            close_quietly(writer.as_mut(), task);
            return Err(e);
        }
        written += 1;
    }
    writer.close(task)?;
    Ok(written)
}

fn close_quietly<K, V>(writer: &mut dyn RecordWriter<K, V>, task: &TaskContext) {
    if let Err(e) = writer.close(task) {
        warn!(task = %task.attempt_id(), error = %e, "failed to close writer after error");
    }
}
