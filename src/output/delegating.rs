//! Record-level output that delegates to a sink-native output format.
//!
//! A sink plugs in by implementing [`SinkCapability`]: how to build its native
//! [`OutputFormat`], how to turn a [`Record`] into its native key/value pair,
//! and optionally a header pair written before the first record.
//!
//! [`DelegatingOutputFormat`] wraps a capability and presents it as an
//! `OutputFormat<(), Record>`:
//!
//! - the delegate format is built on first need and then shared by every
//!   writer and committer of the job;
//! - a task's native writer is only built by its first `write`, so a task
//!   with no records never touches the sink and construction errors surface
//!   from that first write;
//! - the header, when the capability provides one, is written exactly once,
//!   before the first record; a native writer whose header write fails is
//!   closed before the error is returned;
//! - `check_output_specs` and `output_committer` pass straight through.

use super::{JobContext, OutputCommitter, OutputFormat, RecordWriter, TaskContext};
use crate::error::{ConnectorError, Result};
use crate::record::Record;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Record to sink-native pair.
pub type Conversion<K, V> = Arc<dyn Fn(&Record) -> Result<(K, V)> + Send + Sync>;

/// What a sink variant supplies to the delegating writer.
pub trait SinkCapability: Send + Sync + 'static {
    type Key: Send + 'static;
    type Value: Send + 'static;

    /// Build the sink-native output format.
    ///
    /// # Errors
    /// Sink-specific construction failures.
    fn create_delegate(&self, job: &JobContext) -> Result<Arc<dyn OutputFormat<Self::Key, Self::Value>>>;

    /// The record conversion for one task.
    ///
    /// # Errors
    /// Sink-specific setup failures.
    fn conversion(&self, task: &TaskContext) -> Result<Conversion<Self::Key, Self::Value>>;

    /// A pair to write before the first record, derived from that record.
    ///
    /// # Errors
    /// Sink-specific failures.
    fn header(&self, _task: &TaskContext, _first: &Record) -> Result<Option<(Self::Key, Self::Value)>> {
        Ok(None)
    }
}

type Delegate<C> = Arc<dyn OutputFormat<<C as SinkCapability>::Key, <C as SinkCapability>::Value>>;

struct Shared<C: SinkCapability> {
    capability: C,
    delegate: Mutex<Option<Delegate<C>>>,
}

impl<C: SinkCapability> Shared<C> {
    fn delegate(&self, job: &JobContext) -> Result<Delegate<C>> {
        let mut slot = self
            .delegate
            .lock()
            .map_err(|_| ConnectorError::Other(anyhow::anyhow!("delegate lock poisoned")))?;
        if let Some(delegate) = slot.as_ref() {
            return Ok(Arc::clone(delegate));
        }
        debug!(job = %job.job_id, "creating delegate output format");
        let delegate = self.capability.create_delegate(job)?;
        *slot = Some(Arc::clone(&delegate));
        Ok(delegate)
    }
}

/// Record-level output format over a [`SinkCapability`].
pub struct DelegatingOutputFormat<C: SinkCapability> {
    shared: Arc<Shared<C>>,
}

impl<C: SinkCapability> Clone for DelegatingOutputFormat<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: SinkCapability> DelegatingOutputFormat<C> {
    pub fn new(capability: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                capability,
                delegate: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn capability(&self) -> &C {
        &self.shared.capability
    }

    /// Whether the delegate format has been built yet.
    #[must_use]
    pub fn delegate_created(&self) -> bool {
        self.shared
            .delegate
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl<C: SinkCapability> OutputFormat<(), Record> for DelegatingOutputFormat<C> {
    fn check_output_specs(&self, job: &JobContext) -> Result<()> {
        self.shared.delegate(job)?.check_output_specs(job)
    }

    fn record_writer(&self, task: &TaskContext) -> Result<Box<dyn RecordWriter<(), Record>>> {
        Ok(Box::new(DelegatingRecordWriter {
            shared: Arc::clone(&self.shared),
            task: task.clone(),
            active: None,
        }))
    }

    fn output_committer(&self, task: &TaskContext) -> Result<Arc<dyn OutputCommitter>> {
        self.shared.delegate(&task.job)?.output_committer(task)
    }
}

struct Active<C: SinkCapability> {
    writer: Box<dyn RecordWriter<C::Key, C::Value>>,
    conversion: Conversion<C::Key, C::Value>,
}

struct DelegatingRecordWriter<C: SinkCapability> {
    shared: Arc<Shared<C>>,
    task: TaskContext,
    active: Option<Active<C>>,
}

impl<C: SinkCapability> DelegatingRecordWriter<C> {
    fn activate(&mut self, first: &Record) -> Result<&mut Active<C>> {
        if self.active.is_none() {
            let delegate = self.shared.delegate(&self.task.job)?;
            let conversion = self.shared.capability.conversion(&self.task)?;
            let header = self.shared.capability.header(&self.task, first)?;
            let mut writer = delegate.record_writer(&self.task)?;
            if let Some((k, v)) = header
                && let Err(e) = writer.write(k, v)
            {
                if let Err(close) = writer.close(&self.task) {
                    warn!(task = %self.task.attempt_id(), error = %close, "failed to close delegate writer");
                }
                return Err(e);
            }
            debug!(task = %self.task.attempt_id(), "opened delegate record writer");
            self.active = Some(Active { writer, conversion });
        }
        self.active
            .as_mut()
            .ok_or_else(|| ConnectorError::Other(anyhow::anyhow!("delegate writer missing")))
    }
}

impl<C: SinkCapability> RecordWriter<(), Record> for DelegatingRecordWriter<C> {
    fn write(&mut self, _key: (), record: Record) -> Result<()> {
        let active = self.activate(&record)?;
        let (k, v) = (active.conversion)(&record)?;
        active.writer.write(k, v)
    }

    fn close(&mut self, task: &TaskContext) -> Result<()> {
        match self.active.take() {
            Some(mut active) => active.writer.close(task),
            None => Ok(()),
        }
    }
}
