//! Audit hooks.
//!
//! Tasks report what they run to an [`AuditSink`]. Persisting the trail is up
//! to the sink; the default one only writes structured log records.
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum AuditKind {
    /// Free-form information attached by the task itself.
    Info { key: String, value: String },
    Started { command: String },
    Finished {
        command: String,
        exit_code: i32,
        duration: Duration,
    },
    Failed {
        command: String,
        /// `None` if the command never produced an exit code.
        exit_code: Option<i32>,
        duration: Duration,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Instance name of the task that emitted the event.
    pub task: String,
    pub at: Instant,
    pub kind: AuditKind,
}

impl AuditEvent {
    pub(crate) fn new(task: impl Into<String>, kind: AuditKind) -> Self {
        Self {
            task: task.into(),
            at: Instant::now(),
            kind,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes every event as a `tracing` record under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: &AuditEvent) {
        let task = event.task.as_str();

        match &event.kind {
            AuditKind::Info { key, value } => {
                tracing::info!(target: "audit", task, key, value, "audit info");
            }
            AuditKind::Started { command } => {
                tracing::info!(target: "audit", task, command, "command started");
            }
            AuditKind::Finished {
                command,
                exit_code,
                duration,
            } => {
                tracing::info!(
                    target: "audit",
                    task,
                    command,
                    exit_code,
                    "command finished in {duration:.2?}"
                );
            }
            AuditKind::Failed {
                command,
                exit_code,
                duration,
            } => {
                tracing::info!(
                    target: "audit",
                    task,
                    command,
                    exit_code,
                    "command failed after {duration:.2?}"
                );
            }
        }
    }
}

/// Keeps events in memory, in the order they were recorded.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events emitted by one task.
    pub fn for_task(&self, task: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.task == task)
            .collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
