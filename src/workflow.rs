//! The owning side of tasks.
//!
//! A [`Workflow`] keeps every task created through [`Workflow::new_task`].
//! Tasks only point back through a [`WorkflowRef`], which holds a weak
//! reference and never keeps the workflow alive.
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::argument::Arguments;
use crate::audit::{AuditSink, TracingAudit};
use crate::cluster::BatchSubmitter;
use crate::config::ExecutorConfig;
use crate::error::Error;
use crate::task::{Task, TaskKind, create_task};

/// A type-erased, thread-safe container.
type Dynamic = Arc<dyn Any + Send + Sync>;

/// A workflow context: settings shared by its tasks and the tasks themselves.
pub struct Workflow {
    name: Arc<str>,
    executor: Arc<ExecutorConfig>,
    submitter: Option<Arc<dyn BatchSubmitter>>,
    audit: Arc<dyn AuditSink>,
    tasks: Mutex<HashMap<String, Dynamic>>,
}

impl Workflow {
    pub fn config() -> Config {
        Config::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor_config(&self) -> &Arc<ExecutorConfig> {
        &self.executor
    }

    pub fn submitter(&self) -> Option<&Arc<dyn BatchSubmitter>> {
        self.submitter.as_ref()
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// A non-owning reference to this workflow, for handing to tasks.
    pub fn reference(self: &Arc<Self>) -> WorkflowRef {
        WorkflowRef {
            name: self.name.clone(),
            inner: Arc::downgrade(self),
        }
    }

    /// Creates a task owned by this workflow.
    ///
    /// A task already registered under the same name is replaced.
    pub fn new_task<K: TaskKind>(
        self: &Arc<Self>,
        name: &str,
        arguments: Arguments,
    ) -> Result<Arc<Task<K>>, Error> {
        let task = Arc::new(create_task::<K>(name, &self.reference(), arguments)?);

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), task.clone() as Dynamic);

        if previous.is_some() {
            tracing::warn!(workflow = &*self.name, task = name, "Replacing existing task");
        }

        Ok(task)
    }

    /// Looks up a task created by [`Workflow::new_task`].
    ///
    /// Returns `None` if there is no such task or it is of a different kind.
    pub fn task<K: TaskKind>(&self, name: &str) -> Option<Arc<Task<K>>> {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        tasks.get(name)?.clone().downcast::<Task<K>>().ok()
    }

    /// Instance names of all owned tasks, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut names: Vec<_> = tasks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("executor", &self.executor)
            .field("tasks", &self.task_names())
            .finish_non_exhaustive()
    }
}

/// A builder for [`Workflow`].
pub struct Config {
    name: Arc<str>,
    executor: ExecutorConfig,
    submitter: Option<Arc<dyn BatchSubmitter>>,
    audit: Arc<dyn AuditSink>,
}

impl Config {
    fn new() -> Self {
        Self {
            name: Arc::from("workflow"),
            executor: ExecutorConfig::default(),
            submitter: None,
            audit: Arc::new(TracingAudit),
        }
    }

    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Arc::from(name.as_ref());
        self
    }

    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Enables cluster execution for tasks whose cluster info asks for it.
    pub fn submitter(mut self, submitter: Arc<dyn BatchSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn finish(self) -> Arc<Workflow> {
        Arc::new(Workflow {
            name: self.name,
            executor: Arc::new(self.executor),
            submitter: self.submitter,
            audit: self.audit,
            tasks: Mutex::default(),
        })
    }
}

/// A non-owning reference to a [`Workflow`].
///
/// Serializes as `{"workflow":"<name>"}`, which is how it appears in a
/// task's parameters.
#[derive(Clone)]
pub struct WorkflowRef {
    name: Arc<str>,
    inner: Weak<Workflow>,
}

impl WorkflowRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The workflow, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<Workflow>> {
        self.inner.upgrade()
    }
}

impl Serialize for WorkflowRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("WorkflowRef", 1)?;
        state.serialize_field("workflow", &*self.name)?;
        state.end()
    }
}

impl std::fmt::Debug for WorkflowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkflowRef({})", self.name)
    }
}
