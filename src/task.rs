//! Task instances and the factory that builds them.
use std::sync::Arc;
use std::time::Instant;

use crate::argument::{Arguments, INSTANCE_NAME, Params, WORKFLOW_TASK, coerce, coerce_arguments};
use crate::audit::{AuditEvent, AuditKind, AuditSink, TracingAudit};
use crate::cluster::{BatchSubmitter, ClusterInfo};
use crate::command::CommandLine;
use crate::error::{Error, ParamError};
use crate::exec::{ClusterExecutor, CommandResult, Execute, LocalExecutor};
use crate::workflow::WorkflowRef;

/// The behaviour half of a task, built from its coerced parameters.
///
/// This is the string-keyed construction path: whatever a kind needs must be
/// read back out of [`Params`], typically with [`Params::decode`] or
/// [`Params::parse`].
///
/// ```
/// use workcell::{ParamError, Params, TaskKind};
///
/// struct Align {
///     threads: u32,
/// }
///
/// impl TaskKind for Align {
///     fn from_params(params: &Params) -> Result<Self, ParamError> {
///         Ok(Align {
///             threads: params.decode("threads")?,
///         })
///     }
/// }
/// ```
pub trait TaskKind: Sized + Send + Sync + 'static {
    fn from_params(params: &Params) -> Result<Self, ParamError>;
}

impl TaskKind for () {
    fn from_params(_: &Params) -> Result<Self, ParamError> {
        Ok(())
    }
}

/// A constructed task: identity, coerced parameters, the selected execution
/// strategy and the user-defined kind `K`.
pub struct Task<K = ()> {
    instance_name: String,
    workflow_task: String,
    workflow: WorkflowRef,
    params: Params,
    cluster: Option<Arc<ClusterInfo>>,
    local: LocalExecutor,
    executor: Arc<dyn Execute>,
    audit: Arc<dyn AuditSink>,
    kind: K,
}

impl<K> Task<K> {
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// The coerced owning-workflow parameter.
    pub fn workflow_task(&self) -> &str {
        &self.workflow_task
    }

    pub fn workflow(&self) -> &WorkflowRef {
        &self.workflow
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Cluster submission info passed among the arguments, if any.
    pub fn cluster(&self) -> Option<&Arc<ClusterInfo>> {
        self.cluster.as_ref()
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn into_kind(self) -> K {
        self.kind
    }

    pub fn executor(&self) -> &Arc<dyn Execute> {
        &self.executor
    }

    /// Replaces the execution strategy chosen at construction.
    pub fn with_executor(mut self, executor: Arc<dyn Execute>) -> Self {
        self.executor = executor;
        self
    }

    /// Runs a command through the task's execution strategy.
    pub fn ex(&self, command: impl Into<CommandLine>) -> Result<CommandResult, Error> {
        self.run(self.executor.as_ref(), command.into())
    }

    /// Runs a command on this machine, whatever strategy the task uses.
    pub fn ex_local(&self, command: impl Into<CommandLine>) -> Result<CommandResult, Error> {
        self.run(&self.local, command.into())
    }

    pub fn add_audit_info(&self, key: impl Into<String>, value: impl Into<String>) {
        self.audit_event(AuditKind::Info {
            key: key.into(),
            value: value.into(),
        });
    }

    fn run(&self, executor: &dyn Execute, command: CommandLine) -> Result<CommandResult, Error> {
        let start = Instant::now();
        self.audit_event(AuditKind::Started {
            command: command.to_string(),
        });

        let result = executor.execute(&command);

        let duration = start.elapsed();
        let kind = match &result {
            Ok(result) => AuditKind::Finished {
                command: command.into_string(),
                exit_code: result.exit_code,
                duration,
            },
            Err(err) => AuditKind::Failed {
                command: command.into_string(),
                exit_code: err.as_command_error().map(|err| err.exit_code),
                duration,
            },
        };
        self.audit_event(kind);

        result
    }

    fn audit_event(&self, kind: AuditKind) {
        self.audit
            .record(&AuditEvent::new(self.instance_name.clone(), kind));
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for Task<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("instance_name", &self.instance_name)
            .field("workflow_task", &self.workflow_task)
            .field("params", &self.params)
            .field("cluster", &self.cluster)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Builds a task of kind `K` named `name`, owned by `workflow`.
///
/// 1. All argument keys are validated; a non-string key fails the call with
///    [`Error::InvalidKey`] before anything is built.
/// 2. Values are coerced into [`Params`]; cluster info is kept as-is.
/// 3. [`INSTANCE_NAME`] and [`WORKFLOW_TASK`] are set, replacing any caller
///    values under those keys.
/// 4. `K` is built from the parameters.
/// 5. The cluster info becomes the task's [`Task::cluster`] and decides the
///    execution strategy.
///
/// Executor settings, the batch submitter and the audit sink are taken from
/// the workflow. If the workflow is already gone, local defaults are used.
pub fn create_task<K: TaskKind>(
    name: &str,
    workflow: &WorkflowRef,
    arguments: Arguments,
) -> Result<Task<K>, Error> {
    let (mut params, cluster) = coerce_arguments(arguments)?;

    let workflow_task = coerce(WORKFLOW_TASK, workflow);
    params.insert_text(INSTANCE_NAME, name);
    params.insert_text(WORKFLOW_TASK, workflow_task.clone());

    let kind = K::from_params(&params)?;

    let (local, submitter, audit) = match workflow.upgrade() {
        Some(owner) => (
            LocalExecutor::new(owner.executor_config().clone()),
            owner.submitter().cloned(),
            owner.audit().clone(),
        ),
        None => {
            tracing::debug!(task = name, "Owning workflow dropped, using local defaults");
            (
                LocalExecutor::default(),
                None,
                Arc::new(TracingAudit) as Arc<dyn AuditSink>,
            )
        }
    };

    let executor = select_executor(name, cluster.as_ref(), &local, submitter);

    Ok(Task {
        instance_name: name.to_string(),
        workflow_task,
        workflow: workflow.clone(),
        params,
        cluster,
        local,
        executor,
        audit,
        kind,
    })
}

fn select_executor(
    name: &str,
    cluster: Option<&Arc<ClusterInfo>>,
    local: &LocalExecutor,
    submitter: Option<Arc<dyn BatchSubmitter>>,
) -> Arc<dyn Execute> {
    match (cluster, submitter) {
        (Some(info), Some(submitter)) if info.run_mode.is_remote() => {
            Arc::new(ClusterExecutor::new(info.clone(), submitter))
        }
        (Some(info), None) if info.run_mode.is_remote() => {
            tracing::warn!(
                task = name,
                run_mode = ?info.run_mode,
                "No batch submitter configured, commands will run locally"
            );
            Arc::new(local.clone())
        }
        _ => Arc::new(local.clone()),
    }
}
