#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod argument;
mod audit;
mod cluster;
mod command;
mod config;
mod error;
mod exec;
#[cfg(feature = "logging")]
pub mod logging;
mod task;
mod workflow;

pub use crate::argument::{
    ArgKey, Argument, Arguments, Coerce, INSTANCE_NAME, Param, Params, WORKFLOW_TASK, coerce,
};
pub use crate::audit::{AuditEvent, AuditKind, AuditSink, MemoryAudit, TracingAudit};
pub use crate::cluster::{BatchSubmitter, ClusterInfo, RunMode};
pub use crate::command::{CommandLine, join_posix, join_windows};
pub use crate::config::{ExecutorConfig, Shell};
pub use crate::error::*;
pub use crate::exec::{ClusterExecutor, CommandResult, Execute, LocalExecutor, run_all};
pub use crate::task::{Task, TaskKind, create_task};
pub use crate::workflow::{Config, Workflow, WorkflowRef};
