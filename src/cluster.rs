//! Resource-manager submission parameters.
//!
//! [`ClusterInfo`] is deliberately kept out of the string parameter store: it
//! travels through task construction as a shared pointer and is handed to the
//! [`BatchSubmitter`] in its native form.
use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::exec::CommandResult;

/// Where a command attached to a [`ClusterInfo`] should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Run on the local machine, ignoring the remaining fields.
    #[default]
    Local,
    /// Submit as a regular batch job.
    Hpc,
    /// Submit as an MPI job.
    Mpi,
}

impl RunMode {
    pub fn is_remote(self) -> bool {
        !matches!(self, RunMode::Local)
    }
}

/// Submission parameters for a batch resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub run_mode: RunMode,
    /// Accounting project the job is billed to.
    pub project: String,
    /// Queue or partition name.
    pub partition: String,
    pub cores: u32,
    /// Wall-clock limit in the resource manager's own format, e.g. `1:00:00`.
    pub time: String,
    pub job_name: String,
    pub threads: u32,
}

impl ClusterInfo {
    pub fn new(run_mode: RunMode, project: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            run_mode,
            project: project.into(),
            partition: "core".into(),
            cores: 1,
            time: "01:00:00".into(),
            job_name: job_name.into(),
            threads: 1,
        }
    }

    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    pub fn time(mut self, time: impl Into<String>) -> Self {
        self.time = time.into();
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }
}

/// Submits a command to a batch resource manager and waits for it.
///
/// Implementations own the whole protocol (job script, queueing, polling).
/// They must return the job's exit code and captured streams in a
/// [`CommandResult`]; a non-zero exit code is turned into a failure by the
/// caller, so implementations only return `Err` when the submission itself
/// could not be carried out.
pub trait BatchSubmitter: Send + Sync {
    fn submit(&self, info: &ClusterInfo, command: &CommandLine) -> anyhow::Result<CommandResult>;
}
