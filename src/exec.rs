//! Command execution strategies.
//!
//! Every strategy implements [`Execute`]. The local strategy spawns the
//! command through the system shell and blocks until it exits; the cluster
//! strategy hands it to a [`BatchSubmitter`]. Both apply the same failure
//! rule: a non-zero exit code is logged with both captured streams and
//! returned as [`Error::Execution`].
//!
//! There is no timeout and no retry at this layer. A hung child blocks the
//! calling thread until it exits.
use std::borrow::Cow;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::cluster::{BatchSubmitter, ClusterInfo};
use crate::command::CommandLine;
use crate::config::ExecutorConfig;
use crate::error::{CommandError, Error};

/// Exit code and fully captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Process exit code. A child killed by a signal reports `-signal`.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// A way of running a command line to completion.
pub trait Execute: Send + Sync {
    fn execute(&self, command: &CommandLine) -> Result<CommandResult, Error>;
}

/// Runs commands as child processes of the current one.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    config: Arc<ExecutorConfig>,
}

impl LocalExecutor {
    pub fn new(config: impl Into<Arc<ExecutorConfig>>) -> Self {
        Self {
            config: config.into(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn shell(&self, line: &str) -> Command {
        let shell = &self.config.shell;
        let mut command = Command::new(&shell.program);
        command.arg(&shell.flag);

        // cmd.exe does its own parsing; quoting the line again would break it
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.raw_arg(line);
        }
        #[cfg(not(windows))]
        command.arg(line);

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        command.envs(&self.config.env);
        command
    }
}

impl Execute for LocalExecutor {
    fn execute(&self, command: &CommandLine) -> Result<CommandResult, Error> {
        let line = command.as_str();
        tracing::info!("Executing command: {line}");

        let output = self
            .shell(line)
            .output()
            .map_err(|source| Error::Spawn {
                command: line.to_string(),
                source,
            })?;

        check(
            line,
            CommandResult {
                exit_code: exit_code(output.status),
                stdout: output.stdout,
                stderr: output.stderr,
            },
        )
    }
}

/// Hands commands to a batch resource manager.
#[derive(Clone)]
pub struct ClusterExecutor {
    info: Arc<ClusterInfo>,
    submitter: Arc<dyn BatchSubmitter>,
}

impl ClusterExecutor {
    pub fn new(info: Arc<ClusterInfo>, submitter: Arc<dyn BatchSubmitter>) -> Self {
        Self { info, submitter }
    }

    pub fn info(&self) -> &Arc<ClusterInfo> {
        &self.info
    }
}

impl std::fmt::Debug for ClusterExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterExecutor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Execute for ClusterExecutor {
    fn execute(&self, command: &CommandLine) -> Result<CommandResult, Error> {
        let line = command.as_str();
        tracing::info!(
            job = self.info.job_name.as_str(),
            partition = self.info.partition.as_str(),
            "Submitting command: {line}"
        );

        let result = self
            .submitter
            .submit(&self.info, command)
            .map_err(Error::Submit)?;

        check(line, result)
    }
}

/// Applies the common logging and failure rule to a finished command.
fn check(command: &str, result: CommandResult) -> Result<CommandResult, Error> {
    if !result.stderr.is_empty() {
        tracing::debug!("Stderr from command: {}", result.stderr_lossy());
    }

    if !result.success() {
        let err = CommandError::new(command, result);
        tracing::error!(exit_code = err.exit_code, "{err}");
        return Err(err.into());
    }

    Ok(result)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

/// Runs independent commands concurrently on the rayon pool.
///
/// Results are returned in the order of `commands`; one failure does not
/// stop the others.
pub fn run_all(
    executor: &dyn Execute,
    commands: &[CommandLine],
) -> Vec<Result<CommandResult, Error>> {
    let bar = ProgressBar::new(commands.len() as u64).with_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let results: Vec<_> = commands
        .par_iter()
        .map(|command| {
            let result = executor.execute(command);
            bar.inc(1);
            result
        })
        .collect();

    let failed = results.iter().filter(|result| result.is_err()).count();
    bar.finish_with_message(format!("{failed} failed"));

    results
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::cluster::RunMode;

    #[test]
    fn test_true_succeeds() {
        let result = LocalExecutor::default()
            .execute(&CommandLine::from("true"))
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_false_fails_with_detail() {
        let err = LocalExecutor::default()
            .execute(&CommandLine::from("false"))
            .unwrap_err();

        let err = err.as_command_error().expect("should be a command error");
        assert_ne!(err.exit_code, 0);
        assert_eq!(err.command, "false");
    }

    #[test]
    fn test_captures_both_streams_on_failure() {
        let err = LocalExecutor::default()
            .execute(&CommandLine::from("echo out; echo err >&2; exit 3"))
            .unwrap_err();

        let err = err.as_command_error().unwrap();
        assert_eq!(err.exit_code, 3);
        assert_eq!(err.stdout, b"out\n");
        assert_eq!(err.stderr, b"err\n");
        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn test_stderr_on_success_is_not_fatal() {
        let result = LocalExecutor::default()
            .execute(&CommandLine::from("echo noise >&2"))
            .unwrap();

        assert_eq!(result.stderr_lossy(), "noise\n");
    }

    #[test]
    fn test_token_list_keeps_boundaries() {
        let result = LocalExecutor::default()
            .execute(&CommandLine::from(["echo", "a b"]))
            .unwrap();

        assert_eq!(result.stdout_lossy(), "a b\n");
    }

    #[test]
    fn test_signal_exit_code() {
        let err = LocalExecutor::default()
            .execute(&CommandLine::from("kill -9 $$"))
            .unwrap_err();

        assert_eq!(err.as_command_error().unwrap().exit_code, -9);
    }

    #[test]
    fn test_missing_shell_is_spawn_error() {
        let mut config = ExecutorConfig::default();
        config.shell.program = "/nonexistent/shell".into();

        let err = LocalExecutor::new(config)
            .execute(&CommandLine::from("true"))
            .unwrap_err();

        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_config_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        let config = ExecutorConfig::default()
            .working_dir(path.clone())
            .env("WORKCELL_TEST", "42");

        let result = LocalExecutor::new(config)
            .execute(&CommandLine::from("echo $WORKCELL_TEST; pwd -P"))
            .unwrap();

        assert_eq!(result.stdout_lossy(), format!("42\n{path}\n"));
    }

    #[test]
    fn test_run_all_isolates_outputs() {
        let commands: Vec<CommandLine> = (0..8)
            .map(|i| CommandLine::from(format!("echo out{i}; echo err{i} >&2")))
            .collect();

        let results = run_all(&LocalExecutor::default(), &commands);

        for (i, result) in results.into_iter().enumerate() {
            let result = result.unwrap();
            assert_eq!(result.stdout_lossy(), format!("out{i}\n"));
            assert_eq!(result.stderr_lossy(), format!("err{i}\n"));
        }
    }

    #[test]
    fn test_run_all_reports_each_failure() {
        let commands = vec![
            CommandLine::from("true"),
            CommandLine::from("exit 1"),
            CommandLine::from("true"),
        ];

        let results = run_all(&LocalExecutor::default(), &commands);

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    struct FakeCluster {
        exit_code: i32,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl BatchSubmitter for FakeCluster {
        fn submit(
            &self,
            info: &ClusterInfo,
            command: &CommandLine,
        ) -> anyhow::Result<CommandResult> {
            self.seen
                .lock()
                .unwrap()
                .push((info.job_name.clone(), command.to_string()));

            Ok(CommandResult {
                exit_code: self.exit_code,
                stdout: b"queued\n".to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn test_cluster_executor_delegates() {
        let fake = Arc::new(FakeCluster {
            exit_code: 0,
            seen: Mutex::default(),
        });
        let info = Arc::new(ClusterInfo::new(RunMode::Hpc, "p1", "align"));
        let executor = ClusterExecutor::new(info, fake.clone());

        let result = executor.execute(&CommandLine::from("bwa mem")).unwrap();

        assert_eq!(result.stdout_lossy(), "queued\n");
        assert_eq!(
            *fake.seen.lock().unwrap(),
            vec![("align".to_string(), "bwa mem".to_string())]
        );
    }

    #[test]
    fn test_cluster_executor_applies_exit_rule() {
        let fake = Arc::new(FakeCluster {
            exit_code: 2,
            seen: Mutex::default(),
        });
        let info = Arc::new(ClusterInfo::new(RunMode::Hpc, "p1", "align"));

        let err = ClusterExecutor::new(info, fake)
            .execute(&CommandLine::from("bwa mem"))
            .unwrap_err();

        assert_eq!(err.as_command_error().unwrap().exit_code, 2);
    }
}
