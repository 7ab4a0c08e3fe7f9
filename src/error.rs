use std::fmt;

use thiserror::Error;

use crate::exec::CommandResult;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Argument key must be a string, got: {0}")]
    InvalidKey(String),

    #[error("Couldn't construct task from parameters.\n{0}")]
    Params(#[from] ParamError),

    #[error(transparent)]
    Execution(#[from] Box<CommandError>),

    #[error("Couldn't spawn shell for command: {command}\n{source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch submission failed.\n{0}")]
    Submit(anyhow::Error),
}

impl Error {
    /// Returns the command failure if this error was caused by a non-zero
    /// exit code.
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            Error::Execution(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Self {
        Error::Execution(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("Missing parameter '{0}'")]
    Missing(String),

    #[error("Parameter '{0}' holds cluster submission info, not text")]
    NotText(String),

    #[error("Couldn't decode parameter '{key}'.\n{source}")]
    Decode {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A command that ran to completion but exited with a non-zero code.
///
/// Carries everything the child produced, so the caller can decide whether
/// to retry or give up without re-running anything.
#[derive(Debug, Clone, Error)]
pub struct CommandError {
    pub exit_code: i32,
    pub command: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandError {
    pub(crate) fn new(command: impl Into<String>, result: CommandResult) -> Self {
        Self {
            exit_code: result.exit_code,
            command: command.into(),
            stdout: result.stdout,
            stderr: result.stderr,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command failed (exit code {}): {}\nCommand output: {}\nCommand stderr: {}",
            self.exit_code,
            self.command,
            String::from_utf8_lossy(&self.stdout).trim_end(),
            String::from_utf8_lossy(&self.stderr).trim_end(),
        )
    }
}
