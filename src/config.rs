use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Deserialize;

/// Shell used to interpret command lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Shell {
    /// Shell executable, e.g. `sh`.
    pub program: String,
    /// Flag that makes the shell read the command from the next argument.
    pub flag: String,
}

impl Default for Shell {
    #[cfg(windows)]
    fn default() -> Self {
        Self {
            program: "cmd".into(),
            flag: "/C".into(),
        }
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self {
            program: "sh".into(),
            flag: "-c".into(),
        }
    }
}

/// Settings shared by every locally spawned command.
///
/// Every field has a default, so a config file only needs to mention what it
/// changes:
///
/// ```json
/// { "working_dir": "/scratch/run-01", "env": { "LC_ALL": "C" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub shell: Shell,
    /// Directory commands are started in. Inherited from the process if unset.
    pub working_dir: Option<Utf8PathBuf>,
    /// Variables added to the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ExecutorConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}
