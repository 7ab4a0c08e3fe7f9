use std::sync::Arc;

use workcell::{
    Arguments, BatchSubmitter, ClusterInfo, CommandLine, CommandResult, LocalExecutor, ParamError,
    Params, RunMode, TaskKind, Workflow, run_all,
};

/// Prints what would be submitted instead of submitting it.
struct DryRunCluster;

impl BatchSubmitter for DryRunCluster {
    fn submit(&self, info: &ClusterInfo, command: &CommandLine) -> anyhow::Result<CommandResult> {
        println!(
            "would submit to {} ({} cores, {}): {}",
            info.partition, info.cores, info.time, command
        );
        Ok(CommandResult {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

struct Greet {
    who: Vec<String>,
}

impl TaskKind for Greet {
    fn from_params(params: &Params) -> Result<Self, ParamError> {
        Ok(Greet {
            who: params.decode("who")?,
        })
    }
}

fn main() -> anyhow::Result<()> {
    workcell::logging::init("info");

    let workflow = Workflow::config()
        .name("demo")
        .submitter(Arc::new(DryRunCluster))
        .finish();

    let greet = workflow.new_task::<Greet>(
        "greet",
        Arguments::new().with("who", vec!["world".to_string(), "a b".to_string()]),
    )?;

    for who in &greet.kind().who {
        let result = greet.ex(["echo", "hello", who.as_str()])?;
        print!("{}", result.stdout_lossy());
    }

    let heavy = workflow.new_task::<()>(
        "heavy",
        Arguments::new().with(
            "cluster",
            ClusterInfo::new(RunMode::Hpc, "proj01", "heavy").cores(16),
        ),
    )?;
    heavy.ex("sort -S 8G big.txt > sorted.txt")?;

    let commands: Vec<CommandLine> = (1..=4)
        .map(|i| format!("sleep 0.{i}; echo {i}").into())
        .collect();
    for result in run_all(&LocalExecutor::default(), &commands) {
        print!("{}", result?.stdout_lossy());
    }

    if let Err(err) = greet.ex("exit 3") {
        eprintln!("{err}");
    }

    Ok(())
}
