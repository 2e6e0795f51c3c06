//! `worker` 子命令：执行主进程分派的一组用例
//!
//! 插件注册表不跨进程共享，工作进程按作业中的插件目录重新加载。

use crate::args::WorkerArgs;
use crate::logging;
use anyhow::Context;
use log::{error, info};
use std::process::ExitCode;
use tbe_plugin::{DynamicPluginLoader, PluginRegistry};
use tbe_profiling::{ExternalToolchain, WorkerJob};

pub fn run(args: WorkerArgs) -> ExitCode {
    if let Err(err) = logging::init(None) {
        eprintln!("{err:?}");
    }
    match execute(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Worker failed ({}): {err:?}", args.job.display());
            ExitCode::FAILURE
        }
    }
}

fn execute(args: &WorkerArgs) -> anyhow::Result<()> {
    let job = WorkerJob::read(&args.job).context("failed to read worker job")?;
    info!(
        "Worker {} on device {}: {} case(s)",
        job.worker,
        job.device_id,
        job.cases.len()
    );
    job.switches
        .clone()
        .publish()
        .context("failed to publish profiling switches")?;

    let mut registry = PluginRegistry::new();
    DynamicPluginLoader::dylib()
        .load_dirs(&mut registry, job.switches.plugin_dirs.as_slice())
        .context("failed to load operator plugins")?;
    let registry =
        PluginRegistry::install_global(registry).context("failed to install plugin registry")?;

    let toolchain = ExternalToolchain::new(args.toolchain.program.clone())
        .with_args(args.toolchain.args.iter().cloned());
    let result = job.execute(registry, &toolchain);
    result
        .write(&args.result)
        .context("failed to write worker result")?;
    info!(
        "Worker {} wrote {} report(s) to {}",
        job.worker,
        result.reports.len(),
        args.result.display()
    );
    Ok(())
}
