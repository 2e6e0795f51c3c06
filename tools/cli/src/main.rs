//! TBE Toolkits 命令行入口
//!
//! 主流程：解析参数 → 合成开关 → 初始化日志 → 发布开关 → 加载插件 →
//! 读取用例 → 调度执行 → 输出报告。任何错误或 panic 都会终止仍在运行的
//! 工作进程并以退出码 1 结束。

mod args;
mod logging;
mod worker;

use anyhow::{Context, anyhow};
use args::{Cli, Command, RunArgs};
use clap::Parser;
use log::{error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;
use tbe_core::load_cases;
use tbe_plugin::{DynamicPluginLoader, PluginRegistry};
use tbe_profiling::{ExternalToolchain, ProcessLauncher, ProfilingDispatcher, ProfilingSwitches};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Worker(args) => worker::run(args),
    }
}

fn run(args: RunArgs) -> ExitCode {
    let switches = match args.build_switches() {
        Ok(switches) => switches,
        Err(err) => {
            if let Some(line) = log_startup_failure(&err) {
                eprintln!("{line}");
            }
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = logging::init(switches.log_file_path().as_deref()) {
        eprintln!("TBEToolkits Main Sequence failed: {err:?}");
        return ExitCode::FAILURE;
    }

    let toolchain = ExternalToolchain::new(args.toolchain.program.clone())
        .with_args(args.toolchain.args.iter().cloned());
    let mut dispatcher = None;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        main_sequence(&args, switches, &toolchain, &mut dispatcher)
    }));
    let err = match outcome {
        Ok(Ok(())) => return ExitCode::SUCCESS,
        Ok(Err(err)) => err,
        Err(payload) => anyhow!("panicked: {}", panic_message(payload.as_ref())),
    };

    error!("TBEToolkits Main Sequence failed: {err:?}");
    if let Some(dispatcher) = dispatcher.as_mut() {
        let terminated = dispatcher.terminate_workers();
        if terminated > 0 {
            warn!("Terminated {terminated} worker process(es)");
        }
    }
    ExitCode::FAILURE
}

/// 开关合成失败时日志尚未初始化
///
/// 日志可用时经日志输出并返回 `None`，否则返回需要直接写 stderr 的文本。
fn log_startup_failure(err: &anyhow::Error) -> Option<String> {
    match logging::init(None) {
        Ok(()) => {
            error!("TBEToolkits Main Sequence failed: {err:?}");
            None
        }
        Err(log_err) => Some(format!(
            "TBEToolkits Main Sequence failed: {err:?} (logging unavailable: {log_err:?})"
        )),
    }
}

fn main_sequence<'a>(
    args: &RunArgs,
    switches: ProfilingSwitches,
    toolchain: &'a ExternalToolchain,
    slot: &mut Option<ProfilingDispatcher<'a>>,
) -> anyhow::Result<()> {
    let switches = switches
        .publish()
        .context("failed to publish profiling switches")?;
    switches.log_summary();

    let mut registry = PluginRegistry::new();
    if switches.plugin_dirs.is_empty() {
        warn!("No plugin directory given, every operator falls back to default inputs");
    }
    let loaded = DynamicPluginLoader::dylib()
        .load_dirs(&mut registry, switches.plugin_dirs.as_slice())
        .context("failed to load operator plugins")?;
    info!(
        "Loaded {} plugin module(s): {} golden, {} input function(s)",
        loaded.len(),
        registry.golden().len(),
        registry.input().len()
    );
    let registry =
        PluginRegistry::install_global(registry).context("failed to install plugin registry")?;

    let cases = load_cases(&args.cases)
        .with_context(|| format!("failed to load cases from {}", args.cases.display()))?;
    info!("Loaded {} case(s) from {}", cases.len(), args.cases.display());

    let exe = std::env::current_exe().context("cannot locate the tbe-toolkits executable")?;
    let launcher = args
        .toolchain
        .to_worker_args()
        .into_iter()
        .fold(ProcessLauncher::new(exe).arg("worker"), |launcher, arg| {
            launcher.arg(arg)
        });

    let dispatcher =
        slot.insert(ProfilingDispatcher::new(switches, registry, toolchain).with_launcher(launcher));
    let summary = dispatcher.run(cases).context("profiling run failed")?;

    summary.log_summary();
    if let Some(output) = &switches.output {
        summary
            .save(output)
            .with_context(|| format!("failed to save report to {}", output.display()))?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failure_reported_without_logger() {
        // 占住全局 logger，之后的初始化必然失败
        let _ = logging::init(None);
        let line = log_startup_failure(&anyhow!("CORE_NUM must be positive")).unwrap();
        assert!(line.starts_with("TBEToolkits Main Sequence failed: CORE_NUM must be positive"));
        assert!(line.contains("logging unavailable"));
    }
}
