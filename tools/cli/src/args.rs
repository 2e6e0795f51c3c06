//! 命令行参数
//!
//! 开关按三层合成：安全默认值 → `--config` 文件 → 显式命令行参数。
//! 未给出的参数不会改动对应字段。

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tbe_core::ExecutionBackend;
use tbe_core::config::Config;
use tbe_profiling::{DumpLevel, ProfilingSwitches, SocSpecOverrides, TargetMode};

pub const DEFAULT_TOOLCHAIN: &str = "tbe-toolchain";

#[derive(Debug, Parser)]
#[command(name = "tbe-toolkits", version, about = "TBE operator profiling toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 运行一次性能测试
    Run(RunArgs),
    /// 工作进程入口，由主进程启动
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// 外部编译器/运行时程序
#[derive(Debug, Clone, Args)]
pub struct ToolchainArgs {
    /// 工具链程序
    #[arg(long = "toolchain", value_name = "PROGRAM", default_value = DEFAULT_TOOLCHAIN)]
    pub program: PathBuf,

    /// 追加给工具链程序的参数（可重复）
    #[arg(long = "toolchain-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl ToolchainArgs {
    /// 转发给工作进程的参数
    pub fn to_worker_args(&self) -> Vec<String> {
        let mut out = vec!["--toolchain".to_string(), self.program.display().to_string()];
        for arg in &self.args {
            out.push(format!("--toolchain-arg={arg}"));
        }
        out
    }
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    #[arg(long, value_name = "FILE")]
    pub job: PathBuf,

    #[arg(long, value_name = "FILE")]
    pub result: PathBuf,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// 开关配置文件（.toml / .json）
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 用例文件（JSON 列表）
    #[arg(long, value_name = "FILE")]
    pub cases: PathBuf,

    /// 插件目录（可重复）
    #[arg(long = "plugin-dir", value_name = "DIR")]
    pub plugin_dirs: Vec<PathBuf>,

    /// 目标模式：npu 或 gpu
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    pub mode: Option<TargetMode>,

    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub dyn_realtime_compile: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub static_realtime_compile: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub const_realtime_compile: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub binary_realtime_compile: Option<bool>,

    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub dyn_profiling: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub static_profiling: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub const_profiling: Option<bool>,
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub binary_profiling: Option<bool>,

    /// 转储级别：NO/INPUT/OUTPUT/GOLDEN/INOUT/INGOLD/OUTGOLD/FULL
    #[arg(long, value_name = "LEVEL", value_parser = parse_dump)]
    pub dump: Option<DumpLevel>,

    /// SoC 规格覆盖 KEY=VALUE（可重复）
    #[arg(long = "soc-spec", value_name = "KEY=VALUE", value_parser = SocSpecOverrides::parse_entry)]
    pub soc_spec: Vec<(String, String)>,

    /// 日志同时写入该文件
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// 设备 ID（可重复，多于一个时启用工作进程）
    #[arg(long = "device", value_name = "ID")]
    pub devices: Vec<u32>,

    #[arg(long = "kernel-meta", value_name = "DIR")]
    pub kernel_meta: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<PathBuf>,

    /// 报告输出路径
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// 只运行这些算子（可重复）
    #[arg(long = "op", value_name = "NAME")]
    pub ops: Vec<String>,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}

fn parse_mode(s: &str) -> Result<TargetMode, String> {
    s.parse()
}

fn parse_dump(s: &str) -> Result<DumpLevel, String> {
    s.parse()
}

impl RunArgs {
    /// 合成并校验开关
    pub fn build_switches(&self) -> anyhow::Result<ProfilingSwitches> {
        let mut switches = match &self.config {
            Some(path) => ProfilingSwitches::load_file(path)
                .with_context(|| format!("failed to load switches from {}", path.display()))?,
            None => ProfilingSwitches::defaults(),
        };
        self.apply(&mut switches);
        switches.validate().context("invalid profiling switches")?;
        Ok(switches)
    }

    /// 把显式给出的参数覆盖到 `switches`
    pub fn apply(&self, switches: &mut ProfilingSwitches) {
        if let Some(mode) = self.mode {
            switches.mode = mode;
        }

        let realtime = [
            (ExecutionBackend::Dynamic, self.dyn_realtime_compile),
            (ExecutionBackend::Static, self.static_realtime_compile),
            (ExecutionBackend::Const, self.const_realtime_compile),
            (ExecutionBackend::Binary, self.binary_realtime_compile),
        ];
        for (backend, value) in realtime {
            if let Some(value) = value {
                switches.realtime_compile.set(backend, value);
            }
        }
        let profiling = [
            (ExecutionBackend::Dynamic, self.dyn_profiling),
            (ExecutionBackend::Static, self.static_profiling),
            (ExecutionBackend::Const, self.const_profiling),
            (ExecutionBackend::Binary, self.binary_profiling),
        ];
        for (backend, value) in profiling {
            if let Some(value) = value {
                switches.online_profiling.set(backend, value);
            }
        }

        if let Some(dump) = self.dump {
            switches.dump = dump;
        }
        for (key, value) in &self.soc_spec {
            switches.soc_spec.insert(key.clone(), value.clone());
        }
        if let Some(path) = &self.log_file {
            switches.log_to_file = true;
            switches.log_file = Some(path.clone());
        }
        if !self.devices.is_empty() {
            switches.device_ids = self.devices.clone();
        }
        if !self.plugin_dirs.is_empty() {
            switches.plugin_dirs = self.plugin_dirs.clone();
        }
        if let Some(dir) = &self.kernel_meta {
            switches.kernel_meta_dir = dir.clone();
        }
        if let Some(dir) = &self.dump_dir {
            switches.dump_dir = dir.clone();
        }
        if let Some(path) = &self.output {
            switches.output = Some(path.clone());
        }
        if !self.ops.is_empty() {
            switches.op_filter = self.ops.clone();
        }
    }
}
