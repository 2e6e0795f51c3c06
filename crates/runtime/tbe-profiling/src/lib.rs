//! # tbe-profiling
//!
//! 算子性能测试：开关、执行路径与调度。
//!
//! ## 主要组件
//!
//! - [`ProfilingSwitches`]：一次运行的全部开关，发布后只读
//! - [`OperatorToolchain`]：编译 / 执行算子的外部协作方
//! - [`NpuProfilingRun`] / [`GpuProfilingRun`]：两条执行路径，失败按用例隔离
//! - [`WorkerPool`]：多设备时的工作进程
//! - [`ProfilingDispatcher`]：按目标模式选择执行路径
//!
//! ## 使用示例
//!
//! ```no_run
//! use tbe_plugin::PluginRegistry;
//! use tbe_profiling::{ExternalToolchain, ProfilingDispatcher, ProfilingSwitches};
//!
//! let switches = ProfilingSwitches::default();
//! let registry = PluginRegistry::new();
//! let toolchain = ExternalToolchain::new("tbe-toolchain");
//! let mut dispatcher = ProfilingDispatcher::new(&switches, &registry, &toolchain);
//! let summary = dispatcher.run(Vec::new()).unwrap();
//! summary.log_summary();
//! ```

pub mod dispatcher;
pub mod dump;
pub mod error;
pub mod gpu;
pub mod inputs;
pub mod npu;
pub mod report;
pub mod switches;
pub mod toolchain;
pub mod worker;

pub use dispatcher::{DispatchPlan, ProfilingDispatcher, partition};
pub use dump::Dumper;
pub use error::{ProfilingError, ToolchainError};
pub use gpu::GpuProfilingRun;
pub use inputs::{random_inputs, resolve_inputs};
pub use npu::NpuProfilingRun;
pub use report::{CaseReport, CaseStatus, RunSummary, Stage, StageFailure};
pub use switches::{BackendFlags, DumpLevel, ProfilingSwitches, SocSpecOverrides, TargetMode};
pub use toolchain::{
    CompileRequest, ExternalToolchain, GpuLaunchRequest, KernelArtifact, LaunchOutcome,
    LaunchRequest, OperatorToolchain,
};
pub use worker::{ProcessLauncher, WorkerJob, WorkerLauncher, WorkerPool, WorkerResult};
