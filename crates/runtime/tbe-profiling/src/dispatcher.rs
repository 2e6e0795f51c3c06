//! # 性能测试调度
//!
//! 按开关中的目标模式在 GPU 与 NPU 两条执行路径之间选择，模式只在调度时读取一次：
//!
//! ```text
//! Start ─ mode == gpu ─→ GpuProfilingRun ─→ Done
//!   └──── mode == npu ─→ NpuProfilingRun ─→ Done
//!                        （单设备在本进程内执行，多设备分派给工作进程）
//! ```

use crate::error::ProfilingError;
use crate::gpu::GpuProfilingRun;
use crate::npu::NpuProfilingRun;
use crate::report::{CaseReport, RunSummary};
use crate::switches::{ProfilingSwitches, TargetMode};
use crate::toolchain::OperatorToolchain;
use crate::worker::{WorkerJob, WorkerLauncher, WorkerPool};
use tbe_core::ProfilingCase;
use tbe_plugin::PluginRegistry;

/// 调度路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPlan {
    Gpu,
    /// 本进程内，在首个设备上执行
    NpuInline { device_id: u32 },
    /// 每个设备一个工作进程
    NpuWorkers { workers: usize },
}

/// 性能测试调度器
pub struct ProfilingDispatcher<'a> {
    switches: &'a ProfilingSwitches,
    registry: &'a PluginRegistry,
    toolchain: &'a dyn OperatorToolchain,
    launcher: Option<Box<dyn WorkerLauncher + 'a>>,
    pool: Option<WorkerPool>,
}

impl<'a> ProfilingDispatcher<'a> {
    pub fn new(
        switches: &'a ProfilingSwitches,
        registry: &'a PluginRegistry,
        toolchain: &'a dyn OperatorToolchain,
    ) -> Self {
        Self {
            switches,
            registry,
            toolchain,
            launcher: None,
            pool: None,
        }
    }

    /// 设置工作进程启动方式；未设置时 NPU 路径总在本进程内执行
    pub fn with_launcher(mut self, launcher: impl WorkerLauncher + 'a) -> Self {
        self.launcher = Some(Box::new(launcher));
        self
    }

    pub fn plan(&self) -> DispatchPlan {
        match self.switches.mode {
            TargetMode::Gpu => DispatchPlan::Gpu,
            TargetMode::Npu if self.launcher.is_some() && self.switches.device_ids.len() > 1 => {
                DispatchPlan::NpuWorkers {
                    workers: self.switches.device_ids.len(),
                }
            }
            TargetMode::Npu => DispatchPlan::NpuInline {
                device_id: self.switches.device_ids.first().copied().unwrap_or(0),
            },
        }
    }

    /// 过滤用例并执行
    pub fn run(&mut self, cases: Vec<ProfilingCase>) -> Result<RunSummary, ProfilingError> {
        let total = cases.len();
        let cases = self.switches.filter_cases(cases);
        if cases.len() != total {
            log::info!(
                "Operator filter {:?} kept {} of {} case(s)",
                self.switches.op_filter,
                cases.len(),
                total
            );
        }
        if cases.is_empty() {
            log::warn!("No profiling cases selected");
        }

        let plan = self.plan();
        log::info!("Dispatching {} case(s): {:?}", cases.len(), plan);

        let mut summary = RunSummary::start(self.switches.mode);
        let reports = match plan {
            DispatchPlan::Gpu => GpuProfilingRun::new(self.switches, self.registry, self.toolchain).run(&cases),
            DispatchPlan::NpuInline { device_id } => {
                NpuProfilingRun::new(self.switches, self.registry, self.toolchain, device_id).run(&cases)
            }
            DispatchPlan::NpuWorkers { .. } => self.run_workers(cases)?,
        };
        summary.finish(reports);
        Ok(summary)
    }

    /// 用例按设备轮转分组，每组一个工作进程
    fn run_workers(&mut self, cases: Vec<ProfilingCase>) -> Result<Vec<CaseReport>, ProfilingError> {
        let Some(launcher) = self.launcher.as_deref() else {
            return Ok(Vec::new());
        };
        let jobs = partition(self.switches, cases);
        let pool = self.pool.insert(WorkerPool::new()?);
        for job in &jobs {
            pool.spawn(launcher, job)?;
        }
        pool.wait_all()
    }

    /// 终止所有仍在运行的工作进程
    pub fn terminate_workers(&mut self) -> usize {
        self.pool.as_mut().map_or(0, WorkerPool::terminate_all)
    }

    pub fn worker_pool(&self) -> Option<&WorkerPool> {
        self.pool.as_ref()
    }
}

/// 第 i 个用例分给 `device_ids[i % n]`，空组不启动进程
pub fn partition(switches: &ProfilingSwitches, cases: Vec<ProfilingCase>) -> Vec<WorkerJob> {
    let n = switches.device_ids.len().max(1);
    let mut groups: Vec<Vec<ProfilingCase>> = vec![Vec::new(); n];
    for (i, case) in cases.into_iter().enumerate() {
        groups[i % n].push(case);
    }

    groups
        .into_iter()
        .zip(switches.device_ids.iter().copied())
        .enumerate()
        .filter(|(_, (group, _))| !group.is_empty())
        .map(|(worker, (cases, device_id))| WorkerJob {
            worker,
            device_id,
            switches: switches.clone(),
            cases,
        })
        .collect()
}
