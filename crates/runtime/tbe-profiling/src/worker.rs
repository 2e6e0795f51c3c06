//! # 工作进程
//!
//! 多设备运行时，用例按设备分组交给独立的工作进程执行。
//! 主进程与工作进程之间不共享内存中的插件注册表：
//! 作业（[`WorkerJob`]）与结果（[`WorkerResult`]）以 JSON 文件交换，
//! 工作进程根据作业中的开关自行重新加载插件。
//!
//! [`WorkerPool`] 跟踪所有子进程句柄；出错或被释放时显式终止仍在运行的子进程。

use crate::error::ProfilingError;
use crate::npu::NpuProfilingRun;
use crate::report::CaseReport;
use crate::switches::ProfilingSwitches;
use crate::toolchain::OperatorToolchain;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tbe_core::ProfilingCase;
use tbe_plugin::PluginRegistry;
use tempfile::TempDir;

/// 工作进程作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub worker: usize,
    pub device_id: u32,
    pub switches: ProfilingSwitches,
    pub cases: Vec<ProfilingCase>,
}

/// 工作进程结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker: usize,
    pub device_id: u32,
    pub reports: Vec<CaseReport>,
}

impl WorkerJob {
    pub fn read(path: &Path) -> Result<Self, ProfilingError> {
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<(), ProfilingError> {
        write_json(path, self)
    }

    /// 在当前进程中执行作业
    pub fn execute(
        &self,
        registry: &PluginRegistry,
        toolchain: &dyn OperatorToolchain,
    ) -> WorkerResult {
        let run = NpuProfilingRun::new(&self.switches, registry, toolchain, self.device_id);
        WorkerResult {
            worker: self.worker,
            device_id: self.device_id,
            reports: run.run(&self.cases),
        }
    }
}

impl WorkerResult {
    pub fn read(path: &Path) -> Result<Self, ProfilingError> {
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<(), ProfilingError> {
        write_json(path, self)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProfilingError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProfilingError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| ProfilingError::json(path, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProfilingError> {
    let json = serde_json::to_string(value).map_err(|e| ProfilingError::json(path, e))?;
    std::fs::write(path, json).map_err(|e| ProfilingError::io(path, e))
}

/// 工作进程启动方式
pub trait WorkerLauncher: Send + Sync {
    /// 构造执行 `job` 并把结果写到 `result` 的命令
    fn command(&self, job: &Path, result: &Path) -> Command;
}

/// 以 `<program> <args..> --job <JOB> --result <RESULT>` 启动工作进程
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn command(&self, job: &Path, result: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--job")
            .arg(job)
            .arg("--result")
            .arg(result);
        cmd
    }
}

struct WorkerHandle {
    worker: usize,
    device_id: u32,
    child: Option<Child>,
    result_path: PathBuf,
}

/// 工作进程池
pub struct WorkerPool {
    run_dir: TempDir,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// 创建进程池，作业与结果文件放在临时运行目录中
    pub fn new() -> Result<Self, ProfilingError> {
        let run_dir = tempfile::Builder::new()
            .prefix("tbe-workers-")
            .tempdir()
            .map_err(|e| ProfilingError::io(std::env::temp_dir(), e))?;
        Ok(Self {
            run_dir,
            workers: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        self.run_dir.path()
    }

    /// 已启动的工作进程数
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 尚未回收的工作进程数
    pub fn live_count(&self) -> usize {
        self.workers.iter().filter(|w| w.child.is_some()).count()
    }

    /// 写出作业文件并启动工作进程
    pub fn spawn(
        &mut self,
        launcher: &dyn WorkerLauncher,
        job: &WorkerJob,
    ) -> Result<(), ProfilingError> {
        let job_path = self.run_dir.path().join(format!("job-{}.json", job.worker));
        let result_path = self.run_dir.path().join(format!("result-{}.json", job.worker));
        job.write(&job_path)?;

        let child = launcher
            .command(&job_path, &result_path)
            .spawn()
            .map_err(|source| ProfilingError::WorkerSpawn {
                worker: job.worker,
                device_id: job.device_id,
                source,
            })?;
        log::info!(
            "Started worker {} (pid {}) on device {} with {} case(s)",
            job.worker,
            child.id(),
            job.device_id,
            job.cases.len()
        );

        self.workers.push(WorkerHandle {
            worker: job.worker,
            device_id: job.device_id,
            child: Some(child),
            result_path,
        });
        Ok(())
    }

    /// 等待全部工作进程并收集报告
    ///
    /// 任何一个进程失败时，仍会先等待其余进程结束，再返回第一个失败。
    pub fn wait_all(&mut self) -> Result<Vec<CaseReport>, ProfilingError> {
        let mut reports = Vec::new();
        let mut first_error = None;

        for handle in &mut self.workers {
            let Some(mut child) = handle.child.take() else {
                continue;
            };
            let handle: &WorkerHandle = handle;
            let outcome = match child.wait() {
                Ok(status) if status.success() => WorkerResult::read(&handle.result_path)
                    .map(|result| result.reports)
                    .map_err(|e| failed(handle, format!("unreadable result: {e}"))),
                Ok(status) => Err(failed(handle, format!("exited with {status}"))),
                Err(e) => Err(failed(handle, format!("wait failed: {e}"))),
            };

            match outcome {
                Ok(worker_reports) => {
                    log::info!(
                        "Worker {} (device {}) finished with {} report(s)",
                        handle.worker,
                        handle.device_id,
                        worker_reports.len()
                    );
                    reports.extend(worker_reports);
                }
                Err(e) => {
                    log::error!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    /// 终止并回收所有仍在运行的工作进程，返回被终止的数量
    pub fn terminate_all(&mut self) -> usize {
        let mut terminated = 0;
        for handle in &mut self.workers {
            let Some(mut child) = handle.child.take() else {
                continue;
            };
            if let Ok(Some(_)) = child.try_wait() {
                continue;
            }
            log::warn!(
                "Terminating worker {} (pid {}) on device {}",
                handle.worker,
                child.id(),
                handle.device_id
            );
            if let Err(e) = child.kill() {
                log::error!("Failed to kill worker {}: {}", handle.worker, e);
            }
            if let Err(e) = child.wait() {
                log::error!("Failed to reap worker {}: {}", handle.worker, e);
            }
            terminated += 1;
        }
        terminated
    }
}

fn failed(handle: &WorkerHandle, reason: String) -> ProfilingError {
    ProfilingError::WorkerFailed {
        worker: handle.worker,
        device_id: handle.device_id,
        reason,
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let terminated = self.terminate_all();
        if terminated > 0 {
            log::warn!("Worker pool dropped with {terminated} live worker(s), terminated");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("run_dir", &self.run_dir.path())
            .field("workers", &self.workers.len())
            .field("live", &self.live_count())
            .finish()
    }
}
