//! # 运行报告
//!
//! 每个 (用例, 后端) 一条 [`CaseReport`]，整次运行汇总为 [`RunSummary`]。

use crate::error::ProfilingError;
use crate::switches::TargetMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tbe_core::{ExecutionBackend, ProfilingCase};

/// 用例执行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Golden,
    Compile,
    Launch,
    Compare,
    Dump,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Golden => "golden",
            Stage::Compile => "compile",
            Stage::Launch => "launch",
            Stage::Compare => "compare",
            Stage::Dump => "dump",
        }
    }

    /// 构造本阶段的失败
    pub fn failure(self, reason: impl fmt::Display) -> StageFailure {
        StageFailure {
            stage: self,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 某个阶段的失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.reason)
    }
}

/// 用例结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    PrecisionMismatch { detail: String },
    Failed { stage: Stage, reason: String },
}

impl From<StageFailure> for CaseStatus {
    fn from(f: StageFailure) -> Self {
        CaseStatus::Failed {
            stage: f.stage,
            reason: f.reason,
        }
    }
}

/// 单条用例报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: String,
    pub op: String,
    /// GPU 路径以及在进入后端循环之前失败时为空
    pub backend: Option<ExecutionBackend>,
    pub device_id: u32,
    pub status: CaseStatus,
    pub compile_ms: Option<f64>,
    pub kernel_time_us: Option<f64>,
    #[serde(default)]
    pub dumped: Vec<PathBuf>,
}

impl CaseReport {
    pub fn new(case: &ProfilingCase, backend: Option<ExecutionBackend>, device_id: u32) -> Self {
        Self {
            case: case.name.clone(),
            op: case.op.clone(),
            backend,
            device_id,
            status: CaseStatus::Passed,
            compile_ms: None,
            kernel_time_us: None,
            dumped: Vec::new(),
        }
    }

    pub fn failed(
        case: &ProfilingCase,
        backend: Option<ExecutionBackend>,
        device_id: u32,
        failure: StageFailure,
    ) -> Self {
        Self {
            status: failure.into(),
            ..Self::new(case, backend, device_id)
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }

    /// 用于日志的目标描述：`case[backend]`
    pub fn target(&self) -> String {
        match self.backend {
            Some(backend) => format!("{}[{backend}]", self.case),
            None => self.case.clone(),
        }
    }
}

/// 整次运行的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: TargetMode,
    /// RFC 3339
    pub started_at: String,
    pub finished_at: String,
    pub reports: Vec<CaseReport>,
}

impl RunSummary {
    pub fn start(mode: TargetMode) -> Self {
        Self {
            mode,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: String::new(),
            reports: Vec::new(),
        }
    }

    pub fn finish(&mut self, reports: Vec<CaseReport>) {
        self.reports.extend(reports);
        self.finished_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_passed()).count()
    }

    pub fn mismatched(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, CaseStatus::PrecisionMismatch { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, CaseStatus::Failed { .. }))
            .count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.reports.len()
    }

    /// 保存为 JSON
    pub fn save(&self, path: &Path) -> Result<(), ProfilingError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProfilingError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProfilingError::json(path, e))?;
        std::fs::write(path, json).map_err(|e| ProfilingError::io(path, e))?;
        log::info!("Profiling report saved to {}", path.display());
        Ok(())
    }

    /// 输出汇总日志，未通过的逐条列出
    pub fn log_summary(&self) {
        log::info!(
            "{} profiling finished: {} result(s), {} passed, {} precision mismatch, {} failed",
            self.mode,
            self.reports.len(),
            self.passed(),
            self.mismatched(),
            self.failed()
        );
        for report in &self.reports {
            match &report.status {
                CaseStatus::Passed => {}
                CaseStatus::PrecisionMismatch { detail } => {
                    log::warn!("{} ({}): precision mismatch: {}", report.target(), report.op, detail);
                }
                CaseStatus::Failed { stage, reason } => {
                    log::error!("{} ({}): {} failed: {}", report.target(), report.op, stage, reason);
                }
            }
        }
    }
}
