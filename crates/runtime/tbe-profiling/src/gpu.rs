//! GPU 性能测试
//!
//! 每个用例直接交给工具链的 GPU 路径执行并记录耗时。
//! 注册了标杆插件时额外做精度比对，否则只测性能。

use crate::dump::Dumper;
use crate::inputs::resolve_inputs;
use crate::npu::{compare_outputs, compute_golden};
use crate::report::{CaseReport, CaseStatus, Stage, StageFailure};
use crate::switches::{ProfilingSwitches, TargetMode};
use crate::toolchain::{GpuLaunchRequest, OperatorToolchain};
use tbe_core::ProfilingCase;
use tbe_plugin::PluginRegistry;

/// GPU 性能测试
pub struct GpuProfilingRun<'a> {
    registry: &'a PluginRegistry,
    toolchain: &'a dyn OperatorToolchain,
    device_id: u32,
    dumper: Dumper,
}

impl<'a> GpuProfilingRun<'a> {
    pub fn new(
        switches: &'a ProfilingSwitches,
        registry: &'a PluginRegistry,
        toolchain: &'a dyn OperatorToolchain,
    ) -> Self {
        Self {
            registry,
            toolchain,
            device_id: switches.device_ids.first().copied().unwrap_or(0),
            dumper: Dumper::new(&switches.dump_dir, switches.dump),
        }
    }

    pub fn run(&self, cases: &[ProfilingCase]) -> Vec<CaseReport> {
        log::info!("GPU profiling on device {}: {} case(s)", self.device_id, cases.len());
        cases.iter().map(|case| self.run_case(case)).collect()
    }

    pub fn run_case(&self, case: &ProfilingCase) -> CaseReport {
        let mut report = CaseReport::new(case, None, self.device_id);
        match self.try_case(case, &mut report) {
            Err(failure) => {
                log::error!("{} ({}) on gpu: {}", case.name, case.op, failure);
                report.status = failure.into();
            }
            Ok(()) => log::info!(
                "{} ({}) on gpu: {:?}, kernel time {:?}us",
                case.name,
                case.op,
                report.status,
                report.kernel_time_us
            ),
        }
        report
    }

    fn try_case(&self, case: &ProfilingCase, report: &mut CaseReport) -> Result<(), StageFailure> {
        let inputs = resolve_inputs(self.registry, case).map_err(|e| Stage::Input.failure(e))?;
        let outcome = self
            .toolchain
            .launch_gpu(&GpuLaunchRequest {
                case,
                inputs: &inputs,
                device_id: self.device_id,
            })
            .map_err(|e| Stage::Launch.failure(e))?;
        report.kernel_time_us = outcome.kernel_time_us;

        let golden = if self.registry.golden().contains(&case.op) {
            let golden = compute_golden(self.registry, case, &inputs)?;
            if let Some(detail) = compare_outputs(&outcome.outputs, &golden, case) {
                report.status = CaseStatus::PrecisionMismatch { detail };
            }
            golden
        } else {
            log::debug!("No golden plugin for `{}`, skipping precision check", case.op);
            Vec::new()
        };

        report.dumped = self
            .dumper
            .dump(&case.name, TargetMode::Gpu.as_str(), &inputs, &outcome.outputs, &golden)
            .map_err(|e| Stage::Dump.failure(e))?;
        Ok(())
    }
}
