//! # NPU 性能测试
//!
//! 每个用例：生成输入 → 查找标杆插件并计算参考输出 → 对每个选中的后端
//! 编译（或复用预编译产物）→ 执行 → 精度比对 → 转储。
//!
//! 任何失败只影响当前用例（或当前后端），记录在报告中，后续用例照常执行。

use crate::dump::Dumper;
use crate::inputs::resolve_inputs;
use crate::report::{CaseReport, CaseStatus, Stage, StageFailure};
use crate::switches::ProfilingSwitches;
use crate::toolchain::{CompileRequest, KernelArtifact, LaunchRequest, OperatorToolchain};
use std::time::Instant;
use tbe_core::{ExecutionBackend, ProfilingCase, Tensor};
use tbe_plugin::{GoldenRequest, PluginRegistry, call_plugin};

/// NPU 性能测试
pub struct NpuProfilingRun<'a> {
    switches: &'a ProfilingSwitches,
    registry: &'a PluginRegistry,
    toolchain: &'a dyn OperatorToolchain,
    device_id: u32,
    dumper: Dumper,
}

impl<'a> NpuProfilingRun<'a> {
    pub fn new(
        switches: &'a ProfilingSwitches,
        registry: &'a PluginRegistry,
        toolchain: &'a dyn OperatorToolchain,
        device_id: u32,
    ) -> Self {
        Self {
            switches,
            registry,
            toolchain,
            device_id,
            dumper: Dumper::new(&switches.dump_dir, switches.dump),
        }
    }

    pub fn run(&self, cases: &[ProfilingCase]) -> Vec<CaseReport> {
        log::info!("NPU profiling on device {}: {} case(s)", self.device_id, cases.len());
        cases.iter().flat_map(|case| self.run_case(case)).collect()
    }

    /// 单个用例，每个后端一条报告
    pub fn run_case(&self, case: &ProfilingCase) -> Vec<CaseReport> {
        let prepared = resolve_inputs(self.registry, case)
            .map_err(|e| Stage::Input.failure(e))
            .and_then(|inputs| {
                let golden = compute_golden(self.registry, case, &inputs)?;
                Ok((inputs, golden))
            });

        let (inputs, golden) = match prepared {
            Ok(prepared) => prepared,
            Err(failure) => {
                log::error!("Case `{}` ({}): {}", case.name, case.op, failure);
                return vec![CaseReport::failed(case, None, self.device_id, failure)];
            }
        };

        case.selected_backends()
            .into_iter()
            .map(|backend| self.run_backend(case, backend, &inputs, &golden))
            .collect()
    }

    fn run_backend(
        &self,
        case: &ProfilingCase,
        backend: ExecutionBackend,
        inputs: &[Tensor],
        golden: &[Tensor],
    ) -> CaseReport {
        let mut report = CaseReport::new(case, Some(backend), self.device_id);
        if let Err(failure) = self.try_backend(case, backend, inputs, golden, &mut report) {
            log::error!("{} ({}): {}", report.target(), case.op, failure);
            report.status = failure.into();
        } else if let CaseStatus::PrecisionMismatch { detail } = &report.status {
            log::warn!("{} ({}): precision mismatch: {}", report.target(), case.op, detail);
        } else {
            log::info!(
                "{} ({}): passed, kernel time {}",
                report.target(),
                case.op,
                report
                    .kernel_time_us
                    .map_or_else(|| "n/a".to_string(), |t| format!("{t:.3}us"))
            );
        }
        report
    }

    fn try_backend(
        &self,
        case: &ProfilingCase,
        backend: ExecutionBackend,
        inputs: &[Tensor],
        golden: &[Tensor],
        report: &mut CaseReport,
    ) -> Result<(), StageFailure> {
        let artifact = if self.switches.realtime_compile.get(backend) {
            let started = Instant::now();
            let artifact = self
                .toolchain
                .compile(&CompileRequest {
                    case,
                    backend,
                    soc_spec: &self.switches.soc_spec,
                    kernel_meta_dir: &self.switches.kernel_meta_dir,
                })
                .map_err(|e| Stage::Compile.failure(e))?;
            report.compile_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
            artifact
        } else {
            KernelArtifact::precompiled(&self.switches.kernel_meta_dir, backend, &case.name)
                .map_err(|e| Stage::Compile.failure(e))?
        };

        let profiling = self.switches.online_profiling.get(backend);
        let outcome = self
            .toolchain
            .launch(&LaunchRequest {
                case,
                artifact: &artifact,
                inputs,
                device_id: self.device_id,
                profiling,
            })
            .map_err(|e| Stage::Launch.failure(e))?;
        if profiling {
            report.kernel_time_us = outcome.kernel_time_us;
        }

        if let Some(detail) = compare_outputs(&outcome.outputs, golden, case) {
            report.status = CaseStatus::PrecisionMismatch { detail };
        }

        report.dumped = self
            .dumper
            .dump(&case.name, backend.as_str(), inputs, &outcome.outputs, golden)
            .map_err(|e| Stage::Dump.failure(e))?;
        Ok(())
    }
}

/// 查找标杆插件并计算参考输出，未注册是该用例的硬错误
pub(crate) fn compute_golden(
    registry: &PluginRegistry,
    case: &ProfilingCase,
    inputs: &[Tensor],
) -> Result<Vec<Tensor>, StageFailure> {
    let golden = registry
        .golden()
        .get(&case.op)
        .map_err(|e| Stage::Golden.failure(e))?;
    call_plugin(|| golden(&GoldenRequest { case, inputs }))
        .map_err(|e| Stage::Golden.failure(format!("golden plugin `{}` failed: {e}", case.op)))
}

/// 逐个输出比对，返回第一个不一致的描述
pub(crate) fn compare_outputs(
    actual: &[Tensor],
    golden: &[Tensor],
    case: &ProfilingCase,
) -> Option<String> {
    if actual.len() != golden.len() {
        return Some(format!(
            "kernel produced {} output(s), golden has {}",
            actual.len(),
            golden.len()
        ));
    }
    actual
        .iter()
        .zip(golden)
        .enumerate()
        .find_map(|(i, (a, g))| {
            let precision = a.allclose(g, case.rtol, case.atol);
            (!precision.passed).then(|| format!("output {i}: {precision}"))
        })
}
