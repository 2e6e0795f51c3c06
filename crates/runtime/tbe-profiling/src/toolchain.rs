//! # 算子工具链协作方
//!
//! DSL 编译器与运行时不在本仓库中实现，只通过 [`OperatorToolchain`] 调用：
//! - `compile`：把用例编译为某个后端的内核
//! - `launch`：在 NPU（或仿真器）上执行内核
//! - `launch_gpu`：GPU 路径的执行
//!
//! [`ExternalToolchain`] 以子进程方式调用外部程序，stdin 传入 JSON 请求，stdout 读回 JSON 响应。

use crate::error::{ProfilingError, ToolchainError};
use crate::switches::SocSpecOverrides;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tbe_core::{ExecutionBackend, ProfilingCase, Tensor};

/// 编译请求
#[derive(Debug, Clone, Serialize)]
pub struct CompileRequest<'a> {
    pub case: &'a ProfilingCase,
    pub backend: ExecutionBackend,
    pub soc_spec: &'a SocSpecOverrides,
    /// 内核产物输出目录
    pub kernel_meta_dir: &'a Path,
}

/// 编译产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelArtifact {
    pub backend: ExecutionBackend,
    /// 内核目标文件（`.o`）
    pub object: PathBuf,
    /// 内核描述文件（`.json`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PathBuf>,
}

impl KernelArtifact {
    /// `<kernel_meta>/<backend>/<case>.o`
    pub fn precompiled_path(kernel_meta_dir: &Path, backend: ExecutionBackend, case: &str) -> PathBuf {
        kernel_meta_dir.join(backend.as_str()).join(format!("{case}.o"))
    }

    /// 复用已有的预编译产物
    pub fn precompiled(
        kernel_meta_dir: &Path,
        backend: ExecutionBackend,
        case: &str,
    ) -> Result<Self, ProfilingError> {
        let object = Self::precompiled_path(kernel_meta_dir, backend, case);
        if !object.is_file() {
            return Err(ProfilingError::MissingArtifact {
                case: case.to_string(),
                backend,
                path: object,
            });
        }
        let meta = object.with_extension("json");
        Ok(Self {
            backend,
            meta: meta.is_file().then_some(meta),
            object,
        })
    }
}

/// NPU 执行请求
#[derive(Debug, Clone, Serialize)]
pub struct LaunchRequest<'a> {
    pub case: &'a ProfilingCase,
    pub artifact: &'a KernelArtifact,
    pub inputs: &'a [Tensor],
    pub device_id: u32,
    /// 是否采集在线 profiling 数据
    pub profiling: bool,
}

/// GPU 执行请求
#[derive(Debug, Clone, Serialize)]
pub struct GpuLaunchRequest<'a> {
    pub case: &'a ProfilingCase,
    pub inputs: &'a [Tensor],
    pub device_id: u32,
}

/// 执行结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LaunchOutcome {
    pub outputs: Vec<Tensor>,
    /// 内核耗时（微秒），未开启 profiling 时为空
    #[serde(default)]
    pub kernel_time_us: Option<f64>,
}

/// 算子工具链
pub trait OperatorToolchain: Send + Sync {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<KernelArtifact, ToolchainError>;

    fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome, ToolchainError>;

    fn launch_gpu(&self, request: &GpuLaunchRequest<'_>) -> Result<LaunchOutcome, ToolchainError>;
}

/// 外部程序工具链
///
/// 调用形式：`<program> <args..> compile|launch|launch-gpu`。
#[derive(Debug, Clone)]
pub struct ExternalToolchain {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalToolchain {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn invoke<Req, Resp>(&self, command: &str, request: &Req) -> Result<Resp, ToolchainError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let program = self.program.display().to_string();
        let protocol = |reason: String| ToolchainError::Protocol {
            program: program.clone(),
            command: command.to_string(),
            reason,
        };

        let payload = serde_json::to_vec(request)
            .map_err(|e| protocol(format!("failed to encode request: {e}")))?;

        log::debug!("Invoking toolchain: {} {:?} {}", program, self.args, command);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolchainError::Spawn {
                program: program.clone(),
                source,
            })?;

        // 单独线程写入，避免子进程输出填满管道时相互等待
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&payload))
        });

        let output = child.wait_with_output().map_err(|source| ToolchainError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e))
                    if output.status.success() && e.kind() != std::io::ErrorKind::BrokenPipe =>
                {
                    return Err(protocol(format!("failed to write request: {e}")));
                }
                Ok(Err(_)) => {}
                Err(_) => return Err(protocol("request writer panicked".to_string())),
            }
        }

        if !output.status.success() {
            return Err(ToolchainError::Failed {
                program: program.clone(),
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| protocol(format!("invalid JSON response: {e}")))
    }
}

impl OperatorToolchain for ExternalToolchain {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<KernelArtifact, ToolchainError> {
        self.invoke("compile", request)
    }

    fn launch(&self, request: &LaunchRequest<'_>) -> Result<LaunchOutcome, ToolchainError> {
        self.invoke("launch", request)
    }

    fn launch_gpu(&self, request: &GpuLaunchRequest<'_>) -> Result<LaunchOutcome, ToolchainError> {
        self.invoke("launch-gpu", request)
    }
}
