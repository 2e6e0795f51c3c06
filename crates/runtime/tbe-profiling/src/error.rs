//! 性能测试错误类型

use std::io;
use std::path::PathBuf;
use tbe_core::{ConfigError, ExecutionBackend};
use thiserror::Error;

/// 外部工具链调用错误
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Failed to start toolchain `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Toolchain `{program} {command}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Toolchain `{program} {command}` returned malformed output: {reason}")]
    Protocol {
        program: String,
        command: String,
        reason: String,
    },

    #[error("Toolchain rejected request: {0}")]
    Rejected(String),
}

/// 性能测试错误
#[derive(Debug, Error)]
pub enum ProfilingError {
    #[error("Profiling switches have already been published")]
    SwitchesAlreadyPublished,

    #[error("Precompiled {backend} kernel for case `{case}` not found at {}", .path.display())]
    MissingArtifact {
        case: String,
        backend: ExecutionBackend,
        path: PathBuf,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to start worker {worker} (device {device_id}): {source}")]
    WorkerSpawn {
        worker: usize,
        device_id: u32,
        #[source]
        source: io::Error,
    },

    #[error("Worker {worker} (device {device_id}) failed: {reason}")]
    WorkerFailed {
        worker: usize,
        device_id: u32,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

impl ProfilingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
