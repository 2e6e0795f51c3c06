//! 插件系统错误类型

use crate::table::PluginCategory;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 注册表错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// 查找未注册的算子
    #[error("No {category} plugin registered for operator `{key}`")]
    NotFound { category: PluginCategory, key: String },

    /// 非法的算子名集合（空列表、空名字、无法净化的函数名）
    #[error("Invalid operator names for {category} plugin: {reason}")]
    InvalidNames {
        category: PluginCategory,
        reason: String,
    },

    #[error("Global plugin registry is already installed")]
    RegistryAlreadyInstalled,

    #[error("Global plugin registry has not been installed")]
    RegistryNotInstalled,
}

/// 插件函数执行失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PluginCallError(pub String);

impl From<String> for PluginCallError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for PluginCallError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

impl From<PluginError> for PluginCallError {
    fn from(err: PluginError) -> Self {
        Self(err.to_string())
    }
}

/// 提取 panic 负载中的消息
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 单个插件文件的加载失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// 插件加载的汇总错误
///
/// 一次扫描中的所有失败都收集在这里，而不是在第一个失败处中止。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load {} plugin file(s):\n{}", .failures.len(), render_failures(.failures))]
pub struct LoadError {
    pub failures: Vec<LoadFailure>,
}

impl LoadError {
    /// 是否包含指定路径的失败记录
    pub fn mentions(&self, path: &std::path::Path) -> bool {
        self.failures.iter().any(|f| f.path == path)
    }
}

fn render_failures(failures: &[LoadFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
