//! # tbe-core
//!
//! TBE 工具链公共数据模型。
//!
//! ## 主要内容
//!
//! - **张量**: 插件与工具链之间传递的主机侧张量及精度比对
//! - **用例**: 算子性能用例与四种执行后端
//! - **配置**: 统一的配置 Trait（默认值、校验、TOML/JSON 加载）

pub mod case;
pub mod config;
pub mod tensor;

pub use case::{CaseError, ExecutionBackend, OperatorKey, ProfilingCase, TensorDesc, load_cases};
pub use config::{Config, ConfigError};
pub use tensor::{DType, PrecisionReport, Tensor, TensorError, element_count};
