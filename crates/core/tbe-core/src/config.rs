//! 统一配置管理
//!
//! 为工具链各组件提供一致的配置 Trait：默认值、校验、TOML/JSON 加载。

use serde::Serialize;
use std::path::Path;

/// 统一配置 Trait
///
/// # 示例
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tbe_core::config::{Config, ConfigError};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(default)]
/// struct RunConfig {
///     retries: u32,
/// }
///
/// impl Default for RunConfig {
///     fn default() -> Self {
///         Self::defaults()
///     }
/// }
///
/// impl Config for RunConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.retries > 10 {
///             return Err(ConfigError::Invalid("retries must be <= 10".to_string()));
///         }
///         Ok(())
///     }
///
///     fn defaults() -> Self {
///         Self { retries: 3 }
///     }
/// }
///
/// let config = RunConfig::from_toml("retries = 5").unwrap();
/// assert_eq!(config.retries, 5);
/// assert!(RunConfig::from_toml("retries = 11").unwrap().validate().is_err());
/// ```
pub trait Config: Serialize + serde::de::DeserializeOwned {
    /// 验证配置的有效性
    ///
    /// # 错误
    ///
    /// 如果配置无效，返回 `ConfigError::Invalid`
    fn validate(&self) -> Result<(), ConfigError>;

    /// 获取默认配置
    fn defaults() -> Self;

    /// 从 TOML 字符串加载配置
    fn from_toml(toml: &str) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(format!("TOML parse error: {e}")))
    }

    /// 从 JSON 字符串加载配置
    fn from_json(json: &str) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(format!("JSON parse error: {e}")))
    }

    /// 将配置序列化为 TOML
    fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("TOML serialize error: {e}")))
    }

    /// 将配置序列化为 JSON
    fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("JSON serialize error: {e}")))
    }

    /// 从文件加载配置，按扩展名选择格式（`.toml` / `.json`）
    fn load_file(path: &Path) -> Result<Self, ConfigError>
    where
        Self: Sized,
    {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {e}", path.display())))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            other => {
                return Err(ConfigError::UnsupportedFormat(format!(
                    "{} (extension {:?}, expected .toml or .json)",
                    path.display(),
                    other.unwrap_or("")
                )));
            }
        };

        config.map_err(|e| match e {
            ConfigError::Parse(msg) => ConfigError::Parse(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

/// 配置错误类型
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// 无效的配置
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// 解析错误
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// 序列化错误
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(String),

    /// 不支持的文件格式
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        enabled: bool,
        threshold: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self::defaults()
        }
    }

    impl Config for Sample {
        fn validate(&self) -> Result<(), ConfigError> {
            if self.threshold == 0 {
                return Err(ConfigError::Invalid("threshold must be positive".to_string()));
            }
            Ok(())
        }

        fn defaults() -> Self {
            Self {
                enabled: true,
                threshold: 100,
            }
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Sample::from_toml("threshold = 7").unwrap();
        assert!(config.enabled);
        assert_eq!(config.threshold, 7);
    }

    #[test]
    fn test_json_round_trip() {
        let json = Sample::defaults().to_json().unwrap();
        assert_eq!(Sample::from_json(&json).unwrap(), Sample::defaults());
    }

    #[test]
    fn test_load_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("sample.toml");
        std::fs::write(&toml_path, "enabled = false\n").unwrap();
        let config = Sample::load_file(&toml_path).unwrap();
        assert!(!config.enabled);

        let yaml_path = dir.path().join("sample.yaml");
        std::fs::write(&yaml_path, "enabled: false\n").unwrap();
        let err = Sample::load_file(&yaml_path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "threshold = [").unwrap();
        let err = Sample::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_validate() {
        assert!(Sample::defaults().validate().is_ok());
        let bad = Sample {
            threshold: 0,
            ..Sample::defaults()
        };
        assert!(bad.validate().is_err());
    }
}
