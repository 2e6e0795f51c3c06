//! 算子性能用例
//!
//! 一个用例描述一次算子调用：算子名、输入输出描述、属性，以及需要测量的执行后端。

use crate::tensor::{DType, element_count};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// 算子名（区分大小写）
pub type OperatorKey = String;

/// 执行后端
///
/// 动态 shape、静态 shape、常量折叠与预编译二进制四条编译路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionBackend {
    Dynamic,
    Static,
    Const,
    Binary,
}

impl ExecutionBackend {
    pub const ALL: [ExecutionBackend; 4] = [
        ExecutionBackend::Dynamic,
        ExecutionBackend::Static,
        ExecutionBackend::Const,
        ExecutionBackend::Binary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionBackend::Dynamic => "dynamic",
            ExecutionBackend::Static => "static",
            ExecutionBackend::Const => "const",
            ExecutionBackend::Binary => "binary",
        }
    }
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" | "dyn" => Ok(ExecutionBackend::Dynamic),
            "static" => Ok(ExecutionBackend::Static),
            "const" => Ok(ExecutionBackend::Const),
            "binary" | "bin" => Ok(ExecutionBackend::Binary),
            other => Err(format!(
                "unknown execution backend `{other}` (expected dynamic, static, const or binary)"
            )),
        }
    }
}

/// 张量描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Vec<usize>,
    /// 随机输入的取值区间 `[low, high)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<[f64; 2]>,
}

fn default_tolerance() -> f64 {
    1e-3
}

/// 性能用例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingCase {
    /// 用例名，同一批用例内唯一
    pub name: String,
    /// 算子名，用于查找插件
    pub op: OperatorKey,
    pub inputs: Vec<TensorDesc>,
    #[serde(default)]
    pub outputs: Vec<TensorDesc>,
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
    /// 为空表示全部四个后端
    #[serde(default)]
    pub backends: Vec<ExecutionBackend>,
    #[serde(default = "default_tolerance")]
    pub rtol: f64,
    #[serde(default = "default_tolerance")]
    pub atol: f64,
}

impl ProfilingCase {
    /// 需要执行的后端
    pub fn selected_backends(&self) -> Vec<ExecutionBackend> {
        if self.backends.is_empty() {
            ExecutionBackend::ALL.to_vec()
        } else {
            self.backends.clone()
        }
    }
}

/// 用例加载错误
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Failed to read case file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse case file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate case name `{name}` in {path}")]
    DuplicateName { path: PathBuf, name: String },

    #[error("Case `{case}` is invalid: {reason}")]
    Invalid { case: String, reason: String },
}

/// 从 JSON 文件加载用例列表
pub fn load_cases(path: &Path) -> Result<Vec<ProfilingCase>, CaseError> {
    let content = std::fs::read_to_string(path).map_err(|source| CaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cases: Vec<ProfilingCase> =
        serde_json::from_str(&content).map_err(|source| CaseError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    for case in &cases {
        if !seen.insert(case.name.as_str()) {
            return Err(CaseError::DuplicateName {
                path: path.to_path_buf(),
                name: case.name.clone(),
            });
        }
        if case.op.is_empty() {
            return Err(CaseError::Invalid {
                case: case.name.clone(),
                reason: "operator name is empty".to_string(),
            });
        }
        for desc in case.inputs.iter().chain(&case.outputs) {
            if element_count(&desc.shape).is_none() {
                return Err(CaseError::Invalid {
                    case: case.name.clone(),
                    reason: format!("element count of shape {:?} overflows", desc.shape),
                });
            }
        }
    }

    log::debug!("Loaded {} profiling cases from {}", cases.len(), path.display());
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASES: &str = r#"[
        {
            "name": "add_fp32_0",
            "op": "add",
            "inputs": [
                {"dtype": "float32", "shape": [2, 3]},
                {"dtype": "float32", "shape": [2, 3], "value_range": [0.0, 1.0]}
            ],
            "backends": ["static", "binary"]
        },
        {
            "name": "reduce_sum_0",
            "op": "reduce_sum",
            "inputs": [{"dtype": "float32", "shape": [16]}],
            "attrs": {"axis": [0], "keepdims": false},
            "rtol": 0.0001
        }
    ]"#;

    #[test]
    fn test_load_cases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(&path, CASES).unwrap();

        let cases = load_cases(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(
            cases[0].selected_backends(),
            vec![ExecutionBackend::Static, ExecutionBackend::Binary]
        );
        assert_eq!(cases[0].inputs[1].value_range, Some([0.0, 1.0]));
        assert_eq!(cases[1].selected_backends(), ExecutionBackend::ALL.to_vec());
        assert_eq!(cases[1].rtol, 1e-4);
        assert_eq!(cases[1].atol, 1e-3);
    }

    #[test]
    fn test_duplicate_case_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.json");
        let body = r#"[
            {"name": "c", "op": "add", "inputs": []},
            {"name": "c", "op": "sub", "inputs": []}
        ]"#;
        std::fs::write(&path, body).unwrap();

        let err = load_cases(&path).unwrap_err();
        assert!(matches!(err, CaseError::DuplicateName { ref name, .. } if name == "c"));
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        let body = format!(
            r#"[{{"name": "huge", "op": "add", "inputs": [{{"dtype": "float32", "shape": [{}, 2]}}]}}]"#,
            usize::MAX
        );
        std::fs::write(&path, body).unwrap();

        let err = load_cases(&path).unwrap_err();
        assert!(
            matches!(err, CaseError::Invalid { ref case, ref reason } if case == "huge" && reason.contains("overflows"))
        );
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("dyn".parse::<ExecutionBackend>().unwrap(), ExecutionBackend::Dynamic);
        assert_eq!("BINARY".parse::<ExecutionBackend>().unwrap(), ExecutionBackend::Binary);
        assert!("jit".parse::<ExecutionBackend>().is_err());
    }
}
