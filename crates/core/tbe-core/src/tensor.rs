//! 张量数据
//!
//! 插件、工具链与转储共用的主机侧张量表示。数值统一以 `f64` 保存，
//! 写盘时再按 `dtype` 转换为目标元素类型。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
    Int8,
    Int32,
    Int64,
    Uint8,
    Bool,
}

impl DType {
    /// 单个元素的字节数
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Float64 | DType::Int64 => 8,
            DType::Float32 | DType::Int32 => 4,
            DType::Int8 | DType::Uint8 | DType::Bool => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint8 => "uint8",
            DType::Bool => "bool",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" => Ok(DType::Float32),
            "float64" => Ok(DType::Float64),
            "int8" => Ok(DType::Int8),
            "int32" => Ok(DType::Int32),
            "int64" => Ok(DType::Int64),
            "uint8" => Ok(DType::Uint8),
            "bool" => Ok(DType::Bool),
            other => Err(TensorError::UnknownDType(other.to_string())),
        }
    }
}

/// 张量错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    #[error("Unknown dtype: {0}")]
    UnknownDType(String),

    #[error("Shape {shape:?} needs {expected} elements, got {actual}")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Shape {0:?} has more elements than fit in usize")]
    ShapeOverflow(Vec<usize>),
}

/// 形状对应的元素个数，乘积溢出时返回 `None`
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1_usize, |acc, &dim| acc.checked_mul(dim))
}

/// 主机侧张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl Tensor {
    /// 创建张量，元素个数必须与形状一致
    pub fn new(dtype: DType, shape: Vec<usize>, values: Vec<f64>) -> Result<Self, TensorError> {
        let Some(expected) = element_count(&shape) else {
            return Err(TensorError::ShapeOverflow(shape));
        };
        if expected != values.len() {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            dtype,
            shape,
            values,
        })
    }

    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Result<Self, TensorError> {
        let Some(numel) = element_count(&shape) else {
            return Err(TensorError::ShapeOverflow(shape));
        };
        Ok(Self {
            dtype,
            shape,
            values: vec![0.0; numel],
        })
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }

    /// 按 `dtype` 编码为小端字节序列，供转储使用
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.numel() * self.dtype.size_in_bytes());
        for &v in &self.values {
            match self.dtype {
                DType::Float32 => bytes.extend_from_slice(&(v as f32).to_le_bytes()),
                DType::Float64 => bytes.extend_from_slice(&v.to_le_bytes()),
                DType::Int8 => bytes.extend_from_slice(&(v as i8).to_le_bytes()),
                DType::Int32 => bytes.extend_from_slice(&(v as i32).to_le_bytes()),
                DType::Int64 => bytes.extend_from_slice(&(v as i64).to_le_bytes()),
                DType::Uint8 => bytes.push(v as u8),
                DType::Bool => bytes.push(u8::from(v != 0.0)),
            }
        }
        bytes
    }

    /// 逐元素比较：`|a - b| <= atol + rtol * |b|`，`self` 为实际值，`expected` 为标杆
    pub fn allclose(&self, expected: &Tensor, rtol: f64, atol: f64) -> PrecisionReport {
        if self.shape != expected.shape {
            return PrecisionReport {
                passed: false,
                max_abs_error: f64::INFINITY,
                mismatched: self.numel().max(expected.numel()),
                total: expected.numel(),
                detail: Some(format!(
                    "shape mismatch: actual {:?}, expected {:?}",
                    self.shape, expected.shape
                )),
            };
        }

        let mut max_abs_error = 0.0_f64;
        let mut mismatched = 0;
        for (&a, &b) in self.values.iter().zip(&expected.values) {
            if a.is_nan() && b.is_nan() {
                continue;
            }
            let err = (a - b).abs();
            if err.is_nan() || err > atol + rtol * b.abs() {
                mismatched += 1;
            }
            if err.is_nan() {
                max_abs_error = f64::INFINITY;
            } else {
                max_abs_error = max_abs_error.max(err);
            }
        }

        PrecisionReport {
            passed: mismatched == 0,
            max_abs_error,
            mismatched,
            total: expected.numel(),
            detail: None,
        }
    }
}

/// 精度比对结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionReport {
    pub passed: bool,
    pub max_abs_error: f64,
    pub mismatched: usize,
    pub total: usize,
    pub detail: Option<String>,
}

impl fmt::Display for PrecisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(detail) = &self.detail {
            return f.write_str(detail);
        }
        write!(
            f,
            "{}/{} elements out of tolerance, max abs error {:.6e}",
            self.mismatched, self.total, self.max_abs_error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_element_count() {
        assert!(Tensor::new(DType::Float32, vec![2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(DType::Float32, vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::ElementCount {
                shape: vec![2, 3],
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let shape = vec![usize::MAX, 2];
        assert_eq!(element_count(&shape), None);
        assert_eq!(element_count(&[3, 0, usize::MAX]), Some(0));
        assert_eq!(element_count(&[]), Some(1));

        let err = Tensor::new(DType::Float32, shape.clone(), vec![0.0; 2]).unwrap_err();
        assert_eq!(err, TensorError::ShapeOverflow(shape.clone()));
        assert_eq!(
            Tensor::zeros(DType::Int8, shape.clone()).unwrap_err(),
            TensorError::ShapeOverflow(shape)
        );
    }

    #[test]
    fn test_le_bytes_follow_dtype() {
        let t = Tensor::new(DType::Int32, vec![2], vec![1.0, -1.0]).unwrap();
        assert_eq!(t.to_le_bytes(), vec![1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);

        let b = Tensor::new(DType::Bool, vec![3], vec![0.0, 2.0, 1.0]).unwrap();
        assert_eq!(b.to_le_bytes(), vec![0, 1, 1]);

        let f = Tensor::new(DType::Float32, vec![1], vec![1.5]).unwrap();
        assert_eq!(f.to_le_bytes(), 1.5_f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_allclose() {
        let golden = Tensor::new(DType::Float32, vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let close = Tensor::new(DType::Float32, vec![3], vec![1.0005, 2.0, 3.0]).unwrap();
        let far = Tensor::new(DType::Float32, vec![3], vec![1.0, 2.5, 3.9]).unwrap();

        assert!(close.allclose(&golden, 1e-3, 1e-3).passed);

        let report = far.allclose(&golden, 1e-3, 1e-3);
        assert!(!report.passed);
        assert_eq!(report.mismatched, 2);
        assert!((report.max_abs_error - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_allclose_shape_mismatch() {
        let a = Tensor::zeros(DType::Float32, vec![2, 2]).unwrap();
        let b = Tensor::zeros(DType::Float32, vec![4]).unwrap();
        let report = a.allclose(&b, 0.0, 0.0);
        assert!(!report.passed);
        assert!(report.to_string().contains("shape mismatch"));
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!("int8".parse::<DType>().unwrap(), DType::Int8);
        assert!("float16".parse::<DType>().is_err());
        assert_eq!(DType::Uint8.to_string(), "uint8");
    }
}
