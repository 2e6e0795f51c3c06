//! 用例输入数据
//!
//! 算子注册了输入插件时由插件生成，否则按张量描述生成均匀分布随机数。
//! 随机种子由用例名导出，同一用例在不同进程、不同运行中得到相同输入。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tbe_core::{DType, ProfilingCase, Tensor, TensorDesc, element_count};
use tbe_plugin::{PluginRegistry, call_plugin};

/// 生成用例输入
pub fn resolve_inputs(registry: &PluginRegistry, case: &ProfilingCase) -> Result<Vec<Tensor>, String> {
    if registry.input().contains(&case.op) {
        let generate = registry.input().get(&case.op).map_err(|e| e.to_string())?;
        log::debug!("Generating inputs for case `{}` with input plugin `{}`", case.name, case.op);
        return call_plugin(|| generate(case))
            .map_err(|e| format!("input plugin `{}` failed: {e}", case.op));
    }
    random_inputs(case)
}

/// 按描述生成随机输入
pub fn random_inputs(case: &ProfilingCase) -> Result<Vec<Tensor>, String> {
    let mut rng = StdRng::seed_from_u64(seed_for(&case.name));
    case.inputs
        .iter()
        .enumerate()
        .map(|(i, desc)| {
            random_tensor(&mut rng, desc).map_err(|e| format!("input {i} of case `{}`: {e}", case.name))
        })
        .collect()
}

fn random_tensor(rng: &mut StdRng, desc: &TensorDesc) -> Result<Tensor, String> {
    let [low, high] = desc.value_range.unwrap_or_else(|| default_range(desc.dtype));
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(format!("invalid value range [{low}, {high})"));
    }

    let numel = element_count(&desc.shape)
        .ok_or_else(|| format!("element count of shape {:?} overflows", desc.shape))?;
    let values: Vec<f64> = match desc.dtype {
        DType::Float32 | DType::Float64 => (0..numel).map(|_| rng.gen_range(low..high)).collect(),
        DType::Bool => (0..numel)
            .map(|_| f64::from(u8::from(rng.gen_bool(0.5))))
            .collect(),
        _ => {
            // [low, high) 内的整数即 [ceil(low), ceil(high))
            let (lo, hi) = (low.ceil() as i64, high.ceil() as i64);
            if lo >= hi {
                return Err(format!("value range [{low}, {high}) contains no integer"));
            }
            (0..numel).map(|_| rng.gen_range(lo..hi) as f64).collect()
        }
    };
    Tensor::new(desc.dtype, desc.shape.clone(), values).map_err(|e| e.to_string())
}

fn default_range(dtype: DType) -> [f64; 2] {
    match dtype {
        DType::Float32 | DType::Float64 => [-1.0, 1.0],
        DType::Uint8 => [0.0, 10.0],
        DType::Bool => [0.0, 2.0],
        DType::Int8 | DType::Int32 | DType::Int64 => [-10.0, 10.0],
    }
}

/// FNV-1a，跨平台、跨版本稳定
fn seed_for(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbe_plugin::input_fn;

    fn case(name: &str) -> ProfilingCase {
        ProfilingCase {
            name: name.to_string(),
            op: "add".to_string(),
            inputs: vec![
                TensorDesc {
                    dtype: DType::Float32,
                    shape: vec![4, 8],
                    value_range: Some([2.0, 3.0]),
                },
                TensorDesc {
                    dtype: DType::Int32,
                    shape: vec![16],
                    value_range: None,
                },
            ],
            outputs: vec![],
            attrs: Default::default(),
            backends: vec![],
            rtol: 1e-3,
            atol: 1e-3,
        }
    }

    #[test]
    fn test_random_inputs_deterministic_per_case() {
        let a = random_inputs(&case("add_0")).unwrap();
        let b = random_inputs(&case("add_0")).unwrap();
        let c = random_inputs(&case("add_1")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_inputs_follow_descriptions() {
        let inputs = random_inputs(&case("add_0")).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].shape, vec![4, 8]);
        assert!(inputs[0].values.iter().all(|v| (2.0..3.0).contains(v)));
        assert_eq!(inputs[1].dtype, DType::Int32);
        assert!(inputs[1].values.iter().all(|v| v.fract() == 0.0 && (-10.0..10.0).contains(v)));
    }

    #[test]
    fn test_empty_range_rejected() {
        let mut c = case("add_0");
        c.inputs[0].value_range = Some([1.0, 1.0]);
        let err = random_inputs(&c).unwrap_err();
        assert!(err.contains("input 0") && err.contains("add_0"));
    }

    #[test]
    fn test_input_plugin_takes_precedence() {
        let mut registry = PluginRegistry::new();
        registry
            .input_mut()
            .register(
                "add",
                input_fn(|_| {
                    Ok(vec![Tensor::zeros(DType::Float32, vec![2]).map_err(|e| e.to_string())?])
                }),
            )
            .unwrap();
        let inputs = resolve_inputs(&registry, &case("add_0")).unwrap();
        assert_eq!(inputs, vec![Tensor::zeros(DType::Float32, vec![2]).unwrap()]);

        let fallback = resolve_inputs(&PluginRegistry::new(), &case("add_0")).unwrap();
        assert_eq!(fallback.len(), 2);
    }

    #[test]
    fn test_integer_range_keeps_to_declared_bounds() {
        let mut c = case("add_0");
        c.inputs[1].value_range = Some([0.5, 3.2]);
        let inputs = random_inputs(&c).unwrap();
        assert!(inputs[1].values.iter().all(|v| [1.0, 2.0, 3.0].contains(v)));

        c.inputs[1].value_range = Some([-2.5, -1.0]);
        let inputs = random_inputs(&c).unwrap();
        assert!(inputs[1].values.iter().all(|&v| v == -2.0));

        c.inputs[1].value_range = Some([0.5, 0.9]);
        let err = random_inputs(&c).unwrap_err();
        assert!(err.contains("contains no integer"));
    }

    #[test]
    fn test_overflowing_shape_is_an_error() {
        let mut c = case("add_0");
        c.inputs[1].shape = vec![usize::MAX, 2];
        let err = random_inputs(&c).unwrap_err();
        assert!(err.contains("input 1") && err.contains("overflows"));
    }

    #[test]
    fn test_panicking_input_plugin_is_an_error() {
        let mut registry = PluginRegistry::new();
        registry
            .input_mut()
            .register(
                "add",
                input_fn(|case| {
                    let dtype = case.inputs[7].dtype;
                    Ok(vec![Tensor::zeros(dtype, vec![1]).map_err(|e| e.to_string())?])
                }),
            )
            .unwrap();
        let err = resolve_inputs(&registry, &case("add_0")).unwrap_err();
        assert!(err.contains("input plugin `add` failed: panicked"));
    }

    #[test]
    fn test_seed_is_stable() {
        assert_eq!(seed_for(""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(seed_for("add_0"), seed_for("add_1"));
    }
}
