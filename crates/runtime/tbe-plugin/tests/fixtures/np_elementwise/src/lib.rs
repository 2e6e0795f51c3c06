//! 逐元素算子插件，供动态库加载测试使用
//!
//! `add` 在本模块内注册两次：一次按函数名导出，一次作为 `add_v2` 的别名。

use tbe_core::Tensor;
use tbe_plugin::{GoldenRequest, PluginCallError, PluginRegistrar, golden_fn, input_fn};

fn add(req: &GoldenRequest<'_>) -> Result<Vec<Tensor>, PluginCallError> {
    let [x, y] = req.inputs else {
        return Err(format!("add expects 2 inputs, got {}", req.inputs.len()).into());
    };
    let values = x.values.iter().zip(&y.values).map(|(a, b)| a + b).collect();
    let out = Tensor::new(x.dtype, x.shape.clone(), values).map_err(|e| e.to_string())?;
    Ok(vec![out])
}

fn register(r: &mut PluginRegistrar<'_>) -> Result<(), PluginCallError> {
    r.export_golden("np_add", golden_fn(add))?;
    r.golden(&["add_v2", "add"], golden_fn(add))?;
    r.export_input(
        "np_add",
        input_fn(|case| {
            case.inputs
                .iter()
                .map(|desc| {
                    Tensor::zeros(desc.dtype, desc.shape.clone())
                        .map_err(|e| PluginCallError(e.to_string()))
                })
                .collect()
        }),
    )?;
    Ok(())
}

tbe_plugin::export_plugins!(register);
