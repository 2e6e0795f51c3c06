//! # 插件注册表
//!
//! 固定的两张插件表（golden / input）组成的统一访问入口。
//!
//! 注册表通过 `PluginRegistry::new` 显式构造，测试可以各自持有独立实例；
//! 进程级实例在插件加载完成后通过 [`PluginRegistry::install_global`] 安装一次，
//! 此后只读。

use crate::error::{PluginCallError, PluginError, panic_message};
use crate::table::{PluginCategory, PluginTable, PluginTableView};
use libloading::Library;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tbe_core::{ProfilingCase, Tensor};

/// 标杆函数的调用参数
#[derive(Debug, Clone, Copy)]
pub struct GoldenRequest<'a> {
    pub case: &'a ProfilingCase,
    pub inputs: &'a [Tensor],
}

/// 标杆函数：根据输入计算参考输出
pub type GoldenFn =
    dyn Fn(&GoldenRequest<'_>) -> Result<Vec<Tensor>, PluginCallError> + Send + Sync;

/// 输入生成函数：为用例生成输入数据
pub type InputFn = dyn Fn(&ProfilingCase) -> Result<Vec<Tensor>, PluginCallError> + Send + Sync;

/// 将闭包包装为标杆函数
pub fn golden_fn<F>(f: F) -> Arc<GoldenFn>
where
    F: Fn(&GoldenRequest<'_>) -> Result<Vec<Tensor>, PluginCallError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 将闭包包装为输入生成函数
pub fn input_fn<F>(f: F) -> Arc<InputFn>
where
    F: Fn(&ProfilingCase) -> Result<Vec<Tensor>, PluginCallError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 调用插件函数，插件内的 panic 转为 [`PluginCallError`]
///
/// ```
/// use tbe_plugin::{PluginCallError, call_plugin};
///
/// let err = call_plugin(|| -> Result<(), PluginCallError> { panic!("index out of bounds") })
///     .unwrap_err();
/// assert_eq!(err.to_string(), "panicked: index out of bounds");
/// ```
pub fn call_plugin<T>(
    call: impl FnOnce() -> Result<T, PluginCallError>,
) -> Result<T, PluginCallError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(PluginCallError(format!(
            "panicked: {}",
            panic_message(&*payload)
        ))),
    }
}

static GLOBAL_REGISTRY: OnceLock<PluginRegistry> = OnceLock::new();

/// 插件注册表
pub struct PluginRegistry {
    golden: PluginTable<GoldenFn>,
    input: PluginTable<InputFn>,
    // 插件函数的代码位于这些动态库中，必须在插件表之后释放（字段按声明顺序析构）
    libraries: Vec<Arc<Library>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            golden: PluginTable::new(PluginCategory::Golden),
            input: PluginTable::new(PluginCategory::Input),
            libraries: Vec::new(),
        }
    }

    pub fn golden(&self) -> &PluginTable<GoldenFn> {
        &self.golden
    }

    pub fn golden_mut(&mut self) -> &mut PluginTable<GoldenFn> {
        &mut self.golden
    }

    pub fn input(&self) -> &PluginTable<InputFn> {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut PluginTable<InputFn> {
        &mut self.input
    }

    /// 按类别获取插件表视图
    pub fn table(&self, category: PluginCategory) -> &dyn PluginTableView {
        match category {
            PluginCategory::Golden => &self.golden,
            PluginCategory::Input => &self.input,
        }
    }

    /// 枚举全部插件表，键为类别名
    pub fn get_all(&self) -> BTreeMap<&'static str, &dyn PluginTableView> {
        PluginCategory::ALL
            .iter()
            .map(|&category| (category.name(), self.table(category)))
            .collect()
    }

    /// 保持动态库存活，直到注册表被释放
    pub(crate) fn retain_library(&mut self, library: Arc<Library>) {
        if !self.libraries.iter().any(|l| Arc::ptr_eq(l, &library)) {
            self.libraries.push(library);
        }
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// 安装进程级注册表（只能安装一次）
    pub fn install_global(registry: PluginRegistry) -> Result<&'static PluginRegistry, PluginError> {
        GLOBAL_REGISTRY
            .set(registry)
            .map_err(|_| PluginError::RegistryAlreadyInstalled)?;
        Self::global()
    }

    /// 获取进程级注册表
    pub fn global() -> Result<&'static PluginRegistry, PluginError> {
        GLOBAL_REGISTRY.get().ok_or(PluginError::RegistryNotInstalled)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("golden", &self.golden)
            .field("input", &self.input)
            .field("libraries", &self.libraries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbe_core::DType;

    fn case(op: &str) -> ProfilingCase {
        ProfilingCase {
            name: format!("{op}_0"),
            op: op.to_string(),
            inputs: vec![],
            outputs: vec![],
            attrs: Default::default(),
            backends: vec![],
            rtol: 1e-3,
            atol: 1e-3,
        }
    }

    #[test]
    fn test_get_all_lists_exactly_declared_tables() {
        let registry = PluginRegistry::new();
        let all = registry.get_all();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec!["golden", "input"]);
        assert_eq!(all["golden"].category(), PluginCategory::Golden);
        assert!(all["input"].is_empty());
    }

    #[test]
    fn test_golden_registered_under_many_names() {
        let mut registry = PluginRegistry::new();
        let f = golden_fn(|req| Ok(req.inputs.to_vec()));
        registry
            .golden_mut()
            .register_many(&["reduce_sum", "reduce_sum_d"], Arc::clone(&f))
            .unwrap();

        for key in ["reduce_sum", "reduce_sum_d"] {
            assert!(Arc::ptr_eq(&registry.golden().get(key).unwrap(), &f));
            assert!(registry.get_all()["golden"].contains(key));
        }
        assert!(!registry.get_all()["input"].contains("reduce_sum"));
    }

    #[test]
    fn test_plugin_functions_are_callable() {
        let mut registry = PluginRegistry::new();
        registry
            .input_mut()
            .register(
                "relu",
                input_fn(|case| {
                    Ok(vec![Tensor::new(DType::Float32, vec![1], vec![case.name.len() as f64])
                        .map_err(|e| e.to_string())?])
                }),
            )
            .unwrap();

        let f = registry.input().get("relu").unwrap();
        let out = f(&case("relu")).unwrap();
        assert_eq!(out[0].values, vec![6.0]);
    }

    #[test]
    fn test_call_plugin_contains_panics() {
        let mut registry = PluginRegistry::new();
        registry
            .golden_mut()
            .register("gather", golden_fn(|req| Ok(vec![req.inputs[5].clone()])))
            .unwrap();
        let golden = registry.golden().get("gather").unwrap();
        let case = case("gather");
        let request = GoldenRequest {
            case: &case,
            inputs: &[],
        };

        let err = call_plugin(|| golden(&request)).unwrap_err();
        assert!(err.0.starts_with("panicked: "));
        assert!(err.0.contains("index out of bounds"));

        let ok = call_plugin(|| Ok::<_, PluginCallError>(3)).unwrap();
        assert_eq!(ok, 3);
    }

    #[test]
    fn test_global_installs_once() {
        let first = PluginRegistry::install_global(PluginRegistry::new());
        assert!(first.is_ok());
        assert!(PluginRegistry::global().is_ok());
        assert_eq!(
            PluginRegistry::install_global(PluginRegistry::new()).unwrap_err(),
            PluginError::RegistryAlreadyInstalled
        );
    }
}
