//! # tbe-plugin
//!
//! 算子插件系统：标杆（golden）与输入生成（input）两类插件的注册表和加载器。
//!
//! ## 流程
//!
//! 1. [`DynamicPluginLoader`] 扫描插件目录中符合 `np_*` 命名约定的文件
//! 2. 每个文件被导入后，通过 [`PluginRegistrar`] 把函数注册进 [`PluginRegistry`]
//! 3. 加载完成后注册表通过 [`PluginRegistry::install_global`] 发布，此后只读
//!
//! 所有加载失败在扫描结束后汇总为一个 [`LoadError`]。
//!
//! ## 编写插件
//!
//! 插件 crate 以 `cdylib`/`dylib` 形式构建，并用 [`export_plugins!`] 导出注册入口：
//!
//! ```
//! use tbe_plugin::{PluginCallError, PluginRegistrar, golden_fn};
//!
//! fn register(r: &mut PluginRegistrar<'_>) -> Result<(), PluginCallError> {
//!     // 以函数名导出，键为 `add`
//!     r.export_golden("np_add", golden_fn(|req| Ok(req.inputs.to_vec())))?;
//!     // 一个实现对应多个算子
//!     r.golden(&["reduce_sum", "reduce_sum_d"], golden_fn(|req| Ok(req.inputs.to_vec())))?;
//!     Ok(())
//! }
//!
//! tbe_plugin::export_plugins!(register);
//! # fn main() {}
//! ```

pub mod error;
pub mod loader;
pub mod registrar;
pub mod registry;
pub mod sanitize;
pub mod table;

pub use error::{LoadError, LoadFailure, PluginCallError, PluginError};
pub use loader::{
    DylibImporter, DynamicPluginLoader, ENTRY_SYMBOL, LoadedModules, ModuleImporter, PluginModule,
    PluginPattern, RegisterPluginsFn, StaticImporter,
};
pub use registrar::PluginRegistrar;
pub use registry::{
    GoldenFn, GoldenRequest, InputFn, PluginRegistry, call_plugin, golden_fn, input_fn,
};
pub use sanitize::{FUNCTION_PREFIX, sanitize_function_name};
pub use table::{PluginCategory, PluginTable, PluginTableView};

/// 为插件库生成注册入口 `tbe_register_plugins`
///
/// 参数为签名符合 [`RegisterPluginsFn`] 的函数路径。
#[macro_export]
macro_rules! export_plugins {
    ($register:path) => {
        #[unsafe(no_mangle)]
        pub fn tbe_register_plugins(
            registrar: &mut $crate::PluginRegistrar<'_>,
        ) -> ::std::result::Result<(), $crate::PluginCallError> {
            let entry: $crate::RegisterPluginsFn = $register;
            entry(registrar)
        }
    };
}
