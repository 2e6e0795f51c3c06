//! 插件注册句柄
//!
//! 插件模块被导入时拿到一个 [`PluginRegistrar`]，通过它把函数写入注册表。
//! 句柄同时记录本模块注册过的 (类别, 算子名)，供加载报告使用。
//!
//! 句柄不直接持有注册表，而是持有宿主创建的 [`RegistrySink`] trait 对象。
//! 动态库插件内联了自己的一份 `tbe-plugin`，经由 trait 对象写表时执行的是
//! 宿主侧代码，重复注册的警告因此走宿主的日志后端。

use crate::error::PluginError;
use crate::registry::{GoldenFn, InputFn, PluginRegistry};
use crate::sanitize::sanitize_function_name;
use crate::table::PluginCategory;
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 注册表写入口
pub(crate) trait RegistrySink {
    fn register_golden(
        &mut self,
        module: &str,
        names: &[&str],
        function: Arc<GoldenFn>,
    ) -> Result<(), PluginError>;

    fn register_input(
        &mut self,
        module: &str,
        names: &[&str],
        function: Arc<InputFn>,
    ) -> Result<(), PluginError>;

    fn retain_library(&mut self, library: Arc<Library>);
}

impl RegistrySink for PluginRegistry {
    fn register_golden(
        &mut self,
        module: &str,
        names: &[&str],
        function: Arc<GoldenFn>,
    ) -> Result<(), PluginError> {
        self.golden_mut().register_many(names, function)?;
        log::debug!("Module `{module}` registered golden plugin for {names:?}");
        Ok(())
    }

    fn register_input(
        &mut self,
        module: &str,
        names: &[&str],
        function: Arc<InputFn>,
    ) -> Result<(), PluginError> {
        self.input_mut().register_many(names, function)?;
        log::debug!("Module `{module}` registered input plugin for {names:?}");
        Ok(())
    }

    fn retain_library(&mut self, library: Arc<Library>) {
        PluginRegistry::retain_library(self, library);
    }
}

/// 插件注册句柄
pub struct PluginRegistrar<'a> {
    sink: &'a mut dyn RegistrySink,
    module: String,
    module_dir: Option<PathBuf>,
    registered: Vec<(PluginCategory, String)>,
}

impl<'a> PluginRegistrar<'a> {
    pub fn new(registry: &'a mut PluginRegistry, module: impl Into<String>) -> Self {
        Self {
            sink: registry,
            module: module.into(),
            module_dir: None,
            registered: Vec::new(),
        }
    }

    pub(crate) fn with_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_dir = Some(dir.into());
        self
    }

    /// 当前正在导入的模块名
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// 插件文件所在目录，插件可据此定位同目录下的数据文件
    pub fn module_dir(&self) -> Option<&Path> {
        self.module_dir.as_deref()
    }

    /// 以一组算子名注册标杆函数
    pub fn golden<N: AsRef<str>>(
        &mut self,
        names: &[N],
        function: Arc<GoldenFn>,
    ) -> Result<(), PluginError> {
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.sink.register_golden(&self.module, &names, function)?;
        self.record(PluginCategory::Golden, &names);
        Ok(())
    }

    /// 以一组算子名注册输入生成函数
    pub fn input<N: AsRef<str>>(
        &mut self,
        names: &[N],
        function: Arc<InputFn>,
    ) -> Result<(), PluginError> {
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        self.sink.register_input(&self.module, &names, function)?;
        self.record(PluginCategory::Input, &names);
        Ok(())
    }

    /// 按函数名导出标杆函数，键为净化后的函数名（`np_add` → `add`）
    pub fn export_golden(
        &mut self,
        function_name: &str,
        function: Arc<GoldenFn>,
    ) -> Result<String, PluginError> {
        let key = exported_key(PluginCategory::Golden, function_name)?;
        self.golden(&[key.as_str()], function)?;
        Ok(key)
    }

    /// 按函数名导出输入生成函数
    pub fn export_input(
        &mut self,
        function_name: &str,
        function: Arc<InputFn>,
    ) -> Result<String, PluginError> {
        let key = exported_key(PluginCategory::Input, function_name)?;
        self.input(&[key.as_str()], function)?;
        Ok(key)
    }

    /// 本模块已注册的 (类别, 算子名)
    pub fn registered(&self) -> &[(PluginCategory, String)] {
        &self.registered
    }

    pub(crate) fn into_registered(self) -> Vec<(PluginCategory, String)> {
        self.registered
    }

    pub(crate) fn retain_library(&mut self, library: Arc<Library>) {
        self.sink.retain_library(library);
    }

    fn record(&mut self, category: PluginCategory, names: &[&str]) {
        for name in names {
            let exists = self
                .registered
                .iter()
                .any(|(c, n)| *c == category && n == name);
            if !exists {
                self.registered.push((category, (*name).to_string()));
            }
        }
    }
}

fn exported_key(category: PluginCategory, function_name: &str) -> Result<String, PluginError> {
    sanitize_function_name(function_name).ok_or_else(|| PluginError::InvalidNames {
        category,
        reason: format!("function `{function_name}` does not yield a key (expected `np_<name>`)"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{golden_fn, input_fn};

    #[test]
    fn test_registrar_records_registrations() {
        let mut registry = PluginRegistry::new();
        let mut registrar = PluginRegistrar::new(&mut registry, "np_elementwise");
        registrar
            .golden(&["add", "add_v2"], golden_fn(|req| Ok(req.inputs.to_vec())))
            .unwrap();
        registrar
            .input(&["add"], input_fn(|_| Ok(Vec::new())))
            .unwrap();

        assert_eq!(registrar.module_name(), "np_elementwise");
        assert_eq!(
            registrar.registered(),
            &[
                (PluginCategory::Golden, "add".to_string()),
                (PluginCategory::Golden, "add_v2".to_string()),
                (PluginCategory::Input, "add".to_string()),
            ]
        );
        assert!(registry.golden().contains("add_v2"));
        assert!(registry.input().contains("add"));
    }

    #[test]
    fn test_export_uses_sanitized_key() {
        let mut registry = PluginRegistry::new();
        let mut registrar = PluginRegistrar::new(&mut registry, "np_add");
        let key = registrar
            .export_golden("np_add", golden_fn(|req| Ok(req.inputs.to_vec())))
            .unwrap();
        assert_eq!(key, "add");

        let err = registrar
            .export_input("make_inputs", input_fn(|_| Ok(Vec::new())))
            .unwrap_err();
        assert!(err.to_string().contains("make_inputs"));
        assert!(registry.golden().contains("add"));
    }

    #[test]
    fn test_repeated_registration_recorded_once() {
        let mut registry = PluginRegistry::new();
        let mut registrar = PluginRegistrar::new(&mut registry, "np_elementwise");
        registrar
            .golden(&["add", "add"], golden_fn(|req| Ok(req.inputs.to_vec())))
            .unwrap();
        registrar
            .export_golden("np_add", golden_fn(|_| Ok(Vec::new())))
            .unwrap();
        registrar
            .input(&["add"], input_fn(|_| Ok(Vec::new())))
            .unwrap();

        assert_eq!(
            registrar.registered(),
            &[
                (PluginCategory::Golden, "add".to_string()),
                (PluginCategory::Input, "add".to_string()),
            ]
        );
        assert_eq!(registry.golden().len(), 1);
    }

    #[test]
    fn test_invalid_names_register_nothing() {
        let mut registry = PluginRegistry::new();
        let mut registrar = PluginRegistrar::new(&mut registry, "np_bad");
        let none: &[&str] = &[];
        assert!(registrar.golden(none, golden_fn(|_| Ok(Vec::new()))).is_err());
        assert!(registrar.registered().is_empty());
        assert!(registry.golden().is_empty());
    }
}
