//! # 插件加载器
//!
//! 扫描插件文件、逐个导入并执行其注册入口。
//!
//! 单个文件的失败不会中止加载：每个失败在发生时立即以 `error!` 输出，
//! 全部文件处理完后再汇总为一个 [`LoadError`] 返回。
//!
//! 导入方式通过 [`ModuleImporter`] 抽象：
//! - [`DylibImporter`]：以绝对路径打开动态库，解析 `tbe_register_plugins` 入口
//! - [`StaticImporter`]：按模块名查找编译期链接进来的注册函数

use crate::error::{LoadError, LoadFailure, PluginCallError, panic_message};
use crate::registrar::PluginRegistrar;
use crate::registry::PluginRegistry;
use crate::sanitize::FUNCTION_PREFIX;
use crate::table::PluginCategory;
use libloading::{Library, Symbol};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// 动态库插件的注册入口符号
pub const ENTRY_SYMBOL: &str = "tbe_register_plugins";

/// 注册入口函数
///
/// 动态库插件必须与宿主使用同一编译器构建（Rust ABI）。
pub type RegisterPluginsFn = fn(&mut PluginRegistrar<'_>) -> Result<(), PluginCallError>;

/// 模块名 → 该模块注册的 (类别, 算子名)
pub type LoadedModules = BTreeMap<String, Vec<(PluginCategory, String)>>;

/// 待导入的插件模块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginModule {
    /// 由文件名推导的模块名（去扩展名，去可选的 `lib` 前缀）
    pub name: String,
    pub path: PathBuf,
    /// 文件所在目录
    pub dir: PathBuf,
}

impl PluginModule {
    pub fn from_path(path: &Path) -> Result<Self, String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| "cannot derive a module name from the file name".to_string())?;
        let name = stem
            .strip_prefix(std::env::consts::DLL_PREFIX)
            .filter(|rest| !rest.is_empty())
            .unwrap_or(stem);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            dir,
        })
    }
}

/// 模块导入方式
pub trait ModuleImporter {
    /// 导入模块并通过 `registrar` 执行其注册副作用
    fn import(&self, module: &PluginModule, registrar: &mut PluginRegistrar<'_>)
    -> Result<(), String>;
}

/// 动态库导入
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibImporter;

impl ModuleImporter for DylibImporter {
    fn import(
        &self,
        module: &PluginModule,
        registrar: &mut PluginRegistrar<'_>,
    ) -> Result<(), String> {
        // SAFETY: 插件库的初始化代码由插件作者负责，加载的是用户指定的插件目录
        let library = unsafe { Library::new(&module.path) }
            .map_err(|e| format!("failed to open library: {e}"))?;
        let library = Arc::new(library);

        // SAFETY: 入口符号由 `export_plugins!` 生成，签名与 `RegisterPluginsFn` 一致
        let entry: RegisterPluginsFn = unsafe {
            let symbol: Symbol<'_, RegisterPluginsFn> = library
                .get(ENTRY_SYMBOL.as_bytes())
                .map_err(|e| format!("entry symbol `{ENTRY_SYMBOL}` not found: {e}"))?;
            *symbol
        };

        // 注册进表的函数代码位于该库中
        registrar.retain_library(Arc::clone(&library));
        run_entry(entry, registrar)
    }
}

/// 编译期插件表导入
///
/// 按模块名查找注册函数，文件本身不会被读取。
#[derive(Debug, Default, Clone)]
pub struct StaticImporter {
    modules: HashMap<String, RegisterPluginsFn>,
}

impl StaticImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, entry: RegisterPluginsFn) -> Self {
        self.modules.insert(name.into(), entry);
        self
    }

    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModuleImporter for StaticImporter {
    fn import(
        &self,
        module: &PluginModule,
        registrar: &mut PluginRegistrar<'_>,
    ) -> Result<(), String> {
        let entry = self
            .modules
            .get(&module.name)
            .ok_or_else(|| format!("no statically linked plugin module named `{}`", module.name))?;
        run_entry(*entry, registrar)
    }
}

fn run_entry(entry: RegisterPluginsFn, registrar: &mut PluginRegistrar<'_>) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| entry(registrar))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("registration failed: {e}")),
        Err(payload) => Err(format!("registration panicked: {}", panic_message(&*payload))),
    }
}

/// 插件文件命名约定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginPattern {
    /// 文件名前缀（允许前面再带平台动态库前缀 `lib`）
    pub prefix: String,
    /// 文件扩展名
    pub extension: String,
    /// 扫描时跳过的目录名（生成物 / 临时输出目录）
    pub skip_dirs: Vec<String>,
}

impl Default for PluginPattern {
    fn default() -> Self {
        Self {
            prefix: FUNCTION_PREFIX.to_string(),
            extension: std::env::consts::DLL_EXTENSION.to_string(),
            skip_dirs: vec!["out".to_string()],
        }
    }
}

impl PluginPattern {
    /// 文件是否符合 `prefix*.extension`
    pub fn matches(&self, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
            return false;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name
            .strip_prefix(std::env::consts::DLL_PREFIX)
            .filter(|rest| rest.starts_with(&self.prefix))
            .unwrap_or(name);
        name.starts_with(&self.prefix)
    }

    fn is_skipped_dir(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }
}

/// 插件加载器
#[derive(Debug, Clone)]
pub struct DynamicPluginLoader<I: ModuleImporter = DylibImporter> {
    importer: I,
    pattern: PluginPattern,
}

impl DynamicPluginLoader<DylibImporter> {
    /// 动态库加载器
    pub fn dylib() -> Self {
        Self::new(DylibImporter)
    }
}

impl<I: ModuleImporter> DynamicPluginLoader<I> {
    pub fn new(importer: I) -> Self {
        Self {
            importer,
            pattern: PluginPattern::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: PluginPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn pattern(&self) -> &PluginPattern {
        &self.pattern
    }

    /// 逐个导入插件文件
    ///
    /// 空列表返回空结果。失败的文件不影响其余文件，成功导入的注册保留在 `registry` 中。
    pub fn load_files<P: AsRef<Path>>(
        &self,
        registry: &mut PluginRegistry,
        paths: &[P],
    ) -> Result<LoadedModules, LoadError> {
        let mut loaded = LoadedModules::new();
        let mut failures = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match self.load_one(registry, path) {
                Ok((name, registered)) => {
                    if loaded.insert(name.clone(), registered).is_some() {
                        log::debug!("Plugin module `{}` imported again from {}", name, path.display());
                    }
                }
                Err(reason) => {
                    log::error!("Failed to load plugin file {}: {}", path.display(), reason);
                    failures.push(LoadFailure {
                        path: path.to_path_buf(),
                        reason,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(loaded)
        } else {
            Err(LoadError { failures })
        }
    }

    fn load_one(
        &self,
        registry: &mut PluginRegistry,
        path: &Path,
    ) -> Result<(String, Vec<(PluginCategory, String)>), String> {
        let module = PluginModule::from_path(path)?;
        let mut registrar = PluginRegistrar::new(registry, module.name.clone())
            .with_module_dir(module.dir.clone());
        self.importer.import(&module, &mut registrar)?;

        let registered = registrar.into_registered();
        log::info!(
            "Loaded plugin module `{}` from {} ({} registration(s))",
            module.name,
            path.display(),
            registered.len()
        );
        Ok((module.name, registered))
    }

    /// 递归扫描目录，返回符合命名约定的插件文件（有序）
    ///
    /// 名为 `skip_dirs` 的子目录整体跳过。
    pub fn scan_dir(&self, root: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        let mut failures = Vec::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| self.pattern.is_skipped_dir(name)))
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.pattern.matches(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    let reason = format!("failed to scan: {e}");
                    log::error!("Failed to scan plugin directory {}: {}", path.display(), reason);
                    failures.push(LoadFailure { path, reason });
                }
            }
        }

        if failures.is_empty() {
            Ok(files)
        } else {
            Err(LoadError { failures })
        }
    }

    /// 扫描目录并导入全部插件文件
    pub fn load_dir(
        &self,
        registry: &mut PluginRegistry,
        root: &Path,
    ) -> Result<LoadedModules, LoadError> {
        self.load_dirs(registry, &[root])
    }

    /// 扫描多个目录并导入，所有目录的失败汇总为一个错误
    pub fn load_dirs<P: AsRef<Path>>(
        &self,
        registry: &mut PluginRegistry,
        roots: &[P],
    ) -> Result<LoadedModules, LoadError> {
        let mut files = Vec::new();
        let mut failures = Vec::new();

        for root in roots {
            let root = root.as_ref();
            match self.scan_dir(root) {
                Ok(found) => {
                    log::debug!("Found {} plugin file(s) under {}", found.len(), root.display());
                    files.extend(found);
                }
                Err(e) => failures.extend(e.failures),
            }
        }

        match self.load_files(registry, &files) {
            Ok(loaded) if failures.is_empty() => Ok(loaded),
            Ok(_) => Err(LoadError { failures }),
            Err(e) => {
                failures.extend(e.failures);
                Err(LoadError { failures })
            }
        }
    }
}
