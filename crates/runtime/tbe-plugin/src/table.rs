//! # 插件表
//!
//! 单一插件类别（标杆 / 输入生成）下 算子名 → 插件函数 的映射。

use crate::error::PluginError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 插件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginCategory {
    /// 标杆（参考输出）计算
    Golden,
    /// 输入数据生成
    Input,
}

impl PluginCategory {
    pub const ALL: [PluginCategory; 2] = [PluginCategory::Golden, PluginCategory::Input];

    pub fn name(self) -> &'static str {
        match self {
            PluginCategory::Golden => "golden",
            PluginCategory::Input => "input",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 与函数类型无关的插件表视图，用于枚举和诊断
pub trait PluginTableView {
    fn category(&self) -> PluginCategory;
    fn contains(&self, key: &str) -> bool;
    /// 已注册的算子名（有序）
    fn keys(&self) -> Vec<String>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 插件表
///
/// 重复注册同一算子名时后写入者生效，并输出警告；查找缺失的算子名是硬错误。
pub struct PluginTable<F: ?Sized> {
    category: PluginCategory,
    entries: HashMap<String, Arc<F>>,
}

impl<F: ?Sized> PluginTable<F> {
    pub fn new(category: PluginCategory) -> Self {
        Self {
            category,
            entries: HashMap::new(),
        }
    }

    pub fn category(&self) -> PluginCategory {
        self.category
    }

    /// 注册插件函数
    ///
    /// 返回被覆盖的旧函数（如果有）。
    pub fn register(
        &mut self,
        key: impl Into<String>,
        function: Arc<F>,
    ) -> Result<Option<Arc<F>>, PluginError> {
        let key = key.into();
        if key.is_empty() {
            return Err(PluginError::InvalidNames {
                category: self.category,
                reason: "operator name is empty".to_string(),
            });
        }

        let previous = self.entries.insert(key.clone(), function);
        if previous.is_some() {
            log::warn!(
                "{} plugin for operator `{}` registered again, previous function replaced",
                self.category,
                key
            );
        } else {
            log::debug!("Registered {} plugin for operator `{}`", self.category, key);
        }
        Ok(previous)
    }

    /// 以多个算子名注册同一个函数
    ///
    /// 名字列表为空或含空名字时不做任何注册。
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tbe_plugin::{PluginCategory, PluginTable};
    ///
    /// let mut table: PluginTable<dyn Fn() -> u32 + Send + Sync> =
    ///     PluginTable::new(PluginCategory::Golden);
    /// table.register_many(&["square", "square_v2"], Arc::new(|| 2_u32)).unwrap();
    /// assert!(table.contains("square_v2"));
    /// ```
    ///
    /// 单个字符串不是名字集合：
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    /// use tbe_plugin::{PluginCategory, PluginTable};
    ///
    /// let mut table: PluginTable<dyn Fn() -> u32 + Send + Sync> =
    ///     PluginTable::new(PluginCategory::Golden);
    /// table.register_many("square_impl", Arc::new(|| 2_u32)).unwrap();
    /// ```
    pub fn register_many<N: AsRef<str>>(
        &mut self,
        names: &[N],
        function: Arc<F>,
    ) -> Result<(), PluginError> {
        if names.is_empty() {
            return Err(PluginError::InvalidNames {
                category: self.category,
                reason: "name list is empty".to_string(),
            });
        }
        if let Some(pos) = names.iter().position(|n| n.as_ref().is_empty()) {
            return Err(PluginError::InvalidNames {
                category: self.category,
                reason: format!("name at position {pos} is empty"),
            });
        }

        for name in names {
            self.register(name.as_ref(), Arc::clone(&function))?;
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 查找插件函数
    pub fn get(&self, key: &str) -> Result<Arc<F>, PluginError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| PluginError::NotFound {
                category: self.category,
                key: key.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: ?Sized> PluginTableView for PluginTable<F> {
    fn category(&self) -> PluginCategory {
        self.category
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<F: ?Sized> fmt::Debug for PluginTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTable")
            .field("category", &self.category)
            .field("keys", &PluginTableView::keys(self))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestFn = dyn Fn(i32) -> i32 + Send + Sync;

    fn table() -> PluginTable<TestFn> {
        PluginTable::new(PluginCategory::Golden)
    }

    #[test]
    fn test_register_and_get_same_function() {
        let mut t = table();
        let f: Arc<TestFn> = Arc::new(|x: i32| x + 1);
        assert!(t.register("add", Arc::clone(&f)).unwrap().is_none());
        let got = t.get("add").unwrap();
        assert!(Arc::ptr_eq(&got, &f));
        assert_eq!(got(1), 2);
    }

    #[test]
    fn test_reregister_last_write_wins() {
        let mut t = table();
        let first: Arc<TestFn> = Arc::new(|x: i32| x + 1);
        let second: Arc<TestFn> = Arc::new(|x: i32| x * 10);
        t.register("add", Arc::clone(&first)).unwrap();

        let replaced = t.register("add", Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced.unwrap(), &first));
        assert!(Arc::ptr_eq(&t.get("add").unwrap(), &second));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_missing_key_names_category_and_key() {
        let t = table();
        let err = t.get("conv2d").err().unwrap();
        assert_eq!(
            err,
            PluginError::NotFound {
                category: PluginCategory::Golden,
                key: "conv2d".to_string()
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("golden") && msg.contains("conv2d"));
    }

    #[test]
    fn test_contains_never_fails() {
        let mut t = table();
        assert!(!t.contains(""));
        assert!(!t.contains("add"));
        t.register("add", Arc::new(|x: i32| x)).unwrap();
        assert!(t.contains("add"));
        assert!(!t.contains("Add"));
    }

    #[test]
    fn test_register_many_validates_before_inserting() {
        let mut t = table();
        let f: Arc<TestFn> = Arc::new(|x: i32| x);

        let empty: [&str; 0] = [];
        assert!(matches!(
            t.register_many(&empty, Arc::clone(&f)),
            Err(PluginError::InvalidNames { .. })
        ));
        assert!(matches!(
            t.register_many(&["relu", ""], Arc::clone(&f)),
            Err(PluginError::InvalidNames { .. })
        ));
        assert!(t.is_empty());

        t.register_many(&["relu".to_string(), "relu_v2".to_string()], f)
            .unwrap();
        assert_eq!(PluginTableView::keys(&t), vec!["relu", "relu_v2"]);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut t = table();
        assert!(t.register("", Arc::new(|x: i32| x)).is_err());
    }
}
