//! 插件函数名 → 注册表键 的净化规则
//!
//! 去掉固定前缀 `np_`，再删除所有不属于 `[0-9a-z]` 的字符（不做大小写转换）。
//! 下游用这一约定拼出的键查找插件，规则不能改动。

/// 可导出插件函数的名字前缀
pub const FUNCTION_PREFIX: &str = "np_";

/// 将插件函数名转换为注册表键
///
/// 没有前缀或净化后为空时返回 `None`。
///
/// ```
/// use tbe_plugin::sanitize_function_name;
///
/// assert_eq!(sanitize_function_name("np_add").as_deref(), Some("add"));
/// assert_eq!(sanitize_function_name("np_reduce_sum").as_deref(), Some("reducesum"));
/// assert_eq!(sanitize_function_name("add"), None);
/// ```
pub fn sanitize_function_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix(FUNCTION_PREFIX)?;
    let key: String = rest
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        .collect();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_names() {
        assert_eq!(sanitize_function_name("np_add").as_deref(), Some("add"));
        assert_eq!(sanitize_function_name("np_conv2d_v2").as_deref(), Some("conv2dv2"));
        assert_eq!(sanitize_function_name("np_MatMul").as_deref(), Some("at"));
        assert_eq!(sanitize_function_name("np_"), None);
        assert_eq!(sanitize_function_name("np___"), None);
        assert_eq!(sanitize_function_name("tf_add"), None);
        assert_eq!(sanitize_function_name("NP_add"), None);
    }

    proptest! {
        #[test]
        fn prop_output_only_lowercase_alnum(name in "np_[ -~]{0,32}") {
            if let Some(key) = sanitize_function_name(&name) {
                prop_assert!(!key.is_empty());
                prop_assert!(key.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
            }
        }

        #[test]
        fn prop_clean_keys_are_fixed_points(key in "[0-9a-z]{1,24}") {
            let name = format!("{FUNCTION_PREFIX}{key}");
            prop_assert_eq!(sanitize_function_name(&name), Some(key));
        }
    }
}
