//! # 性能测试开关
//!
//! 一次性能测试运行的全部行为由 [`ProfilingSwitches`] 决定：
//! 各后端的实时编译与在线 profiling 开关、转储级别、目标模式、SoC 规格覆盖等。
//!
//! 生命周期：安全默认值 → 配置文件 → 命令行参数 → [`ProfilingSwitches::publish`]，
//! 发布后全进程只读。

use crate::error::ProfilingError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use tbe_core::{Config, ConfigError, ExecutionBackend, ProfilingCase};

/// 每个执行后端一个布尔开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendFlags {
    pub dynamic: bool,
    #[serde(rename = "static")]
    pub static_shape: bool,
    #[serde(rename = "const")]
    pub const_folded: bool,
    pub binary: bool,
}

impl BackendFlags {
    /// 四个开关取同一个值
    pub const fn all(value: bool) -> Self {
        Self {
            dynamic: value,
            static_shape: value,
            const_folded: value,
            binary: value,
        }
    }

    pub fn get(&self, backend: ExecutionBackend) -> bool {
        match backend {
            ExecutionBackend::Dynamic => self.dynamic,
            ExecutionBackend::Static => self.static_shape,
            ExecutionBackend::Const => self.const_folded,
            ExecutionBackend::Binary => self.binary,
        }
    }

    pub fn set(&mut self, backend: ExecutionBackend, value: bool) {
        match backend {
            ExecutionBackend::Dynamic => self.dynamic = value,
            ExecutionBackend::Static => self.static_shape = value,
            ExecutionBackend::Const => self.const_folded = value,
            ExecutionBackend::Binary => self.binary = value,
        }
    }
}

impl Default for BackendFlags {
    fn default() -> Self {
        Self::all(true)
    }
}

/// 转储级别
///
/// {input, output, golden} 的组合，`No` 与 `Full` 为两端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DumpLevel {
    #[default]
    No,
    Input,
    Output,
    Golden,
    InOut,
    InGold,
    OutGold,
    Full,
}

impl DumpLevel {
    pub const ALL: [DumpLevel; 8] = [
        DumpLevel::No,
        DumpLevel::Input,
        DumpLevel::Output,
        DumpLevel::Golden,
        DumpLevel::InOut,
        DumpLevel::InGold,
        DumpLevel::OutGold,
        DumpLevel::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DumpLevel::No => "NO",
            DumpLevel::Input => "INPUT",
            DumpLevel::Output => "OUTPUT",
            DumpLevel::Golden => "GOLDEN",
            DumpLevel::InOut => "INOUT",
            DumpLevel::InGold => "INGOLD",
            DumpLevel::OutGold => "OUTGOLD",
            DumpLevel::Full => "FULL",
        }
    }

    pub fn dumps_input(self) -> bool {
        matches!(
            self,
            DumpLevel::Input | DumpLevel::InOut | DumpLevel::InGold | DumpLevel::Full
        )
    }

    pub fn dumps_output(self) -> bool {
        matches!(
            self,
            DumpLevel::Output | DumpLevel::InOut | DumpLevel::OutGold | DumpLevel::Full
        )
    }

    pub fn dumps_golden(self) -> bool {
        matches!(
            self,
            DumpLevel::Golden | DumpLevel::InGold | DumpLevel::OutGold | DumpLevel::Full
        )
    }

    pub fn is_enabled(self) -> bool {
        self != DumpLevel::No
    }
}

impl fmt::Display for DumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DumpLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        DumpLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == upper)
            .ok_or_else(|| {
                let names: Vec<&str> = DumpLevel::ALL.iter().map(|l| l.as_str()).collect();
                format!("unknown dump level `{s}` (expected one of {})", names.join(", "))
            })
    }
}

impl Serialize for DumpLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DumpLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 目标模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// Ascend NPU（含仿真）
    #[default]
    Npu,
    Gpu,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetMode::Npu => "npu",
            TargetMode::Gpu => "gpu",
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npu" | "ascend" => Ok(TargetMode::Npu),
            "gpu" => Ok(TargetMode::Gpu),
            other => Err(format!("unknown target mode `{other}` (expected npu or gpu)")),
        }
    }
}

/// SoC 规格覆盖表
///
/// 在不修改编译器自身配置文件的前提下伪造目标芯片特性（如核数）。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocSpecOverrides(BTreeMap<String, String>);

impl SocSpecOverrides {
    /// 核数覆盖使用的键
    pub const CORE_NUM: &'static str = "CORE_NUM";

    pub fn new() -> Self {
        Self::default()
    }

    /// 解析 `KEY=VALUE`，值中允许再出现 `=`
    pub fn parse_entry(entry: &str) -> Result<(String, String), String> {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("invalid soc spec override `{entry}` (expected KEY=VALUE)"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("invalid soc spec override `{entry}`: key is empty"));
        }
        Ok((key.to_string(), value.trim().to_string()))
    }

    /// 插入覆盖项，返回被替换的旧值
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 覆盖的 AI Core 核数
    pub fn core_num(&self) -> Option<u32> {
        self.get(Self::CORE_NUM).and_then(|v| v.parse().ok())
    }
}

impl FromIterator<(String, String)> for SocSpecOverrides {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

static PUBLISHED: OnceLock<ProfilingSwitches> = OnceLock::new();

/// 性能测试开关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingSwitches {
    /// 目标模式
    pub mode: TargetMode,
    /// 转储级别
    pub dump: DumpLevel,
    /// 日志是否同时写入文件
    pub log_to_file: bool,
    /// 日志文件路径（`log_to_file` 打开时使用，缺省为 `tbe_toolkits.log`）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// 参与测试的设备，多于一个时启用工作进程
    pub device_ids: Vec<u32>,
    /// 插件目录
    pub plugin_dirs: Vec<PathBuf>,
    /// 预编译内核目录
    pub kernel_meta_dir: PathBuf,
    /// 转储目录
    pub dump_dir: PathBuf,
    /// 报告输出路径
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// 只运行这些算子（为空表示全部）
    pub op_filter: Vec<String>,
    /// 各后端是否实时编译
    pub realtime_compile: BackendFlags,
    /// 各后端是否开启在线 profiling
    pub online_profiling: BackendFlags,
    /// SoC 规格覆盖
    pub soc_spec: SocSpecOverrides,
}

impl Default for ProfilingSwitches {
    fn default() -> Self {
        Self {
            mode: TargetMode::Npu,
            dump: DumpLevel::No,
            log_to_file: false,
            log_file: None,
            device_ids: vec![0],
            plugin_dirs: Vec::new(),
            kernel_meta_dir: PathBuf::from("kernel_meta"),
            dump_dir: PathBuf::from("dump"),
            output: None,
            op_filter: Vec::new(),
            realtime_compile: BackendFlags::all(true),
            online_profiling: BackendFlags::all(true),
            soc_spec: SocSpecOverrides::new(),
        }
    }
}

impl Config for ProfilingSwitches {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.device_ids.is_empty() {
            return Err(ConfigError::Invalid("device_ids must not be empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.device_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ConfigError::Invalid(format!("device {dup} listed more than once")));
        }
        if self.kernel_meta_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("kernel_meta_dir must not be empty".to_string()));
        }
        if self.dump.is_enabled() && self.dump_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "dump level {} requires a dump_dir",
                self.dump
            )));
        }
        if self.soc_spec.iter().any(|(k, _)| k.trim().is_empty()) {
            return Err(ConfigError::Invalid("soc_spec contains an empty key".to_string()));
        }
        if let Some(v) = self.soc_spec.get(SocSpecOverrides::CORE_NUM) {
            match v.parse::<u32>() {
                Ok(n) if n > 0 => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "soc_spec {} must be a positive integer, got `{v}`",
                        SocSpecOverrides::CORE_NUM
                    )));
                }
            }
        }
        Ok(())
    }

    fn defaults() -> Self {
        Self::default()
    }
}

impl ProfilingSwitches {
    /// 实际使用的日志文件路径
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_to_file.then(|| {
            self.log_file
                .clone()
                .unwrap_or_else(|| PathBuf::from("tbe_toolkits.log"))
        })
    }

    /// 按 `op_filter` 过滤用例
    pub fn filter_cases(&self, cases: Vec<ProfilingCase>) -> Vec<ProfilingCase> {
        if self.op_filter.is_empty() {
            return cases;
        }
        cases
            .into_iter()
            .filter(|c| self.op_filter.iter().any(|op| op == &c.op))
            .collect()
    }

    /// 发布为进程级只读配置（只能发布一次）
    pub fn publish(self) -> Result<&'static ProfilingSwitches, ProfilingError> {
        PUBLISHED
            .set(self)
            .map_err(|_| ProfilingError::SwitchesAlreadyPublished)?;
        PUBLISHED.get().ok_or(ProfilingError::SwitchesAlreadyPublished)
    }

    /// 已发布的配置
    pub fn current() -> Option<&'static ProfilingSwitches> {
        PUBLISHED.get()
    }

    /// 输出一行开关摘要
    pub fn log_summary(&self) {
        let flags = |f: &BackendFlags| {
            ExecutionBackend::ALL
                .iter()
                .map(|&b| format!("{b}={}", f.get(b)))
                .collect::<Vec<_>>()
                .join(",")
        };
        log::info!(
            "Profiling switches: mode={} dump={} devices={:?} realtime_compile[{}] online_profiling[{}] soc_spec={:?}",
            self.mode,
            self.dump,
            self.device_ids,
            flags(&self.realtime_compile),
            flags(&self.online_profiling),
            self.soc_spec
        );
    }
}
