//! 真实动态库插件的加载测试
//!
//! 先用 cargo 构建 `tests/fixtures/np_elementwise`（cdylib），再把产物复制进临时插件目录加载。
//! 全局 logger 只能安装一次，本文件只放一个测试。

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tbe_core::{DType, ProfilingCase, Tensor};
use tbe_plugin::{
    DynamicPluginLoader, GoldenRequest, PluginCategory, PluginRegistry, call_plugin, golden_fn,
};

struct CapturingLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl CapturingLogger {
    fn warnings(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl Log for CapturingLogger {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    records: Mutex::new(Vec::new()),
};

fn build_fixture() -> PathBuf {
    let manifest =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/np_elementwise/Cargo.toml");
    let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("plugin-fixtures");
    let status = Command::new(env!("CARGO"))
        .arg("build")
        .arg("--manifest-path")
        .arg(&manifest)
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .unwrap();
    assert!(status.success(), "building the fixture plugin failed");

    let library = target_dir
        .join("debug")
        .join(format!("{DLL_PREFIX}np_elementwise{DLL_SUFFIX}"));
    assert!(library.is_file(), "{} not built", library.display());
    library
}

fn case() -> ProfilingCase {
    serde_json::from_value(serde_json::json!({
        "name": "add_f32",
        "op": "add",
        "inputs": [
            {"dtype": "float32", "shape": [3]},
            {"dtype": "float32", "shape": [3]}
        ]
    }))
    .unwrap()
}

#[test]
fn test_cdylib_plugin_loads_and_duplicates_warn_on_host() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let library = build_fixture();
    let dir = tempfile::tempdir().unwrap();
    let plugin = dir.path().join(library.file_name().unwrap());
    std::fs::copy(&library, &plugin).unwrap();

    let mut registry = PluginRegistry::new();
    registry
        .golden_mut()
        .register("add_v2", golden_fn(|_| Ok(Vec::new())))
        .unwrap();

    let loaded = DynamicPluginLoader::dylib()
        .load_dir(&mut registry, dir.path())
        .unwrap();
    assert_eq!(
        loaded["np_elementwise"],
        vec![
            (PluginCategory::Golden, "add".to_string()),
            (PluginCategory::Golden, "add_v2".to_string()),
            (PluginCategory::Input, "add".to_string()),
        ]
    );
    assert_eq!(registry.library_count(), 1);

    // 模块内重复（add）与跨模块覆盖（add_v2）都由宿主侧输出警告
    let warnings = LOGGER.warnings();
    assert!(
        warnings.iter().any(|w| w.contains("operator `add` registered again")),
        "{warnings:?}"
    );
    assert!(
        warnings.iter().any(|w| w.contains("operator `add_v2` registered again")),
        "{warnings:?}"
    );

    let case = case();
    let generate = registry.input().get("add").unwrap();
    let zeros = call_plugin(|| generate(&case)).unwrap();
    assert_eq!(zeros.len(), 2);
    assert_eq!(zeros[0].values, vec![0.0; 3]);

    let x = Tensor::new(DType::Float32, vec![3], vec![1.0, 2.0, 3.0]).unwrap();
    let y = Tensor::new(DType::Float32, vec![3], vec![0.5, 0.5, 0.5]).unwrap();
    let inputs = [x, y];
    for key in ["add", "add_v2"] {
        let golden = registry.golden().get(key).unwrap();
        let out = call_plugin(|| {
            golden(&GoldenRequest {
                case: &case,
                inputs: &inputs,
            })
        })
        .unwrap();
        assert_eq!(out[0].values, vec![1.5, 2.5, 3.5]);
    }
}
