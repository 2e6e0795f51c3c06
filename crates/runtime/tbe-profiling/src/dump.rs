//! 数据转储
//!
//! 布局：`<dump_dir>/<case>/<target>/{input,output,golden}_<i>.bin`，
//! 内容为按张量 dtype 编码的小端字节。

use crate::error::ProfilingError;
use crate::switches::DumpLevel;
use std::path::{Path, PathBuf};
use tbe_core::Tensor;

/// 按转储级别写出张量
#[derive(Debug, Clone)]
pub struct Dumper {
    root: PathBuf,
    level: DumpLevel,
}

impl Dumper {
    pub fn new(root: impl Into<PathBuf>, level: DumpLevel) -> Self {
        Self {
            root: root.into(),
            level,
        }
    }

    pub fn level(&self) -> DumpLevel {
        self.level
    }

    /// 写出本级别要求的数据，返回写出的文件
    ///
    /// `target` 为后端名（NPU）或 `gpu`。
    pub fn dump(
        &self,
        case: &str,
        target: &str,
        inputs: &[Tensor],
        outputs: &[Tensor],
        golden: &[Tensor],
    ) -> Result<Vec<PathBuf>, ProfilingError> {
        let mut groups: Vec<(&str, &[Tensor])> = Vec::new();
        if self.level.dumps_input() {
            groups.push(("input", inputs));
        }
        if self.level.dumps_output() {
            groups.push(("output", outputs));
        }
        if self.level.dumps_golden() {
            groups.push(("golden", golden));
        }
        if groups.iter().all(|(_, tensors)| tensors.is_empty()) {
            return Ok(Vec::new());
        }

        let dir = self.root.join(case).join(target);
        std::fs::create_dir_all(&dir).map_err(|e| ProfilingError::io(&dir, e))?;

        let mut written = Vec::new();
        for (kind, tensors) in groups {
            for (i, tensor) in tensors.iter().enumerate() {
                let path = dir.join(format!("{kind}_{i}.bin"));
                write_tensor(&path, tensor)?;
                written.push(path);
            }
        }
        log::debug!("Dumped {} file(s) for {case}[{target}] to {}", written.len(), dir.display());
        Ok(written)
    }
}

fn write_tensor(path: &Path, tensor: &Tensor) -> Result<(), ProfilingError> {
    std::fs::write(path, tensor.to_le_bytes()).map_err(|e| ProfilingError::io(path, e))
}
