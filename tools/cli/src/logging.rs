//! 日志初始化
//!
//! `RUST_LOG` 优先，缺省级别为 `info`。打开 `log_to_file` 时同时写 stderr 与日志文件。

use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// 同时写入 stderr 与文件
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn builder() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"))
}

/// 初始化全局日志；`log_file` 为 `Some` 时镜像到该文件（追加写入）
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = builder();
    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }
    builder.try_init().context("logger already initialized")?;
    Ok(())
}
