//! 日志模块 - 宿主驱动进程的日志初始化
//!
//! 库本身只通过 tracing 宏打日志；宿主在启动时调用一次 [`init_logging`]
//! 安装带大小上限的文件订阅器即可。

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB），超过后轮转为 .old
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 打开日志文件；现有文件超过大小限制时先轮转为 .old
fn open_log_file(file_path: &Path, max_size: u64) -> io::Result<fs::File> {
    if let Ok(metadata) = fs::metadata(file_path) {
        if metadata.len() > max_size {
            let backup_path = file_path.with_extension("log.old");
            if backup_path.exists() {
                fs::remove_file(&backup_path)?;
            }
            fs::rename(file_path, &backup_path)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(file_path)
}

/// 初始化全局日志订阅器，宿主进程启动时调用一次
///
/// 重复调用是安全的，后续调用不生效。
pub fn init_logging(log_dir: &Path, config: &LogConfig) -> io::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    fs::create_dir_all(log_dir)?;

    let file_path = log_dir.join("filestage.log");
    let max_size = u64::from(config.max_size_mb) * 1024 * 1024;
    let file = open_log_file(&file_path, max_size)?;

    // RUST_LOG 优先于配置文件中的级别
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        config.level = "DEBUG".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "bogus".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }
}
