//! CLI 配置
//!
//! 包含 CLI 特有的配置：日志配置，以及从 JSON 文件读取的虚拟机配置

use std::collections::HashMap;
use std::path::Path;

use b9_config::{Phase, VmConfig};
use serde::Deserialize;
use tracing::Level;

use crate::error::CliError;

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    /// 分阶段覆盖，未设置时使用 `global`
    pub phases: HashMap<Phase, Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::WARN,
            phases: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// Get log level for a specific phase
    pub fn level_for(&self, phase: Phase) -> Level {
        self.phases.get(&phase).copied().unwrap_or(self.global)
    }
}

/// 配置文件结构
///
/// ```json
/// {
///   "vm": { "verify_on_load": true, "limits": { "max_recursion_depth": 64 } },
///   "log": { "level": "info", "phases": { "interp": "trace" } }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub vm: VmConfig,
    pub log: LogSection,
}

/// 配置文件中的日志部分
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// 日志级别: "silent", "error", "warn", "info", "debug", "trace"
    pub level: Option<String>,
    pub phases: HashMap<Phase, String>,
}

impl FileConfig {
    /// Read and parse a JSON config file
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// 合并命令行给出的全局级别（优先于文件）
    pub fn log_config(&self, cli_level: Option<&str>) -> Result<LogConfig, CliError> {
        let mut config = LogConfig::default();
        if let Some(level) = cli_level.or(self.log.level.as_deref()) {
            config.global = parse_log_level(level)?;
        }
        for (phase, level) in &self.log.phases {
            config.phases.insert(*phase, parse_log_level(level)?);
        }
        Ok(config)
    }
}

/// Parse log level string
pub fn parse_log_level(s: &str) -> Result<Level, CliError> {
    match s.to_lowercase().as_str() {
        "silent" => Ok(Level::ERROR), // silent = only errors
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(CliError::InvalidLogLevel(s.to_string())),
    }
}
