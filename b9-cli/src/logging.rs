//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分阶段日志控制。日志写到 stderr，
//! stdout 留给原语输出和运行结果。

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use b9_config::Phase;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::config::LogConfig;
use crate::error::CliError;

/// CLI 自身的日志 target
pub const TARGET_CLI: &str = "b9::cli";

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

/// 构建分阶段过滤器
pub fn targets(log_config: &LogConfig) -> Targets {
    Phase::ALL
        .iter()
        .fold(Targets::new().with_default(log_config.global), |targets, phase| {
            targets.with_target(phase.target(), log_config.level_for(*phase))
        })
        .with_target(TARGET_CLI, log_config.global)
}

/// 使用指定格式和日志配置初始化日志系统
///
/// 指定文件时同时输出到 stderr 和文件。
pub fn init_with_file(
    log_config: &LogConfig,
    format: LogFormat,
    file: Option<&Path>,
) -> Result<(), CliError> {
    let file = file.map(open_log_file).transpose()?;
    build_subscriber(log_config, format, io::stderr, file).init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File, CliError> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CliError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// 控制台层使用所选格式；文件层总是不带颜色的默认格式
fn build_subscriber<W, F>(
    log_config: &LogConfig,
    format: LogFormat,
    make_writer: F,
    file: Option<File>,
) -> impl Subscriber + Send + Sync + 'static
where
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    let targets = targets(log_config);

    let console_layer = create_format_layer(format, make_writer).with_filter(targets.clone());
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(targets)
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
}

/// Create formatter layer based on format
fn create_format_layer<W, F>(
    format: LogFormat,
    make_writer: F,
) -> impl Layer<tracing_subscriber::Registry>
where
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}
