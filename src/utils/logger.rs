//! 日志系统模块
//!
//! 基于 tracing 生态实现日志系统：
//!
//! - 多级别日志与按模块过滤（`EnvFilter`，`RUST_LOG` 优先）
//! - 结构化日志（JSON 格式输出）
//! - 文件日志输出（异步非阻塞，按时间轮转）
//!
//! 控制台日志写到 stderr，stdout 留给命令输出。
//!
//! # 示例
//!
//! ```rust,no_run
//! use dune_modules::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let config = LoggerConfig::builder()
//!     .level("debug")
//!     .file_output("./logs")
//!     .rotation(RotationStrategy::Daily)
//!     .build();
//!
//! let _guard = Logger::init(config).unwrap();
//! tracing::info!(module = "dune-common", "开始解析");
//! ```

use crate::utils::{CoreError, Result};
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转（单个日志文件）
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    /// 转换为 tracing-appender 的 Rotation 类型
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }

    /// 从字符串解析轮转策略，无法识别时使用默认值
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "never" | "none" => RotationStrategy::Never,
            "hourly" | "hour" => RotationStrategy::Hourly,
            _ => RotationStrategy::Daily,
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别（例如 "trace", "debug", "info", "warn", "error"）
    pub level: String,

    /// 是否使用 JSON 格式输出
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不输出到文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 日志轮转策略
    pub rotation: RotationStrategy,

    /// 是否显示目标模块
    pub show_target: bool,

    /// 是否显示文件名和行号
    pub show_file_line: bool,

    /// 自定义过滤指令（EnvFilter 格式），例如 "dune_modules::module=debug"
    pub filter_directives: Option<String>,

    /// 是否启用 ANSI 颜色（控制台输出）
    pub ansi_colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: "dune-modules".to_string(),
            rotation: RotationStrategy::Daily,
            show_target: true,
            show_file_line: false,
            filter_directives: None,
            ansi_colors: true,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// 从工具配置中的 LogConfig 创建
    pub fn from_log_config(log_config: &crate::core::config::LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: RotationStrategy::parse(&log_config.rotation),
            ..Default::default()
        }
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式输出
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 显示目标模块
    pub fn show_target(mut self, enable: bool) -> Self {
        self.config.show_target = enable;
        self
    }

    /// 显示文件名和行号
    pub fn show_file_line(mut self, enable: bool) -> Self {
        self.config.show_file_line = enable;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    /// 启用 ANSI 颜色
    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 WorkerGuard，丢弃时等待挂起的日志写入完成。
pub struct LogGuard {
    _console_guard: Option<WorkerGuard>,
    _file_guard: Option<WorkerGuard>,
}

impl LogGuard {
    fn empty() -> Self {
        Self {
            _console_guard: None,
            _file_guard: None,
        }
    }
}

// ============================================================================
// 日志系统
// ============================================================================

/// 全局日志初始化状态
static LOGGER_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// 返回的 `LogGuard` 必须保持存活直到程序退出。
    ///
    /// # Errors
    ///
    /// 日志系统已初始化或过滤指令无效时返回 `InitFailed` 错误
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::InitFailed(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = Self::create_env_filter(&config)?;
        let mut guard = LogGuard::empty();

        let console_writer = if config.console_output {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stderr());
            guard._console_guard = Some(console_guard);
            Some(writer)
        } else {
            None
        };

        let file_writer = match config.file_output {
            Some(ref log_dir) => {
                let appender = RollingFileAppender::new(
                    config.rotation.to_rotation(),
                    log_dir,
                    format!("{}.log", config.file_prefix),
                );
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard._file_guard = Some(file_guard);
                Some(writer)
            }
            None => None,
        };

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if config.json_format {
            let console_layer = console_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(config.show_target)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
            });
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(config.show_target)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
            });
            registry.with(console_layer).with(file_layer).try_init()
        } else {
            let console_layer = console_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(config.show_target)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_ansi(config.ansi_colors)
            });
            // 文件不使用 ANSI
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(config.show_target)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_ansi(false)
            });
            registry.with(console_layer).with(file_layer).try_init()
        };

        result.map_err(|e| CoreError::InitFailed(format!("日志系统初始化失败: {}", e)))?;
        let _ = LOGGER_INITIALIZED.set(true);

        Ok(guard)
    }

    /// 尝试初始化日志系统，已初始化或失败时返回空守卫
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_else(|_| LogGuard::empty())
    }

    /// 创建 EnvFilter，`RUST_LOG` 优先于配置中的级别
    fn create_env_filter(config: &LoggerConfig) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| CoreError::InitFailed(format!("无效的日志级别 '{}': {}", config.level, e)))?;

        if let Some(ref directives) = config.filter_directives {
            for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let parsed: Directive = directive.parse().map_err(|e| {
                    CoreError::InitFailed(format!("无效的过滤指令 '{}': {}", directive, e))
                })?;
                filter = filter.add_directive(parsed);
            }
        }

        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LogConfig;

    #[test]
    fn test_rotation_strategy_parse() {
        assert_eq!(RotationStrategy::parse("daily"), RotationStrategy::Daily);
        assert_eq!(RotationStrategy::parse("HOURLY"), RotationStrategy::Hourly);
        assert_eq!(RotationStrategy::parse("none"), RotationStrategy::Never);
        // 无效值返回默认值
        assert_eq!(RotationStrategy::parse("weekly"), RotationStrategy::Daily);
    }

    #[test]
    fn test_rotation_strategy_display() {
        assert_eq!(RotationStrategy::Never.to_string(), "never");
        assert_eq!(RotationStrategy::Hourly.to_string(), "hourly");
        assert_eq!(RotationStrategy::Daily.to_string(), "daily");
    }

    #[test]
    fn test_logger_config_builder() {
        let config = LoggerConfig::builder()
            .level("debug")
            .json_format(true)
            .file_output("/var/log/dune")
            .file_prefix("resolver")
            .rotation(RotationStrategy::Hourly)
            .show_target(false)
            .filter_directives("dune_modules::module=trace")
            .ansi_colors(false)
            .build();

        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/var/log/dune")));
        assert_eq!(config.file_prefix, "resolver");
        assert_eq!(config.rotation, RotationStrategy::Hourly);
        assert!(!config.show_target);
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_from_log_config() {
        let log_config = LogConfig {
            level: "warn".to_string(),
            file_output: true,
            log_dir: Some(PathBuf::from("/tmp/logs")),
            json_format: true,
            rotation: "hourly".to_string(),
        };

        let config = LoggerConfig::from_log_config(&log_config);
        assert_eq!(config.level, "warn");
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(config.rotation, RotationStrategy::Hourly);

        let config = LoggerConfig::from_log_config(&LogConfig::default());
        assert!(config.file_output.is_none());
    }

    #[test]
    fn test_create_env_filter_with_directives() {
        let config = LoggerConfig::builder()
            .level("info")
            .filter_directives("dune_modules=debug, dune_modules::module=trace")
            .build();
        assert!(Logger::create_env_filter(&config).is_ok());
    }

    #[test]
    fn test_logger_try_init_never_fails() {
        let _guard = Logger::try_init(LoggerConfig::default());
        let _guard2 = Logger::try_init(LoggerConfig::default());
    }
}
