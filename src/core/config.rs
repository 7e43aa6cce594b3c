//! 工具配置
//!
//! 定义工具的配置结构和加载逻辑。配置文件可以是 YAML 或 JSON（按扩展名判断）。
//!
//! ```yaml
//! fetch:
//!   workdir: /tmp/dune-work
//!   timeout_secs: 120
//! logging:
//!   level: debug
//! repositories:
//!   my-module: https://example.org/my-module.git
//! hints:
//!   dune-common: https://example.org/forks/dune-common.git
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// 描述文件获取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// 临时克隆所在的工作目录（默认系统临时目录）
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// git 可执行文件
    #[serde(default = "default_git_program")]
    pub git_program: String,

    /// 单次获取超时（秒），不设置则不限时
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_git_program() -> String {
    "git".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            git_program: default_git_program(),
            timeout_secs: None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 工具配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 获取配置
    #[serde(default)]
    pub fetch: FetchConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 追加到官方注册表的仓库地址
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,

    /// 地址提示，优先于注册表
    #[serde(default)]
    pub hints: HashMap<String, String>,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

impl ToolConfig {
    /// 创建配置构建器
    pub fn builder() -> ToolConfigBuilder {
        ToolConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> crate::utils::Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;

        let mut config: ToolConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        Ok(config)
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: ToolConfig) {
        // 只覆盖非默认值的配置
        if other.fetch.workdir.is_some() {
            self.fetch.workdir = other.fetch.workdir;
        }
        if other.fetch.git_program != default_git_program() {
            self.fetch.git_program = other.fetch.git_program;
        }
        if other.fetch.timeout_secs.is_some() {
            self.fetch.timeout_secs = other.fetch.timeout_secs;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        self.repositories.extend(other.repositories);
        self.hints.extend(other.hints);
        if other.dev_mode {
            self.dev_mode = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct ToolConfigBuilder {
    config: ToolConfig,
}

impl ToolConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: ToolConfig::default(),
        }
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置临时克隆工作目录
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fetch.workdir = Some(dir.into());
        self
    }

    /// 设置 git 可执行文件
    pub fn git_program(mut self, program: impl Into<String>) -> Self {
        self.config.fetch.git_program = program.into();
        self
    }

    /// 设置单次获取超时
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch.timeout_secs = Some(secs);
        self
    }

    /// 追加仓库地址
    pub fn repository(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.repositories.insert(name.into(), url.into());
        self
    }

    /// 添加地址提示
    pub fn hint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.hints.insert(name.into(), url.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> ToolConfig {
        self.config
    }
}
