//! 错误类型定义
//!
//! 本模块定义了描述文件解析、依赖闭包解析和参数树解析中使用的所有错误类型。

use std::time::Duration;

use thiserror::Error;

/// 核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 描述文件错误 ====================

    /// 描述符字段校验失败（例如缺少模块名）
    #[error("校验失败: {0}")]
    Validation(String),

    /// 描述文件格式错误
    #[error("描述文件解析失败 (第 {line} 行): {message}")]
    Parse {
        /// 出错的行号（从 1 开始）
        line: usize,
        /// 错误描述
        message: String,
    },

    // ==================== 依赖解析错误 ====================

    /// 找不到模块对应的仓库地址
    #[error("找不到模块 '{0}' 的仓库地址")]
    Lookup(String),

    /// 拉取模块描述文件失败
    #[error("拉取模块失败: '{module}' - {reason}")]
    Fetch {
        /// 模块名
        module: String,
        /// 失败原因（包含 git 的 stderr）
        reason: String,
    },

    /// 拉取模块超时
    #[error("拉取模块超时: '{module}' 超过 {timeout:?}")]
    FetchTimeout {
        /// 模块名
        module: String,
        /// 超时上限
        timeout: Duration,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 参数树文件格式错误
    #[error("参数文件解析失败 (第 {line} 行): {message}")]
    ConfigParse {
        /// 出错的行号（从 1 开始）
        line: usize,
        /// 错误描述
        message: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 描述文件错误 (DESCRIPTOR-xxx)
    /// 描述符校验失败
    pub const DESCRIPTOR_INVALID: &str = "DESCRIPTOR-001";
    /// 描述文件格式错误
    pub const DESCRIPTOR_PARSE_FAILED: &str = "DESCRIPTOR-002";

    // 解析错误 (RESOLVE-xxx)
    /// 找不到仓库地址
    pub const RESOLVE_LOOKUP_FAILED: &str = "RESOLVE-001";
    /// 拉取失败
    pub const RESOLVE_FETCH_FAILED: &str = "RESOLVE-002";
    /// 拉取超时
    pub const RESOLVE_FETCH_TIMEOUT: &str = "RESOLVE-003";
    /// 循环依赖
    pub const RESOLVE_CIRCULAR_DEPENDENCY: &str = "RESOLVE-004";

    // 配置错误 (CONFIG-xxx)
    /// 配置加载失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    /// 参数文件格式错误
    pub const CONFIG_PARSE_FAILED: &str = "CONFIG-002";

    // 其他
    /// IO 错误
    pub const IO_ERROR: &str = "IO-001";
    /// 版本号无效
    pub const VERSION_INVALID: &str = "VERSION-001";
    /// 未分类错误
    pub const UNKNOWN: &str = "UNKNOWN";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => error_code::DESCRIPTOR_INVALID,
            CoreError::Parse { .. } => error_code::DESCRIPTOR_PARSE_FAILED,
            CoreError::Lookup(_) => error_code::RESOLVE_LOOKUP_FAILED,
            CoreError::Fetch { .. } => error_code::RESOLVE_FETCH_FAILED,
            CoreError::FetchTimeout { .. } => error_code::RESOLVE_FETCH_TIMEOUT,
            CoreError::CircularDependency(_) => error_code::RESOLVE_CIRCULAR_DEPENDENCY,
            CoreError::ConfigLoadFailed(_) | CoreError::Yaml(_) | CoreError::Json(_) => {
                error_code::CONFIG_LOAD_FAILED
            }
            CoreError::ConfigParse { .. } => error_code::CONFIG_PARSE_FAILED,
            CoreError::Io(_) => error_code::IO_ERROR,
            CoreError::VersionParse(_) => error_code::VERSION_INVALID,
            _ => error_code::UNKNOWN,
        }
    }

    /// 构造拉取失败错误
    pub fn fetch(module: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Fetch {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// 构造描述文件解析错误
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        CoreError::Parse {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Lookup("dune-foo".to_string());
        assert!(err.to_string().contains("dune-foo"));

        let err = CoreError::parse(3, "未知的键 'Foo'");
        assert!(err.to_string().contains("第 3 行"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::Lookup("dune-foo".to_string());
        assert_eq!(err.error_code(), error_code::RESOLVE_LOOKUP_FAILED);

        let err = CoreError::fetch("dune-grid", "git clone 失败");
        assert_eq!(err.error_code(), error_code::RESOLVE_FETCH_FAILED);

        let err = CoreError::CircularDependency("a -> b -> a".to_string());
        assert_eq!(err.error_code(), error_code::RESOLVE_CIRCULAR_DEPENDENCY);
    }

    #[test]
    fn test_sub_second_timeout_display() {
        let err = CoreError::FetchTimeout {
            module: "dune-grid".to_string(),
            timeout: Duration::from_millis(200),
        };
        assert!(err.to_string().contains("200ms"));
        assert_eq!(err.error_code(), error_code::RESOLVE_FETCH_TIMEOUT);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert_eq!(core_err.error_code(), error_code::IO_ERROR);
    }
}
