//! # Dune Modules - 模块依赖解析
//!
//! 读取 `dune.module` 描述文件，并计算模块的完整依赖闭包：
//!
//! - **描述文件解析**: `Module`、`Version`、`Depends`、`Suggests` 等字段
//! - **仓库注册表**: 模块名到 git 仓库地址的映射，支持地址提示覆盖
//! - **描述文件获取**: 从 git 仓库或本地目录取得依赖模块的描述文件
//! - **依赖闭包**: 递归合并传递依赖，并把只经建议引入的模块归为建议
//! - **参数文件**: 分层的 ini 风格 `key = value` 文件
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use dune_modules::{ClosureResolver, DescriptorParser, GitFetcher, RepositoryRegistry};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let module = DescriptorParser::parse_file(Path::new("dune.module")).await?;
//!
//!     let fetcher = GitFetcher::new(RepositoryRegistry::official());
//!     let resolved = ClosureResolver::new(fetcher).resolve(module).await?;
//!
//!     println!("{}", resolved);
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 描述符、解析器、仓库注册表、获取与依赖闭包
//! - `parametertree` - 参数文件解析
//! - `core` - 工具配置
//! - `utils` - 错误类型与日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod parametertree;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    ClosureReport, ClosureResolver, ConstraintOp, DependencyEntry, DescriptorParser, GitFetcher,
    LocalFetcher, ModuleDescriptor, ModuleFetcher, RepositoryRegistry, ResolutionCache,
    StaticFetcher, VersionConstraint, DESCRIPTOR_FILENAME,
};

pub use parametertree::{ParameterTree, ParameterTreeParser};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, CoreError, Result};

pub use core::config::{FetchConfig, LogConfig, ToolConfig, ToolConfigBuilder};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
