//! 模块描述与依赖管理
//!
//! 包含模块描述相关的核心组件：
//! - 描述符定义与 dune.module 解析
//! - 仓库注册表与描述文件获取
//! - 依赖闭包解析

pub mod closure;
pub mod descriptor;
pub mod fetch;
pub mod parser;
pub mod repositories;

// 重导出常用类型
pub use closure::{ClosureReport, ClosureResolver, ResolutionCache};
pub use descriptor::{ConstraintOp, ModuleDescriptor, VersionConstraint};
pub use fetch::{GitFetcher, LocalFetcher, ModuleFetcher, StaticFetcher};
pub use parser::{DependencyEntry, DescriptorParser, DESCRIPTOR_FILENAME};
pub use repositories::RepositoryRegistry;
