//! 核心模块
//!
//! 包含工具配置。

pub mod config;

pub use config::{FetchConfig, LogConfig, ToolConfig, ToolConfigBuilder};
