//! 参数树
//!
//! 解析层级式 `.ini` 风格的键值文件，得到以点号分隔键名的扁平映射。

pub mod parser;
pub mod tree;

pub use parser::ParameterTreeParser;
pub use tree::ParameterTree;
