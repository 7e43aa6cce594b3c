//! 模块描述符定义
//!
//! 定义 `dune.module` 描述文件对应的数据结构。

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::utils::{CoreError, Result};

/// 版本约束运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOp {
    /// `>=`
    #[serde(rename = ">=")]
    GreaterEq,
    /// `<=`
    #[serde(rename = "<=")]
    LessEq,
    /// `>`
    #[serde(rename = ">")]
    Greater,
    /// `<`
    #[serde(rename = "<")]
    Less,
    /// `=` 或 `==`
    #[serde(rename = "=")]
    Equal,
}

impl ConstraintOp {
    /// 从运算符文本解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">=" => Some(ConstraintOp::GreaterEq),
            "<=" => Some(ConstraintOp::LessEq),
            ">" => Some(ConstraintOp::Greater),
            "<" => Some(ConstraintOp::Less),
            "=" | "==" => Some(ConstraintOp::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintOp::GreaterEq => ">=",
            ConstraintOp::LessEq => "<=",
            ConstraintOp::Greater => ">",
            ConstraintOp::Less => "<",
            ConstraintOp::Equal => "=",
        };
        f.write_str(s)
    }
}

/// 依赖项后括号中声明的版本约束，例如 `dune-common (>= 2.4)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// 比较运算符
    pub op: ConstraintOp,

    /// 约束版本（原始文本）
    pub version: String,
}

impl VersionConstraint {
    /// 创建版本约束
    pub fn new(op: ConstraintOp, version: impl Into<String>) -> Self {
        Self {
            op,
            version: version.into(),
        }
    }

    /// 检查给定版本是否满足约束
    ///
    /// 版本号后缀（如 `2.6-git` 中的 `-git`）不参与比较。
    ///
    /// # Errors
    ///
    /// 任一版本号无法解析时返回 `VersionParse` 错误
    pub fn matches(&self, version: &str) -> Result<bool> {
        let actual = normalize_version(version)?;
        let required = normalize_version(&self.version)?;

        Ok(match self.op {
            ConstraintOp::GreaterEq => actual >= required,
            ConstraintOp::LessEq => actual <= required,
            ConstraintOp::Greater => actual > required,
            ConstraintOp::Less => actual < required,
            ConstraintOp::Equal => actual == required,
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.op, self.version)
    }
}

/// 将 `2.4`、`2.6-git`、`3` 之类的版本号规整为 semver 版本
fn normalize_version(raw: &str) -> Result<Version> {
    let numeric = raw.trim().split('-').next().unwrap_or_default();
    let mut parts: Vec<&str> = numeric.split('.').take(3).collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Ok(Version::parse(&parts.join("."))?)
}

/// 模块描述符
///
/// 对应一个 `dune.module` 文件。构造后只在依赖闭包解析期间改写
/// `depends` / `suggests`，解析完成后视为不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 模块名（在一次解析过程中唯一）
    pub name: String,

    /// 模块版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// 维护者（通常是邮箱地址）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,

    /// Whitespace-Hook 开关
    #[serde(default)]
    pub whitespace_hook: bool,

    /// 必需依赖
    #[serde(default)]
    pub depends: BTreeSet<String>,

    /// 建议依赖
    #[serde(default)]
    pub suggests: BTreeSet<String>,

    /// 直接依赖上声明的版本约束
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, VersionConstraint>,
}

impl ModuleDescriptor {
    /// 创建新的模块描述符
    ///
    /// # Errors
    ///
    /// 模块名为空时返回 `Validation` 错误
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Validation("模块名不能为空".to_string()));
        }

        Ok(Self {
            name,
            version: None,
            maintainer: None,
            whitespace_hook: false,
            depends: BTreeSet::new(),
            suggests: BTreeSet::new(),
            constraints: BTreeMap::new(),
        })
    }

    /// 设置版本号
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// 设置维护者
    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.maintainer = Some(maintainer.into());
        self
    }

    /// 设置 Whitespace-Hook 标记
    pub fn with_whitespace_hook(mut self, enabled: bool) -> Self {
        self.whitespace_hook = enabled;
        self
    }

    /// 添加必需依赖
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends.insert(name.into());
        self
    }

    /// 添加建议依赖
    pub fn suggest(mut self, name: impl Into<String>) -> Self {
        self.suggests.insert(name.into());
        self
    }

    /// 为直接依赖记录版本约束
    pub fn with_constraint(mut self, name: impl Into<String>, constraint: VersionConstraint) -> Self {
        self.constraints.insert(name.into(), constraint);
        self
    }

    /// 两个描述符是否指向同一模块（按名称判断）
    pub fn same_module(&self, other: &ModuleDescriptor) -> bool {
        self.name == other.name
    }

    /// 是否没有任何依赖或建议
    pub fn is_leaf(&self) -> bool {
        self.depends.is_empty() && self.suggests.is_empty()
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(ref version) => write!(f, "{} {}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}
