//! dune.module 描述文件解析器
//!
//! 负责从 `dune.module` 文本解析 [`ModuleDescriptor`]。
//!
//! 文件格式为按行组织的 `Key: value`：
//!
//! ```text
//! # 注释
//! Module: dune-pdelab
//! Version: 2.5-git
//! Maintainer: dune-pdelab@dune-project.org
//! Depends: dune-common (>= 2.5) dune-grid dune-istl
//! Suggests: dune-alugrid
//! ```

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::module::descriptor::{ConstraintOp, ModuleDescriptor, VersionConstraint};
use crate::utils::{CoreError, Result};

/// 描述文件的默认文件名
pub const DESCRIPTOR_FILENAME: &str = "dune.module";

/// `Key: value` 行
fn key_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z-]*)\s*:\s*(.*)$").expect("固定的正则表达式"))
}

/// 依赖列表中的单个条目：模块名及可选的括号约束
fn dependency_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([^\s()]+)(?:\s*\(([^()]*)\))?").expect("固定的正则表达式")
    })
}

/// 括号内的版本约束，例如 `>= 2.4`
fn constraint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(>=|<=|==|=|>|<)\s*(\S+)\s*$").expect("固定的正则表达式"))
}

/// 可识别的键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorKey {
    Module,
    Version,
    Maintainer,
    WhitespaceHook,
    Depends,
    Suggests,
}

impl DescriptorKey {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "Module" => Some(DescriptorKey::Module),
            "Version" => Some(DescriptorKey::Version),
            "Maintainer" => Some(DescriptorKey::Maintainer),
            "Whitespace-Hook" => Some(DescriptorKey::WhitespaceHook),
            "Depends" => Some(DescriptorKey::Depends),
            "Suggests" => Some(DescriptorKey::Suggests),
            _ => None,
        }
    }
}

/// 依赖列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    /// 模块名
    pub name: String,
    /// 版本约束
    pub constraint: Option<VersionConstraint>,
}

/// 逐行解析时累积的字段
#[derive(Debug, Default)]
struct PartialDescriptor {
    name: Option<String>,
    version: Option<String>,
    maintainer: Option<String>,
    whitespace_hook: bool,
    depends: Vec<DependencyEntry>,
    suggests: Vec<DependencyEntry>,
}

/// dune.module 描述文件解析器
#[derive(Debug, Clone, Default)]
pub struct DescriptorParser;

impl DescriptorParser {
    /// 创建新的解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 从文件解析描述符
    ///
    /// # Errors
    ///
    /// - 文件不存在或无法读取时返回 IO 错误
    /// - 内容格式错误时返回 `Parse` 错误
    /// - 缺少模块名时返回 `Validation` 错误
    pub async fn parse_file(path: &Path) -> Result<ModuleDescriptor> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_str(&content)
    }

    /// 从文件同步解析描述符
    pub fn parse_file_sync(path: &Path) -> Result<ModuleDescriptor> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// 从字符串解析描述符
    ///
    /// 空行和以 `#` 开头的行会被忽略；单值键重复出现时以最后一次为准，
    /// `Depends` / `Suggests` 多次出现时累加。
    pub fn parse_str(content: &str) -> Result<ModuleDescriptor> {
        let mut partial = PartialDescriptor::default();

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let captures = key_line_regex()
                .captures(line)
                .ok_or_else(|| CoreError::parse(line_no, format!("无法识别的行: '{}'", line)))?;
            let key_text = &captures[1];
            let value = captures[2].trim();

            let key = DescriptorKey::parse(key_text)
                .ok_or_else(|| CoreError::parse(line_no, format!("未知的键 '{}'", key_text)))?;

            match key {
                DescriptorKey::Module => {
                    partial.name = Some(Self::single_token(value, key_text, line_no)?);
                }
                DescriptorKey::Version => {
                    partial.version = Some(Self::single_token(value, key_text, line_no)?);
                }
                DescriptorKey::Maintainer => {
                    if value.is_empty() {
                        return Err(CoreError::parse(line_no, "Maintainer 缺少值"));
                    }
                    partial.maintainer = Some(value.to_string());
                }
                DescriptorKey::WhitespaceHook => {
                    partial.whitespace_hook = Self::parse_flag(value, line_no)?;
                }
                DescriptorKey::Depends => {
                    partial.depends.extend(Self::parse_dependency_list(value, line_no)?);
                }
                DescriptorKey::Suggests => {
                    partial.suggests.extend(Self::parse_dependency_list(value, line_no)?);
                }
            }
        }

        Self::build(partial)
    }

    /// 解析依赖列表，例如 `dune-common (>= 2.4) dune-geometry`
    pub fn parse_dependency_list(value: &str, line_no: usize) -> Result<Vec<DependencyEntry>> {
        let mut entries = Vec::new();
        let mut cursor = 0;

        for captures in dependency_entry_regex().captures_iter(value) {
            let whole = captures.get(0).ok_or_else(|| {
                CoreError::Internal("依赖条目匹配缺少整体捕获".to_string())
            })?;

            // 两个条目之间只允许出现空白
            let gap = &value[cursor..whole.start()];
            if !gap.trim().is_empty() {
                return Err(CoreError::parse(
                    line_no,
                    format!("依赖列表格式错误: '{}'", gap.trim()),
                ));
            }
            cursor = whole.end();

            let constraint = match captures.get(2) {
                Some(inner) => Some(Self::parse_constraint(inner.as_str(), line_no)?),
                None => None,
            };

            entries.push(DependencyEntry {
                name: captures[1].to_string(),
                constraint,
            });
        }

        let rest = &value[cursor..];
        if !rest.trim().is_empty() {
            return Err(CoreError::parse(
                line_no,
                format!("依赖列表格式错误: '{}'", rest.trim()),
            ));
        }

        Ok(entries)
    }

    /// 解析括号内的版本约束
    fn parse_constraint(text: &str, line_no: usize) -> Result<VersionConstraint> {
        let captures = constraint_regex()
            .captures(text)
            .ok_or_else(|| CoreError::parse(line_no, format!("无效的版本约束: '({})'", text)))?;

        let op = ConstraintOp::parse(&captures[1])
            .ok_or_else(|| CoreError::parse(line_no, format!("未知的比较运算符 '{}'", &captures[1])))?;

        Ok(VersionConstraint::new(op, &captures[2]))
    }

    /// 解析 Whitespace-Hook 的取值
    fn parse_flag(value: &str, line_no: usize) -> Result<bool> {
        match value.to_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" => Ok(false),
            other => Err(CoreError::parse(
                line_no,
                format!("Whitespace-Hook 的取值无效: '{}'", other),
            )),
        }
    }

    fn single_token(value: &str, key: &str, line_no: usize) -> Result<String> {
        if value.is_empty() {
            return Err(CoreError::parse(line_no, format!("{} 缺少值", key)));
        }
        if value.split_whitespace().count() > 1 {
            return Err(CoreError::parse(
                line_no,
                format!("{} 只能有一个值: '{}'", key, value),
            ));
        }
        Ok(value.to_string())
    }

    fn build(partial: PartialDescriptor) -> Result<ModuleDescriptor> {
        let name = partial
            .name
            .ok_or_else(|| CoreError::Validation("描述文件缺少 Module 字段".to_string()))?;

        let mut descriptor = ModuleDescriptor::new(name)?.with_whitespace_hook(partial.whitespace_hook);
        descriptor.version = partial.version;
        descriptor.maintainer = partial.maintainer;

        for entry in partial.depends {
            if let Some(constraint) = entry.constraint {
                descriptor.constraints.insert(entry.name.clone(), constraint);
            }
            descriptor.depends.insert(entry.name);
        }
        for entry in partial.suggests {
            if let Some(constraint) = entry.constraint {
                descriptor.constraints.entry(entry.name.clone()).or_insert(constraint);
            }
            descriptor.suggests.insert(entry.name);
        }

        Ok(descriptor)
    }
}
