//! 参数树文件解析器
//!
//! 文件格式：
//!
//! ```text
//! # 注释
//! x = 5
//! [group]
//! x = 5
//! [subgroup]
//! y = str
//! []
//! z = 1
//! ```
//!
//! - `[name]` 在当前段之下开启子段，`[a.b]` 相当于依次开启 `a`、`b`
//! - `[]` 回到顶层
//! - 以 `#` 或 `;` 开头的行是注释
//! - 值两侧成对的单引号或双引号会被去掉
//!
//! 上例得到 `x=5`、`group.x=5`、`group.subgroup.y=str`、`z=1`。

use std::path::Path;

use crate::parametertree::tree::ParameterTree;
use crate::utils::{CoreError, Result};

/// 参数树文件解析器
#[derive(Debug, Clone, Default)]
pub struct ParameterTreeParser;

impl ParameterTreeParser {
    /// 创建解析器
    pub fn new() -> Self {
        Self
    }

    /// 从文件解析
    pub async fn parse_file(path: &Path) -> Result<ParameterTree> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_str(&content)
    }

    /// 从文件同步解析
    pub fn parse_file_sync(path: &Path) -> Result<ParameterTree> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// 从字符串解析
    pub fn parse_str(content: &str) -> Result<ParameterTree> {
        Self::parse_str_with_prefix(content, "")
    }

    /// 从字符串解析，所有键都放在 `prefix` 之下
    ///
    /// # Errors
    ///
    /// 出现无法识别的行、空键名或未闭合的段头时返回 `ConfigParse` 错误
    pub fn parse_str_with_prefix(content: &str, prefix: &str) -> Result<ParameterTree> {
        let base = Self::split_path(prefix, 0)?;
        let mut section: Vec<String> = Vec::new();
        let mut tree = ParameterTree::new();

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| CoreError::ConfigParse {
                    line: line_no,
                    message: format!("段头缺少 ']': '{}'", line),
                })?;

                if name.trim().is_empty() {
                    section.clear();
                } else {
                    section.extend(Self::split_path(name, line_no)?);
                }
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| CoreError::ConfigParse {
                line: line_no,
                message: format!("无法识别的行: '{}'", line),
            })?;

            let key_path = Self::split_path(key, line_no)?;
            if key_path.is_empty() {
                return Err(CoreError::ConfigParse {
                    line: line_no,
                    message: "键名不能为空".to_string(),
                });
            }

            let full_key = base
                .iter()
                .chain(section.iter())
                .chain(key_path.iter())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(".");

            if let Some(old) = tree.insert(full_key.clone(), Self::unquote(value.trim())) {
                tracing::debug!(key = %full_key, old = %old, "参数被覆盖");
            }
        }

        Ok(tree)
    }

    /// 把 `a.b.c` 拆成各段；空白路径返回空列表，中间出现空段视为错误
    fn split_path(path: &str, line_no: usize) -> Result<Vec<String>> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(Vec::new());
        }

        path.split('.')
            .map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    Err(CoreError::ConfigParse {
                        line: line_no,
                        message: format!("名称中存在空段: '{}'", path),
                    })
                } else {
                    Ok(part.to_string())
                }
            })
            .collect()
    }

    fn unquote(value: &str) -> String {
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}
