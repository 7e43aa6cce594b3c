//! 扁平参数树

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::utils::{CoreError, Result};

/// 以点号分隔键名的参数集合，例如 `group.subgroup.y`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterTree {
    values: BTreeMap<String, String>,
}

impl ParameterTree {
    /// 创建空参数树
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置参数，已存在时覆盖并返回旧值
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// 获取原始字符串值
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 获取并转换为指定类型
    ///
    /// # Errors
    ///
    /// 值存在但无法转换时返回 `ConfigLoadFailed` 错误
    pub fn get_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                CoreError::ConfigLoadFailed(format!("参数 '{}' 的值 '{}' 无效: {}", key, raw, e))
            }),
        }
    }

    /// 是否包含指定键
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// 取出某个前缀下的子树，键名去掉前缀
    pub fn sub(&self, prefix: &str) -> ParameterTree {
        let prefix = format!("{}.", prefix.trim_end_matches('.'));
        let values = self
            .values
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();
        ParameterTree { values }
    }

    /// 参数数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 参数树是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 按键名排序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 转换为普通映射
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.values
    }
}
