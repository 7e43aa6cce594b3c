//! 模块仓库注册表
//!
//! 维护模块名到远程 git 仓库地址的映射。

use std::collections::{BTreeMap, HashMap};

use crate::utils::{CoreError, Result};

/// 官方仓库列表
const OFFICIAL_REPOSITORIES: &[(&str, &str)] = &[
    ("dune-alugrid", "https://gitlab.dune-project.org/extensions/dune-alugrid.git"),
    ("dune-common", "https://gitlab.dune-project.org/core/dune-common.git"),
    ("dune-geometry", "https://gitlab.dune-project.org/core/dune-geometry.git"),
    ("dune-grid", "https://gitlab.dune-project.org/core/dune-grid.git"),
    ("dune-functions", "https://gitlab.dune-project.org/staging/dune-functions.git"),
    ("dune-istl", "https://gitlab.dune-project.org/core/dune-istl.git"),
    ("dune-localfunctions", "https://gitlab.dune-project.org/core/dune-localfunctions.git"),
    ("dune-pdelab", "https://gitlab.dune-project.org/pdelab/dune-pdelab.git"),
    ("dune-pdelab-howto", "https://gitlab.dune-project.org/pdelab/dune-pdelab-howto.git"),
    (
        "dune-pdelab-systemtesting",
        "https://gitlab.dune-project.org/quality/dune-pdelab-systemtesting.git",
    ),
    ("dune-pdelab-tutorials", "https://gitlab.dune-project.org/pdelab/dune-pdelab-tutorials.git"),
    ("dune-python", "https://gitlab.dune-project.org/quality/dune-python.git"),
    ("dune-testtools", "https://gitlab.dune-project.org/quality/dune-testtools"),
    ("dune-typetree", "https://gitlab.dune-project.org/pdelab/dune-typetree.git"),
];

/// 模块仓库注册表
///
/// 查找顺序：调用方提供的提示映射优先，其次是注册表本身。
#[derive(Debug, Clone, Default)]
pub struct RepositoryRegistry {
    /// module name -> git url
    repos: BTreeMap<String, String>,
}

impl RepositoryRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            repos: BTreeMap::new(),
        }
    }

    /// 创建包含官方仓库的注册表
    pub fn official() -> Self {
        let repos = OFFICIAL_REPOSITORIES
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect();
        Self { repos }
    }

    /// 注册（或覆盖）一个仓库地址
    pub fn register(&mut self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        let url = url.into();
        tracing::debug!(module = %name, url = %url, "注册仓库地址");
        self.repos.insert(name, url);
    }

    /// 批量注册
    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, url) in entries {
            self.register(name, url);
        }
    }

    /// 查询注册表中的地址
    pub fn get(&self, name: &str) -> Option<&str> {
        self.repos.get(name).map(String::as_str)
    }

    /// 解析模块的仓库地址
    ///
    /// # Errors
    ///
    /// 提示映射和注册表中都没有该模块时返回 `Lookup` 错误
    pub fn resolve_url(&self, name: &str, hints: &HashMap<String, String>) -> Result<String> {
        if let Some(url) = hints.get(name).filter(|url| !url.is_empty()) {
            return Ok(url.clone());
        }
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| CoreError::Lookup(name.to_string()))
    }

    /// 是否包含指定模块
    pub fn contains(&self, name: &str) -> bool {
        self.repos.contains_key(name)
    }

    /// 已注册模块数
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// 按模块名排序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.repos.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
