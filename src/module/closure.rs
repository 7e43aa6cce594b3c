//! 依赖闭包解析
//!
//! 给定一个只声明了直接依赖的模块，递归获取并解析每个依赖/建议模块的描述文件，
//! 把传递依赖合并进根模块。
//!
//! # 主要组件
//!
//! - [`ResolutionCache`] - 单次解析过程的缓存：模块名 -> 已完整解析的描述符
//! - [`ClosureResolver`] - 依赖闭包解析器
//!
//! # 规则
//!
//! - `depends` 合并每个必需依赖自身的（完整）`depends`
//! - `suggests` 合并每个建议依赖的 `depends` 和 `suggests`，再去掉已在 `depends` 中的模块
//! - 每个模块名在一次解析中最多获取一次
//! - 遇到环时返回 `CoreError::CircularDependency`
//!
//! # 示例
//!
//! ```rust
//! use dune_modules::module::{ClosureResolver, ModuleDescriptor, StaticFetcher};
//!
//! # tokio_test_block(async {
//! let fetcher: StaticFetcher = [
//!     ModuleDescriptor::new("dune-common").unwrap(),
//!     ModuleDescriptor::new("dune-geometry").unwrap().depends_on("dune-common"),
//! ]
//! .into_iter()
//! .collect();
//!
//! let root = ModuleDescriptor::new("my-module").unwrap().depends_on("dune-geometry");
//! let resolved = ClosureResolver::new(fetcher).resolve(root).await.unwrap();
//! assert!(resolved.depends.contains("dune-common"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::module::descriptor::ModuleDescriptor;
use crate::module::fetch::ModuleFetcher;
use crate::utils::{CoreError, Result};

/// 单次解析过程的缓存
///
/// 由调用方显式创建并在整个递归过程中传递。缓存中的描述符总是已完整解析的，
/// 正在解析中的模块只记录在解析栈上。
#[derive(Debug, Default)]
pub struct ResolutionCache {
    /// 已完整解析的模块
    resolved: HashMap<String, ModuleDescriptor>,

    /// 正在解析的模块（从根到当前）
    in_progress: Vec<String>,

    /// 按顺序记录的获取过的模块名
    fetched: Vec<String>,
}

impl ResolutionCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已有指定模块的完整解析结果
    pub fn contains(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    /// 获取已解析的模块
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.resolved.get(name)
    }

    /// 插入模块，已存在同名条目时保留旧条目
    ///
    /// 返回是否发生了插入。
    pub fn insert_if_absent(&mut self, module: ModuleDescriptor) -> bool {
        if self.resolved.contains_key(&module.name) {
            return false;
        }
        self.resolved.insert(module.name.clone(), module);
        true
    }

    /// 本次解析中获取过的模块名（按获取顺序）
    pub fn fetched(&self) -> &[String] {
        &self.fetched
    }

    /// 已缓存模块数
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// 按模块名排序的已解析模块
    pub fn modules(&self) -> Vec<&ModuleDescriptor> {
        let mut modules: Vec<&ModuleDescriptor> = self.resolved.values().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        modules
    }

    fn is_in_progress(&self, name: &str) -> bool {
        self.in_progress.iter().any(|n| n == name)
    }

    /// 环路径，例如 `a -> b -> a`
    fn cycle_path(&self, name: &str) -> String {
        let start = self
            .in_progress
            .iter()
            .position(|n| n == name)
            .unwrap_or(0);
        let mut path: Vec<&str> = self.in_progress[start..].iter().map(String::as_str).collect();
        path.push(name);
        path.join(" -> ")
    }

    fn enter(&mut self, name: &str) -> Result<()> {
        if self.is_in_progress(name) {
            return Err(CoreError::CircularDependency(self.cycle_path(name)));
        }
        self.in_progress.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self, name: &str) {
        if let Some(pos) = self.in_progress.iter().rposition(|n| n == name) {
            self.in_progress.remove(pos);
        }
    }
}

/// 依赖闭包解析器
pub struct ClosureResolver<F> {
    fetcher: F,
}

impl<F: ModuleFetcher> ClosureResolver<F> {
    /// 使用给定的获取器创建解析器
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// 获取器
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// 解析模块的完整依赖闭包
    ///
    /// 每次调用都使用新建的缓存。
    pub async fn resolve(&self, module: ModuleDescriptor) -> Result<ModuleDescriptor> {
        let mut cache = ResolutionCache::new();
        self.resolve_with_cache(module, &mut cache).await
    }

    /// 使用调用方提供的缓存解析模块的完整依赖闭包
    ///
    /// # Errors
    ///
    /// - 获取器无法找到模块时返回 `Lookup` 错误
    /// - 克隆或检出失败时返回 `Fetch` / `FetchTimeout` 错误
    /// - 描述文件格式错误时返回 `Parse` / `Validation` 错误
    /// - 存在环时返回 `CircularDependency` 错误
    pub fn resolve_with_cache<'a>(
        &'a self,
        module: ModuleDescriptor,
        cache: &'a mut ResolutionCache,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleDescriptor>> + Send + 'a>> {
        Box::pin(async move {
            let name = module.name.clone();
            cache.enter(&name)?;
            let result = self.resolve_closure(module, cache).await;
            cache.leave(&name);
            result
        })
    }

    async fn resolve_closure(
        &self,
        mut module: ModuleDescriptor,
        cache: &mut ResolutionCache,
    ) -> Result<ModuleDescriptor> {
        debug!(
            module = %module.name,
            depends = module.depends.len(),
            suggests = module.suggests.len(),
            "开始解析依赖闭包"
        );

        // 1-2. 必需依赖
        let mut depends_closure = BTreeSet::new();
        for dep in module.depends.iter().cloned().collect::<Vec<_>>() {
            let resolved = self.ensure_resolved(&dep, cache).await?;
            Self::check_constraint(&module, resolved);
            depends_closure.extend(resolved.depends.iter().cloned());
        }
        module.depends.extend(depends_closure);

        // 3-4. 建议依赖：建议模块自身的依赖和建议都只能算作建议
        let mut suggests_closure = BTreeSet::new();
        for suggestion in module.suggests.iter().cloned().collect::<Vec<_>>() {
            let resolved = self.ensure_resolved(&suggestion, cache).await?;
            Self::check_constraint(&module, resolved);
            suggests_closure.extend(resolved.depends.iter().cloned());
            suggests_closure.extend(resolved.suggests.iter().cloned());
        }
        module.suggests.extend(suggests_closure);
        let depends = &module.depends;
        module.suggests.retain(|name| !depends.contains(name));

        // 5. 先到先得
        cache.insert_if_absent(module.clone());

        info!(
            module = %module.name,
            depends = module.depends.len(),
            suggests = module.suggests.len(),
            "依赖闭包解析完成"
        );
        Ok(module)
    }

    /// 确保模块已在缓存中，必要时获取并递归解析
    async fn ensure_resolved<'c>(
        &self,
        name: &str,
        cache: &'c mut ResolutionCache,
    ) -> Result<&'c ModuleDescriptor> {
        if !cache.contains(name) {
            if cache.is_in_progress(name) {
                return Err(CoreError::CircularDependency(cache.cycle_path(name)));
            }

            cache.fetched.push(name.to_string());
            let fetched = self.fetcher.fetch(name).await?;
            let resolved = self.resolve_with_cache(fetched, cache).await?;

            // 描述文件中声明的模块名可能与请求的名称不同，按请求的名称缓存
            if resolved.name != name {
                let mut renamed = resolved;
                renamed.name = name.to_string();
                cache.insert_if_absent(renamed);
            }
        }

        cache
            .get(name)
            .ok_or_else(|| CoreError::Internal(format!("模块 '{}' 解析后未进入缓存", name)))
    }

    /// 检查直接依赖是否满足声明的版本约束，不满足时只记录警告
    fn check_constraint(module: &ModuleDescriptor, dependency: &ModuleDescriptor) {
        let Some(constraint) = module.constraints.get(&dependency.name) else {
            return;
        };
        let Some(ref version) = dependency.version else {
            return;
        };

        match constraint.matches(version) {
            Ok(true) => {}
            Ok(false) => warn!(
                module = %module.name,
                dependency = %dependency.name,
                version = %version,
                constraint = %constraint,
                "依赖版本不满足约束"
            ),
            Err(e) => debug!(
                module = %module.name,
                dependency = %dependency.name,
                error = %e,
                "无法比较依赖版本"
            ),
        }
    }
}

/// 依赖闭包解析结果报告
#[derive(Debug, Clone, Serialize)]
pub struct ClosureReport {
    /// 已解析的根模块
    pub module: ModuleDescriptor,

    /// 解析过程中获取过的模块
    pub fetched: Vec<String>,

    /// 解析完成时间
    pub resolved_at: DateTime<Utc>,
}

impl ClosureReport {
    /// 由解析结果和本次使用的缓存生成报告
    pub fn new(module: ModuleDescriptor, cache: &ResolutionCache) -> Self {
        Self {
            module,
            fetched: cache.fetched().to_vec(),
            resolved_at: Utc::now(),
        }
    }
}
