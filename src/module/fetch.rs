//! 模块描述文件获取
//!
//! 依赖闭包解析器通过 [`ModuleFetcher`] 按模块名获取新解析出的描述符。
//!
//! - [`GitFetcher`] - 浅克隆远程仓库，只检出 `dune.module`，解析后删除克隆
//! - [`LocalFetcher`] - 从本地目录读取描述文件
//! - [`StaticFetcher`] - 内存中的描述符表，并记录每次获取

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::ToolConfig;
use crate::module::descriptor::ModuleDescriptor;
use crate::module::parser::{DescriptorParser, DESCRIPTOR_FILENAME};
use crate::module::repositories::RepositoryRegistry;
use crate::utils::{CoreError, Result};

/// 模块描述符获取接口
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// 获取并解析指定模块的描述文件
    async fn fetch(&self, name: &str) -> Result<ModuleDescriptor>;
}

/// 基于 git 的描述符获取器
///
/// 每次获取都在工作目录下创建独立的临时目录，无论成功与否都会在返回前删除。
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// 仓库注册表
    registry: RepositoryRegistry,

    /// 调用方提供的地址提示，优先于注册表
    hints: HashMap<String, String>,

    /// 临时克隆所在的工作目录
    workdir: PathBuf,

    /// git 可执行文件
    git_program: String,

    /// 单次获取超时
    timeout: Option<Duration>,
}

impl GitFetcher {
    /// 使用给定注册表创建获取器
    pub fn new(registry: RepositoryRegistry) -> Self {
        Self {
            registry,
            hints: HashMap::new(),
            workdir: std::env::temp_dir(),
            git_program: "git".to_string(),
            timeout: None,
        }
    }

    /// 根据工具配置创建获取器
    pub fn from_config(config: &ToolConfig) -> Self {
        let mut registry = RepositoryRegistry::official();
        registry.extend(config.repositories.clone());

        let mut fetcher = Self::new(registry)
            .with_hints(config.hints.clone())
            .with_git_program(config.fetch.git_program.clone());
        if let Some(ref workdir) = config.fetch.workdir {
            fetcher = fetcher.with_workdir(workdir.clone());
        }
        if let Some(secs) = config.fetch.timeout_secs {
            fetcher = fetcher.with_timeout(Duration::from_secs(secs));
        }
        fetcher
    }

    /// 合并一组地址提示
    pub fn with_hints(mut self, hints: HashMap<String, String>) -> Self {
        self.hints.extend(hints);
        self
    }

    /// 添加单个地址提示
    pub fn with_hint(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.hints.insert(name.into(), url.into());
        self
    }

    /// 设置临时克隆所在的工作目录
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// 设置 git 可执行文件
    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.git_program = program.into();
        self
    }

    /// 设置单次获取超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 仓库注册表
    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    /// 工作目录
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn fetch_inner(&self, name: &str) -> Result<ModuleDescriptor> {
        ensure_plain_name(name)?;
        let url = self.registry.resolve_url(name, &self.hints)?;
        info!(module = %name, url = %url, "获取模块描述文件");

        tokio::fs::create_dir_all(&self.workdir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("gdmf-")
            .tempdir_in(&self.workdir)?;
        let clone_path = scratch.path().join(name);

        self.run_git(
            name,
            scratch.path(),
            &[
                OsStr::new("clone"),
                OsStr::new("-n"),
                OsStr::new("--depth"),
                OsStr::new("1"),
                OsStr::new(&url),
                clone_path.as_os_str(),
            ],
        )
        .await?;

        self.run_git(
            name,
            &clone_path,
            &[
                OsStr::new("checkout"),
                OsStr::new("HEAD"),
                OsStr::new(DESCRIPTOR_FILENAME),
            ],
        )
        .await?;

        let descriptor = DescriptorParser::parse_file(&clone_path.join(DESCRIPTOR_FILENAME)).await?;
        if descriptor.name != name {
            warn!(
                module = %name,
                declared = %descriptor.name,
                "描述文件中的模块名与请求的模块名不一致"
            );
        }

        scratch.close()?;
        debug!(module = %name, "已删除临时克隆");

        Ok(descriptor)
    }

    async fn run_git(&self, module: &str, cwd: &Path, args: &[&OsStr]) -> Result<()> {
        let subcommand = args
            .first()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(module = %module, cwd = %cwd.display(), command = %subcommand, "执行 git");

        let output = Command::new(&self.git_program)
            .args(args)
            .current_dir(cwd)
            // 不允许 git 在终端上询问凭据
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CoreError::fetch(module, format!("无法执行 '{}': {}", self.git_program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::fetch(
                module,
                format!("git {} 失败 ({}): {}", subcommand, output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl ModuleFetcher for GitFetcher {
    async fn fetch(&self, name: &str) -> Result<ModuleDescriptor> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_inner(name))
                .await
                .map_err(|_| CoreError::FetchTimeout {
                    module: name.to_string(),
                    timeout: limit,
                })?,
            None => self.fetch_inner(name).await,
        }
    }
}

/// 模块名会被拼接为路径，只允许单个普通路径段
fn ensure_plain_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && !name.contains("..")
        && !name.contains(|c: char| c == '/' || c == '\\' || c == ':')
        && name != ".";
    if plain {
        Ok(())
    } else {
        warn!(module = %name, "模块名不是合法的路径段");
        Err(CoreError::Lookup(name.to_string()))
    }
}

/// 从本地目录读取描述文件
///
/// 依次查找 `<root>/<name>/dune.module` 和 `<root>/<name>.module`。
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    /// 以 `root` 为根目录创建获取器
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, name: &str) -> [PathBuf; 2] {
        [
            self.root.join(name).join(DESCRIPTOR_FILENAME),
            self.root.join(format!("{}.module", name)),
        ]
    }
}

#[async_trait]
impl ModuleFetcher for LocalFetcher {
    async fn fetch(&self, name: &str) -> Result<ModuleDescriptor> {
        ensure_plain_name(name)?;
        for path in self.candidates(name) {
            if tokio::fs::try_exists(&path).await? {
                debug!(module = %name, path = %path.display(), "读取本地描述文件");
                return DescriptorParser::parse_file(&path).await;
            }
        }
        Err(CoreError::Lookup(name.to_string()))
    }
}

/// 内存中的描述符表
///
/// 每次获取返回一份新的拷贝，并按顺序记录被请求的模块名。
#[derive(Debug, Default)]
pub struct StaticFetcher {
    modules: HashMap<String, ModuleDescriptor>,
    calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加描述符
    pub fn insert(&mut self, module: ModuleDescriptor) {
        self.modules.insert(module.name.clone(), module);
    }

    /// 添加描述符（链式）
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.insert(module);
        self
    }

    /// 已请求的模块名（按请求顺序）
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

impl FromIterator<ModuleDescriptor> for StaticFetcher {
    fn from_iter<I: IntoIterator<Item = ModuleDescriptor>>(iter: I) -> Self {
        let mut fetcher = StaticFetcher::new();
        for module in iter {
            fetcher.insert(module);
        }
        fetcher
    }
}

#[async_trait]
impl ModuleFetcher for StaticFetcher {
    async fn fetch(&self, name: &str) -> Result<ModuleDescriptor> {
        self.calls.lock().await.push(name.to_string());
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::Lookup(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_fetcher_records_calls() {
        let fetcher: StaticFetcher = [
            ModuleDescriptor::new("a").unwrap(),
            ModuleDescriptor::new("b").unwrap().depends_on("a"),
        ]
        .into_iter()
        .collect();

        let b = fetcher.fetch("b").await.unwrap();
        assert!(b.depends.contains("a"));
        assert!(matches!(fetcher.fetch("c").await, Err(CoreError::Lookup(_))));
        assert_eq!(fetcher.calls().await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_local_fetcher_layouts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("dune-common")).unwrap();
        std::fs::write(
            dir.path().join("dune-common").join(DESCRIPTOR_FILENAME),
            "Module: dune-common\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("dune-geometry.module"),
            "Module: dune-geometry\nDepends: dune-common\n",
        )
        .unwrap();

        let fetcher = LocalFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("dune-common").await.unwrap().name, "dune-common");
        let geometry = fetcher.fetch("dune-geometry").await.unwrap();
        assert!(geometry.depends.contains("dune-common"));
        assert!(matches!(fetcher.fetch("dune-grid").await, Err(CoreError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_git_fetcher_unknown_module_is_lookup_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = GitFetcher::new(RepositoryRegistry::official()).with_workdir(dir.path());

        let result = fetcher.fetch("dune-not-registered").await;
        assert!(matches!(result, Err(CoreError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_git_fetcher_missing_program_is_fetch_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = GitFetcher::new(RepositoryRegistry::official())
            .with_workdir(dir.path())
            .with_git_program("definitely-not-a-git-binary");

        let result = fetcher.fetch("dune-common").await;
        assert!(matches!(result, Err(CoreError::Fetch { ref module, .. }) if module == "dune-common"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_git_fetcher_failing_clone_cleans_up() {
        let dir = TempDir::new().unwrap();
        let fetcher = GitFetcher::new(RepositoryRegistry::new())
            .with_hint("dune-foo", "file:///nonexistent/dune-foo.git")
            .with_workdir(dir.path())
            .with_git_program("false");

        let result = fetcher.fetch("dune-foo").await;
        assert!(matches!(result, Err(CoreError::Fetch { .. })));

        // 临时目录在失败后也被删除
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_git_fetcher_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("slow-git.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let workdir = dir.path().join("work");
        let fetcher = GitFetcher::new(RepositoryRegistry::official())
            .with_workdir(&workdir)
            .with_git_program(script.to_string_lossy())
            .with_timeout(Duration::from_millis(200));

        let result = fetcher.fetch("dune-common").await;
        match result {
            Err(CoreError::FetchTimeout { module, timeout }) => {
                assert_eq!(module, "dune-common");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("期望超时错误，实际为 {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_git_runs_without_terminal_prompt() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let env_log = dir.path().join("git-env.txt");
        let script = dir.path().join("fake-git.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"prompt=[$GIT_TERMINAL_PROMPT] askpass=[${{GIT_ASKPASS-unset}}]\" >> '{}'\nexit 128\n",
                env_log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fetcher = GitFetcher::new(RepositoryRegistry::official())
            .with_workdir(dir.path().join("work"))
            .with_git_program(script.to_string_lossy());

        let result = fetcher.fetch("dune-common").await;
        assert!(matches!(result, Err(CoreError::Fetch { .. })));

        let recorded = std::fs::read_to_string(&env_log).unwrap();
        assert_eq!(recorded.trim(), "prompt=[0] askpass=[]");
    }

    #[tokio::test]
    async fn test_path_like_names_are_rejected() {
        let root = TempDir::new().unwrap();
        let inner = root.path().join("modules");
        std::fs::create_dir(&inner).unwrap();
        // 根目录之外的描述文件
        std::fs::create_dir(root.path().join("outside")).unwrap();
        std::fs::write(
            root.path().join("outside").join(DESCRIPTOR_FILENAME),
            "Module: outside\n",
        )
        .unwrap();

        let fetcher = LocalFetcher::new(&inner);
        for name in ["../outside", "..", "a/b", "a\\b", ""] {
            let result = fetcher.fetch(name).await;
            assert!(matches!(result, Err(CoreError::Lookup(_))), "名称 '{}' 应被拒绝", name);
        }

        let git = GitFetcher::new(RepositoryRegistry::new())
            .with_hint("../escape", "file:///nonexistent")
            .with_workdir(root.path().join("work"))
            .with_git_program("definitely-not-a-git-binary");
        assert!(matches!(git.fetch("../escape").await, Err(CoreError::Lookup(_))));
    }

    #[test]
    fn test_from_config() {
        let config = ToolConfig::builder()
            .workdir("/tmp/dune-work")
            .repository("my-module", "https://example.org/my-module.git")
            .hint("dune-common", "https://example.org/dune-common.git")
            .fetch_timeout_secs(30)
            .build();

        let fetcher = GitFetcher::from_config(&config);
        assert_eq!(fetcher.workdir(), Path::new("/tmp/dune-work"));
        assert!(fetcher.registry().contains("my-module"));
        assert!(fetcher.registry().contains("dune-grid"));
        assert_eq!(fetcher.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            fetcher.hints.get("dune-common").map(String::as_str),
            Some("https://example.org/dune-common.git")
        );
    }
}
