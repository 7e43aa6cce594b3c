//! 依赖闭包集成测试
//!
//! 从磁盘上的描述文件出发，经由本地目录或真实 git 仓库完成整个解析流程

use dune_modules::{
    ClosureReport, ClosureResolver, CoreError, DescriptorParser, GitFetcher, LocalFetcher,
    RepositoryRegistry, ResolutionCache,
};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// 在 `<root>/<name>/dune.module` 写入描述文件
async fn write_module(root: &Path, name: &str, content: &str) {
    let dir = root.join(name);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("dune.module"), content).await.unwrap();
}

/// 构造一个小型模块树：
///
/// ```text
/// dune-pdelab -> dune-grid -> dune-geometry -> dune-common
///             ~> dune-alugrid -> dune-grid
///                             ~> dune-uggrid -> dune-common
/// ```
async fn module_tree() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write_module(root, "dune-common", "Module: dune-common\nVersion: 2.9.0\n").await;
    write_module(
        root,
        "dune-geometry",
        "Module: dune-geometry\nVersion: 2.9.0\nDepends: dune-common (>= 2.9)\n",
    )
    .await;
    write_module(
        root,
        "dune-grid",
        "Module: dune-grid\nVersion: 2.9.0\nDepends: dune-geometry dune-common\n",
    )
    .await;
    write_module(root, "dune-uggrid", "Module: dune-uggrid\nDepends: dune-common\n").await;
    write_module(
        root,
        "dune-alugrid",
        "Module: dune-alugrid\nDepends: dune-grid\nSuggests: dune-uggrid\n",
    )
    .await;

    temp_dir
}

/// 测试完整的本地解析流程
#[tokio::test]
async fn test_local_closure_workflow() {
    let modules = module_tree().await;

    let project = TempDir::new().unwrap();
    let descriptor = project.path().join("dune.module");
    tokio::fs::write(
        &descriptor,
        "# 项目描述\nModule: dune-pdelab\nVersion: 2.9-git\nMaintainer: dev@example.org\n\
         Depends: dune-grid (>= 2.8)\nSuggests: dune-alugrid\n",
    )
    .await
    .unwrap();

    let module = DescriptorParser::parse_file(&descriptor).await.unwrap();
    let resolver = ClosureResolver::new(LocalFetcher::new(modules.path()));
    let mut cache = ResolutionCache::new();
    let resolved = resolver.resolve_with_cache(module, &mut cache).await.unwrap();

    let depends: Vec<_> = resolved.depends.iter().map(String::as_str).collect();
    assert_eq!(depends, vec!["dune-common", "dune-geometry", "dune-grid"]);

    // dune-grid 等已是必需依赖，只剩下仅经建议引入的模块
    let suggests: Vec<_> = resolved.suggests.iter().map(String::as_str).collect();
    assert_eq!(suggests, vec!["dune-alugrid", "dune-uggrid"]);

    assert_eq!(resolved.version.as_deref(), Some("2.9-git"));
    assert_eq!(resolved.maintainer.as_deref(), Some("dev@example.org"));

    // 每个模块只获取一次
    let mut fetched = cache.fetched().to_vec();
    fetched.sort();
    assert_eq!(
        fetched,
        vec!["dune-alugrid", "dune-common", "dune-geometry", "dune-grid", "dune-uggrid"]
    );

    let report = ClosureReport::new(resolved, &cache);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["module"]["name"], "dune-pdelab");
    assert_eq!(json["fetched"].as_array().unwrap().len(), 5);
}

/// 测试 `<root>/<name>.module` 形式的本地描述文件
#[tokio::test]
async fn test_local_fetcher_flat_layout() {
    let temp_dir = TempDir::new().unwrap();
    tokio::fs::write(
        temp_dir.path().join("dune-common.module"),
        "Module: dune-common\n",
    )
    .await
    .unwrap();

    let root = DescriptorParser::parse_str("Module: app\nDepends: dune-common\n").unwrap();
    let resolved = ClosureResolver::new(LocalFetcher::new(temp_dir.path()))
        .resolve(root)
        .await
        .unwrap();

    assert!(resolved.depends.contains("dune-common"));
    assert!(resolved.suggests.is_empty());
}

/// 测试缺失的依赖模块
#[tokio::test]
async fn test_missing_dependency_is_reported() {
    let modules = module_tree().await;
    let root = DescriptorParser::parse_str("Module: app\nDepends: dune-grid dune-fem\n").unwrap();

    let err = ClosureResolver::new(LocalFetcher::new(modules.path()))
        .resolve(root)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Lookup(ref name) if name == "dune-fem"));
    assert_eq!(err.error_code(), "RESOLVE-001");
}

/// 测试磁盘上的循环依赖
#[tokio::test]
async fn test_cycle_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    write_module(temp_dir.path(), "a", "Module: a\nDepends: b\n").await;
    write_module(temp_dir.path(), "b", "Module: b\nSuggests: a\n").await;

    let root = DescriptorParser::parse_str("Module: app\nDepends: a\n").unwrap();
    let err = ClosureResolver::new(LocalFetcher::new(temp_dir.path()))
        .resolve(root)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::CircularDependency(_)));
}

/// 测试无法解析的依赖描述文件
#[tokio::test]
async fn test_invalid_dependency_descriptor() {
    let temp_dir = TempDir::new().unwrap();
    write_module(temp_dir.path(), "broken", "Module: broken\nDepends: x (~> 1)\n").await;

    let root = DescriptorParser::parse_str("Module: app\nDepends: broken\n").unwrap();
    let err = ClosureResolver::new(LocalFetcher::new(temp_dir.path()))
        .resolve(root)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Parse { line: 2, .. }));
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// 创建只含一个 dune.module 的 git 仓库，返回 file:// 地址
fn init_repo(parent: &Path, name: &str, descriptor: &str) -> String {
    let repo = parent.join(name);
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("dune.module"), descriptor).unwrap();

    let git = |args: &[&str]| {
        let status = Command::new("git")
            .args(["-c", "user.email=test@example.org", "-c", "user.name=test"])
            .args(["-c", "init.defaultBranch=master", "-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(&repo)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} 失败", args);
    };
    git(&["init", "-q"]);
    git(&["add", "dune.module"]);
    git(&["commit", "-q", "-m", "init"]);

    format!("file://{}", repo.display())
}

/// 测试通过真实 git 仓库获取描述文件
#[tokio::test]
async fn test_git_fetch_from_local_repositories() {
    if !git_available() {
        eprintln!("未找到 git，跳过");
        return;
    }

    let repos = TempDir::new().unwrap();
    let common_url = init_repo(repos.path(), "dune-common", "Module: dune-common\n");
    let geometry_url = init_repo(
        repos.path(),
        "dune-geometry",
        "Module: dune-geometry\nDepends: dune-common\n",
    );

    let mut registry = RepositoryRegistry::new();
    registry.register("dune-geometry", geometry_url);
    // 注册表中的地址无效，由地址提示覆盖
    registry.register("dune-common", "file:///nonexistent/dune-common");

    let workdir = TempDir::new().unwrap();
    let fetcher = GitFetcher::new(registry)
        .with_hint("dune-common", common_url)
        .with_workdir(workdir.path());

    let root = DescriptorParser::parse_str("Module: app\nDepends: dune-geometry\n").unwrap();
    let resolved = ClosureResolver::new(fetcher).resolve(root).await.unwrap();

    assert!(resolved.depends.contains("dune-geometry"));
    assert!(resolved.depends.contains("dune-common"));

    // 临时克隆目录已清理
    let leftovers: Vec<_> = std::fs::read_dir(workdir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

/// 测试仓库中缺少描述文件
#[tokio::test]
async fn test_git_fetch_missing_descriptor() {
    if !git_available() {
        eprintln!("未找到 git，跳过");
        return;
    }

    let repos = TempDir::new().unwrap();
    let repo = repos.path().join("empty");
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("README"), "no descriptor").unwrap();
    for args in [
        vec!["init", "-q"],
        vec!["add", "README"],
        vec!["commit", "-q", "-m", "init"],
    ] {
        let status = Command::new("git")
            .args(["-c", "user.email=test@example.org", "-c", "user.name=test"])
            .args(["-c", "commit.gpgsign=false"])
            .args(&args)
            .current_dir(&repo)
            .status()
            .unwrap();
        assert!(status.success());
    }

    let workdir = TempDir::new().unwrap();
    let fetcher = GitFetcher::new(RepositoryRegistry::new())
        .with_hint("empty", format!("file://{}", repo.display()))
        .with_workdir(workdir.path());

    let root = DescriptorParser::parse_str("Module: app\nDepends: empty\n").unwrap();
    let err = ClosureResolver::new(fetcher).resolve(root).await.unwrap_err();

    assert!(matches!(err, CoreError::Fetch { ref module, .. } if module == "empty"));
}
