//! Dune Modules 命令行入口
//!
//! 解析 `dune.module` 描述文件并计算依赖闭包。
//!
//! # 命令概览
//!
//! - `closure` - 计算模块的完整依赖闭包
//! - `parse` - 解析并显示单个描述文件
//! - `ini` - 解析参数文件
//! - `repos` - 列出仓库注册表
//! - `check-config` - 验证配置文件
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! # 计算当前目录模块的依赖闭包
//! dune-modules closure dune.module
//!
//! # 使用自定义仓库地址
//! dune-modules closure dune.module --hint dune-common=https://example.org/dune-common.git
//!
//! # 从本地目录读取依赖模块，并以 JSON 输出
//! dune-modules closure dune.module --local ../modules --json
//!
//! # 检查配置文件
//! dune-modules check-config -c dune-modules.yaml
//! ```

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};

use dune_modules::{
    ClosureReport, ClosureResolver, CoreError, DescriptorParser, GitFetcher, LocalFetcher, Logger,
    LoggerConfig, ModuleDescriptor, ModuleFetcher, ParameterTreeParser, RepositoryRegistry,
    ResolutionCache, ToolConfig,
};

/// Dune Modules - 模块依赖解析工具
#[derive(Parser)]
#[command(name = "dune-modules")]
#[command(version, about = "解析 dune.module 描述文件并计算依赖闭包", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "dune-modules.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示文件名和行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 计算依赖闭包
    ///
    /// 读取描述文件，逐个获取依赖与建议模块的描述文件，输出合并后的结果。
    Closure {
        /// 描述文件路径
        #[arg(default_value = "dune.module")]
        file: PathBuf,

        /// 地址提示（格式: name=url），可重复
        #[arg(long = "hint", value_name = "NAME=URL")]
        hints: Vec<String>,

        /// 从本地目录读取依赖模块，不访问 git
        #[arg(long, value_name = "DIR")]
        local: Option<PathBuf>,

        /// 临时克隆所在目录
        #[arg(long, value_name = "DIR")]
        workdir: Option<PathBuf>,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 解析描述文件
    Parse {
        /// 描述文件路径
        #[arg(default_value = "dune.module")]
        file: PathBuf,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 解析参数文件，输出 JSON
    Ini {
        /// 参数文件路径
        file: PathBuf,

        /// 所有键的公共前缀
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// 列出仓库注册表（含配置文件追加的仓库）
    Repos,

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 查看版本信息
    Version,
}

/// 解析 `name=url` 形式的地址提示
fn parse_hints(raw: &[String]) -> Result<HashMap<String, String>, CoreError> {
    raw.iter()
        .map(|hint| {
            let (name, url) = hint.split_once('=').ok_or_else(|| {
                CoreError::Validation(format!("地址提示格式应为 name=url: '{}'", hint))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::Validation(format!("地址提示缺少模块名: '{}'", hint)));
            }
            Ok((name.to_string(), url.trim().to_string()))
        })
        .collect()
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(config_path: &Path) -> Result<ToolConfig, CoreError> {
    if config_path.exists() {
        let config = ToolConfig::from_file(config_path).await?;
        debug!(path = %config_path.display(), "已加载配置文件");
        Ok(config)
    } else {
        Ok(ToolConfig::default())
    }
}

/// 由命令行参数构造覆盖配置
///
/// `--dev`、`closure --workdir` 和 `closure --hint` 经 [`ToolConfig::merge`] 生效。
fn cli_overrides(cli: &Cli) -> Result<ToolConfig, CoreError> {
    let mut builder = ToolConfig::builder();
    if cli.dev {
        builder = builder.dev_mode();
    }
    if let Commands::Closure { hints, workdir, .. } = &cli.command {
        if let Some(dir) = workdir {
            builder = builder.workdir(dir.clone());
        }
        for (name, url) in parse_hints(hints)? {
            builder = builder.hint(name, url);
        }
    }
    Ok(builder.build())
}

/// 日志配置：`-l` 直接覆盖级别
///
/// `merge` 把默认级别 "info" 视为未设置，显式的 `-l info` 也必须生效。
fn logger_config(config: &ToolConfig, log_level: Option<&str>) -> LoggerConfig {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = log_level {
        logger_config.level = level.to_string();
    }
    logger_config.show_file_line = config.dev_mode;
    logger_config
}

async fn resolve_with<F: ModuleFetcher>(
    fetcher: F,
    module: ModuleDescriptor,
) -> Result<ClosureReport, CoreError> {
    let resolver = ClosureResolver::new(fetcher);
    let mut cache = ResolutionCache::new();
    let resolved = resolver.resolve_with_cache(module, &mut cache).await?;
    Ok(ClosureReport::new(resolved, &cache))
}

/// 计算依赖闭包
async fn run_closure(
    config: &ToolConfig,
    file: &Path,
    local: Option<PathBuf>,
    json: bool,
) -> Result<(), CoreError> {
    let module = DescriptorParser::parse_file(file).await?;
    info!(module = %module.name, file = %file.display(), "开始计算依赖闭包");

    let report = match local {
        Some(root) => resolve_with(LocalFetcher::new(root), module).await?,
        None => resolve_with(GitFetcher::from_config(config), module).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_descriptor(&report.module);
        println!("  获取次数:   {}", report.fetched.len());
    }
    Ok(())
}

/// 解析单个描述文件
async fn run_parse(file: &Path, json: bool) -> Result<(), CoreError> {
    let module = DescriptorParser::parse_file(file).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
    } else {
        print_descriptor(&module);
    }
    Ok(())
}

/// 解析参数文件
async fn run_ini(file: &Path, prefix: &str) -> Result<(), CoreError> {
    let content = tokio::fs::read_to_string(file).await?;
    let tree = ParameterTreeParser::parse_str_with_prefix(&content, prefix)?;
    debug!(entries = tree.len(), "参数文件已解析");
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// 列出仓库注册表
fn list_repositories(config: &ToolConfig) {
    let mut registry = RepositoryRegistry::official();
    registry.extend(config.repositories.clone());

    println!();
    println!("仓库注册表 ({} 个)", registry.len());
    println!("═══════════════════════════════════════");
    for (name, url) in registry.iter() {
        let marker = if config.hints.contains_key(name) { " (有地址提示)" } else { "" };
        println!("  {:<20} {}{}", name, url, marker);
    }
    println!("═══════════════════════════════════════");
    println!();
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), CoreError> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&ToolConfig::default());
        return Ok(());
    }

    match ToolConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!();
            print_config(&config);
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(e)
        }
    }
}

fn print_config(config: &ToolConfig) {
    let yes_no = |b: bool| if b { "是" } else { "否" };

    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [获取配置]");
    match config.fetch.workdir {
        Some(ref dir) => println!("    工作目录:       {}", dir.display()),
        None => println!("    工作目录:       {} (系统临时目录)", std::env::temp_dir().display()),
    }
    println!("    git 程序:       {}", config.fetch.git_program);
    match config.fetch.timeout_secs {
        Some(secs) => println!("    超时:           {} 秒", secs),
        None => println!("    超时:           不限"),
    }
    println!();
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", yes_no(config.logging.file_output));
    println!("    JSON 格式:      {}", yes_no(config.logging.json_format));
    println!();
    println!("  [仓库]");
    println!("    追加仓库:       {}", config.repositories.len());
    println!("    地址提示:       {}", config.hints.len());
    println!();
    println!("  [其他]");
    println!("    开发模式:       {}", yes_no(config.dev_mode));
    println!("────────────────────────────────────────");
}

fn print_descriptor(module: &ModuleDescriptor) {
    let join = |names: &std::collections::BTreeSet<String>| {
        if names.is_empty() {
            "(无)".to_string()
        } else {
            names.iter().cloned().collect::<Vec<_>>().join(" ")
        }
    };

    println!("  模块:       {}", module.name);
    if let Some(ref version) = module.version {
        println!("  版本:       {}", version);
    }
    if let Some(ref maintainer) = module.maintainer {
        println!("  维护者:     {}", maintainer);
    }
    println!("  依赖:       {}", join(&module.depends));
    println!("  建议:       {}", join(&module.suggests));
    for (name, constraint) in &module.constraints {
        println!("  约束:       {} {}", name, constraint);
    }
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Dune Modules - 模块依赖解析");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", dune_modules::VERSION);
    println!("  描述文件:         {}", dune_modules::DESCRIPTOR_FILENAME);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    // Version 和 CheckConfig 命令不需要加载配置和日志
    match &cli.command {
        Commands::Version => {
            print_version();
            return Ok(());
        }
        Commands::CheckConfig { config } => {
            let config_path = config.as_deref().unwrap_or(&cli.config);
            return check_config(config_path).await;
        }
        _ => {}
    }

    let mut config = load_config(&cli.config).await?;
    config.merge(cli_overrides(&cli)?);

    let _guard = Logger::init(logger_config(&config, cli.log_level.as_deref()))?;

    match cli.command {
        Commands::Closure {
            file, local, json, ..
        } => run_closure(&config, &file, local, json).await,
        Commands::Parse { file, json } => run_parse(&file, json).await,
        Commands::Ini { file, prefix } => run_ini(&file, &prefix).await,
        Commands::Repos => {
            list_repositories(&config);
            Ok(())
        }
        Commands::Version | Commands::CheckConfig { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("错误 [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_flags_merge_into_config() {
        let cli = Cli::parse_from([
            "dune-modules",
            "--dev",
            "closure",
            "dune.module",
            "--workdir",
            "/tmp/cli-work",
            "--hint",
            "dune-common=https://example.org/forks/dune-common.git",
        ]);

        let mut config = ToolConfig::builder()
            .workdir("/tmp/file-work")
            .hint("dune-grid", "https://example.org/dune-grid.git")
            .fetch_timeout_secs(30)
            .build();
        config.merge(cli_overrides(&cli).unwrap());

        assert!(config.dev_mode);
        assert_eq!(config.fetch.workdir, Some(PathBuf::from("/tmp/cli-work")));
        assert_eq!(config.fetch.timeout_secs, Some(30));
        // 配置文件中的提示保留，命令行提示追加
        assert_eq!(config.hints.len(), 2);

        let fetcher = GitFetcher::from_config(&config);
        assert_eq!(fetcher.workdir(), Path::new("/tmp/cli-work"));
    }

    #[test]
    fn test_invalid_hint_is_rejected() {
        let cli = Cli::parse_from(["dune-modules", "closure", "--hint", "no-equals-sign"]);
        assert!(matches!(cli_overrides(&cli), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_explicit_log_level_wins_over_file() {
        let config = ToolConfig::builder().log_level("debug").dev_mode().build();

        let logger = logger_config(&config, Some("info"));
        assert_eq!(logger.level, "info");
        assert!(logger.show_file_line);

        let logger = logger_config(&config, None);
        assert_eq!(logger.level, "debug");
    }

    #[test]
    fn test_overrides_without_flags_leave_config_unchanged() {
        let cli = Cli::parse_from(["dune-modules", "repos"]);
        let original = ToolConfig::builder()
            .repository("a", "https://example.org/a.git")
            .build();

        let mut config = original.clone();
        config.merge(cli_overrides(&cli).unwrap());
        assert_eq!(config, original);
    }
}
