use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rs_flock::render::{render_outcome, render_summary};
use rs_flock::{FlockManager, RunReport, Settings};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

#[derive(Parser)]
#[command(name = "rs-flock", version)]
#[command(about = "Run commands and push files on groups of SSH hosts", long_about = None)]
struct Cli {
    /// hosts 文件，覆盖配置中的路径
    #[arg(short, long, global = true)]
    inventory: Option<PathBuf>,

    /// YAML 或 JSON 配置文件
    #[arg(short, long, env = "FLOCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// 最大并发会话数，0 表示不限制
    #[arg(short, long, global = true)]
    forks: Option<usize>,

    /// 建立连接的超时（秒）
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    /// 整次运行的超时（秒）
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    /// -v 输出 info，-vv 输出 debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在匹配的主机上执行命令
    Exec {
        pattern: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// 向匹配的主机推送文件
    Copy {
        pattern: String,
        src: PathBuf,
        dest: String,
        #[arg(long)]
        buffer_size: Option<usize>,
    },
    /// 列出匹配的主机及其分组
    List {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(&cli)?;
    let manager = FlockManager::from_settings(settings)
        .context("Failed to load inventory")?;

    // Ctrl-C 取消当前运行，未完成的主机记为失败
    let token = manager.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    let report = match &cli.command {
        Commands::Exec { pattern, command } => {
            manager.execute_command(pattern, &command.join(" ")).await?
        }
        Commands::Copy {
            pattern, src, dest, ..
        } => manager.copy_file(pattern, src, dest).await?,
        Commands::List { pattern } => {
            for target in manager.resolve(pattern)?.iter() {
                let groups = manager.inventory().groups_of(target.host());
                if groups.is_empty() {
                    println!("{}\t(unmatched)", target.host());
                } else {
                    println!("{}\t{}", target.host(), groups.join(","));
                }
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    print_report(&report, &cli)?;

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(inventory) = &cli.inventory {
        settings.inventory = inventory.clone();
    }
    if let Some(forks) = cli.forks {
        settings.forks = forks;
    }
    if let Some(secs) = cli.connect_timeout {
        settings.connect_timeout_secs = secs;
    }
    if let Some(secs) = cli.timeout {
        settings.run_timeout_secs = Some(secs);
    }
    if let Commands::Copy {
        buffer_size: Some(size),
        ..
    } = &cli.command
    {
        settings.transfer_buffer_size = *size;
    }
    Ok(settings)
}

fn print_report(report: &RunReport, cli: &Cli) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let color = !cli.no_color && std::io::stdout().is_terminal();
    for outcome in &report.outcomes {
        print!("{}", render_outcome(outcome, color));
    }
    eprintln!("{}", render_summary(report, color));
    Ok(())
}
