use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use steward::assistant::CliAssistant;
use steward::briefing;
use steward::config::Config;
use steward::demo;
use steward::orchestrator::Orchestrator;
use steward::scheduler::Scheduler;
use steward::social;
use steward::store::Vault;
use steward::sync::SyncTransport;
use steward::watchers::FileWatcher;
use steward::web::{self, AppState};
use steward::zone::{WorkZone, validate_credentials};

#[derive(Parser)]
#[command(name = "steward")]
#[command(version, about = "Split-zone AI task pipeline over a shared vault")]
pub struct Cli {
    /// Vault location; overrides VAULT_PATH.
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline (daemon by default)
    Run {
        /// Run a single cycle and exit (for external cron)
        #[arg(long)]
        once: bool,
    },
    /// Serve the web dashboard without event ingestion
    DashboardOnly,
    /// Scripted end-to-end walkthrough against a temporary vault
    Demo,
    /// Create the vault layout and exit
    Init,
    /// Generate a period briefing
    Brief {
        #[arg(long, default_value = "7")]
        days: i64,
    },
    /// Drive a multi-step assistant task until it declares completion
    Task {
        /// The task prompt
        prompt: String,
        #[arg(long, default_value = "10")]
        max_iterations: u32,
        /// Completion strategy: promise-tag or file-movement
        #[arg(long, default_value = "promise-tag")]
        strategy: TaskStrategy,
        /// Required for the file-movement strategy
        #[arg(long)]
        task_file: Option<PathBuf>,
    },
    /// Vault sync transport operations
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum TaskStrategy {
    PromiseTag,
    FileMovement,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show transport status
    Status,
    /// Commit local changes and push
    Push {
        #[arg(long, default_value = "vault sync")]
        message: String,
    },
    /// Pull remote changes
    Pull,
    /// Pull then push
    Full,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(vault) = cli.vault.clone() {
        config.vault_path = vault;
    }

    init_tracing(&config.log_level);

    match &cli.command {
        Commands::Run { once } => cmd_run(&config, *once).await,
        Commands::DashboardOnly => cmd_dashboard_only(&config).await,
        Commands::Demo => demo::run_demo().await,
        Commands::Init => cmd_init(&config),
        Commands::Brief { days } => cmd_brief(&config, *days),
        Commands::Task { prompt, max_iterations, strategy, task_file } => {
            cmd_task(&config, prompt, *max_iterations, *strategy, task_file.clone()).await
        }
        Commands::Sync { command } => cmd_sync(&config, command).await,
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("steward={log_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_vault(config: &Config) -> Result<Vault> {
    let vault = Vault::new(&config.vault_path);
    vault.ensure_layout().context("failed to prepare vault layout")?;
    Ok(vault)
}

fn report_credentials(zone: WorkZone) {
    for warning in validate_credentials(zone).warnings {
        tracing::warn!("{warning}");
    }
}

fn build_orchestrator(config: &Config, vault: &Vault) -> Orchestrator {
    let assistant = Arc::new(CliAssistant::new(&config.assistant_cmd, &config.assistant_model));
    Orchestrator::new(
        vault.clone(),
        assistant,
        config.work_zone,
        config.auto_approve_threshold,
        config.daily_send_limit,
    )
    .with_social_sinks(social::sinks_from_env())
}

async fn cmd_run(config: &Config, once: bool) -> Result<()> {
    let vault = open_vault(config)?;
    tracing::info!("vault ready at {}", vault.root().display());
    report_credentials(config.work_zone);

    if config.auto_approve_enabled() {
        tracing::info!("auto-approve enabled (threshold: {})", config.auto_approve_threshold);
    } else {
        tracing::info!("auto-approve disabled (threshold: 1.0)");
    }

    // The mail provider is an external collaborator; without one wired in,
    // the pipeline still plans, executes file drops and serves approvals.
    tracing::warn!("no mail provider configured; running without the mail watcher");

    let mut scheduler = Scheduler::new(build_orchestrator(config, &vault));

    if config.file_watch_enabled {
        let assistant =
            Arc::new(CliAssistant::new(&config.assistant_cmd, &config.assistant_model));
        let mode = if config.file_watch_dry_run { "dry-run" } else { "live" };
        tracing::info!("file watcher enabled ({mode})");
        scheduler = scheduler.with_file_watcher(FileWatcher::new(
            vault.clone(),
            assistant,
            config.file_watch_dry_run,
        ));
    }

    if config.sync_enabled {
        scheduler = scheduler.with_transport(SyncTransport::new(&vault));
    }

    let web_handle = if config.web_enabled && !once {
        let state = Arc::new(AppState::new(vault.clone(), config.work_zone));
        let port = config.web_port;
        Some(tokio::spawn(async move { web::serve(state, port).await }))
    } else {
        None
    };

    if once {
        let report = scheduler.run_cycle().await;
        println!(
            "cycle complete: {} emails, {} files, {} planned, {} executed, {} reviewed, \
             {} restored, {} updates merged",
            report.emails_detected,
            report.files_detected,
            report.actions_processed,
            report.approved_executed,
            report.rejections_reviewed,
            report.quarantine_restored,
            report.updates_merged
        );
    } else {
        scheduler.run_daemon(Duration::from_secs(config.check_interval)).await?;
    }

    if let Some(handle) = web_handle {
        handle.abort();
    }
    Ok(())
}

async fn cmd_dashboard_only(config: &Config) -> Result<()> {
    let vault = open_vault(config)?;
    report_credentials(config.work_zone);
    let state = Arc::new(AppState::new(vault, config.work_zone));
    web::serve(state, config.web_port).await
}

fn cmd_init(config: &Config) -> Result<()> {
    let vault = open_vault(config)?;
    println!("Vault initialized at: {}", vault.root().display());
    Ok(())
}

fn cmd_brief(config: &Config, days: i64) -> Result<()> {
    let vault = open_vault(config)?;
    let content = briefing::generate_briefing(&vault, days)?;
    let path = briefing::save_briefing(&vault, &content)?;
    println!("Briefing saved to: {}", path.display());
    Ok(())
}

async fn cmd_task(
    config: &Config,
    prompt: &str,
    max_iterations: u32,
    strategy: TaskStrategy,
    task_file: Option<PathBuf>,
) -> Result<()> {
    use steward::driver::{CompletionStrategy, LoopOptions, run_task_loop};

    let vault = open_vault(config)?;
    let assistant = CliAssistant::new(&config.assistant_cmd, &config.assistant_model);
    let options = LoopOptions {
        max_iterations,
        strategy: match strategy {
            TaskStrategy::PromiseTag => CompletionStrategy::PromiseTag,
            TaskStrategy::FileMovement => CompletionStrategy::FileMovement,
        },
        task_file,
    };
    let outcome = run_task_loop(&vault, &assistant, prompt, &options).await?;
    println!(
        "completed: {} after {} iteration(s) ({})",
        outcome.completed,
        outcome.iterations,
        outcome.strategy.as_str()
    );
    if !outcome.output.is_empty() {
        println!("\n{}", outcome.output);
    }
    Ok(())
}

async fn cmd_sync(config: &Config, command: &SyncCommands) -> Result<()> {
    let vault = open_vault(config)?;
    let transport = SyncTransport::new(&vault);
    match command {
        SyncCommands::Status => {
            let status = transport.status();
            println!("repo: {}", status.is_repo);
            println!("remote: {}", status.has_remote);
            println!("pending changes: {}", status.pending_changes);
            println!("last sync: {}", status.last_sync);
        }
        SyncCommands::Push { message } => {
            transport.init_sync()?;
            let pushed = transport.push(message).await?;
            println!("{}", if pushed { "pushed" } else { "nothing to push" });
        }
        SyncCommands::Pull => {
            let pulled = transport.pull().await?;
            println!("{}", if pulled { "pulled new changes" } else { "already up to date" });
        }
        SyncCommands::Full => {
            transport.init_sync()?;
            let outcome = transport.sync("vault sync").await?;
            println!("pulled: {}, pushed: {}", outcome.pulled, outcome.pushed);
        }
    }
    Ok(())
}
