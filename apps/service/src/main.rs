mod config;
mod database;
mod monitoring;
mod pool;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use config::Config;
use database::models::{HistoryFilter, NewProbe};
use database::{DatabaseImpl, ProbeStore, TimelineStore, initialize_database};
use monitoring::command::split_command;
use monitoring::condition::parse as parse_condition;
use monitoring::{AlertDispatcher, Checker, LogDispatcher, MonitorStatus, MonitoringScheduler, WebhookDispatcher};

/// Periodic service health checker
#[derive(Parser)]
#[command(name = "pochta")]
#[command(about = "Runs HTTP probes on an interval, records uptime and alerts when services go down")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "POCHTA_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check all probes forever, sleeping the configured interval between cycles
    Run,
    /// Run a single check cycle and print the results as JSON
    Check,
    /// Manage probe definitions
    Probe {
        #[command(subcommand)]
        action: ProbeCommand,
    },
    /// Latest status of every probe
    Status,
    /// Recent uptime samples, newest first
    History {
        /// Only samples of this probe
        #[arg(long)]
        probe: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum ProbeCommand {
    /// Add a probe
    Add {
        #[arg(long)]
        name: String,
        /// curl command line, e.g. "curl https://example.com/health"
        #[arg(long)]
        command: String,
        /// Condition deciding whether the probe is up, e.g. "response_code == 200"
        #[arg(long)]
        condition: String,
    },
    /// Change fields of an existing probe
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        condition: Option<String>,
    },
    List,
    Show {
        id: i64,
    },
    Remove {
        id: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Up,
    Down,
}

impl From<StatusArg> for MonitorStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Up => MonitorStatus::Up,
            StatusArg::Down => MonitorStatus::Down,
        }
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Reject probes the checker could never run
fn validate_probe(command: &str, condition: &str) -> Result<()> {
    split_command(command).context("invalid probe command")?;
    parse_condition(condition).context("invalid probe condition")?;
    Ok(())
}

async fn open_database(config: &Config) -> Result<Arc<DatabaseImpl>> {
    let pool = pool::open_pool(&config.database.path)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;

    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);

    Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
}

fn alert_dispatcher(config: &Config) -> Result<Arc<dyn AlertDispatcher>> {
    let dispatcher: Arc<dyn AlertDispatcher> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookDispatcher::new(url.clone())?),
        None => {
            info!("No webhook configured, down alerts are only logged");
            Arc::new(LogDispatcher)
        }
    };
    Ok(dispatcher)
}

async fn run(config: &Config, db: Arc<DatabaseImpl>) -> Result<()> {
    let interval = config.check_interval()?;
    let scheduler = Arc::new(MonitoringScheduler::new(
        db.clone(),
        db,
        alert_dispatcher(config)?,
        Checker::new(config.check_timeout()),
        interval,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = scheduler.spawn(shutdown_rx);

    tokio::select! {
        finished = &mut handle => return finished?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Shutdown requested, finishing current cycle");
        }
    }

    let _ = shutdown_tx.send(true);
    handle.await?
}

async fn check_once(config: &Config, db: Arc<DatabaseImpl>) -> Result<()> {
    let scheduler = MonitoringScheduler::new(
        db.clone(),
        db,
        alert_dispatcher(config)?,
        Checker::new(config.check_timeout()),
        config.check_interval().unwrap_or_default(),
    );

    let results = scheduler.run_cycle().await?;
    scheduler.flush_alerts().await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn manage_probes(db: &DatabaseImpl, action: ProbeCommand) -> Result<()> {
    match action {
        ProbeCommand::Add { name, command, condition } => {
            validate_probe(&command, &condition)?;
            let id = db.create_probe(&NewProbe::from_command(name, &command, condition)).await?;
            println!("Created probe {id}");
        }
        ProbeCommand::Edit { id, name, command, condition } => {
            let Some(existing) = db.get_probe(id).await? else {
                bail!("no probe with id {id}");
            };
            let condition = condition.unwrap_or(existing.condition_expr);
            let updated = match command {
                Some(command) => {
                    validate_probe(&command, &condition)?;
                    NewProbe::from_command(name.unwrap_or(existing.name), &command, condition)
                }
                None => {
                    parse_condition(&condition).context("invalid probe condition")?;
                    NewProbe {
                        name: name.unwrap_or(existing.name),
                        request_spec: existing.request_spec,
                        condition_expr: condition,
                    }
                }
            };
            db.update_probe(id, &updated).await?;
            println!("Updated probe {id}");
        }
        ProbeCommand::List => {
            for probe in db.list_probes().await? {
                println!("{:>4}  {:<24} {}", probe.id, probe.name, probe.condition_expr);
            }
        }
        ProbeCommand::Show { id } => {
            let Some(probe) = db.get_probe(id).await? else {
                bail!("no probe with id {id}");
            };
            let command = probe.command().unwrap_or_else(|e| format!("<{e}>"));
            println!("Id:        {}", probe.id);
            println!("Name:      {}", probe.name);
            println!("Command:   {command}");
            println!("Condition: {}", probe.condition_expr);
        }
        ProbeCommand::Remove { id } => {
            if !db.delete_probe(id).await? {
                bail!("no probe with id {id}");
            }
            println!("Removed probe {id}");
        }
    }
    Ok(())
}

async fn print_status(db: &DatabaseImpl) -> Result<()> {
    for status in db.latest_statuses().await? {
        let checked = status.last_checked.map(format_time).unwrap_or_else(|| "never".into());
        println!("{:<24} {:<8} {}", status.name, status.status, checked);
    }
    Ok(())
}

async fn print_history(db: &DatabaseImpl, filter: HistoryFilter) -> Result<()> {
    for entry in db.history(&filter).await? {
        println!("{}  {:<24} {}", format_time(entry.timestamp), entry.name, entry.status);
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_ref())?;

    if let Command::Config = cli.command {
        print!("{config}");
        return Ok(());
    }

    let db = open_database(&config).await?;

    match cli.command {
        Command::Run => run(&config, db).await,
        Command::Check => check_once(&config, db).await,
        Command::Probe { action } => manage_probes(&db, action).await,
        Command::Status => print_status(&db).await,
        Command::History { probe, status, limit } => {
            let filter = HistoryFilter { probe_name: probe, status: status.map(Into::into), limit };
            print_history(&db, filter).await
        }
        Command::Config => Ok(()),
    }
}

/// Errors are reported once, through the logger
fn exit_code(outcome: Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init(cli.verbose);

    exit_code(dispatch(cli).await)
}
