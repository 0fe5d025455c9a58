// src/main.rs

//! Agent entry-point.
//!
//! 1. Parse the command line, load configuration & set up structured logging
//! 2. Open the report store (or an in-memory one for `--dry-run`)
//! 3. Wire the probes and correlator into an engine
//! 4. Run one cycle, a bounded session, or the daemon loop until Ctrl-C
//! 5. `reports …` commands only talk to the store
//!

// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use fern::Dispatch;
use log::{Level, LevelFilter};
use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
    thread,
    time::Duration,
};
use tokio::runtime::Runtime;

// ───── local imports ────────────────────────────────────────────────────────
use watchpost::agent_log;
use watchpost::config::{self, Config};
use watchpost::config::model::LoggingConfig;
use watchpost::detection::{Engine, Monitor};
use watchpost::store::{self, maintenance::spawn_retention, MemoryStore, ReportStore};

/// How often the daemon applies the report TTL.
const RETENTION_PERIOD: Duration = Duration::from_secs(300);

#[derive(Debug, Parser)]
#[command(name = "watchpost", version, about = "Lightweight endpoint detection agent")]
struct Cli {
    /// Configuration file; defaults to `default.toml` next to the executable.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging and per-probe detail.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Keep reports in memory instead of the configured store.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single detection cycle and print its summary.
    Once,
    /// Run the monitor loop for a fixed time, e.g. `30s` or `5m`.
    RunFor {
        #[arg(value_parser = humantime::parse_duration)]
        duration: Duration,
    },
    /// Run the monitor loop until interrupted.
    Daemon,
    /// Inspect stored reports.
    Reports {
        #[command(subcommand)]
        command: ReportsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ReportsCommand {
    List,
    Show { ts: i64 },
    Delete { ts: i64 },
}

// ───── helpers ──────────────────────────────────────────────────────────────

/// Directory that contains the running executable.
fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot determine executable path")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable must live in some directory")
}

/// `--config`, else `default.toml` next to the executable, else built-in
/// defaults.
fn load_config(cli: &Cli, base_dir: &Path) -> Result<Config> {
    let cfg = match &cli.config {
        Some(path) => config::load(path, base_dir)?,
        None => {
            let default = base_dir.join("default.toml");
            if default.exists() {
                config::load(&default, base_dir)?
            } else {
                config::parse("", base_dir)?
            }
        }
    };
    Ok(cfg)
}

/// Configure global logging as requested in `[logging]`.
fn setup_logging(base_dir: &Path, logging: &LoggingConfig, verbose: bool) -> Result<(), fern::InitError> {
    let level = match logging.level.to_uppercase().as_str() {
        _ if verbose => LevelFilter::Debug,
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let log_path = logging
        .enable
        .then(|| base_dir.join(logging.file.as_deref().unwrap_or("agent.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

fn open_store(cfg: &Config, dry_run: bool) -> Result<Arc<dyn ReportStore>> {
    if dry_run {
        agent_log!(Level::Info, "main", "Dry run: reports stay in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = store::open(&cfg.store).context("opening report store")?;
    Ok(store)
}

fn build_monitor(cfg: &Config, store: Arc<dyn ReportStore>, verbose: bool) -> Monitor {
    let engine = Arc::new(Engine::from_config(cfg, store));
    let mut settings = cfg.monitor;
    settings.verbose |= verbose;
    Monitor::new(engine, settings)
}

// ───── commands ─────────────────────────────────────────────────────────────

fn run_daemon(cfg: &Config, store: Arc<dyn ReportStore>, verbose: bool) -> Result<()> {
    let rt = Runtime::new().context("tokio runtime creation failed")?;
    let retention = spawn_retention(rt.handle(), Arc::clone(&store), cfg.store.ttl, RETENTION_PERIOD);

    let monitor = build_monitor(cfg, store, verbose);
    monitor.start()?;
    agent_log!(Level::Info, "main", "Daemon running; press Ctrl-C to stop");

    rt.block_on(tokio::signal::ctrl_c()).context("waiting for Ctrl-C")?;
    agent_log!(Level::Warn, "main", "Shutdown initiated");

    if !monitor.stop() {
        agent_log!(Level::Warn, "main", "Monitor loop still finishing its cycle at exit");
    }
    if let Some(task) = retention {
        task.abort();
    }
    agent_log!(Level::Info, "main", "Stopped cleanly after {} cycle(s)", monitor.cycles_completed());
    Ok(())
}

fn run_reports(cmd: &ReportsCommand, store: &dyn ReportStore) -> Result<()> {
    match cmd {
        ReportsCommand::List => {
            for r in store.list()? {
                println!("{:<12} {:>6} {}", r.timestamp, r.summary_count, r.highest_severity);
            }
        }
        ReportsCommand::Show { ts } => match store.read(*ts)? {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => anyhow::bail!("no report with timestamp {ts}"),
        },
        ReportsCommand::Delete { ts } => {
            if !store.delete(*ts)? {
                anyhow::bail!("no report with timestamp {ts}");
            }
            println!("deleted report {ts}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1 ─ Context
    let base_dir = exe_dir()?;
    let cfg = load_config(&cli, &base_dir)?;

    // 2 ─ Logging
    setup_logging(&base_dir, &cfg.logging, cli.verbose).context("logging setup failed")?;
    agent_log!(Level::Info, "main", "watchpost {} starting", env!("CARGO_PKG_VERSION"));

    // 3 ─ Store
    let store = open_store(&cfg, cli.dry_run)?;

    // 4 ─ Command
    match &cli.command {
        Commands::Once => {
            let monitor = build_monitor(&cfg, store, cli.verbose);
            let summary = monitor.run_once();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::RunFor { duration } => {
            let monitor = build_monitor(&cfg, store, cli.verbose);
            monitor.run_for(*duration)?;
            agent_log!(Level::Info, "main", "Completed {} cycle(s)", monitor.cycles_completed());
        }
        Commands::Daemon => run_daemon(&cfg, store, cli.verbose)?,
        Commands::Reports { command } => run_reports(command, store.as_ref())?,
    }
    Ok(())
}
