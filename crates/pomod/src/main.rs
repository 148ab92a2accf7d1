//! pomod - Pomodoro session timer service
//!
//! This is the main entry point for the pomod service.
//! It wires together all the components:
//! - Configuration loading and SIGHUP reload
//! - Session store and its background writer
//! - Session engine, tick source, and terminal side-effect ports
//! - Commands read line by line from stdin

mod console;
mod ports;

use anyhow::{Context, Result};
use clap::Parser;
use pomo_api::{COMMAND_HELP, CommandParseError, Event, TimerCommand};
use pomo_config::{Config, ConfigError, SettingsHandle, load_config_checked};
use pomo_core::{
    CommandOutcome, IntervalTicker, PersistFailure, PersistQueue, SessionEngine, TickCallback,
    spawn_writer,
};
use pomo_ports::Ports;
use pomo_store::{SessionStore, SqliteStore};
use pomo_util::{DATABASE_FILENAME, UserId, default_config_path};
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::{
    describe_event, describe_history, describe_outcome, describe_snapshot, describe_stats,
    start_of_local_day,
};
use crate::ports::TerminalPorts;

/// pomod - Pomodoro session timer
#[derive(Parser, Debug)]
#[command(name = "pomod")]
#[command(about = "Pomodoro session timer driven from stdin", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/pomo/config.toml)
    #[arg(short, long, env = "POMO_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set POMO_DATA_DIR env var)
    #[arg(short, long, env = "POMO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// User whose sessions are stored (overrides the config file)
    #[arg(short, long)]
    user: Option<String>,

    /// Print every event as a JSON line instead of text
    #[arg(long)]
    json: bool,

    /// Ring the terminal bell when a phase completes
    #[arg(long)]
    bell: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Everything the command handlers need besides the engine
struct ServiceContext {
    store: Arc<dyn SessionStore>,
    user: UserId,
    config_path: PathBuf,
    settings: SettingsHandle,
    json: bool,
}

/// Main service state
struct Service {
    engine: SessionEngine,
    ctx: ServiceContext,
    persist: PersistQueue,
    writer: JoinHandle<()>,
    failures: mpsc::UnboundedReceiver<PersistFailure>,
    ticks: mpsc::Receiver<()>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_or_default(&args.config);

        let user = args
            .user
            .clone()
            .map(UserId::new)
            .unwrap_or_else(|| config.service.user.clone());
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn SessionStore> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        if !store.is_healthy() {
            warn!(db_path = %db_path.display(), "Store failed its health check");
        }
        info!(db_path = %db_path.display(), user = %user, "Store initialized");

        let (persist, persist_rx) = PersistQueue::channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let writer = spawn_writer(store.clone(), user.clone(), persist_rx, failures_tx);

        // One pending tick is enough; the engine reads the clock itself
        let (tick_tx, ticks) = mpsc::channel(1);
        let on_tick: TickCallback = Arc::new(move || {
            let _ = tick_tx.try_send(());
        });

        let ticker = IntervalTicker::new(config.service.tick_interval);
        debug!(tick_ms = ticker.period().as_millis() as u64, "Tick source configured");

        let settings = SettingsHandle::new(config.timer.clone());
        let ports = Ports::shared(Arc::new(TerminalPorts::new(args.bell)));
        let mut engine = SessionEngine::new(
            user.clone(),
            settings.snapshot(),
            persist.clone(),
            ports,
            Box::new(ticker),
            on_tick,
        );

        let json = args.json;
        engine.subscribe(move |event| print_event(event, json));

        match store.load_most_recent_incomplete(&user).await {
            Ok(Some(record)) => {
                let outcome = engine.recover(record, pomo_util::now());
                info!(outcome = ?outcome, "Recovery complete");
            }
            Ok(None) => debug!("No interrupted session to recover"),
            Err(e) => warn!(error = %e, "Failed to load interrupted session"),
        }

        Ok(Self {
            engine,
            ctx: ServiceContext {
                store,
                user,
                config_path: args.config.clone(),
                settings,
                json,
            },
            persist,
            writer,
            failures,
            ticks,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            mut engine,
            ctx,
            persist,
            writer,
            mut failures,
            mut ticks,
        } = self;

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut settings_rx = ctx.settings.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        info!("Service running");
        if !ctx.json {
            println!("{}", describe_snapshot(&engine.snapshot(pomo_util::now())));
            println!("Type `help` for commands");
        }

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP - reload configuration
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    reload_settings(&ctx);
                }

                Some(()) = ticks.recv() => {
                    engine.tick(pomo_util::now());
                }

                Some(failure) = failures.recv() => {
                    engine.report_persistence_failure(&failure, pomo_util::now());
                }

                Ok(()) = settings_rx.changed() => {
                    let settings = settings_rx.borrow_and_update().clone();
                    engine.apply_settings(settings, pomo_util::now());
                }

                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if handle_line(&mut engine, &ctx, &line).is_break() {
                            info!("Quit requested");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed; running until signalled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin; running until signalled");
                        stdin_open = false;
                    }
                },
            }
        }

        info!("Shutting down pomod");

        engine.shutdown(pomo_util::now());
        if !persist.flush().await {
            warn!("Persistence writer stopped before shutdown");
        }
        while let Ok(failure) = failures.try_recv() {
            warn!(error = %failure, "Store write failed during shutdown");
        }

        // The writer exits once every queue handle is gone
        drop(engine);
        drop(persist);
        if let Err(e) = writer.await {
            warn!(error = %e, "Persistence writer task failed");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Load the config file, falling back to defaults on any error
fn load_or_default(path: &Path) -> Config {
    match load_config_checked(path) {
        Ok((config, warnings)) => {
            for warning in &warnings {
                warn!(warning = %warning, "Config value will be adjusted");
            }
            info!(config_path = %path.display(), "Configuration loaded");
            config
        }
        Err(ConfigError::ReadError(e)) if e.kind() == ErrorKind::NotFound => {
            info!(config_path = %path.display(), "No config file; using defaults");
            Config::default()
        }
        Err(e) => {
            warn!(config_path = %path.display(), error = %e, "Failed to load config; using defaults");
            Config::default()
        }
    }
}

fn reload_settings(ctx: &ServiceContext) {
    match load_config_checked(&ctx.config_path) {
        Ok((config, warnings)) => {
            for warning in &warnings {
                warn!(warning = %warning, "Config value will be adjusted");
            }
            ctx.settings.replace(config.timer);
            info!("Configuration reloaded");
        }
        Err(e) => warn!(error = %e, "Config reload failed; keeping current settings"),
    }
}

fn print_event(event: &Event, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to serialize event"),
        }
    } else if let Some(line) = describe_event(event) {
        println!("{}", line);
    }
}

fn handle_line(engine: &mut SessionEngine, ctx: &ServiceContext, line: &str) -> ControlFlow<()> {
    let command = match line.parse::<TimerCommand>() {
        Ok(command) => command,
        Err(CommandParseError::Empty) => return ControlFlow::Continue(()),
        Err(e) => {
            println!("{} (type `help` for commands)", e);
            return ControlFlow::Continue(());
        }
    };

    debug!(command = ?command, "Command received");
    let now = pomo_util::now();

    let outcome = match command {
        TimerCommand::Start { phase } => engine.start(phase, now),
        TimerCommand::Pause => engine.pause(now),
        TimerCommand::Resume => engine.resume(now),
        TimerCommand::Reset => engine.reset(now),
        TimerCommand::Skip => engine.skip(now),
        TimerCommand::Task { task_id } => {
            engine.link_task(task_id, now);
            CommandOutcome::Applied
        }
        TimerCommand::Status => {
            let snapshot = engine.snapshot(now);
            if ctx.json {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize snapshot"),
                }
            } else {
                println!("{}", describe_snapshot(&snapshot));
            }
            CommandOutcome::Applied
        }
        TimerCommand::Stats => {
            println!("{}", describe_stats(&engine.quick_stats()));
            CommandOutcome::Applied
        }
        TimerCommand::History => {
            spawn_history(ctx, now);
            CommandOutcome::Applied
        }
        TimerCommand::Help => {
            println!("{}", COMMAND_HELP);
            CommandOutcome::Applied
        }
        TimerCommand::Quit => return ControlFlow::Break(()),
    };

    if let Some(message) = describe_outcome(outcome) {
        println!("{}", message);
    }
    ControlFlow::Continue(())
}

/// Print today's stored sessions without holding up the loop
fn spawn_history(ctx: &ServiceContext, now: chrono::DateTime<chrono::Utc>) {
    let store = ctx.store.clone();
    let user = ctx.user.clone();
    let json = ctx.json;
    let since = start_of_local_day(now);

    tokio::spawn(async move {
        match store.list_completed_since(&user, since).await {
            Ok(records) if json => match serde_json::to_string(&records) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize history"),
            },
            Ok(records) => println!("{}", describe_history(&records)),
            Err(e) => warn!(error = %e, "Failed to load history"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mock_time = pomo_util::is_mock_time_active(),
        "pomod starting"
    );

    let service = Service::new(&args).await?;
    service.run().await
}
