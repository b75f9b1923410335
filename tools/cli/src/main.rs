//! dripsync CLI - run and inspect the widget sync client.
//!
//! This tool runs the sync client against a simulated companion and
//! offers the operations an external writer performs on the shared
//! cursor store (editing config, pushing data, clearing).

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{CommandFactory, Parser, Subcommand};
use futures::FutureExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dripsync_common::{Error, SlotKey, UtcMillis};
use dripsync_store::{CursorStore, FileStore};
use dripsync_sync::{
    loopback, publish_config, Clock, CompanionHandler, ConfigLoader, Cursor, InfoPayload,
    LatestPayload, LaunchRequest, LifecycleAdapter, Request, Response, SyncScheduler,
    SyncTimings, SystemClock, TimerLauncher, Transport, WidgetConfig,
};

/// App id the simulated companion answers to.
const COMPANION_APP_ID: &str = "dripsync-companion";

#[derive(Parser)]
#[command(name = "dripsync")]
#[command(about = "dripsync - Companion data sync client for watch widgets")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Cursor store file (default: platform data directory).
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync client against a simulated companion.
    Run {
        /// Stop after this many seconds.
        #[arg(short, long, default_value_t = 60)]
        duration_secs: u64,

        /// Simulate a pause/resume cycle every N seconds.
        #[arg(long)]
        cycle_secs: Option<u64>,

        /// How long each simulated pause lasts.
        #[arg(long, default_value_t = 5)]
        pause_secs: u64,

        /// Tick interval in milliseconds.
        #[arg(long, default_value_t = 3_000)]
        tick_ms: u64,

        /// Staleness threshold in milliseconds.
        #[arg(long, default_value_t = 60_000)]
        stale_ms: u64,

        /// Freshness window in milliseconds.
        #[arg(long, default_value_t = 300_000)]
        update_interval_ms: u64,

        /// Request timeout in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Simulated companion response latency in milliseconds.
        #[arg(long, default_value_t = 200)]
        latency_ms: u64,

        /// Make every Nth companion answer fail.
        #[arg(long)]
        fail_every: Option<u64>,

        /// Have the companion write data straight to the store every N
        /// seconds, as an external writer.
        #[arg(long)]
        companion_writes_secs: Option<u64>,
    },

    /// Show the cursor and config stored on disk.
    Status,

    /// Edit the stored config and bump its generation marker.
    Config {
        /// Suspend or resume scheduling.
        #[arg(long)]
        disable_updates: Option<bool>,

        /// Log every tick decision.
        #[arg(long)]
        show_log: Option<bool>,
    },

    /// Write a payload to the store as an external writer would.
    Touch {
        /// JSON payload.
        #[arg(short, long)]
        payload: String,
    },

    /// Remove every cursor and config slot.
    Clear,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store_path = cli.store.unwrap_or_else(default_store_path);

    match cli.command {
        Commands::Run {
            duration_secs,
            cycle_secs,
            pause_secs,
            tick_ms,
            stale_ms,
            update_interval_ms,
            timeout_ms,
            latency_ms,
            fail_every,
            companion_writes_secs,
        } => {
            let timings = SyncTimings::default()
                .with_tick_interval(Duration::from_millis(tick_ms))
                .with_stale_time(Duration::from_millis(stale_ms))
                .with_update_interval(Duration::from_millis(update_interval_ms))
                .with_request_timeout(Duration::from_millis(timeout_ms));
            let options = RunOptions {
                duration: Duration::from_secs(duration_secs),
                cycle: cycle_secs.map(Duration::from_secs),
                pause: Duration::from_secs(pause_secs),
                latency: Duration::from_millis(latency_ms),
                fail_every,
                companion_writes: companion_writes_secs.map(Duration::from_secs),
            };
            cmd_run(&store_path, timings, options).await
        }

        Commands::Status => cmd_status(&store_path),

        Commands::Config {
            disable_updates,
            show_log,
        } => cmd_config(&store_path, disable_updates, show_log),

        Commands::Touch { payload } => cmd_touch(&store_path, &payload),

        Commands::Clear => cmd_clear(&store_path),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "dripsync", &mut io::stdout());
            Ok(())
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dripsync")
        .join("cursor.json")
}

fn open_store(path: &Path) -> Result<Arc<dyn CursorStore>> {
    let store = FileStore::new(path)
        .with_context(|| format!("Failed to open cursor store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn format_ts(ts: Option<UtcMillis>) -> String {
    match ts.and_then(DateTime::from_timestamp_millis) {
        Some(time) => format!("{} ({})", time.to_rfc3339(), ts.unwrap_or_default()),
        None => "never".to_string(),
    }
}

struct RunOptions {
    duration: Duration,
    cycle: Option<Duration>,
    pause: Duration,
    latency: Duration,
    fail_every: Option<u64>,
    companion_writes: Option<Duration>,
}

/// Payload the simulated companion serves for its `n`th reading.
fn simulated_reading(n: u64, now: UtcMillis) -> String {
    let val = 5.0 + (n % 20) as f64 * 0.1;
    serde_json::json!({
        "bg": { "val": format!("{:.1}", val), "time": now },
    })
    .to_string()
}

fn simulated_companion(latency: Duration, fail_every: Option<u64>) -> CompanionHandler {
    let served = Arc::new(AtomicU64::new(0));

    Arc::new(move |request: Request| {
        let n = served.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(latency).await;
            if fail_every.is_some_and(|every| every > 0 && n % every == 0) {
                return Err(Error::Transport(format!("companion failed request #{}", n)));
            }
            Ok(Response::reply(&request, simulated_reading(n, SystemClock.now())))
        }
        .boxed()
    })
}

fn summarize(payload: &InfoPayload) -> String {
    match payload.value["bg"]["val"].as_str() {
        Some(val) => format!("bg {}", val),
        None => payload.raw.clone(),
    }
}

async fn wait_for_cycle(cycle: &mut Option<Interval>) {
    if let Some(ref mut cycle) = cycle {
        cycle.tick().await;
    } else {
        std::future::pending::<()>().await;
    }
}

/// Run the widget client until the duration elapses or Ctrl-C.
async fn cmd_run(store_path: &Path, timings: SyncTimings, options: RunOptions) -> Result<()> {
    info!("Using cursor store at {}", store_path.display());

    let store = open_store(store_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (transport, companion, _link) =
        loopback(simulated_companion(options.latency, options.fail_every));
    tokio::spawn(companion.serve());
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let sink = Arc::new(LatestPayload::new());
    let mut updates = sink.subscribe();

    let scheduler = SyncScheduler::new(
        store.clone(),
        transport.clone(),
        sink.clone(),
        clock.clone(),
        timings,
    )
    .context("Invalid timings")?;
    let config = ConfigLoader::new(store.clone(), clock.clone());
    let launcher = Arc::new(TimerLauncher::new(Arc::new(|request: &LaunchRequest| {
        info!("Host launched {} ({})", request.app_id, request.url);
    })));
    let mut widget = LifecycleAdapter::new(scheduler, config, transport)
        .with_launcher(launcher, LaunchRequest::update(COMPANION_APP_ID));

    if let Some(every) = options.companion_writes {
        spawn_external_writer(store_path, every)?;
    }

    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    let mut cycle = options
        .cycle
        .filter(|period| !period.is_zero())
        .map(|period| interval_at(Instant::now() + period, period));

    widget.on_resume().await;
    if widget.config().disable_updates {
        warn!("Updates are disabled in the stored config");
    }

    loop {
        tokio::select! {
            _ = &mut deadline => break,

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }

            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(payload) = updates.borrow_and_update().clone() {
                    println!("{}  {}", format_ts(Some(payload.received_at)), summarize(&payload));
                }
            }

            _ = wait_for_cycle(&mut cycle) => {
                widget.on_pause().await;
                tokio::time::sleep(options.pause).await;
                widget.on_resume().await;

                // A companion that has produced nothing for a while gets
                // woken through the host.
                let stale = widget
                    .scheduler()
                    .cursor()
                    .info_last_update()
                    .ok()
                    .flatten()
                    .map_or(true, |ts| SystemClock.now() - ts > timings.stale_ms());
                if stale {
                    if let Err(e) = widget.request_companion_update(false) {
                        warn!("Could not wake companion: {}", e);
                    }
                }
            }
        }
    }

    widget.on_pause().await;
    widget.on_destroy();

    let state = widget.scheduler().state();
    println!(
        "Last attempt: {}, successful: {}",
        format_ts(state.last_update_attempt),
        state.last_update_successful
    );
    Ok(())
}

/// Companion process writing straight into the shared store.
fn spawn_external_writer(store_path: &Path, every: Duration) -> Result<()> {
    let store = open_store(store_path)?;
    let cursor = Cursor::new(store);
    let mut n = 1_000u64;

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        loop {
            ticker.tick().await;
            n += 1;
            let now = SystemClock.now();
            match cursor.save_info(&simulated_reading(n, now), now) {
                Ok(ts) => info!("Companion wrote data directly at {}", ts),
                Err(e) => warn!("Companion write failed: {}", e),
            }
        }
    });
    Ok(())
}

/// Show what is stored.
fn cmd_status(store_path: &Path) -> Result<()> {
    let cursor = Cursor::new(open_store(store_path)?);
    let snapshot = cursor.snapshot().context("Failed to read cursor")?;

    println!("Store: {}", store_path.display());
    println!("  Data updated:   {}", format_ts(snapshot.info_last_update));
    println!(
        "  Data:           {}",
        snapshot.info_blob.as_deref().unwrap_or("<none>")
    );
    println!("  Config updated: {}", format_ts(snapshot.config_last_update));
    println!(
        "  Config:         {}",
        snapshot.config_blob.as_deref().unwrap_or("<defaults>")
    );

    Ok(())
}

/// Edit the config as an external writer.
fn cmd_config(
    store_path: &Path,
    disable_updates: Option<bool>,
    show_log: Option<bool>,
) -> Result<()> {
    let store = open_store(store_path)?;

    let mut config = match store.get_string(SlotKey::ConfigBlob)? {
        Some(blob) => WidgetConfig::from_json(&blob).unwrap_or_else(|e| {
            warn!("{}; starting from defaults", e);
            WidgetConfig::default()
        }),
        None => WidgetConfig::default(),
    };

    if let Some(disable_updates) = disable_updates {
        config.disable_updates = disable_updates;
    }
    if let Some(show_log) = show_log {
        config.show_log = show_log;
    }

    let generation = publish_config(store.as_ref(), &config, SystemClock.now())
        .context("Failed to write config")?;

    println!("Config written (generation {}):", generation);
    println!("  disableUpdates: {}", config.disable_updates);
    println!("  showLog:        {}", config.show_log);

    Ok(())
}

/// Push a payload as an external writer.
fn cmd_touch(store_path: &Path, payload: &str) -> Result<()> {
    let now = SystemClock.now();
    let payload = InfoPayload::parse(payload, now).context("Payload must be JSON")?;

    let cursor = Cursor::new(open_store(store_path)?);
    let written_at = cursor
        .save_info(&payload.raw, now)
        .context("Failed to write payload")?;

    println!("Payload written at {}", format_ts(Some(written_at)));
    Ok(())
}

/// Clear every slot.
fn cmd_clear(store_path: &Path) -> Result<()> {
    let cursor = Cursor::new(open_store(store_path)?);
    cursor.clear().context("Failed to clear cursor")?;
    println!("Cursor cleared: {}", store_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_options() {
        let cli = Cli::try_parse_from([
            "dripsync",
            "--store",
            "/tmp/cursor.json",
            "run",
            "--duration-secs",
            "5",
            "--fail-every",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/cursor.json")));
        match cli.command {
            Commands::Run {
                duration_secs,
                fail_every,
                tick_ms,
                ..
            } => {
                assert_eq!(duration_secs, 5);
                assert_eq!(fail_every, Some(3));
                assert_eq!(tick_ms, 3_000);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_simulated_reading_is_valid_payload() {
        let raw = simulated_reading(3, 1_700_000_000_000);
        let payload = InfoPayload::parse(raw, 0).unwrap();
        assert_eq!(summarize(&payload), "bg 5.3");
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(None), "never");
        assert!(format_ts(Some(0)).starts_with("1970-01-01"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
