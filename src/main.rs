mod config;
mod errors;
mod models;
mod monitoring;
mod notify;
mod session;
mod sources;
mod storage;

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use config::Config;
use errors::{Result, TrackerError};
use models::AlertEvent;
use monitoring::{PollingMonitor, TrackingOrchestrator};
use notify::{
    spawn_alert_dispatcher, DiscordNotifier, FanoutNotifier, LogNotifier, NotificationSink,
};
use session::MarketCalendar;
use sources::{
    CachedFloatLookup, FloatLookup, HttpFloatProvider, HttpScannerSource, MarketDataSource,
    ReplaySource,
};
use std::time::Duration;
use storage::{AlertLogger, ExportSink, JsonSessionExporter};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

const SCANNER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Parser, Debug)]
#[command(name = "Gainer Tracker")]
#[command(author = "Gainer Tracker Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Tracks intraday top gainers, scores threshold breakouts and follows their peaks", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Operating mode (overrides config): live or replay
    #[arg(short, long)]
    mode: Option<String>,

    /// Percent move from entry that latches a ticker (overrides config)
    #[arg(short, long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;
    config.expand_env_vars()?;

    if let Some(mode) = args.mode {
        config.general.mode = mode;
    }
    if let Some(threshold) = args.threshold {
        config.tracking.desired_pct_change = threshold;
    }
    config.validate()?;

    init_logging(&config.logging.level)?;

    info!("Starting Gainer Tracker v0.1.0");
    info!(
        "Mode: {} | threshold {}%",
        config.general.mode, config.tracking.desired_pct_change
    );

    match config.general.mode.as_str() {
        "live" => run_live(config).await,
        "replay" => run_replay(config).await,
        _ => {
            error!("Invalid mode: {}", config.general.mode);
            Err(TrackerError::ConfigError(format!(
                "Invalid mode: {}. Must be 'live' or 'replay'",
                config.general.mode
            )))
        }
    }
}

/// RUST_LOG wins over the configured level when set
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TrackerError::Unknown(format!("Failed to set logger: {}", e)))?;

    Ok(())
}

/// Discord when both credentials are configured, plus the log in every case
fn build_notifier(config: &Config) -> Result<FanoutNotifier> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(LogNotifier)];

    match (
        &config.notifications.discord_bot_token,
        &config.notifications.discord_user_id,
    ) {
        (Some(token), Some(user_id)) => {
            sinks.push(Box::new(DiscordNotifier::new(token.clone(), user_id.clone())?));
            info!("Discord alerts enabled");
        }
        _ => warn!("Discord credentials not configured; alerts go to the log only"),
    }

    Ok(FanoutNotifier::new(sinks))
}

fn start_dispatcher(
    config: &Config,
) -> Result<(mpsc::UnboundedSender<AlertEvent>, JoinHandle<()>)> {
    let alert_log = config.notifications.alert_log.clone().map(AlertLogger::new);
    Ok(spawn_alert_dispatcher(build_notifier(config)?, alert_log))
}

/// Flips the returned receiver to true on Ctrl-C
fn shutdown_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let signal_tx = tx.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, finishing the current batch");
            let _ = signal_tx.send(true);
        }
    });

    (tx, rx)
}

/// Report, export and clear the tracker set once a session is over
fn finish_session<S, F>(
    monitor: &mut PollingMonitor<S, F>,
    exporter: Option<&JsonSessionExporter>,
    started_at: DateTime<Utc>,
) where
    S: MarketDataSource,
    F: FloatLookup,
{
    if monitor.orchestrator().is_empty() {
        warn!("No tickers were seen this session");
    }

    let summary = monitor.orchestrator_mut().summary(
        Uuid::new_v4().to_string(),
        started_at,
        Utc::now(),
    );

    println!("{}", summary.format_report());

    match exporter {
        Some(exporter) => {
            if let Err(e) = exporter.write_session_summary(&summary) {
                error!("Failed to export session summary: {}", e);
            }
        }
        None => info!("No export_dir configured; skipping export"),
    }

    monitor.orchestrator_mut().reset();
}

/// Wait for queued alerts to drain, then report the alert log totals
async fn wait_for_dispatcher(handle: JoinHandle<()>, config: &Config) -> Result<()> {
    handle
        .await
        .map_err(|e| TrackerError::Unknown(format!("Alert dispatcher failed: {}", e)))?;

    if let Some(path) = &config.notifications.alert_log {
        match AlertLogger::new(path.clone()).get_statistics() {
            Ok(stats) => {
                let mut tiers: Vec<String> = stats
                    .by_tier
                    .iter()
                    .map(|(tier, count)| format!("{}={}", tier, count))
                    .collect();
                tiers.sort();
                info!(
                    "Alert log {}: {} delivered, {} failed [{}]",
                    path,
                    stats.total_alerts,
                    stats.failed_deliveries,
                    tiers.join(" ")
                );
            }
            Err(e) => error!("Failed to read alert log {}: {}", path, e),
        }
    }

    Ok(())
}

/// Follow the scanner through every weekday session until Ctrl-C
async fn run_live(config: Config) -> Result<()> {
    info!("Initializing live mode...");

    let calendar = MarketCalendar::from_config(&config.session)?;
    let float_lookup = CachedFloatLookup::new(HttpFloatProvider::new(&config.float_lookup)?);
    let source = HttpScannerSource::new(config.general.scanner_url.clone(), SCANNER_TIMEOUT)?
        .with_max_rows(config.general.max_rows);
    let exporter = config.export.export_dir.as_ref().map(JsonSessionExporter::new);

    let (alerts, dispatcher) = start_dispatcher(&config)?;
    let mut monitor = PollingMonitor::new(
        source,
        TrackingOrchestrator::new(&config.tracking, float_lookup),
        &config.tracking,
        alerts,
    );
    let (_shutdown_tx, mut shutdown) = shutdown_signal();

    loop {
        let now = Local::now().naive_local();
        let window = calendar.next_session(now);
        let wait = window.until_open(now);

        if !wait.is_zero() {
            info!(
                "Waiting until market open on {}",
                window.open.format("%a %Y-%m-%d @ %H:%M:%S")
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("Market OPEN, tracking until {}", window.close.format("%H:%M:%S"));
        let started_at = Utc::now();
        let stats = monitor
            .run_session(|| window.is_open(Local::now().naive_local()), &mut shutdown)
            .await?;
        info!(
            "Session done: {} cycles ({} skipped), {} alerts",
            stats.cycles, stats.skipped_cycles, stats.alerts_sent
        );

        finish_session(&mut monitor, exporter.as_ref(), started_at);
        // Floats are refreshed once per session
        monitor.orchestrator_mut().float_lookup_mut().clear();

        if *shutdown.borrow() {
            break;
        }
        info!("Market CLOSED");
    }

    // Dropping the monitor closes the alert channel so the dispatcher drains and exits
    drop(monitor);
    wait_for_dispatcher(dispatcher, &config).await?;

    info!("Gainer Tracker stopped");
    Ok(())
}

/// Run recorded batches through the tracker without pauses
async fn run_replay(config: Config) -> Result<()> {
    info!("Initializing replay mode...");

    let replay_file = config.general.replay_file.clone().ok_or_else(|| {
        TrackerError::ConfigError("replay mode requires general.replay_file".to_string())
    })?;
    let source = ReplaySource::from_file(&replay_file)?;
    let float_lookup = CachedFloatLookup::new(HttpFloatProvider::new(&config.float_lookup)?);
    let exporter = config.export.export_dir.as_ref().map(JsonSessionExporter::new);

    let (alerts, dispatcher) = start_dispatcher(&config)?;
    let mut monitor = PollingMonitor::new(
        source,
        TrackingOrchestrator::new(&config.tracking, float_lookup),
        &config.tracking,
        alerts,
    )
    .with_intervals(Duration::ZERO, Duration::ZERO);
    let (_shutdown_tx, mut shutdown) = shutdown_signal();

    let started_at = Utc::now();
    let stats = monitor.run_session(|| true, &mut shutdown).await?;
    info!(
        "Replayed {} batches, {} alerts raised",
        stats.cycles, stats.alerts_sent
    );

    finish_session(&mut monitor, exporter.as_ref(), started_at);

    drop(monitor);
    wait_for_dispatcher(dispatcher, &config).await
}
