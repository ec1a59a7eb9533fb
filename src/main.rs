use clap::Parser;
use retestbot::api::{MessageSink, TelegramClient, TinkoffClient};
use retestbot::commands::{run_command_loop, CommandHandler};
use retestbot::config::Settings;
use retestbot::notify::{format_error, format_startup, Broadcaster, SubscriberSet};
use retestbot::scanner::Scanner;
use retestbot::tracker::LifecycleTracker;
use retestbot::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// EMA breakout-and-retest signal bot for MOEX shares
#[derive(Parser, Debug)]
#[command(name = "retestbot", version, about)]
struct Cli {
    /// Settings file (defaults to retestbot.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single scan/monitor/sweep cycle and exit
    #[arg(long)]
    once: bool,

    /// Do not answer chat commands
    #[arg(long)]
    no_commands: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    tracing::info!("🚀 Retest bot starting");

    let settings = Settings::load(cli.config.as_deref())?;
    settings.validate()?;

    let tinkoff = TinkoffClient::new(
        settings.tinkoff.token.clone(),
        settings.tinkoff.base_url.clone(),
        settings.tinkoff.request_interval(),
    )?;
    let telegram = TelegramClient::new(
        settings.telegram.token.clone(),
        settings.telegram.base_url.clone(),
    )?;

    let subscribers = Arc::new(RwLock::new(SubscriberSet::new(
        settings.telegram.chat_ids.iter().copied(),
    )));
    let sink: Arc<dyn MessageSink> = Arc::new(telegram.clone());
    let broadcaster = Broadcaster::new(sink, subscribers.clone());

    tracing::info!("🔍 Resolving {} tickers...", settings.scanner.universe.len());
    let instruments = match tinkoff.resolve_instruments(&settings.scanner.universe).await {
        Ok(instruments) if !instruments.is_empty() => instruments,
        Ok(_) => {
            broadcaster
                .broadcast(&format_error("no instruments from the universe could be resolved"))
                .await;
            return Err("No instruments resolved! Cannot start bot.".into());
        }
        Err(e) => {
            broadcaster
                .broadcast(&format_error(&format!("initialisation failed: {}", e)))
                .await;
            return Err(e.into());
        }
    };

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Instruments: {}", instruments.len());
    tracing::info!("  Scan interval: {}s", settings.scanner.scan_interval_secs);
    tracing::info!(
        "  Trading hours: {:02}:00-{:02}:59 UTC",
        settings.scanner.trading_hours.start_hour,
        settings.scanner.trading_hours.end_hour
    );
    tracing::info!("  EMA period: {}", settings.strategy.ema_period);
    tracing::info!("  Expiry: {}h", settings.strategy.expiry_hours);
    tracing::info!("  Subscribers: {}", subscribers.read().await.len());

    let tracker = Arc::new(RwLock::new(LifecycleTracker::new(settings.strategy.expiry())));
    let instrument_count = instruments.len();
    let scanner = Scanner::new(
        Arc::new(tinkoff),
        tracker.clone(),
        broadcaster.clone(),
        instruments,
        settings.scanner.clone(),
        settings.strategy.clone(),
    );

    if cli.once {
        let summary = scanner.run_cycle().await?;
        tracing::info!(
            "✅ Single cycle done: {} scanned, {} failed, {} monitored, {} events",
            summary.scanned,
            summary.fetch_failures,
            summary.monitored,
            summary.events
        );
        return Ok(());
    }

    broadcaster.broadcast(&format_startup(instrument_count)).await;

    tracing::info!("\n🔄 Spawning loops...");
    let scan_task = tokio::spawn(scanner.run());

    let command_task = if cli.no_commands {
        tracing::info!("  💬 Chat commands disabled");
        None
    } else {
        let handler = CommandHandler::new(
            tracker.clone(),
            subscribers.clone(),
            settings.scanner.trading_hours,
        );
        let poll_timeout = settings.telegram.poll_timeout_secs;
        Some(tokio::spawn(run_command_loop(telegram, handler, poll_timeout)))
    };
    let commands = async move {
        match command_task {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");

    // Wait for Ctrl+C or task failure
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = scan_task => {
            tracing::error!("Scan loop exited: {:?}", result);
        }
        result = commands => {
            tracing::error!("Command loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 Retest bot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("retestbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
