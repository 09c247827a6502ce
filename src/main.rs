use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use reddit_watcher::config::Config;
use reddit_watcher::db::{Db, EventStore, WatchlistStore};
use reddit_watcher::delivery::DeliveryLoop;
use reddit_watcher::error::AppError;
use reddit_watcher::reddit::RedditClient;
use reddit_watcher::telegram::{CommandBot, TelegramClient};
use reddit_watcher::watcher::{Intervals, Watcher};
use reddit_watcher::Result;

/// How long the loops get to finish up after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (informational by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Check for --config flag
    let config = if args.len() >= 3 && args[1] == "--config" {
        Config::load_from(&PathBuf::from(&args[2]))?
    } else {
        Config::load()?
    };

    let token = config.telegram_bot_token.clone().ok_or_else(|| {
        AppError::Config(
            "no bot token; set telegram_bot_token in the config file or TELEGRAM_BOT_TOKEN"
                .to_string(),
        )
    })?;

    tracing::info!("using database at {}", config.db_path);

    // One connection per loop; the loops only meet at the SQLite file
    let watcher_db = Db::open(&config.db_path).await?;
    let delivery_db = Db::open(&config.db_path).await?;
    let bot_db = Db::open(&config.db_path).await?;

    let upstream = Arc::new(RedditClient::new(&config.reddit_user_agent));
    let telegram = TelegramClient::new(&token);

    let watcher = Watcher::new(
        WatchlistStore::new(watcher_db.clone()),
        EventStore::new(watcher_db),
        upstream.clone(),
        Intervals {
            refresh: Duration::from_secs(config.watchlist_refresh_secs),
            stream_pause: Duration::from_secs(config.stream_pause_secs),
            upstream_cooldown: Duration::from_secs(config.upstream_cooldown_secs),
            error_cooldown: Duration::from_secs(config.error_cooldown_secs),
        },
    );

    let delivery = DeliveryLoop::new(
        WatchlistStore::new(delivery_db.clone()),
        EventStore::new(delivery_db),
        Arc::new(telegram.clone()),
        Duration::from_secs(config.delivery_interval_secs),
    );

    let bot = CommandBot::new(telegram, WatchlistStore::new(bot_db), upstream);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks: Vec<(&str, JoinHandle<()>)> = vec![
        ("watcher", tokio::spawn(watcher.run(shutdown_rx.clone()))),
        ("delivery", tokio::spawn(delivery.run(shutdown_rx.clone()))),
        ("command bot", tokio::spawn(bot.run(shutdown_rx))),
    ];

    shutdown_signal().await;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    for (name, mut handle) in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("{} task failed: {}", name, e),
            Err(_) => {
                tracing::warn!("{} did not stop in time, aborting it", name);
                handle.abort();
            }
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
