//! Run command - the long-running poller plus startup catch-up

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::interval;

use stobot_adapters::chat::DiscordChat;
use stobot_adapters::news::ArcNewsClient;
use stobot_adapters::store::SqliteStore;
use stobot_domain::usecases::{DeliveryEngine, CATCHUP_DAYS, CATCHUP_TAGS};
use stobot_domain::SystemClock;

use crate::args::BotArgs;
use crate::config::BotConfig;

pub async fn execute(args: BotArgs) -> Result<()> {
    let config = BotConfig::from_args(args)?;
    let engine_config = config.engine_config();
    let poll_period = config.poll_period;

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .await
            .context("Failed to initialize database")?,
    );
    let source = Arc::new(ArcNewsClient::new());
    let chat = Arc::new(DiscordChat::new(config.token));
    let clock = Arc::new(SystemClock);

    let engine = DeliveryEngine::new(store, source, chat, clock, engine_config);

    tracing::info!(
        poll_period_secs = poll_period.as_secs(),
        poll_count = engine.config().poll_count,
        environment = %engine
            .config()
            .environment
            .map(|env| env.to_string())
            .unwrap_or_else(|| "all".to_string()),
        "bot is now running, press CTRL-C to exit"
    );

    // Catch up on unposted news in parallel with the poller.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.catch_up(CATCHUP_DAYS, &CATCHUP_TAGS).await;
        });
    }

    let mut ticker = interval(poll_period);
    // The first tick of a tokio interval completes immediately; consume
    // it so polling starts one full period after startup.
    ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.poll_once().await;
            }
            _ = &mut shutdown => {
                tracing::info!("gracefully shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
