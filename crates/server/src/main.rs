mod bootstrap;
mod health;
mod ingress;
mod slack_api;
mod web;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use karmic_core::config::{AppConfig, LoadOptions};
use karmic_core::format::ReplyFormatter;
use karmic_core::leaderboard::Leaderboard;
use karmic_core::ledger::{KarmaLedger, KarmaStore};
use karmic_db::SqlKarmaRepository;
use karmic_slack::events::karma_dispatcher;
use karmic_slack::reply::ReplySink;
use tracing_subscriber::EnvFilter;

use crate::ingress::{InFlight, IngressState};
use crate::slack_api::{LoggingReplySink, SlackWebApiSink};

fn init_logging(config: &AppConfig) {
    use karmic_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let config = &app.config;

    let store: Arc<dyn KarmaStore> = Arc::new(SqlKarmaRepository::new(app.db_pool.clone()));
    let sink: Arc<dyn ReplySink> = if config.slack.has_bot_token() {
        Arc::new(SlackWebApiSink::new(config.slack.bot_token.clone()))
    } else {
        tracing::warn!(
            event_name = "system.server.reply_transport",
            transport_mode = "log",
            correlation_id = "bootstrap",
            "no slack bot token configured; replies will only be logged"
        );
        Arc::new(LoggingReplySink)
    };

    let dispatcher = karma_dispatcher(
        KarmaLedger::new(Arc::clone(&store), config.karma.buzzkill_policy()),
        ReplyFormatter::new(i64::from(config.karma.buzzkill_limit)),
        Arc::clone(&sink),
        Leaderboard::new(Arc::clone(&store)),
    );
    let in_flight = InFlight::default();
    let templates = web::init_templates().context("failed to load page templates")?;

    let router = web::router(Arc::clone(&store), templates)
        .merge(health::router(app.db_pool.clone()))
        .merge(ingress::router(IngressState::new(dispatcher, sink, in_flight.clone())));

    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        buzzkill_enabled = config.karma.buzzkill_enabled,
        buzzkill_limit = config.karma.buzzkill_limit,
        "karmic-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        in_flight = in_flight.active(),
        "draining in-flight karma events"
    );
    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, in_flight.wait_idle()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            in_flight = in_flight.active(),
            "shutdown grace period elapsed with events still in flight"
        );
    }
    app.db_pool.close().await;

    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
