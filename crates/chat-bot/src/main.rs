//! Chat bot - main entry point.

use anyhow::Context;
use attribute_store::AttributeStore;
use chat_bot::commands::{self, HttpQueryBackend, QuoteModule, TimeRequests};
use chat_bot::{AppResult, Bot, Config};
use chat_dispatch::Dispatcher;
use quote_ledger::QuoteLedger;
use relay_client::{LineReceiver, RelayClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level);

    info!("Starting {}...", config.bot.nick);

    // Storage
    let specs = commands::attribute_specs(&config).map_err(anyhow::Error::msg)?;
    let store = AttributeStore::open(&config.store.attributes_path, specs).await?;
    info!(
        "Attribute store ready at {} ({} values)",
        config.store.attributes_path.display(),
        store.len().await
    );

    let ledger = QuoteLedger::open(&config.quote.filename).await?;
    info!("Quote ledger holds {} quotes", ledger.count().await?);

    // Clients
    let relay = RelayClient::new(
        &config.relay.service_url,
        &config.bot.nick,
        config.relay.timeout,
    )?;

    if !relay.health_check().await {
        error!("Relay not reachable at {}", config.relay.service_url);
        return Err(anyhow::anyhow!("Relay not reachable").into());
    }
    info!("Relay healthy");

    let backend = Arc::new(
        HttpQueryBackend::new(&config.query.base_url, config.query.app_id.clone())
            .context("Failed to create query backend")?,
    );
    if config.query.app_id.is_none() {
        warn!("QUERY__APP_ID not set - queries will likely be refused");
    }

    // Routes
    let quotes = Arc::new(
        QuoteModule::new(ledger.clone(), &config.bot.command_prefix, &config.bot.nick)
            .with_expiry(config.bot.session_ttl, config.quote.recent_line_ttl),
    );
    let time_requests = Arc::new(TimeRequests::new(config.bot.session_ttl));
    let mut dispatcher = Dispatcher::new(store.clone());
    commands::register_all(
        &mut dispatcher,
        &config,
        quotes.clone(),
        time_requests.clone(),
        backend,
    )?;
    tokio::spawn(cleanup_loop(quotes, time_requests));

    let bot = Arc::new(Bot::new(
        Arc::new(dispatcher),
        Arc::new(relay.clone()),
        config.bot.admin_list(),
    ));

    let workers = config.bot.max_concurrent_lines;
    let permits = Arc::new(Semaphore::new(workers));
    info!("Listening for lines with {} workers...", workers);

    // Start line receiver
    let receiver = LineReceiver::new(relay, config.relay.poll_interval);
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    };

    // Main line loop
    let taken = bot.serve(receiver.stream(), permits.clone(), shutdown).await;
    debug!("Handled {} lines", taken);

    info!("Shutting down...");

    // Let in-flight lines finish.
    if let Ok(all) = permits.acquire_many(workers as u32).await {
        drop(all);
    }
    ledger.close().await;

    Ok(())
}

/// Periodically drops import sessions, time requests and line history
/// nobody has touched within their time to live.
async fn cleanup_loop(quotes: Arc<QuoteModule>, time_requests: Arc<TimeRequests>) {
    let cleanup_interval = Duration::from_secs(60);

    loop {
        tokio::time::sleep(cleanup_interval).await;

        let now = chrono::Utc::now();
        let sessions = quotes.expire(now);
        let requests = time_requests.expire(now);
        if sessions + requests > 0 {
            debug!(
                "Cleaned up {} import sessions and {} time requests",
                sessions, requests
            );
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
