pub mod cli;
pub mod core;
pub mod monitor;
pub mod providers;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::alert::{Alert, AlertKind, AlertSink, LogSink};
use crate::core::cache::QuoteCache;
use crate::core::config::AppConfig;
use crate::core::portfolio::MemoryStore;
use crate::core::strategy;
use crate::monitor::{MarketHours, MonitoringScheduler, SchedulerConfig};
use crate::providers::exchange_api::ExchangeApiProvider;
use crate::providers::finance_api::FinanceApiProvider;
use crate::providers::rss_feed::RssFeedProvider;
use crate::providers::{FallbackAggregator, RateLimitPolicy};

pub enum AppCommand {
    Monitor,
    Update,
    Status,
    Report,
    TestAlert,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Monitor => run_monitor(&config).await,
        AppCommand::Update => run_update(&config).await,
        AppCommand::Status => run_status(&config).await,
        AppCommand::Report => run_report(&config).await,
        AppCommand::TestAlert => run_test_alert().await,
    }
}

/// Builds the provider chain from config. Missing exchange credentials
/// degrade to the unauthenticated fallback path instead of failing.
pub fn build_aggregator(config: &AppConfig) -> Arc<FallbackAggregator> {
    let exchange_base = config
        .providers
        .exchange
        .as_ref()
        .map_or("https://api.jquants.com/v1", |p| &p.base_url);
    let credentials = config
        .providers
        .exchange
        .as_ref()
        .and_then(|p| p.resolve_credentials());
    if credentials.is_none() {
        info!("No exchange credentials configured; using the finance fallback only");
    }
    let primary = Arc::new(ExchangeApiProvider::new(exchange_base, credentials));

    let finance_base = config
        .providers
        .finance
        .as_ref()
        .map_or("https://query1.finance.yahoo.com", |p| &p.base_url);
    let suffix = config
        .providers
        .finance
        .as_ref()
        .map_or(".T", |p| p.exchange_suffix.as_str());
    let fallback = Arc::new(FinanceApiProvider::new(finance_base, suffix));

    let feed = Arc::new(RssFeedProvider::new(
        config.providers.rss.as_ref().and_then(|r| r.feed_url.clone()),
    ));

    let cache = QuoteCache::new(Duration::from_secs(config.monitor.cache_ttl_secs));
    Arc::new(FallbackAggregator::new(
        primary,
        fallback,
        feed,
        cache,
        RateLimitPolicy::default(),
    ))
}

fn build_scheduler(config: &AppConfig) -> Result<MonitoringScheduler> {
    let aggregator = build_aggregator(config);
    let store = Arc::new(MemoryStore::new(
        config.holdings.clone(),
        config.watchlist.clone(),
    ));
    let strategies = strategy::load_strategies(&config.strategies);
    let scheduler_config = SchedulerConfig {
        check_interval: Duration::from_secs(config.monitor.check_interval_secs),
        market_hours: MarketHours::from_config(&config.monitor.sessions)?,
        market_hours_only: config.monitor.market_hours_only,
        alert_cooldown: Duration::from_secs(config.monitor.alert_cooldown_hours * 3600),
    };
    Ok(MonitoringScheduler::new(
        aggregator,
        store,
        Arc::new(LogSink),
        strategies,
        scheduler_config,
    ))
}

async fn run_monitor(config: &AppConfig) -> Result<()> {
    info!("Portfolio watchdog starting...");
    let mut scheduler = build_scheduler(config)?;

    let status = scheduler.status().await;
    println!("{}", cli::portfolio::render_status(&status));

    scheduler.start();
    println!("Monitoring started; press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    println!("Stopping...");
    scheduler.stop().await;
    Ok(())
}

async fn run_update(config: &AppConfig) -> Result<()> {
    let aggregator = build_aggregator(config);
    let mut holdings: Vec<_> = config
        .holdings
        .iter()
        .cloned()
        .map(core::portfolio::Holding::normalized)
        .collect();
    if holdings.is_empty() {
        println!("No holdings configured");
        return Ok(());
    }

    let output = cli::portfolio::refresh_and_render(&mut holdings, &aggregator).await?;
    println!("{output}");
    Ok(())
}

async fn run_status(config: &AppConfig) -> Result<()> {
    let scheduler = build_scheduler(config)?;
    let status = scheduler.status().await;
    println!("{}", cli::portfolio::render_status(&status));
    Ok(())
}

/// Refreshes prices and sends a portfolio summary through the alert sink.
async fn run_report(config: &AppConfig) -> Result<()> {
    let aggregator = build_aggregator(config);
    let mut holdings: Vec<_> = config
        .holdings
        .iter()
        .cloned()
        .map(core::portfolio::Holding::normalized)
        .collect();
    for holding in holdings.iter_mut() {
        if let Some(quote) = aggregator.get_quote(&holding.symbol).await {
            holding.apply_price(quote.price);
        }
    }

    let total_value: f64 = holdings.iter().map(|h| h.market_value).sum();
    let total_pl: f64 = holdings.iter().map(|h| h.profit_loss).sum();
    let message = format!(
        "Daily report\nHoldings: {}\nMarket value: {total_value:.0}\nP/L: {total_pl:+.0}",
        holdings.len()
    );

    let alert = Alert::new("PORTFOLIO", AlertKind::Report, message, total_value, "daily_report");
    println!("{}", alert.message);
    LogSink.deliver(alert).await;
    Ok(())
}

/// Pushes a test alert through the sink so notification plumbing can be
/// verified without waiting for a real signal.
async fn run_test_alert() -> Result<()> {
    let alert = Alert::new(
        "TEST",
        AlertKind::Test,
        "Test alert: notification path is working".to_string(),
        0.0,
        "test",
    );
    println!("{}", alert.message);
    LogSink.deliver(alert).await;
    Ok(())
}
