//! Periodic monitoring loop.
//!
//! One scheduler per process. Each cycle checks holdings (sell pass)
//! before the watchlist (buy pass), so a sell signal is always presented
//! first. Quote fetching stays sequential to keep the per-provider
//! backoff meaningful.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::alert::{Alert, AlertSink};
use crate::core::portfolio::PortfolioStore;
use crate::core::strategy::Strategy;
use crate::monitor::dedup::{self, AlertDeduplicator};
use crate::monitor::evaluator::{evaluate_buy, evaluate_sell};
use crate::monitor::market_hours::MarketHours;
use crate::providers::aggregator::FallbackAggregator;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SchedulerConfig {
    pub check_interval: Duration,
    pub market_hours: MarketHours,
    /// When false, cycles run around the clock (useful outside exchange
    /// time zones and in tests).
    pub market_hours_only: bool,
    pub alert_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            check_interval: Duration::from_secs(1800),
            market_hours: MarketHours::default(),
            market_hours_only: true,
            alert_cooldown: dedup::DEFAULT_COOLDOWN,
        }
    }
}

struct MonitorContext {
    aggregator: Arc<FallbackAggregator>,
    store: Arc<dyn PortfolioStore>,
    sink: Arc<dyn AlertSink>,
    strategies: HashMap<String, Strategy>,
    config: SchedulerConfig,
    dedup: Mutex<AlertDeduplicator>,
}

#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub running: bool,
    pub check_interval: Duration,
    pub market_open: bool,
    pub strategy_count: usize,
    pub holding_count: usize,
    pub watchlist_count: usize,
}

/// Stopped -> Running -> Stopped. `start` is a no-op while running;
/// `stop` interrupts the inter-cycle sleep and joins with a bounded
/// timeout (an in-flight fetch is allowed to complete).
pub struct MonitoringScheduler {
    context: Arc<MonitorContext>,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl MonitoringScheduler {
    pub fn new(
        aggregator: Arc<FallbackAggregator>,
        store: Arc<dyn PortfolioStore>,
        sink: Arc<dyn AlertSink>,
        strategies: HashMap<String, Strategy>,
        config: SchedulerConfig,
    ) -> Self {
        let dedup = Mutex::new(AlertDeduplicator::new(config.alert_cooldown));
        MonitoringScheduler {
            context: Arc::new(MonitorContext {
                aggregator,
                store,
                sink,
                strategies,
                config,
                dedup,
            }),
            handle: None,
            shutdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Monitoring is already running");
            return;
        }

        let (tx, rx) = watch::channel(false);
        let context = Arc::clone(&self.context);
        self.handle = Some(tokio::spawn(run_loop(context, rx)));
        self.shutdown = Some(tx);
        info!("Monitoring started");
    }

    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            debug!("Monitoring is not running");
            return;
        };
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(_) => info!("Monitoring stopped"),
            Err(_) => warn!("Monitoring loop did not stop within {STOP_TIMEOUT:?}"),
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        let ctx = &self.context;
        MonitorStatus {
            running: self.is_running(),
            check_interval: ctx.config.check_interval,
            market_open: ctx.config.market_hours.is_open(),
            strategy_count: ctx.strategies.len(),
            holding_count: ctx.store.get_all_holdings().await.map_or(0, |h| h.len()),
            watchlist_count: ctx.store.get_watchlist().await.map_or(0, |w| w.len()),
        }
    }
}

async fn run_loop(ctx: Arc<MonitorContext>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        if ctx.config.market_hours_only && !ctx.config.market_hours.is_open() {
            info!("Market closed; sleeping until the next check");
        } else {
            info!("Starting monitoring cycle");
            if let Err(err) = run_cycle(&ctx).await {
                // A bad cycle must never take the loop down
                error!("Monitoring cycle failed: {err:#}");
            } else {
                info!("Monitoring cycle complete");
            }
        }

        if sleep_or_shutdown(ctx.config.check_interval, &mut shutdown).await {
            break;
        }
    }
}

/// Returns true when shutdown was requested during the sleep.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let changed = tokio::select! {
        _ = tokio::time::sleep(duration) => return false,
        result = shutdown.changed() => result,
    };
    // A dropped sender means the owner is gone; stop in that case too.
    changed.is_err() || *shutdown.borrow()
}

async fn run_cycle(ctx: &MonitorContext) -> Result<()> {
    check_holdings(ctx).await?;
    check_watchlist(ctx).await?;
    Ok(())
}

/// Sell-condition pass over the current holdings.
async fn check_holdings(ctx: &MonitorContext) -> Result<()> {
    let holdings = ctx.store.get_all_holdings().await?;
    for holding in holdings {
        let Some(quote) = ctx.aggregator.get_quote(&holding.symbol).await else {
            continue;
        };

        if let Err(err) = ctx.store.update_price(&holding.symbol, quote.price).await {
            warn!(symbol = %holding.symbol, "Failed to persist price update: {err:#}");
        }
        let mut holding = holding;
        holding.apply_price(quote.price);

        for strategy in ctx.strategies.values() {
            if let Some(alert) = evaluate_sell(&holding, &quote, strategy) {
                emit(ctx, alert).await;
            }
        }
    }
    Ok(())
}

/// Buy-condition pass over active watchlist entries.
async fn check_watchlist(ctx: &MonitorContext) -> Result<()> {
    let watchlist = ctx.store.get_watchlist().await?;
    let entries: Vec<_> = watchlist.into_iter().filter(|e| e.active).collect();
    if entries.is_empty() {
        return Ok(());
    }

    let symbols: Vec<String> = entries.iter().map(|e| e.symbol.clone()).collect();
    let quotes = ctx.aggregator.get_quotes(&symbols).await;

    for entry in entries {
        let Some(strategy) = ctx.strategies.get(&entry.strategy_name) else {
            debug!(
                symbol = %entry.symbol,
                strategy = %entry.strategy_name,
                "Watchlist entry references an unknown strategy"
            );
            continue;
        };
        let Some(quote) = quotes.get(&entry.symbol) else {
            continue;
        };

        // Served from the cache the batch fetch just filled
        let dividend_info = ctx.aggregator.dividend_info(&entry.symbol).await;
        if let Some(alert) = evaluate_buy(quote, &dividend_info, strategy) {
            emit(ctx, alert).await;
        }
    }
    Ok(())
}

async fn emit(ctx: &MonitorContext, alert: Alert) {
    let key = dedup::key_for(&alert);
    if !ctx.dedup.lock().await.should_fire(key, Instant::now()) {
        return;
    }

    if let Err(err) = ctx.store.log_alert(&alert).await {
        warn!(symbol = %alert.symbol, "Failed to record alert: {err:#}");
    }

    info!(
        symbol = %alert.symbol,
        kind = %alert.kind,
        strategy = %alert.strategy_name,
        "Alert raised"
    );

    // Fire-and-forget; delivery never blocks the monitoring loop.
    let sink = Arc::clone(&ctx.sink);
    tokio::spawn(async move {
        sink.deliver(alert).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::AlertKind;
    use crate::core::cache::QuoteCache;
    use crate::core::portfolio::{Holding, MemoryStore, WatchlistEntry};
    use crate::core::quote::Quote;
    use crate::core::source::{FetchError, QuoteSource};
    use crate::core::strategy::{self, StrategyConfig};
    use crate::providers::backoff::RateLimitPolicy;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FixedSource {
        price: f64,
    }

    #[async_trait]
    impl QuoteSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, sym: &str) -> Result<Quote, FetchError> {
            let mut quote = Quote::new(sym, sym, self.price, self.price, 1000);
            quote.per = Some(7.3);
            quote.pbr = Some(1.0);
            quote.dividend_yield = Some(0.028);
            Ok(quote)
        }
    }

    struct NoSource;

    #[async_trait]
    impl QuoteSource for NoSource {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn fetch(&self, sym: &str) -> Result<Quote, FetchError> {
            Err(FetchError::NotFound(sym.to_string()))
        }
    }

    struct ChannelSink {
        tx: mpsc::UnboundedSender<Alert>,
    }

    #[async_trait]
    impl AlertSink for ChannelSink {
        async fn deliver(&self, alert: Alert) {
            let _ = self.tx.send(alert);
        }
    }

    fn test_aggregator(price: f64) -> Arc<FallbackAggregator> {
        Arc::new(FallbackAggregator::new(
            Arc::new(NoSource),
            Arc::new(FixedSource { price }),
            Arc::new(NoSource),
            QuoteCache::default(),
            RateLimitPolicy::with_waits(
                Duration::from_millis(1),
                Duration::from_millis(1),
            ),
        ))
    }

    fn test_strategies() -> HashMap<String, Strategy> {
        let mut config = StrategyConfig {
            condition_mode: "any_two_of_three".to_string(),
            ..StrategyConfig::default()
        };
        config.buy_conditions.dividend_yield_min = 1.0;
        config.buy_conditions.per_max = 40.0;
        config.buy_conditions.pbr_max = 4.0;
        config.sell_conditions.profit_target = 15.0;
        config.sell_conditions.stop_loss = -3.0;
        let strategy = Strategy::from_config("value", config).unwrap();
        HashMap::from([(strategy.name.clone(), strategy)])
    }

    fn scheduler_config(interval: Duration) -> SchedulerConfig {
        SchedulerConfig {
            check_interval: interval,
            market_hours: MarketHours::default(),
            market_hours_only: false,
            alert_cooldown: dedup::DEFAULT_COOLDOWN,
        }
    }

    async fn drain_alerts(
        rx: &mut mpsc::UnboundedReceiver<Alert>,
        expected: usize,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        while alerts.len() < expected {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(alert)) => alerts.push(alert),
                _ => break,
            }
        }
        alerts
    }

    #[tokio::test]
    async fn test_cycle_emits_sell_and_buy_alerts_once() {
        // Price drop to 2420 (-3.2%) trips the stop-loss; the same quote
        // satisfies all three buy conditions for the watchlist entry.
        let store = Arc::new(MemoryStore::new(
            vec![Holding::new("7203", "Toyota", 100, 2500.0)],
            vec![WatchlistEntry {
                symbol: "6758".to_string(),
                name: "Sony".to_string(),
                strategy_name: "value".to_string(),
                target_buy_price: None,
                target_sell_price: None,
                active: true,
            }],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = MonitoringScheduler::new(
            test_aggregator(2420.0),
            store.clone(),
            Arc::new(ChannelSink { tx }),
            test_strategies(),
            scheduler_config(Duration::from_millis(50)),
        );

        scheduler.start();
        let alerts = drain_alerts(&mut rx, 2).await;
        scheduler.stop().await;

        assert_eq!(alerts.len(), 2);
        // The sell pass runs before the watchlist pass; delivery itself is
        // fire-and-forget, so match on kind rather than arrival order.
        let sell = alerts.iter().find(|a| a.kind == AlertKind::SellLoss);
        assert_eq!(sell.expect("stop-loss alert").symbol, "7203");
        let buy = alerts.iter().find(|a| a.kind == AlertKind::Buy);
        assert_eq!(buy.expect("buy alert").symbol, "6758");

        // The store saw the price update and logged both alerts
        let holdings = store.get_all_holdings().await.unwrap();
        assert_eq!(holdings[0].current_price, 2420.0);
        assert_eq!(store.alert_history().await.len(), 2);

        // Later cycles within the cool-down stay quiet
        assert!(drain_alerts(&mut rx, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_is_bounded() {
        let store = Arc::new(MemoryStore::new(vec![], vec![]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = MonitoringScheduler::new(
            test_aggregator(2500.0),
            store,
            Arc::new(ChannelSink { tx }),
            test_strategies(),
            scheduler_config(Duration::from_secs(3600)),
        );

        assert!(!scheduler.is_running());
        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.start(); // no-op
        assert!(scheduler.is_running());

        // Stop must interrupt the hour-long sleep promptly
        let started = Instant::now();
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(started.elapsed() < Duration::from_secs(2));

        scheduler.stop().await; // no-op when already stopped
    }

    #[tokio::test]
    async fn test_closed_market_skips_the_cycle() {
        let store = Arc::new(MemoryStore::new(
            vec![Holding::new("7203", "Toyota", 100, 2500.0)],
            vec![],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Zero sessions: the market is never open
        let config = SchedulerConfig {
            check_interval: Duration::from_millis(20),
            market_hours: MarketHours::new(vec![]),
            market_hours_only: true,
            alert_cooldown: dedup::DEFAULT_COOLDOWN,
        };
        let mut scheduler = MonitoringScheduler::new(
            test_aggregator(2420.0),
            store.clone(),
            Arc::new(ChannelSink { tx }),
            test_strategies(),
            config,
        );

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(store.get_all_holdings().await.unwrap()[0].current_price, 0.0);
    }

    #[tokio::test]
    async fn test_inactive_watchlist_entries_are_skipped() {
        let store = Arc::new(MemoryStore::new(
            vec![],
            vec![WatchlistEntry {
                symbol: "6758".to_string(),
                name: "Sony".to_string(),
                strategy_name: "value".to_string(),
                target_buy_price: None,
                target_sell_price: None,
                active: false,
            }],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = MonitoringScheduler::new(
            test_aggregator(2420.0),
            store,
            Arc::new(ChannelSink { tx }),
            test_strategies(),
            scheduler_config(Duration::from_millis(20)),
        );

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_reflects_store_and_state() {
        let store = Arc::new(MemoryStore::new(
            vec![Holding::new("7203", "Toyota", 100, 2500.0)],
            vec![],
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = MonitoringScheduler::new(
            test_aggregator(2500.0),
            store,
            Arc::new(ChannelSink { tx }),
            test_strategies(),
            scheduler_config(Duration::from_secs(1800)),
        );

        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.holding_count, 1);
        assert_eq!(status.watchlist_count, 0);
        assert_eq!(status.strategy_count, 1);
    }

    #[test]
    fn test_default_strategies_are_usable() {
        let strategies = strategy::default_strategies();
        assert!(strategies.contains_key("default_strategy"));
    }
}
