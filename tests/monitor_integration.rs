use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use stockwatch::core::alert::{Alert, AlertKind, AlertSink};
use stockwatch::core::cache::QuoteCache;
use stockwatch::core::portfolio::{Holding, MemoryStore, PortfolioStore, WatchlistEntry};
use stockwatch::core::strategy::{BuyConditions, SellConditions, Strategy, StrategyConfig};
use stockwatch::monitor::market_hours::MarketHours;
use stockwatch::monitor::scheduler::{MonitoringScheduler, SchedulerConfig};
use stockwatch::monitor::evaluator;
use stockwatch::providers::exchange_api::ExchangeApiProvider;
use stockwatch::providers::finance_api::FinanceApiProvider;
use stockwatch::providers::rss_feed::RssFeedProvider;
use stockwatch::providers::{FallbackAggregator, RateLimitPolicy};

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Chart payload in the finance API's shape, with full valuation data.
    pub fn chart_body(name: &str, price: f64, previous_close: f64) -> String {
        format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "meta": {{
                            "regularMarketPrice": {price},
                            "chartPreviousClose": {previous_close},
                            "regularMarketVolume": 1200000,
                            "shortName": "{name}",
                            "trailingPE": 7.3,
                            "priceToBook": 1.0,
                            "dividendYield": 0.028
                        }}
                    }}]
                }}
            }}"#
        )
    }

    pub async fn mount_chart(server: &MockServer, chart_path: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{chart_path}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
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

fn fast_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        rate_limit_wait: Duration::from_millis(5),
        transient_wait: Duration::from_millis(1),
        escalation_threshold: 3,
        escalation_wait: Duration::from_millis(10),
    }
}

/// Exchange adapter without credentials plus a wiremock-backed finance
/// API: the realistic unauthenticated setup.
fn unauthenticated_aggregator(finance_base: &str) -> Arc<FallbackAggregator> {
    Arc::new(FallbackAggregator::new(
        Arc::new(ExchangeApiProvider::new("http://127.0.0.1:9", None)),
        Arc::new(FinanceApiProvider::new(finance_base, ".T")),
        Arc::new(RssFeedProvider::new(None)),
        QuoteCache::default(),
        fast_policy(),
    ))
}

fn value_strategy() -> Strategy {
    Strategy::from_config(
        "value",
        StrategyConfig {
            buy_conditions: BuyConditions {
                dividend_yield_min: 1.0,
                per_max: 40.0,
                pbr_max: 4.0,
            },
            sell_conditions: SellConditions {
                profit_target: 15.0,
                stop_loss: -3.0,
            },
            condition_mode: "any_two_of_three".to_string(),
            ..StrategyConfig::default()
        },
    )
    .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_monitoring_cycle_end_to_end() {
    let server = wiremock::MockServer::start().await;
    // Holding 7203 bought at 2500 drops to 2420 (-3.2%): stop-loss.
    test_utils::mount_chart(
        &server,
        "7203.T",
        test_utils::chart_body("Toyota Motor", 2420.0, 2500.0),
    )
    .await;
    // Watchlist 6758 satisfies all three buy conditions.
    test_utils::mount_chart(
        &server,
        "6758.T",
        test_utils::chart_body("Sony Group", 2860.0, 2750.0),
    )
    .await;

    let store = Arc::new(MemoryStore::new(
        vec![Holding::new("7203", "Toyota Motor", 100, 2500.0)],
        vec![WatchlistEntry {
            symbol: "6758".to_string(),
            name: "Sony Group".to_string(),
            strategy_name: "value".to_string(),
            target_buy_price: None,
            target_sell_price: None,
            active: true,
        }],
    ));
    let strategy = value_strategy();
    let strategies = HashMap::from([(strategy.name.clone(), strategy)]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut scheduler = MonitoringScheduler::new(
        unauthenticated_aggregator(&server.uri()),
        store.clone(),
        Arc::new(ChannelSink { tx }),
        strategies,
        SchedulerConfig {
            check_interval: Duration::from_millis(50),
            market_hours: MarketHours::default(),
            market_hours_only: false,
            alert_cooldown: Duration::from_secs(24 * 3600),
        },
    );

    scheduler.start();
    let mut alerts = Vec::new();
    while alerts.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(alert)) => alerts.push(alert),
            _ => break,
        }
    }
    scheduler.stop().await;

    assert_eq!(alerts.len(), 2, "expected a sell and a buy alert");
    let sell = alerts
        .iter()
        .find(|a| a.kind == AlertKind::SellLoss)
        .expect("stop-loss alert for the holding");
    assert_eq!(sell.symbol, "7203");
    assert_eq!(sell.triggered_price, 2420.0);
    assert_eq!(sell.strategy_name, "value");

    let buy = alerts
        .iter()
        .find(|a| a.kind == AlertKind::Buy)
        .expect("buy alert for the watchlist entry");
    assert_eq!(buy.symbol, "6758");

    // Denormalized holding fields were refreshed from the quote
    let holdings = store.get_all_holdings().await.unwrap();
    assert_eq!(holdings[0].current_price, 2420.0);
    assert_eq!(holdings[0].market_value, 242_000.0);

    // Cool-down: further cycles raise nothing new for the same keys
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "duplicate alerts within the cool-down");
    assert_eq!(store.alert_history().await.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_profit_band_keeps_quiet() {
    // 2500 -> 2860 is +14.4%: inside the {-3%, +15%} band, no sell alert.
    let server = wiremock::MockServer::start().await;
    test_utils::mount_chart(
        &server,
        "7203.T",
        test_utils::chart_body("Toyota Motor", 2860.0, 2750.0),
    )
    .await;

    let aggregator = unauthenticated_aggregator(&server.uri());
    let quote = aggregator.get_quote("7203").await.expect("quote");

    let mut holding = Holding::new("7203", "Toyota Motor", 100, 2500.0);
    holding.apply_price(quote.price);
    assert!(evaluator::evaluate_sell(&holding, &quote, &value_strategy()).is_none());
}

#[test_log::test(tokio::test)]
async fn test_rate_limited_symbol_resolves_to_none() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/v8/finance/chart/AAPL"))
        .respond_with(wiremock::ResponseTemplate::new(429))
        .expect(2) // initial attempt plus exactly one retry
        .mount(&server)
        .await;

    let aggregator = unauthenticated_aggregator(&server.uri());
    assert!(aggregator.get_quote("AAPL").await.is_none());
}

#[test_log::test(tokio::test)]
async fn test_synthetic_symbols_make_no_requests() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let aggregator = unauthenticated_aggregator(&server.uri());
    assert!(aggregator.get_quote("PORTFOLIO_TOTAL").await.is_none());
    assert!(aggregator.get_quote("FUND_GLOBAL").await.is_none());

    let batch = aggregator
        .get_quotes(&["TOTAL_PORTFOLIO".to_string(), "STOCK_PORTFOLIO".to_string()])
        .await;
    assert!(batch.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_exchange_quote_is_supplemented_by_finance_api() {
    let server = wiremock::MockServer::start().await;

    // Authenticated exchange API knows the price but has no fundamentals.
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/token/auth_refresh"))
        .respond_with(
            wiremock::ResponseTemplate::new(200).set_body_string(r#"{"idToken": "id-tok"}"#),
        )
        .mount(&server)
        .await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/prices/daily_quotes"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
            r#"{"daily_quotes": [{"Close": 2750.0, "Volume": 900000}, {"Close": 2860.0, "Volume": 1100000}]}"#,
        ))
        .mount(&server)
        .await;
    // The finance API fills the valuation gaps.
    test_utils::mount_chart(
        &server,
        "7203.T",
        test_utils::chart_body("Toyota Motor", 2855.0, 2748.0),
    )
    .await;

    let credentials = stockwatch::core::config::ExchangeCredentials {
        email: None,
        password: None,
        refresh_token: Some("refresh-tok".to_string()),
    };
    let aggregator = Arc::new(FallbackAggregator::new(
        Arc::new(ExchangeApiProvider::new(&server.uri(), Some(credentials))),
        Arc::new(FinanceApiProvider::new(&server.uri(), ".T")),
        Arc::new(RssFeedProvider::new(None)),
        QuoteCache::default(),
        fast_policy(),
    ));

    let quote = aggregator.get_quote("7203").await.expect("merged quote");
    // Price and volume from the exchange API, which answered first
    assert_eq!(quote.price, 2860.0);
    assert_eq!(quote.volume, 1_100_000);
    // Valuations supplemented from the finance API
    assert_eq!(quote.per, Some(7.3));
    assert_eq!(quote.pbr, Some(1.0));
    assert_eq!(quote.dividend_yield, Some(0.028));
}
