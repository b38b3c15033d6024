//! Holdings, watchlist and the persistence boundary.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::alert::Alert;

/// One position imported from a broker export.
///
/// `current_price`, `market_value` and `profit_loss` are denormalized and
/// recomputed by [`Holding::apply_price`] on every price update; they are
/// never edited by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub quantity: u32,
    pub average_cost: f64,
    #[serde(default)]
    pub acquisition_amount: f64,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub market_value: f64,
    #[serde(default)]
    pub profit_loss: f64,
    #[serde(default)]
    pub broker: String,
    #[serde(default)]
    pub account_type: String,
}

impl Holding {
    pub fn new(symbol: &str, name: &str, quantity: u32, average_cost: f64) -> Self {
        Holding {
            symbol: symbol.to_string(),
            name: name.to_string(),
            quantity,
            average_cost,
            acquisition_amount: average_cost * f64::from(quantity),
            current_price: 0.0,
            market_value: 0.0,
            profit_loss: 0.0,
            broker: String::new(),
            account_type: String::new(),
        }
    }

    /// Recomputes the denormalized fields for a fresh price.
    pub fn apply_price(&mut self, price: f64) {
        self.current_price = price;
        self.market_value = price * f64::from(self.quantity);
        self.profit_loss = self.market_value - self.acquisition_amount;
    }

    /// Return rate in percent against the average cost, 0 when the cost
    /// basis is unusable.
    pub fn return_rate(&self) -> f64 {
        if self.average_cost > 0.0 {
            (self.current_price / self.average_cost - 1.0) * 100.0
        } else {
            0.0
        }
    }

    /// Fills `acquisition_amount` when a config-seeded holding omits it.
    pub fn normalized(mut self) -> Self {
        if self.acquisition_amount <= 0.0 {
            self.acquisition_amount = self.average_cost * f64::from(self.quantity);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub name: String,
    pub strategy_name: String,
    #[serde(default)]
    pub target_buy_price: Option<f64>,
    #[serde(default)]
    pub target_sell_price: Option<f64>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Read/write contract against the persistence collaborator. The monitor
/// treats holdings and watchlist as read-only inputs per cycle.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn get_all_holdings(&self) -> Result<Vec<Holding>>;
    async fn get_watchlist(&self) -> Result<Vec<WatchlistEntry>>;
    async fn update_price(&self, symbol: &str, price: f64) -> Result<()>;
    async fn log_alert(&self, alert: &Alert) -> Result<()>;
}

/// In-memory store used by the one-shot CLI commands and tests. The real
/// database lives behind the same trait in the desktop application.
#[derive(Default)]
pub struct MemoryStore {
    holdings: Mutex<Vec<Holding>>,
    watchlist: Mutex<Vec<WatchlistEntry>>,
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryStore {
    pub fn new(holdings: Vec<Holding>, watchlist: Vec<WatchlistEntry>) -> Self {
        MemoryStore {
            holdings: Mutex::new(holdings.into_iter().map(Holding::normalized).collect()),
            watchlist: Mutex::new(watchlist),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub async fn alert_history(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn get_all_holdings(&self) -> Result<Vec<Holding>> {
        Ok(self.holdings.lock().await.clone())
    }

    async fn get_watchlist(&self) -> Result<Vec<WatchlistEntry>> {
        Ok(self.watchlist.lock().await.clone())
    }

    async fn update_price(&self, symbol: &str, price: f64) -> Result<()> {
        let mut holdings = self.holdings.lock().await;
        for holding in holdings.iter_mut().filter(|h| h.symbol == symbol) {
            holding.apply_price(price);
        }
        debug!(symbol, price, "Updated holding price");
        Ok(())
    }

    async fn log_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alert::AlertKind;

    #[test]
    fn test_apply_price_recomputes_denormalized_fields() {
        let mut holding = Holding::new("7203", "Toyota", 100, 2500.0);
        holding.apply_price(2860.0);

        assert_eq!(holding.current_price, 2860.0);
        assert_eq!(holding.market_value, 286_000.0);
        assert_eq!(holding.profit_loss, 36_000.0);
        assert!((holding.return_rate() - 14.4).abs() < 0.001);
    }

    #[test]
    fn test_return_rate_with_zero_cost_basis() {
        let mut holding = Holding::new("7203", "Toyota", 100, 0.0);
        holding.apply_price(2860.0);
        assert_eq!(holding.return_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new(
            vec![Holding::new("7203", "Toyota", 100, 2500.0)],
            vec![],
        );

        store.update_price("7203", 2420.0).await.unwrap();
        let holdings = store.get_all_holdings().await.unwrap();
        assert_eq!(holdings[0].current_price, 2420.0);

        let alert = Alert::new("7203", AlertKind::SellLoss, "stop".into(), 2420.0, "s");
        store.log_alert(&alert).await.unwrap();
        assert_eq!(store.alert_history().await.len(), 1);
    }

    #[test]
    fn test_config_seeded_holding_fills_acquisition_amount() {
        let yaml = r#"
symbol: "7203"
name: "Toyota"
quantity: 100
average_cost: 2500.0
"#;
        let holding: Holding = serde_yaml::from_str(yaml).unwrap();
        let store_ready = holding.normalized();
        assert_eq!(store_ready.acquisition_amount, 250_000.0);
    }
}
