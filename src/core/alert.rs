//! Alert model and the outbound notification boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Buy,
    SellProfit,
    SellLoss,
    Test,
    Report,
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AlertKind::Buy => "buy",
            AlertKind::SellProfit => "sell_profit",
            AlertKind::SellLoss => "sell_loss",
            AlertKind::Test => "test",
            AlertKind::Report => "report",
        };
        write!(f, "{label}")
    }
}

/// A recommendation produced by the strategy evaluator.
///
/// Immutable once created; the store keeps them for history and nothing
/// updates them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub symbol: String,
    pub kind: AlertKind,
    pub message: String,
    pub triggered_price: f64,
    pub strategy_name: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        symbol: &str,
        kind: AlertKind,
        message: String,
        triggered_price: f64,
        strategy_name: &str,
    ) -> Self {
        Alert {
            symbol: symbol.to_string(),
            kind,
            message,
            triggered_price,
            strategy_name: strategy_name.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Notification collaborator. Delivery is fire-and-forget from the
/// monitor's point of view; retries are the sink's own business.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: Alert);
}

/// Default sink: writes the alert to the log and nothing else.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: Alert) {
        info!(
            symbol = %alert.symbol,
            kind = %alert.kind,
            strategy = %alert.strategy_name,
            price = alert.triggered_price,
            "ALERT: {}",
            alert.message
        );
    }
}
