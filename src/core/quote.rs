//! Quote model shared by all data sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of one symbol as reported by a data source.
///
/// `change_percent` is always derived from `price` and `previous_close`;
/// nothing mutates it independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub previous_close: f64,
    pub change_percent: f64,
    pub volume: u64,
    /// Price-to-earnings ratio.
    pub per: Option<f64>,
    /// Price-to-book ratio.
    pub pbr: Option<f64>,
    /// Dividend yield as a fraction (0.028 = 2.8%).
    pub dividend_yield: Option<f64>,
    /// Return on equity as a fraction.
    pub roe: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: &str, name: &str, price: f64, previous_close: f64, volume: u64) -> Self {
        Quote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            previous_close,
            change_percent: Self::change_percent_of(price, previous_close),
            volume,
            per: None,
            pbr: None,
            dividend_yield: None,
            roe: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn change_percent_of(price: f64, previous_close: f64) -> f64 {
        if previous_close > 0.0 {
            (price - previous_close) / previous_close * 100.0
        } else {
            0.0
        }
    }

    /// True when every valuation field a buy strategy can look at is present.
    pub fn has_valuations(&self) -> bool {
        self.per.is_some() && self.pbr.is_some() && self.dividend_yield.is_some()
    }
}

/// Dividend figures used by the buy-condition pass.
#[derive(Debug, Clone, Default)]
pub struct DividendInfo {
    pub annual_dividend: f64,
    /// Yield in percent, matching the strategy threshold unit.
    pub yield_percent: f64,
}

impl DividendInfo {
    pub fn from_quote(quote: &Quote) -> Self {
        let fraction = quote.dividend_yield.unwrap_or(0.0);
        DividendInfo {
            annual_dividend: fraction * quote.price,
            yield_percent: fraction * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_percent_derivation() {
        let quote = Quote::new("7203", "Toyota", 2860.0, 2750.0, 1_000_000);
        assert!((quote.change_percent - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_change_percent_zero_without_previous_close() {
        let quote = Quote::new("7203", "Toyota", 2860.0, 0.0, 0);
        assert_eq!(quote.change_percent, 0.0);
    }

    #[test]
    fn test_dividend_info_from_quote() {
        let mut quote = Quote::new("7203", "Toyota", 2500.0, 2500.0, 0);
        quote.dividend_yield = Some(0.028);

        let info = DividendInfo::from_quote(&quote);
        assert!((info.yield_percent - 2.8).abs() < 0.001);
        assert!((info.annual_dividend - 70.0).abs() < 0.001);

        let bare = Quote::new("AAPL", "Apple", 150.0, 150.0, 0);
        assert_eq!(DividendInfo::from_quote(&bare).yield_percent, 0.0);
    }

    #[test]
    fn test_has_valuations() {
        let mut quote = Quote::new("7203", "Toyota", 2860.0, 2750.0, 0);
        assert!(!quote.has_valuations());

        quote.per = Some(7.3);
        quote.pbr = Some(1.0);
        quote.dividend_yield = Some(0.028);
        assert!(quote.has_valuations());
    }
}
