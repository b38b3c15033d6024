//! Broad-market fallback source.
//!
//! Works for both domestic and foreign symbols; domestic numeric codes
//! get the configured exchange suffix appended, alphabetic tickers pass
//! through untouched.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::quote::Quote;
use crate::core::source::{FetchError, QuoteSource};
use crate::core::symbol::{self, SymbolKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FinanceApiProvider {
    base_url: String,
    exchange_suffix: String,
}

impl FinanceApiProvider {
    pub fn new(base_url: &str, exchange_suffix: &str) -> Self {
        FinanceApiProvider {
            base_url: base_url.to_string(),
            exchange_suffix: exchange_suffix.to_string(),
        }
    }

    fn format_symbol(&self, sym: &str) -> String {
        let normalized = symbol::normalize(sym);
        match symbol::classify(&normalized) {
            SymbolKind::Domestic => format!("{normalized}{}", self.exchange_suffix),
            _ => normalized,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Vec<ChartItem>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    #[serde(alias = "chartPreviousClose")]
    previous_close: Option<f64>,
    #[serde(alias = "regularMarketVolume")]
    volume: Option<u64>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
    #[serde(alias = "longName")]
    long_name: Option<String>,
    #[serde(alias = "trailingPE")]
    trailing_pe: Option<f64>,
    #[serde(alias = "priceToBook")]
    price_to_book: Option<f64>,
    #[serde(alias = "dividendYield")]
    dividend_yield: Option<f64>,
}

#[async_trait]
impl QuoteSource for FinanceApiProvider {
    fn name(&self) -> &'static str {
        "finance-api"
    }

    #[instrument(name = "FinanceFetch", skip(self), fields(symbol = %sym))]
    async fn fetch(&self, sym: &str) -> Result<Quote, FetchError> {
        let formatted = self.format_symbol(sym);
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=2d",
            self.base_url, formatted
        );
        debug!("Requesting quote from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("stockwatch/0.2")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status(), sym));
        }

        let data = response.json::<ChartResponse>().await.map_err(|e| {
            FetchError::Transient(format!("malformed chart payload for {sym}: {e}"))
        })?;
        let item = data
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NotFound(sym.to_string()))?;

        let meta = item.meta;
        if !meta.regular_market_price.is_finite() || meta.regular_market_price < 0.0 {
            return Err(FetchError::Transient(format!(
                "invalid price {} for {sym}",
                meta.regular_market_price
            )));
        }

        let name = meta
            .short_name
            .or(meta.long_name)
            .unwrap_or_else(|| sym.to_string());
        let mut quote = Quote::new(
            sym,
            &name,
            meta.regular_market_price,
            meta.previous_close.unwrap_or(meta.regular_market_price),
            meta.volume.unwrap_or(0),
        );
        quote.per = meta.trailing_pe;
        quote.pbr = meta.price_to_book;
        quote.dividend_yield = meta.dividend_yield;
        Ok(quote)
    }
}
