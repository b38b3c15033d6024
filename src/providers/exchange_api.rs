//! Authenticated exchange API, the authoritative source for domestic
//! symbols.
//!
//! Authentication is two-step: a refresh token (configured directly, or
//! obtained from email/password) is exchanged for an id token on first
//! use and reused for the rest of the run. Valuation ratios missing from
//! the quote payload are derived from the statements endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::core::config::ExchangeCredentials;
use crate::core::quote::Quote;
use crate::core::source::{FetchError, QuoteSource};
use crate::core::symbol;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ExchangeApiProvider {
    base_url: String,
    credentials: Option<ExchangeCredentials>,
    id_token: Mutex<Option<String>>,
}

impl ExchangeApiProvider {
    pub fn new(base_url: &str, credentials: Option<ExchangeCredentials>) -> Self {
        ExchangeApiProvider {
            base_url: base_url.to_string(),
            credentials,
            id_token: Mutex::new(None),
        }
    }

    /// The API addresses listings by five-character code; plain four-digit
    /// codes gain a trailing zero, preferred-share codes already carry
    /// their letter.
    fn format_exchange_code(code: &str) -> String {
        let code = symbol::normalize(code);
        if code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit()) {
            format!("{code}0")
        } else {
            code
        }
    }

    async fn ensure_token(
        &self,
        client: &reqwest::Client,
        credentials: &ExchangeCredentials,
    ) -> Result<String, FetchError> {
        let mut guard = self.id_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let refresh_token = match &credentials.refresh_token {
            Some(token) => token.clone(),
            None => self.request_refresh_token(client, credentials).await?,
        };
        let id_token = self.request_id_token(client, &refresh_token).await?;
        *guard = Some(id_token.clone());
        Ok(id_token)
    }

    async fn request_refresh_token(
        &self,
        client: &reqwest::Client,
        credentials: &ExchangeCredentials,
    ) -> Result<String, FetchError> {
        let (Some(email), Some(password)) = (&credentials.email, &credentials.password) else {
            return Err(FetchError::Fatal(
                "no refresh token and no email/password pair".to_string(),
            ));
        };

        let url = format!("{}/token/auth_user", self.base_url);
        debug!("Requesting refresh token");
        let response = client
            .post(&url)
            .json(&serde_json::json!({ "mailaddress": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Fatal(format!(
                "user authentication failed ({})",
                response.status()
            )));
        }

        let body = response.json::<RefreshAuthResponse>().await.map_err(|e| {
            FetchError::Fatal(format!("malformed authentication response: {e}"))
        })?;
        Ok(body.refresh_token)
    }

    async fn request_id_token(
        &self,
        client: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<String, FetchError> {
        let url = format!("{}/token/auth_refresh", self.base_url);
        debug!("Exchanging refresh token for id token");
        let response = client
            .post(&url)
            .query(&[("refreshtoken", refresh_token)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Fatal(format!(
                "token refresh failed ({})",
                response.status()
            )));
        }

        let body = response
            .json::<IdTokenResponse>()
            .await
            .map_err(|e| FetchError::Fatal(format!("malformed token response: {e}")))?;
        Ok(body.id_token)
    }

    async fn daily_quotes(
        &self,
        client: &reqwest::Client,
        token: &str,
        code: &str,
        sym: &str,
    ) -> Result<(f64, f64, u64), FetchError> {
        let url = format!("{}/prices/daily_quotes", self.base_url);
        let response = client
            .get(&url)
            .query(&[("code", code)])
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(response.status(), sym));
        }

        let body = response.json::<DailyQuotesResponse>().await.map_err(|e| {
            FetchError::Transient(format!("malformed daily quotes for {sym}: {e}"))
        })?;

        let closes: Vec<&DailyQuote> = body
            .daily_quotes
            .iter()
            .filter(|q| q.close.is_some())
            .collect();
        let Some(latest) = closes.last() else {
            return Err(FetchError::NotFound(sym.to_string()));
        };

        let price = latest.close.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(FetchError::Transient(format!(
                "invalid price {price} for {sym}"
            )));
        }
        let previous_close = closes
            .len()
            .checked_sub(2)
            .and_then(|i| closes[i].close)
            .unwrap_or(price);
        let volume = latest.volume.unwrap_or(0.0) as u64;
        Ok((price, previous_close, volume))
    }

    async fn company_name(
        &self,
        client: &reqwest::Client,
        token: &str,
        code: &str,
    ) -> Option<String> {
        let url = format!("{}/listed/info", self.base_url);
        let response = client
            .get(&url)
            .query(&[("code", code)])
            .bearer_auth(token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(code, status = %response.status(), "Listed info unavailable");
            return None;
        }
        let body = response.json::<ListedInfoResponse>().await.ok()?;
        body.info.into_iter().next().map(|i| i.company_name)
    }

    async fn fundamentals(
        &self,
        client: &reqwest::Client,
        token: &str,
        code: &str,
    ) -> Option<Statement> {
        let url = format!("{}/fins/statements", self.base_url);
        let response = client
            .get(&url)
            .query(&[("code", code)])
            .bearer_auth(token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(code, status = %response.status(), "Statements unavailable");
            return None;
        }
        let body = response.json::<StatementsResponse>().await.ok()?;
        body.statements.into_iter().last()
    }
}

#[derive(Deserialize, Debug)]
struct RefreshAuthResponse {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Deserialize, Debug)]
struct IdTokenResponse {
    #[serde(rename = "idToken")]
    id_token: String,
}

#[derive(Deserialize, Debug)]
struct DailyQuotesResponse {
    daily_quotes: Vec<DailyQuote>,
}

#[derive(Deserialize, Debug)]
struct DailyQuote {
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct ListedInfoResponse {
    info: Vec<ListedInfo>,
}

#[derive(Deserialize, Debug)]
struct ListedInfo {
    #[serde(rename = "CompanyName")]
    company_name: String,
}

#[derive(Deserialize, Debug)]
struct StatementsResponse {
    statements: Vec<Statement>,
}

#[derive(Deserialize, Debug, Default)]
struct Statement {
    #[serde(rename = "EarningsPerShare")]
    eps: Option<f64>,
    #[serde(rename = "BookValuePerShare")]
    bvps: Option<f64>,
    #[serde(rename = "Profit")]
    profit: Option<f64>,
    #[serde(rename = "Equity")]
    equity: Option<f64>,
    #[serde(rename = "ResultDividendPerShareAnnual")]
    dividend_per_share: Option<f64>,
}

fn guarded_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator > 0.0).then(|| numerator / denominator)
}

#[async_trait]
impl QuoteSource for ExchangeApiProvider {
    fn name(&self) -> &'static str {
        "exchange-api"
    }

    #[instrument(name = "ExchangeFetch", skip(self), fields(symbol = %sym))]
    async fn fetch(&self, sym: &str) -> Result<Quote, FetchError> {
        let Some(credentials) = &self.credentials else {
            return Err(FetchError::Fatal("no credentials configured".to_string()));
        };

        let client = reqwest::Client::builder()
            .user_agent("stockwatch/0.2")
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let token = self.ensure_token(&client, credentials).await?;
        let code = Self::format_exchange_code(sym);

        let (price, previous_close, volume) =
            self.daily_quotes(&client, &token, &code, sym).await?;
        let name = self
            .company_name(&client, &token, &code)
            .await
            .unwrap_or_else(|| sym.to_string());

        let mut quote = Quote::new(sym, &name, price, previous_close, volume);
        if let Some(stmt) = self.fundamentals(&client, &token, &code).await {
            quote.per = stmt.eps.and_then(|eps| guarded_ratio(price, eps));
            quote.pbr = stmt.bvps.and_then(|bvps| guarded_ratio(price, bvps));
            quote.roe = match (stmt.profit, stmt.equity) {
                (Some(profit), Some(equity)) => guarded_ratio(profit, equity),
                _ => None,
            };
            quote.dividend_yield = stmt
                .dividend_per_share
                .and_then(|dps| guarded_ratio(dps, price));
        }
        Ok(quote)
    }
}
