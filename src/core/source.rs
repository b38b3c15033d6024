//! Data-source abstraction and the error taxonomy the fallback logic
//! branches on.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::quote::Quote;

/// Why a fetch failed, from the aggregator's point of view.
///
/// The distinction matters: `NotFound` moves on to the next adapter and is
/// never retried, `RateLimited` and `Transient` get exactly one retry with
/// a backoff, and `Fatal` disables the adapter for the rest of the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("symbol not found: {0}")]
    NotFound(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("provider unavailable: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn from_status(status: reqwest::StatusCode, symbol: &str) -> Self {
        match status.as_u16() {
            404 => FetchError::NotFound(symbol.to_string()),
            429 => FetchError::RateLimited,
            401 | 403 => FetchError::Fatal(format!("authentication rejected ({status})")),
            _ if status.is_server_error() => {
                FetchError::Transient(format!("server error {status}"))
            }
            _ => FetchError::Transient(format!("unexpected status {status}")),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Fatal(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // Connection and timeout failures carry no HTTP status; anything
        // with a status has already been mapped via `from_status`.
        FetchError::Transient(err.to_string())
    }
}

/// One upstream quote provider.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short identifier used in logs and the adapter-disable set.
    fn name(&self) -> &'static str;

    async fn fetch(&self, symbol: &str) -> Result<Quote, FetchError>;
}
