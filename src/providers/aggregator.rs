//! Multi-source quote acquisition with fallback, caching and rate-limit
//! recovery.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::cache::QuoteCache;
use crate::core::quote::{DividendInfo, Quote};
use crate::core::source::{FetchError, QuoteSource};
use crate::core::symbol::{self, SymbolKind};
use crate::providers::backoff::RateLimitPolicy;
use crate::providers::supplement::supplement;

/// Tries adapters in market-priority order and merges partial results.
///
/// Domestic symbols go to the exchange API first, with the finance API
/// filling valuation gaps; foreign symbols use the finance API directly.
/// An adapter reporting a fatal error is disabled for the rest of the run.
pub struct FallbackAggregator {
    primary: Arc<dyn QuoteSource>,
    fallback: Arc<dyn QuoteSource>,
    feed: Arc<dyn QuoteSource>,
    cache: QuoteCache,
    policy: RateLimitPolicy,
    disabled: Mutex<HashSet<&'static str>>,
}

impl FallbackAggregator {
    pub fn new(
        primary: Arc<dyn QuoteSource>,
        fallback: Arc<dyn QuoteSource>,
        feed: Arc<dyn QuoteSource>,
        cache: QuoteCache,
        policy: RateLimitPolicy,
    ) -> Self {
        FallbackAggregator {
            primary,
            fallback,
            feed,
            cache,
            policy,
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Single-symbol lookup. A symbol failing across every adapter comes
    /// back as `None`; the error never propagates further up.
    pub async fn get_quote(&self, sym: &str) -> Option<Quote> {
        if symbol::classify(sym) == SymbolKind::Synthetic {
            debug!(symbol = %sym, "Skipping synthetic symbol");
            return None;
        }
        match self.resolve(sym).await {
            Ok(quote) => Some(quote),
            Err(err) => {
                warn!(symbol = %sym, error = %err, "No quote from any source");
                None
            }
        }
    }

    /// Batch lookup used by the watchlist pass. Cache hits skip the
    /// network pass; the rest is fetched sequentially so the per-provider
    /// backoff stays meaningful. One symbol's failure never aborts the
    /// batch, but a streak of failures pauses it.
    pub async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let mut results = HashMap::new();
        let mut pending = Vec::new();

        for sym in symbols {
            if symbol::classify(sym) == SymbolKind::Synthetic {
                debug!(symbol = %sym, "Skipping synthetic symbol");
                continue;
            }
            match self.cache.get(sym).await {
                Some(hit) => {
                    results.insert(sym.clone(), hit);
                }
                None => pending.push(sym.clone()),
            }
        }

        let mut streak = self.policy.streak();
        for sym in pending {
            match self.resolve(&sym).await {
                Ok(quote) => {
                    streak.record_success();
                    results.insert(sym, quote);
                }
                Err(FetchError::NotFound(_)) => {
                    // A definitive miss; the provider itself is healthy.
                    warn!(symbol = %sym, "Symbol unknown to every source");
                    streak.record_success();
                }
                Err(err) => {
                    warn!(symbol = %sym, error = %err, "No quote from any source");
                    if streak.record_failure() {
                        warn!(
                            "Providers look degraded; pausing batch for {:?}",
                            self.policy.escalation_wait
                        );
                        tokio::time::sleep(self.policy.escalation_wait).await;
                    }
                }
            }
        }
        results
    }

    /// Dividend figures for the buy pass, derived from the (cached) quote.
    pub async fn dividend_info(&self, sym: &str) -> DividendInfo {
        self.get_quote(sym)
            .await
            .map(|quote| DividendInfo::from_quote(&quote))
            .unwrap_or_default()
    }

    async fn resolve(&self, sym: &str) -> Result<Quote, FetchError> {
        if let Some(hit) = self.cache.get(sym).await {
            return Ok(hit);
        }

        let quote = match symbol::classify(sym) {
            SymbolKind::Domestic => self.resolve_domestic(sym).await?,
            _ => self.resolve_foreign(sym).await?,
        };
        self.cache.put(sym, quote.clone()).await;
        Ok(quote)
    }

    async fn resolve_domestic(&self, sym: &str) -> Result<Quote, FetchError> {
        match self.try_source(&self.primary, sym).await {
            Ok(primary_quote) => {
                if primary_quote.has_valuations() {
                    return Ok(primary_quote);
                }
                // Partial data: best-effort supplement, the primary quote
                // stands on its own if the secondary fails too.
                match self.try_source(&self.fallback, sym).await {
                    Ok(secondary) => Ok(supplement(&primary_quote, Some(&secondary))),
                    Err(err) => {
                        debug!(symbol = %sym, error = %err, "No supplement source");
                        Ok(primary_quote)
                    }
                }
            }
            Err(primary_err) => {
                debug!(symbol = %sym, error = %primary_err, "Primary source failed, falling back");
                match self.try_source(&self.fallback, sym).await {
                    Ok(quote) => Ok(quote),
                    Err(fallback_err) => match self.try_source(&self.feed, sym).await {
                        Ok(quote) => Ok(quote),
                        Err(_) => Err(fallback_err),
                    },
                }
            }
        }
    }

    /// The finance API is authoritative for foreign symbols; its result is
    /// returned as-is, without supplementation.
    async fn resolve_foreign(&self, sym: &str) -> Result<Quote, FetchError> {
        match self.try_source(&self.fallback, sym).await {
            Ok(quote) => Ok(quote),
            Err(fallback_err) => match self.try_source(&self.feed, sym).await {
                Ok(quote) => Ok(quote),
                Err(_) => Err(fallback_err),
            },
        }
    }

    async fn try_source(
        &self,
        source: &Arc<dyn QuoteSource>,
        sym: &str,
    ) -> Result<Quote, FetchError> {
        if self.disabled.lock().await.contains(source.name()) {
            return Err(FetchError::Fatal(format!(
                "{} disabled for this run",
                source.name()
            )));
        }

        let mut attempt = 0;
        loop {
            match source.fetch(sym).await {
                Ok(quote) => return Ok(quote),
                Err(err) if err.is_fatal() => {
                    let newly = self.disabled.lock().await.insert(source.name());
                    if newly {
                        warn!(source = source.name(), error = %err, "Disabling adapter for this run");
                    }
                    return Err(err);
                }
                Err(err) => match self.policy.retry_delay(&err, attempt) {
                    Some(delay) => {
                        warn!(
                            source = source.name(),
                            symbol = %sym,
                            error = %err,
                            "Retrying once after {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}
