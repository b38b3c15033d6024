//! Short-TTL quote cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::quote::Quote;
use crate::core::symbol;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    quote: Quote,
    fetched_at: Instant,
}

/// In-memory cache keyed by normalized symbol.
///
/// Staleness is checked only at read time; there is no eviction sweep.
/// Writers to the same key must be serialized by the caller (the scheduler
/// processes symbols sequentially).
pub struct QuoteCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, CacheEntry>>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<Quote> {
        let key = symbol::normalize(symbol);
        let cache = self.inner.lock().await;
        match cache.get(&key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                debug!(symbol = %key, "Cache HIT");
                Some(entry.quote.clone())
            }
            Some(_) => {
                debug!(symbol = %key, "Cache entry expired");
                None
            }
            None => {
                debug!(symbol = %key, "Cache MISS");
                None
            }
        }
    }

    pub async fn put(&self, symbol: &str, quote: Quote) {
        let key = symbol::normalize(symbol);
        let mut cache = self.inner.lock().await;
        debug!(symbol = %key, "Cache PUT");
        cache.insert(
            key,
            CacheEntry {
                quote,
                fetched_at: Instant::now(),
            },
        );
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quote::Quote;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = QuoteCache::default();
        assert!(cache.get("7203").await.is_none());

        cache
            .put("7203", Quote::new("7203", "Toyota", 2860.0, 2750.0, 0))
            .await;

        let hit = cache.get("7203").await.expect("fresh entry");
        assert_eq!(hit.price, 2860.0);
        assert!(cache.get("6758").await.is_none());
    }

    #[tokio::test]
    async fn test_key_is_normalized() {
        let cache = QuoteCache::default();
        cache
            .put(" 7203 ", Quote::new("7203", "Toyota", 2860.0, 2750.0, 0))
            .await;
        assert!(cache.get("7203").await.is_some());
    }

    #[tokio::test]
    async fn test_expiry_at_read_time() {
        let cache = QuoteCache::new(Duration::from_millis(20));
        cache
            .put("7203", Quote::new("7203", "Toyota", 2860.0, 2750.0, 0))
            .await;
        assert!(cache.get("7203").await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("7203").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = QuoteCache::default();
        cache
            .put("7203", Quote::new("7203", "Toyota", 2860.0, 2750.0, 0))
            .await;
        cache
            .put("7203", Quote::new("7203", "Toyota", 2420.0, 2860.0, 0))
            .await;
        assert_eq!(cache.get("7203").await.unwrap().price, 2420.0);
    }
}
