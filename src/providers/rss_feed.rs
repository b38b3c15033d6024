//! Broker RSS feed source, currently a placeholder.
//!
//! Kept in the fallback chain so the aggregator's priority order is
//! complete; it reports every symbol as unavailable until a feed
//! integration lands. The aggregator treats that as "move on", not as a
//! provider failure.

use async_trait::async_trait;
use tracing::debug;

use crate::core::quote::Quote;
use crate::core::source::{FetchError, QuoteSource};

pub struct RssFeedProvider {
    feed_url: Option<String>,
}

impl RssFeedProvider {
    pub fn new(feed_url: Option<String>) -> Self {
        RssFeedProvider { feed_url }
    }
}

#[async_trait]
impl QuoteSource for RssFeedProvider {
    fn name(&self) -> &'static str {
        "broker-rss"
    }

    async fn fetch(&self, sym: &str) -> Result<Quote, FetchError> {
        debug!(
            symbol = %sym,
            feed = self.feed_url.as_deref().unwrap_or("<unset>"),
            "RSS source has no quote data yet"
        );
        Err(FetchError::NotFound(sym.to_string()))
    }
}
