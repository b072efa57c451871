use crate::config::FloatLookupConfig;
use crate::errors::{Result, TrackerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Free-float share count by ticker. Never fails: problems resolve to `None`.
#[async_trait]
pub trait FloatLookup: Send + Sync {
    async fn float_shares(&mut self, ticker: &str) -> Option<f64>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharesFloatEntry {
    float_shares: Option<f64>,
}

/// Shares-float HTTP endpoint (`?symbol=...&apikey=...`, first entry's `floatShares`)
pub struct HttpFloatProvider {
    http_client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpFloatProvider {
    pub fn new(config: &FloatLookupConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn fetch(&self, ticker: &str, api_key: &str) -> Result<Option<f64>> {
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[("symbol", ticker), ("apikey", api_key)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::ApiError(format!(
                "Failed to fetch float for {}: {}",
                ticker,
                response.status()
            )));
        }

        let entries: Vec<SharesFloatEntry> = response.json().await?;
        Ok(entries
            .first()
            .and_then(|e| e.float_shares)
            .filter(|shares| *shares > 0.0))
    }
}

#[async_trait]
impl FloatLookup for HttpFloatProvider {
    async fn float_shares(&mut self, ticker: &str) -> Option<f64> {
        let api_key = match self.api_key.as_deref() {
            Some(key) => key,
            None => {
                debug!("No float API key configured; float for {} unknown", ticker);
                return None;
            }
        };

        match self.fetch(ticker, api_key).await {
            Ok(shares) => shares,
            Err(e) => {
                warn!("Failed to fetch float for {}: {}", ticker, e);
                None
            }
        }
    }
}

/// Caches every answer, known or unknown, so each ticker is looked up once
pub struct CachedFloatLookup<L> {
    inner: L,
    cache: HashMap<String, Option<f64>>,
}

impl<L: FloatLookup> CachedFloatLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    /// Forget everything, e.g. between sessions
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[async_trait]
impl<L: FloatLookup> FloatLookup for CachedFloatLookup<L> {
    async fn float_shares(&mut self, ticker: &str) -> Option<f64> {
        let key = ticker.to_uppercase();
        if let Some(shares) = self.cache.get(&key) {
            return *shares;
        }

        let shares = self.inner.float_shares(&key).await;
        self.cache.insert(key, shares);
        shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingLookup {
        calls: usize,
        answer: Option<f64>,
    }

    #[async_trait]
    impl FloatLookup for CountingLookup {
        async fn float_shares(&mut self, _ticker: &str) -> Option<f64> {
            self.calls += 1;
            self.answer
        }
    }

    #[tokio::test]
    async fn test_cache_hits_inner_once_per_ticker() {
        let mut lookup = CachedFloatLookup::new(CountingLookup {
            calls: 0,
            answer: Some(2_500_000.0),
        });

        assert_eq!(lookup.float_shares("abc").await, Some(2_500_000.0));
        assert_eq!(lookup.float_shares("ABC").await, Some(2_500_000.0));
        assert_eq!(lookup.inner.calls, 1);

        lookup.float_shares("XYZ").await;
        assert_eq!(lookup.inner.calls, 2);
    }

    #[test]
    fn test_unknown_answers_are_cached() {
        let mut lookup = CachedFloatLookup::new(CountingLookup {
            calls: 0,
            answer: None,
        });

        tokio_test::block_on(async {
            assert_eq!(lookup.float_shares("ABC").await, None);
            assert_eq!(lookup.float_shares("ABC").await, None);
        });
        assert_eq!(lookup.inner.calls, 1);

        // After a clear the next request goes out again
        lookup.clear();
        tokio_test::block_on(async {
            assert_eq!(lookup.float_shares("abc").await, None);
        });
        assert_eq!(lookup.inner.calls, 2);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unknown() {
        let mut provider = HttpFloatProvider::new(&FloatLookupConfig::default()).unwrap();
        assert_eq!(provider.float_shares("ABC").await, None);
    }
}
