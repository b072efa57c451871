use crate::errors::{Result, TrackerError};
use crate::models::MarketRow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Produces one batch of sampled rows per polling cycle
#[async_trait]
pub trait MarketDataSource: Send {
    async fn poll(&mut self) -> Result<Vec<MarketRow>>;

    /// A finite source reports true once it has nothing left to replay
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Scanner row as served over HTTP; cells may arrive as text or numbers
#[derive(Debug, Deserialize)]
struct ScannerRow {
    ticker: String,
    price: Value,
    #[serde(default)]
    volume: Value,
    #[serde(default, alias = "rvol")]
    relative_volume: Value,
    #[serde(default)]
    rsi: Value,
}

impl ScannerRow {
    /// Rows whose price is not a number come back with a NaN price and are
    /// dropped downstream
    fn into_market_row(self) -> MarketRow {
        MarketRow {
            ticker: self.ticker.trim().to_string(),
            price: numeric_cell(&self.price).unwrap_or(f64::NAN),
            volume: match self.volume {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => String::new(),
            },
            relative_volume: numeric_cell(&self.relative_volume),
            rsi: numeric_cell(&self.rsi),
        }
    }
}

fn numeric_cell(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => MarketRow::parse_price(s),
        _ => None,
    }
}

/// Polls a scanner endpoint that returns the current gainers as a JSON array
pub struct HttpScannerSource {
    http_client: Client,
    scanner_url: String,
    max_rows: usize,
}

impl HttpScannerSource {
    pub fn new(scanner_url: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            scanner_url,
            max_rows: 100,
        })
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}

#[async_trait]
impl MarketDataSource for HttpScannerSource {
    async fn poll(&mut self) -> Result<Vec<MarketRow>> {
        let response = self.http_client.get(&self.scanner_url).send().await?;

        if !response.status().is_success() {
            return Err(TrackerError::DataSourceError(format!(
                "Scanner returned {}",
                response.status()
            )));
        }

        let rows: Vec<ScannerRow> = response.json().await?;
        debug!("Scanner returned {} rows", rows.len());

        Ok(rows
            .into_iter()
            .take(self.max_rows)
            .map(ScannerRow::into_market_row)
            .collect())
    }
}

/// Replays batches recorded as a JSON array of arrays of rows
pub struct ReplaySource {
    batches: VecDeque<Vec<MarketRow>>,
}

impl ReplaySource {
    pub fn new(batches: Vec<Vec<MarketRow>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            TrackerError::DataSourceError(format!(
                "Failed to read replay file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let batches = Self::parse_batches(&content)?;
        info!("Loaded {} recorded batches", batches.len());
        Ok(Self::new(batches))
    }

    fn parse_batches(content: &str) -> Result<Vec<Vec<MarketRow>>> {
        let raw: Vec<Vec<ScannerRow>> = serde_json::from_str(content)?;
        Ok(raw
            .into_iter()
            .map(|batch| batch.into_iter().map(ScannerRow::into_market_row).collect())
            .collect())
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn poll(&mut self) -> Result<Vec<MarketRow>> {
        let batch = self.batches.pop_front().unwrap_or_default();
        debug!("Replaying {} rows, {} batches left", batch.len(), self.remaining());
        Ok(batch)
    }

    fn is_exhausted(&self) -> bool {
        self.batches.is_empty()
    }
}
