use crate::config::TrackingConfig;
use crate::models::{AlertEvent, MarketRow, SessionSummary};
use crate::monitoring::instrument::InstrumentTracker;
use crate::monitoring::scorer::SignalScorer;
use crate::sources::FloatLookup;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of folding one batch into the tracker set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub changed: bool,
    /// Tickers whose latch fired in this batch, in latch order
    pub newly_latched: Vec<String>,
}

/// Owns every tracker of the session and applies batches to them one at a time
pub struct TrackingOrchestrator<F> {
    trackers: HashMap<String, InstrumentTracker>,
    /// Tickers in first-seen order
    encounter_order: Vec<String>,
    ranking: Vec<String>,
    float_lookup: F,
    desired_pct_change: f64,
    history_capacity: usize,
}

impl<F: FloatLookup> TrackingOrchestrator<F> {
    pub fn new(config: &TrackingConfig, float_lookup: F) -> Self {
        Self {
            trackers: HashMap::new(),
            encounter_order: Vec::new(),
            ranking: Vec::new(),
            float_lookup,
            desired_pct_change: config.desired_pct_change,
            history_capacity: config.history_capacity,
        }
    }

    pub async fn process_batch(&mut self, rows: &[MarketRow], now: DateTime<Utc>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for row in rows {
            let ticker = row.ticker.trim();
            if ticker.is_empty() || !row.price.is_finite() {
                warn!("Dropping unparseable row: {:?}", row);
                continue;
            }

            let tracker = match self.trackers.entry(ticker.to_string()) {
                Entry::Occupied(entry) => {
                    let tracker = entry.into_mut();
                    if tracker.recompute_change(row.price) != tracker.abs_pct_change() {
                        outcome.changed = true;
                    }
                    tracker
                }
                Entry::Vacant(entry) => {
                    debug!("New ticker {} at {}", ticker, row.price);
                    outcome.changed = true;
                    self.encounter_order.push(ticker.to_string());
                    entry.insert(InstrumentTracker::with_capacity(
                        ticker,
                        row.price,
                        row.volume.clone(),
                        row.relative_volume,
                        row.rsi,
                        now,
                        self.history_capacity,
                    ))
                }
            };

            let float_shares = tracker.float_shares();
            tracker.observe(
                row.price,
                &row.volume,
                row.relative_volume,
                row.rsi,
                float_shares,
                now,
            );

            if tracker.abs_pct_change() < self.desired_pct_change || tracker.criteria_met() {
                continue;
            }

            if !tracker.float_resolved() {
                let shares = self.float_lookup.float_shares(ticker).await;
                tracker.resolve_float(shares);
            }

            let signal = SignalScorer::score(&tracker.signal_features());
            if tracker.latch_criteria(signal.score, signal.tier, now) {
                info!(
                    "{} +{:.2}% | Score: {:+} ({})",
                    ticker,
                    tracker.abs_pct_change(),
                    signal.score,
                    signal.tier
                );
                outcome.newly_latched.push(ticker.to_string());
            }
        }

        outcome
    }

    /// Sort by move descending; ties keep first-seen order
    pub fn rerank(&mut self) {
        let mut ranking = self.encounter_order.clone();
        ranking.sort_by(|a, b| {
            let a = self.trackers[a].abs_pct_change();
            let b = self.trackers[b].abs_pct_change();
            b.total_cmp(&a)
        });
        self.ranking = ranking;
    }

    pub fn ranked(&self) -> Vec<&InstrumentTracker> {
        self.ranking
            .iter()
            .filter_map(|ticker| self.trackers.get(ticker))
            .collect()
    }

    pub fn top(&self, n: usize) -> Vec<&InstrumentTracker> {
        self.ranked().into_iter().take(n).collect()
    }

    pub fn get(&self, ticker: &str) -> Option<&InstrumentTracker> {
        self.trackers.get(ticker)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn desired_pct_change(&self) -> f64 {
        self.desired_pct_change
    }

    pub fn float_lookup_mut(&mut self) -> &mut F {
        &mut self.float_lookup
    }

    pub fn alert_for(&self, ticker: &str) -> Option<AlertEvent> {
        let tracker = self.get(ticker)?;
        let criteria = tracker.criteria()?;

        Some(AlertEvent {
            ticker: tracker.ticker().to_string(),
            abs_pct_change: tracker.abs_pct_change(),
            price: criteria.price,
            score: criteria.score,
            tier: criteria.tier,
            timestamp: criteria.time,
        })
    }

    /// Snapshot of the whole session, ranked
    pub fn summary(
        &mut self,
        session_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> SessionSummary {
        self.rerank();

        SessionSummary {
            session_id,
            desired_pct_change: self.desired_pct_change,
            started_at,
            ended_at,
            rows: self.ranked().iter().map(|t| t.summary_row()).collect(),
        }
    }

    /// Drop all trackers before the next session
    pub fn reset(&mut self) {
        self.trackers.clear();
        self.encounter_order.clear();
        self.ranking.clear();
    }
}
