use crate::models::{SignalFeatures, SummaryRow, Tier};
use crate::monitoring::volume::parse_volume;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Values seen when the ticker first showed up
#[derive(Clone, Debug, PartialEq)]
pub struct EntrySnapshot {
    pub price: f64,
    pub time: DateTime<Utc>,
    pub volume: String,
    pub relative_volume: Option<f64>,
    pub rsi: Option<f64>,
}

/// Technicals frozen at the instant the threshold was crossed
#[derive(Clone, Debug, PartialEq)]
pub struct CriteriaSnapshot {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub volume: String,
    pub relative_volume: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_float_ratio: Option<f64>,
    pub score: i32,
    pub tier: Tier,
}

/// Highest post-latch observation
#[derive(Clone, Debug, PartialEq)]
pub struct PeakSnapshot {
    pub price: f64,
    pub time: DateTime<Utc>,
    pub volume: String,
    pub relative_volume: Option<f64>,
    pub rsi: Option<f64>,
}

/// Write-once latch. The only legal transition is `Tracking -> CriteriaMet`.
#[derive(Clone, Debug, PartialEq)]
pub enum LatchState {
    Tracking,
    CriteriaMet {
        criteria: CriteriaSnapshot,
        peak: PeakSnapshot,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FloatShares {
    Unresolved,
    Resolved(Option<f64>),
}

/// Rolling state for one ticker over one session
#[derive(Clone, Debug)]
pub struct InstrumentTracker {
    ticker: String,
    entry: EntrySnapshot,
    current_price: f64,
    abs_pct_change: f64,
    age_minutes: i64,
    history: VecDeque<f64>,
    history_capacity: usize,
    last_volume: String,
    last_relative_volume: Option<f64>,
    last_rsi: Option<f64>,
    last_volume_float_ratio: Option<f64>,
    float_shares: FloatShares,
    state: LatchState,
}

impl InstrumentTracker {
    pub fn with_capacity(
        ticker: impl Into<String>,
        price: f64,
        volume: impl Into<String>,
        relative_volume: Option<f64>,
        rsi: Option<f64>,
        now: DateTime<Utc>,
        history_capacity: usize,
    ) -> Self {
        let volume = volume.into();
        let history_capacity = history_capacity.max(1);

        Self {
            ticker: ticker.into(),
            entry: EntrySnapshot {
                price,
                time: now,
                volume: volume.clone(),
                relative_volume,
                rsi,
            },
            current_price: price,
            abs_pct_change: 0.0,
            age_minutes: 0,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            last_volume: volume,
            last_relative_volume: relative_volume,
            last_rsi: rsi,
            last_volume_float_ratio: None,
            float_shares: FloatShares::Unresolved,
            state: LatchState::Tracking,
        }
    }

    /// Percent change of `price` from the entry price; 0 when the entry price is 0
    pub fn recompute_change(&self, price: f64) -> f64 {
        pct_change(self.entry.price, price).unwrap_or(0.0)
    }

    /// Fold one sample into the rolling state and, once latched, the peak
    pub fn observe(
        &mut self,
        price: f64,
        volume: &str,
        relative_volume: Option<f64>,
        rsi: Option<f64>,
        float_shares: Option<f64>,
        now: DateTime<Utc>,
    ) {
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(price);

        self.current_price = price;
        self.abs_pct_change = self.recompute_change(price);
        self.age_minutes = (now - self.entry.time).num_minutes();
        self.last_volume = volume.to_string();
        self.last_relative_volume = relative_volume;
        self.last_rsi = rsi;
        self.last_volume_float_ratio = volume_float_ratio(volume, float_shares);

        if let LatchState::CriteriaMet { peak, .. } = &mut self.state {
            if price > peak.price {
                *peak = PeakSnapshot {
                    price,
                    time: now,
                    volume: volume.to_string(),
                    relative_volume,
                    rsi,
                };
            }
        }
    }

    /// Store the float the first time it is resolved; an unknown float is cached too
    pub fn resolve_float(&mut self, float_shares: Option<f64>) {
        if self.float_shares != FloatShares::Unresolved {
            return;
        }
        self.float_shares = FloatShares::Resolved(float_shares);
        self.last_volume_float_ratio = volume_float_ratio(&self.last_volume, float_shares);
    }

    /// Fire the latch. Returns false and changes nothing if it already fired.
    pub fn latch_criteria(&mut self, score: i32, tier: Tier, now: DateTime<Utc>) -> bool {
        if self.criteria_met() {
            return false;
        }

        let criteria = CriteriaSnapshot {
            time: now,
            price: self.current_price,
            volume: self.last_volume.clone(),
            relative_volume: self.last_relative_volume,
            rsi: self.last_rsi,
            volume_float_ratio: self.last_volume_float_ratio,
            score,
            tier,
        };
        let peak = PeakSnapshot {
            price: self.current_price,
            time: now,
            volume: self.last_volume.clone(),
            relative_volume: self.last_relative_volume,
            rsi: self.last_rsi,
        };

        self.state = LatchState::CriteriaMet { criteria, peak };
        true
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn entry(&self) -> &EntrySnapshot {
        &self.entry
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn abs_pct_change(&self) -> f64 {
        self.abs_pct_change
    }

    pub fn age_minutes(&self) -> i64 {
        self.age_minutes
    }

    #[cfg(test)]
    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn float_shares(&self) -> Option<f64> {
        match self.float_shares {
            FloatShares::Resolved(shares) => shares,
            FloatShares::Unresolved => None,
        }
    }

    pub fn float_resolved(&self) -> bool {
        matches!(self.float_shares, FloatShares::Resolved(_))
    }

    pub fn criteria_met(&self) -> bool {
        matches!(self.state, LatchState::CriteriaMet { .. })
    }

    pub fn criteria(&self) -> Option<&CriteriaSnapshot> {
        match &self.state {
            LatchState::CriteriaMet { criteria, .. } => Some(criteria),
            LatchState::Tracking => None,
        }
    }

    pub fn peak(&self) -> Option<&PeakSnapshot> {
        match &self.state {
            LatchState::CriteriaMet { peak, .. } => Some(peak),
            LatchState::Tracking => None,
        }
    }

    /// Peak gain relative to the entry price
    pub fn peak_change_from_entry(&self) -> Option<f64> {
        self.peak()
            .map(|peak| pct_change(self.entry.price, peak.price).unwrap_or(0.0))
    }

    /// Peak gain relative to the price at which the latch fired
    pub fn peak_change_from_criteria(&self) -> Option<f64> {
        match &self.state {
            LatchState::CriteriaMet { criteria, peak } => {
                Some(pct_change(criteria.price, peak.price).unwrap_or(0.0))
            }
            LatchState::Tracking => None,
        }
    }

    /// Whole minutes from the latch to the peak
    pub fn minutes_to_peak(&self) -> Option<i64> {
        match &self.state {
            LatchState::CriteriaMet { criteria, peak } => {
                Some((peak.time - criteria.time).num_minutes())
            }
            LatchState::Tracking => None,
        }
    }

    /// Percent change versus the price `polls` samples ago
    pub fn change_over_polls(&self, polls: usize) -> Option<f64> {
        if polls == 0 || polls >= self.history.len() {
            return None;
        }
        let past = self.history[self.history.len() - 1 - polls];
        pct_change(past, self.current_price)
    }

    /// Freshest scorer input
    pub fn signal_features(&self) -> SignalFeatures {
        SignalFeatures {
            float_shares: self.float_shares(),
            relative_volume: self.last_relative_volume,
            volume_float_ratio: self.last_volume_float_ratio,
            rsi: self.last_rsi,
            abs_pct_change: self.abs_pct_change,
        }
    }

    pub fn summary_row(&self) -> SummaryRow {
        let criteria = self.criteria();
        let peak = self.peak();

        SummaryRow {
            ticker: self.ticker.clone(),
            time_entered: self.entry.time,
            entry_price: self.entry.price,
            entry_volume: self.entry.volume.clone(),
            entry_relative_volume: self.entry.relative_volume,
            entry_rsi: self.entry.rsi,
            last_price: self.current_price,
            abs_pct_change: self.abs_pct_change,
            met_criteria: self.criteria_met(),
            criteria_time: criteria.map(|c| c.time),
            criteria_price: criteria.map(|c| c.price),
            criteria_score: criteria.map(|c| c.score),
            criteria_tier: criteria.map(|c| c.tier),
            float_shares: self.float_shares(),
            criteria_relative_volume: criteria.and_then(|c| c.relative_volume),
            criteria_rsi: criteria.and_then(|c| c.rsi),
            criteria_volume_float_ratio: criteria.and_then(|c| c.volume_float_ratio),
            peak_time: peak.map(|p| p.time),
            peak_price: peak.map(|p| p.price),
            peak_volume: peak.map(|p| p.volume.clone()),
            peak_change_from_entry: self.peak_change_from_entry(),
            peak_change_from_criteria: self.peak_change_from_criteria(),
            minutes_to_peak: self.minutes_to_peak(),
        }
    }
}

fn pct_change(base: f64, price: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    Some((price - base) / base * 100.0)
}

fn volume_float_ratio(volume: &str, float_shares: Option<f64>) -> Option<f64> {
    let float_shares = float_shares.filter(|f| *f > 0.0)?;
    parse_volume(volume).map(|shares| shares / float_shares)
}
