use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// One sampled scanner row
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MarketRow {
    pub ticker: String,
    pub price: f64,
    /// Human-readable volume, e.g. "1.2M"
    pub volume: String,
    #[serde(default)]
    pub relative_volume: Option<f64>,
    #[serde(default)]
    pub rsi: Option<f64>,
}

impl MarketRow {
    /// Parse a scraped price cell; anything other than digits and '.' is stripped first
    pub fn parse_price(text: &str) -> Option<f64> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        cleaned.parse::<f64>().ok().filter(|p| p.is_finite())
    }
}

/// Coarse letter grade derived from the composite score
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tier {
    A,
    B,
    C,
    D,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::A => write!(f, "A"),
            Tier::B => write!(f, "B"),
            Tier::C => write!(f, "C"),
            Tier::D => write!(f, "D"),
        }
    }
}

/// Scorer input captured from a tracker at latch time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalFeatures {
    pub float_shares: Option<f64>,
    pub relative_volume: Option<f64>,
    pub volume_float_ratio: Option<f64>,
    pub rsi: Option<f64>,
    pub abs_pct_change: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalScore {
    pub score: i32,
    pub tier: Tier,
}

/// Raised once per ticker when it first meets the threshold
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub ticker: String,
    pub abs_pct_change: f64,
    pub price: f64,
    pub score: i32,
    pub tier: Tier,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn headline(&self) -> String {
        format!(
            "{} +{:.2}% | Score: {:+} ({}) | {}",
            self.ticker,
            self.abs_pct_change,
            self.score,
            self.tier,
            self.timestamp.with_timezone(&Local).format("%H:%M:%S")
        )
    }
}

/// One tracker's end-of-session record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SummaryRow {
    pub ticker: String,
    pub time_entered: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_volume: String,
    pub entry_relative_volume: Option<f64>,
    pub entry_rsi: Option<f64>,
    pub last_price: f64,
    pub abs_pct_change: f64,
    pub met_criteria: bool,
    pub criteria_time: Option<DateTime<Utc>>,
    pub criteria_price: Option<f64>,
    pub criteria_score: Option<i32>,
    pub criteria_tier: Option<Tier>,
    pub float_shares: Option<f64>,
    pub criteria_relative_volume: Option<f64>,
    pub criteria_rsi: Option<f64>,
    pub criteria_volume_float_ratio: Option<f64>,
    pub peak_time: Option<DateTime<Utc>>,
    pub peak_price: Option<f64>,
    pub peak_volume: Option<String>,
    pub peak_change_from_entry: Option<f64>,
    pub peak_change_from_criteria: Option<f64>,
    pub minutes_to_peak: Option<i64>,
}

/// Everything seen during one trading session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub desired_pct_change: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Ranked order, highest move first
    pub rows: Vec<SummaryRow>,
}

impl SessionSummary {
    pub fn winners(&self) -> impl Iterator<Item = &SummaryRow> {
        self.rows.iter().filter(|r| r.met_criteria)
    }

    pub fn format_report(&self) -> String {
        let winners: Vec<&SummaryRow> = self.winners().collect();
        if winners.is_empty() {
            return format!(
                "No stocks met or surpassed {}% growth this session ({} tickers seen).",
                self.desired_pct_change,
                self.rows.len()
            );
        }

        let mut out = format!(
            "SUMMARY OF STOCKS THAT SURPASSED {}% GROWTH ({} of {} tickers)\n",
            self.desired_pct_change,
            winners.len(),
            self.rows.len()
        );
        out.push_str(&format!(
            "{:<8} {:>9} {:>10} {:>9} {:>10} {:>8} {:>6} {:>9} {:>10}\n",
            "Ticker", "CritTime", "CritPrice", "PeakTime", "MaxPrice", "Peak%", "Score",
            "Spot%", "Time2Peak"
        ));

        for row in winners {
            out.push_str(&format!(
                "{:<8} {:>9} {:>10} {:>9} {:>10} {:>8} {:>6} {:>9} {:>10}\n",
                row.ticker,
                fmt_time(row.criteria_time),
                fmt_price(row.criteria_price),
                fmt_time(row.peak_time),
                fmt_price(row.peak_price),
                fmt_pct(row.peak_change_from_criteria),
                row.criteria_score
                    .map(|s| format!("{:+}{}", s, row.criteria_tier.map(|t| t.to_string()).unwrap_or_default()))
                    .unwrap_or_else(|| "--".to_string()),
                fmt_pct(row.peak_change_from_entry),
                row.minutes_to_peak
                    .map(|m| format!("{} mins", m))
                    .unwrap_or_else(|| "--".to_string()),
            ));
        }

        out
    }
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

fn fmt_price(p: Option<f64>) -> String {
    p.map(|p| format!("${:.2}", p))
        .unwrap_or_else(|| "n/a".to_string())
}

fn fmt_pct(p: Option<f64>) -> String {
    p.map(|p| format!("{:.2}%", p))
        .unwrap_or_else(|| "--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_strips_currency() {
        assert_eq!(MarketRow::parse_price("$13.45"), Some(13.45));
        assert_eq!(MarketRow::parse_price("1,204.5 USD"), Some(1204.5));
        assert_eq!(MarketRow::parse_price("—"), None);
        assert_eq!(MarketRow::parse_price(""), None);
    }

    #[test]
    fn test_empty_report() {
        let summary = SessionSummary {
            session_id: "s".to_string(),
            desired_pct_change: 20.0,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            rows: Vec::new(),
        };
        assert!(summary.format_report().starts_with("No stocks met"));
    }
}
