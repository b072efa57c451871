use crate::errors::{Result, TrackerError};
use crate::models::{SessionSummary, SummaryRow};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the full tracker set once the session ends
pub trait ExportSink {
    fn write_session_summary(&self, summary: &SessionSummary) -> Result<()>;
}

/// Writes the winners and the full list of seen tickers as JSON files
pub struct JsonSessionExporter {
    export_dir: PathBuf,
}

impl JsonSessionExporter {
    pub fn new<P: AsRef<Path>>(export_dir: P) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }

    fn file_name(prefix: &str, summary: &SessionSummary) -> String {
        let date_str = summary
            .ended_at
            .with_timezone(&Local)
            .format("%Y_%m_%d");
        format!("{}_{}%_{}.json", prefix, summary.desired_pct_change, date_str)
    }

    fn write_json(&self, file_name: &str, value: &impl serde::Serialize) -> Result<PathBuf> {
        fs::create_dir_all(&self.export_dir).map_err(|e| {
            TrackerError::ExportError(format!(
                "Failed to create {}: {}",
                self.export_dir.display(),
                e
            ))
        })?;

        let path = self.export_dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl ExportSink for JsonSessionExporter {
    fn write_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        let winners: Vec<&SummaryRow> = summary.winners().collect();
        if winners.is_empty() {
            info!("No stocks met criteria; skipping end-of-day summary export");
        } else {
            let path = self.write_json(&Self::file_name("eod_summary", summary), &winners)?;
            info!("End-of-day summary exported to: {}", path.display());
        }

        let path = self.write_json(&Self::file_name("all_gainers", summary), summary)?;
        info!("All-seen gainers exported to: {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;
    use chrono::Utc;

    fn row(ticker: &str, met: bool) -> SummaryRow {
        SummaryRow {
            ticker: ticker.to_string(),
            time_entered: Utc::now(),
            entry_price: 10.0,
            entry_volume: "1M".to_string(),
            entry_relative_volume: None,
            entry_rsi: None,
            last_price: 12.0,
            abs_pct_change: 20.0,
            met_criteria: met,
            criteria_time: met.then(Utc::now),
            criteria_price: met.then_some(12.0),
            criteria_score: met.then_some(6),
            criteria_tier: met.then_some(Tier::C),
            float_shares: None,
            criteria_relative_volume: None,
            criteria_rsi: None,
            criteria_volume_float_ratio: None,
            peak_time: met.then(Utc::now),
            peak_price: met.then_some(12.0),
            peak_volume: met.then(|| "1M".to_string()),
            peak_change_from_entry: met.then_some(20.0),
            peak_change_from_criteria: met.then_some(0.0),
            minutes_to_peak: met.then_some(0),
        }
    }

    fn summary(rows: Vec<SummaryRow>) -> SessionSummary {
        SessionSummary {
            session_id: "test".to_string(),
            desired_pct_change: 20.0,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            rows,
        }
    }

    #[test]
    fn test_exports_winners_and_all_seen() {
        let dir = std::env::temp_dir().join("gainer_tracker_export_both");
        let _ = fs::remove_dir_all(&dir);

        let exporter = JsonSessionExporter::new(&dir);
        let summary = summary(vec![row("ABC", true), row("XYZ", false)]);
        exporter.write_session_summary(&summary).unwrap();

        let eod = dir.join(JsonSessionExporter::file_name("eod_summary", &summary));
        let all = dir.join(JsonSessionExporter::file_name("all_gainers", &summary));

        let winners: Vec<SummaryRow> =
            serde_json::from_str(&fs::read_to_string(&eod).unwrap()).unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].ticker, "ABC");

        let everything: SessionSummary =
            serde_json::from_str(&fs::read_to_string(&all).unwrap()).unwrap();
        assert_eq!(everything.rows.len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_no_winners_skips_eod_file() {
        let dir = std::env::temp_dir().join("gainer_tracker_export_none");
        let _ = fs::remove_dir_all(&dir);

        let exporter = JsonSessionExporter::new(&dir);
        let summary = summary(vec![row("XYZ", false)]);
        exporter.write_session_summary(&summary).unwrap();

        assert!(!dir
            .join(JsonSessionExporter::file_name("eod_summary", &summary))
            .exists());
        assert!(dir
            .join(JsonSessionExporter::file_name("all_gainers", &summary))
            .exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
