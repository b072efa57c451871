use crate::errors::Result;
use crate::models::{AlertEvent, Tier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub timestamp: String,
    pub alert: AlertEvent,
    pub delivered: bool,
    pub error: Option<String>,
}

/// Append-only JSONL record of every alert raised
pub struct AlertLogger {
    log_path: String,
}

impl AlertLogger {
    pub fn new(log_path: String) -> Self {
        Self { log_path }
    }

    /// Log an alert as it is raised
    pub fn log_alert(&self, alert: &AlertEvent) -> Result<()> {
        let entry = AlertLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            alert: alert.clone(),
            delivered: true,
            error: None,
        };

        self.write_entry(&entry)
    }

    /// Log an alert whose delivery failed
    pub fn log_failed_alert(&self, alert: &AlertEvent, error: &str) -> Result<()> {
        let entry = AlertLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            alert: alert.clone(),
            delivered: false,
            error: Some(error.to_string()),
        };

        self.write_entry(&entry)
    }

    fn write_entry(&self, entry: &AlertLogEntry) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Read all log entries, skipping lines that do not parse
    pub fn read_logs(&self) -> Result<Vec<AlertLogEntry>> {
        if !Path::new(&self.log_path).exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);

        Ok(reader
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str::<AlertLogEntry>(&line).ok())
            .collect())
    }

    /// Alert counts from the log
    pub fn get_statistics(&self) -> Result<AlertStatistics> {
        let entries = self.read_logs()?;

        let mut by_tier: HashMap<Tier, usize> = HashMap::new();
        let mut failed_deliveries = 0;
        for entry in &entries {
            if entry.delivered {
                *by_tier.entry(entry.alert.tier).or_default() += 1;
            } else {
                failed_deliveries += 1;
            }
        }

        Ok(AlertStatistics {
            total_alerts: entries.len() - failed_deliveries,
            failed_deliveries,
            by_tier,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_alerts: usize,
    pub failed_deliveries: usize,
    pub by_tier: HashMap<Tier, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn alert(ticker: &str, tier: Tier) -> AlertEvent {
        AlertEvent {
            ticker: ticker.to_string(),
            abs_pct_change: 22.0,
            price: 4.4,
            score: 7,
            tier,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_alert_logger() {
        let log_path = std::env::temp_dir().join("gainer_tracker_test_alert_log.jsonl");
        let _ = fs::remove_file(&log_path); // Clean up from previous test

        let logger = AlertLogger::new(log_path.to_string_lossy().to_string());
        assert!(logger.read_logs().unwrap().is_empty());

        logger.log_alert(&alert("ABC", Tier::A)).unwrap();
        logger.log_alert(&alert("XYZ", Tier::C)).unwrap();
        logger.log_alert(&alert("QRS", Tier::C)).unwrap();
        logger
            .log_failed_alert(&alert("QRS", Tier::C), "discord down")
            .unwrap();

        let logs = logger.read_logs().unwrap();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0].alert.ticker, "ABC");
        assert_eq!(logs[3].error.as_deref(), Some("discord down"));

        let stats = logger.get_statistics().unwrap();
        assert_eq!(stats.total_alerts, 3);
        assert_eq!(stats.failed_deliveries, 1);
        assert_eq!(stats.by_tier.get(&Tier::C), Some(&2));
        assert_eq!(stats.by_tier.get(&Tier::B), None);

        // Clean up
        let _ = fs::remove_file(&log_path);
    }
}
