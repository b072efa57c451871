use crate::config::TrackingConfig;
use crate::errors::Result;
use crate::models::AlertEvent;
use crate::monitoring::orchestrator::TrackingOrchestrator;
use crate::sources::{FloatLookup, MarketDataSource};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Drives one session: poll, fold the batch, alert, sleep, repeat
pub struct PollingMonitor<S, F> {
    source: S,
    orchestrator: TrackingOrchestrator<F>,
    poll_interval: Duration,
    idle_poll_interval: Duration,
    display_top: usize,
    alerts: mpsc::UnboundedSender<AlertEvent>,
}

/// What a finished session loop did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: usize,
    pub skipped_cycles: usize,
    pub alerts_sent: usize,
}

impl<S: MarketDataSource, F: FloatLookup> PollingMonitor<S, F> {
    pub fn new(
        source: S,
        orchestrator: TrackingOrchestrator<F>,
        config: &TrackingConfig,
        alerts: mpsc::UnboundedSender<AlertEvent>,
    ) -> Self {
        Self {
            source,
            orchestrator,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            idle_poll_interval: Duration::from_secs(config.idle_poll_interval_seconds),
            display_top: config.display_top,
            alerts,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, idle_poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.idle_poll_interval = idle_poll_interval;
        self
    }

    pub fn orchestrator(&self) -> &TrackingOrchestrator<F> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut TrackingOrchestrator<F> {
        &mut self.orchestrator
    }

    /// Main polling loop. Stops at a batch boundary once `session_open` turns
    /// false, a shutdown is signalled or a finite source runs dry.
    pub async fn run_session<P>(
        &mut self,
        mut session_open: P,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionStats>
    where
        P: FnMut() -> bool,
    {
        info!(
            "Starting polling monitor (threshold {}%)",
            self.orchestrator.desired_pct_change()
        );
        let mut stats = SessionStats::default();

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, leaving session loop");
                break;
            }
            if !session_open() {
                info!("Session closed");
                break;
            }
            if self.source.is_exhausted() {
                info!("Data source exhausted");
                break;
            }

            stats.cycles += 1;
            let rows = match self.source.poll().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Error polling market data: {}", e);
                    Vec::new()
                }
            };

            let changed = if rows.is_empty() {
                debug!("Empty batch, skipping cycle");
                stats.skipped_cycles += 1;
                false
            } else {
                let outcome = self.orchestrator.process_batch(&rows, Utc::now()).await;

                if outcome.changed {
                    self.orchestrator.rerank();
                    self.log_top();
                }

                for ticker in &outcome.newly_latched {
                    if let Some(alert) = self.orchestrator.alert_for(ticker) {
                        if self.alerts.send(alert).is_err() {
                            warn!("Alert dispatcher is gone; dropping alert for {}", ticker);
                        } else {
                            stats.alerts_sent += 1;
                        }
                    }
                }

                outcome.changed
            };

            let pause = if changed {
                self.poll_interval
            } else {
                self.idle_poll_interval
            };
            pause_or_shutdown(pause, shutdown).await;
        }

        Ok(stats)
    }

    fn log_top(&self) {
        info!("Tracking {} tickers", self.orchestrator.len());
        for (rank, tracker) in self.orchestrator.top(self.display_top).iter().enumerate() {
            let last_poll = tracker
                .change_over_polls(1)
                .map(|pct| format!("{:+.2}%", pct))
                .unwrap_or_else(|| "--".to_string());

            info!(
                "#{} {:<6} ${:.2} {:+.2}% | entry ${:.2} | {}m | last poll {}{}",
                rank + 1,
                tracker.ticker(),
                tracker.current_price(),
                tracker.abs_pct_change(),
                tracker.entry().price,
                tracker.age_minutes(),
                last_poll,
                if tracker.criteria_met() { " *" } else { "" }
            );
        }
    }
}

/// Sleep, waking early if shutdown is signalled
async fn pause_or_shutdown(pause: Duration, shutdown: &mut watch::Receiver<bool>) {
    if pause.is_zero() {
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(pause) => {}
        changed = shutdown.changed() => {
            // Sender dropped: nobody can signal anymore, so just sleep
            if changed.is_err() {
                tokio::time::sleep(pause).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TrackerError;
    use crate::models::MarketRow;
    use crate::sources::ReplaySource;
    use async_trait::async_trait;

    struct NoFloat;

    #[async_trait]
    impl FloatLookup for NoFloat {
        async fn float_shares(&mut self, _ticker: &str) -> Option<f64> {
            None
        }
    }

    struct FailingSource {
        polls: usize,
    }

    #[async_trait]
    impl MarketDataSource for FailingSource {
        async fn poll(&mut self) -> Result<Vec<MarketRow>> {
            self.polls += 1;
            Err(TrackerError::DataSourceError("scanner down".to_string()))
        }
    }

    fn config() -> TrackingConfig {
        TrackingConfig {
            desired_pct_change: 20.0,
            poll_interval_seconds: 0,
            idle_poll_interval_seconds: 0,
            history_capacity: 200,
            display_top: 5,
        }
    }

    fn row(ticker: &str, price: f64) -> MarketRow {
        MarketRow {
            ticker: ticker.to_string(),
            price,
            volume: "900K".to_string(),
            relative_volume: Some(3.5),
            rsi: Some(58.0),
        }
    }

    #[tokio::test]
    async fn test_replayed_session_alerts_once() {
        let batches = vec![
            vec![row("ABC", 10.0), row("XYZ", 2.0)],
            vec![row("ABC", 13.0), row("XYZ", 2.1)],
            vec![],
            vec![row("ABC", 15.0), row("XYZ", 2.6)],
            vec![row("ABC", 12.0), row("XYZ", 2.7)],
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, mut shutdown) = watch::channel(false);

        let mut monitor = PollingMonitor::new(
            ReplaySource::new(batches),
            TrackingOrchestrator::new(&config(), NoFloat),
            &config(),
            tx,
        );

        let stats = monitor.run_session(|| true, &mut shutdown).await.unwrap();
        assert_eq!(stats.cycles, 5);
        assert_eq!(stats.skipped_cycles, 1);
        assert_eq!(stats.alerts_sent, 2);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.ticker, "ABC");
        assert_eq!(first.price, 13.0);
        assert_eq!(second.ticker, "XYZ");
        assert_eq!(second.price, 2.6);
        assert!(rx.try_recv().is_err());

        let abc = monitor.orchestrator().get("ABC").unwrap();
        assert_eq!(abc.peak().unwrap().price, 15.0);
        let ranked: Vec<&str> = monitor
            .orchestrator()
            .ranked()
            .iter()
            .map(|t| t.ticker())
            .collect();
        assert_eq!(ranked, vec!["XYZ", "ABC"]);
    }

    #[tokio::test]
    async fn test_source_errors_skip_cycles() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, mut shutdown) = watch::channel(false);
        let mut monitor = PollingMonitor::new(
            FailingSource { polls: 0 },
            TrackingOrchestrator::new(&config(), NoFloat),
            &config(),
            tx,
        );

        let mut remaining = 3;
        let stats = monitor
            .run_session(
                || {
                    remaining -= 1;
                    remaining >= 0
                },
                &mut shutdown,
            )
            .await
            .unwrap();

        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.skipped_cycles, 3);
        assert_eq!(monitor.source.polls, 3);
        assert!(monitor.orchestrator().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_polling() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let mut monitor = PollingMonitor::new(
            FailingSource { polls: 0 },
            TrackingOrchestrator::new(&config(), NoFloat),
            &config(),
            tx,
        )
        .with_intervals(Duration::from_secs(60), Duration::from_secs(60));

        let stats = monitor.run_session(|| true, &mut shutdown).await.unwrap();
        assert_eq!(stats, SessionStats::default());
        assert_eq!(monitor.source.polls, 0);
    }
}
