pub mod discord;

pub use discord::DiscordNotifier;

use crate::errors::{Result, TrackerError};
use crate::models::AlertEvent;
use crate::storage::AlertLogger;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Consumer of alert events
#[async_trait]
pub trait NotificationSink: Send {
    async fn alert(&mut self, alert: &AlertEvent) -> Result<()>;
}

/// Writes alerts to the log only
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn alert(&mut self, alert: &AlertEvent) -> Result<()> {
        info!("ALERT {}", alert.headline());
        Ok(())
    }
}

/// Delivers every alert to each sink in turn; fails if any sink failed
pub struct FanoutNotifier {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    async fn alert(&mut self, alert: &AlertEvent) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &mut self.sinks {
            if let Err(e) = sink.alert(alert).await {
                warn!("Failed to deliver alert for {}: {}", alert.ticker, e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::NotificationError(failures.join("; ")))
        }
    }
}

/// Spawn the single consumer that delivers alerts in the order they were sent.
/// The task ends once every sender is dropped.
pub fn spawn_alert_dispatcher<S>(
    mut sink: S,
    alert_log: Option<AlertLogger>,
) -> (mpsc::UnboundedSender<AlertEvent>, JoinHandle<()>)
where
    S: NotificationSink + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<AlertEvent>();

    let handle = tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            let logged = match sink.alert(&alert).await {
                Ok(()) => alert_log.as_ref().map(|log| log.log_alert(&alert)),
                Err(e) => {
                    error!("Failed to deliver alert for {}: {}", alert.ticker, e);
                    alert_log
                        .as_ref()
                        .map(|log| log.log_failed_alert(&alert, &e.to_string()))
                }
            };

            if let Some(Err(e)) = logged {
                error!("Failed to log alert for {}: {}", alert.ticker, e);
            }
        }
    });

    (tx, handle)
}
