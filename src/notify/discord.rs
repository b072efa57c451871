use crate::errors::{Result, TrackerError};
use crate::models::{AlertEvent, Tier};
use crate::notify::NotificationSink;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DISCORD_API: &str = "https://discord.com/api/v10";
const MAX_CONTENT_CHARS: usize = 1900;
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    #[serde(default = "default_retry_after")]
    retry_after: f64,
}

fn default_retry_after() -> f64 {
    1.0
}

/// Direct-message alerts through a Discord bot
pub struct DiscordNotifier {
    http_client: Client,
    api_url: String,
    bot_token: String,
    user_id: String,
    dm_channel_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(bot_token: String, user_id: String) -> Result<Self> {
        let http_client = Client::builder().timeout(Duration::from_secs(8)).build()?;

        Ok(Self {
            http_client,
            api_url: DISCORD_API.to_string(),
            bot_token,
            user_id,
            dm_channel_id: None,
        })
    }

    /// Open (or fetch) the DM channel once and remember it
    async fn ensure_dm_channel(&mut self) -> Result<String> {
        if let Some(id) = &self.dm_channel_id {
            return Ok(id.clone());
        }

        let response = self
            .http_client
            .post(format!("{}/users/@me/channels", self.api_url))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&json!({ "recipient_id": self.user_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::NotificationError(format!(
                "Failed to open DM channel: {}",
                response.status()
            )));
        }

        let channel: DmChannel = response.json().await?;
        self.dm_channel_id = Some(channel.id.clone());
        Ok(channel.id)
    }

    async fn post_message(&mut self, payload: &Value) -> Result<()> {
        let channel_id = self.ensure_dm_channel().await?;
        let url = format!("{}/channels/{}/messages", self.api_url, channel_id);

        let mut attempts = 0;
        loop {
            let response = self
                .http_client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.bot_token))
                .json(payload)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                attempts += 1;
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    return Err(TrackerError::NotificationError(
                        "Rate limited too many times".to_string(),
                    ));
                }
                let retry_after = response
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or_else(|_| default_retry_after());
                warn!("Discord rate limited, retrying in {:.2}s", retry_after);
                tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                continue;
            }

            if !response.status().is_success() {
                let error = response.text().await?;
                return Err(TrackerError::NotificationError(format!(
                    "Failed to post message: {}",
                    error
                )));
            }

            debug!("Discord alert delivered");
            return Ok(());
        }
    }
}

/// Embed payload for one alert
pub fn alert_payload(alert: &AlertEvent) -> Value {
    let mut content = alert.headline();
    if content.chars().count() > MAX_CONTENT_CHARS {
        content = content.chars().take(MAX_CONTENT_CHARS).collect();
    }

    json!({
        "content": content,
        "embeds": [{
            "title": format!("{} met criteria", alert.ticker),
            "color": tier_color(alert.tier),
            "fields": [
                { "name": "Move", "value": format!("+{:.2}%", alert.abs_pct_change), "inline": true },
                { "name": "Price", "value": format!("${:.2}", alert.price), "inline": true },
                { "name": "Score", "value": format!("{:+} ({})", alert.score, alert.tier), "inline": true },
            ],
            "timestamp": alert.timestamp.to_rfc3339(),
        }]
    })
}

fn tier_color(tier: Tier) -> u32 {
    match tier {
        Tier::A => 0x2ECC71,
        Tier::B => 0x7FFF00,
        Tier::C => 0xF1C40F,
        Tier::D => 0xE74C3C,
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn alert(&mut self, alert: &AlertEvent) -> Result<()> {
        self.post_message(&alert_payload(alert)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_alert_payload_fields() {
        let alert = AlertEvent {
            ticker: "ABC".to_string(),
            abs_pct_change: 30.0,
            price: 13.0,
            score: 12,
            tier: Tier::A,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 3, 14, 31, 0).unwrap(),
        };

        let payload = alert_payload(&alert);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "ABC met criteria");
        assert_eq!(embed["color"], 0x2ECC71);
        assert_eq!(embed["fields"][0]["value"], "+30.00%");
        assert_eq!(embed["fields"][1]["value"], "$13.00");
        assert_eq!(embed["fields"][2]["value"], "+12 (A)");
        assert!(payload["content"].as_str().unwrap().starts_with("ABC +30.00%"));
    }
}
