// src/notify/telegram.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    base: String,
    client: Client,
    timeout: Duration,
    /// Total send attempts per message. A failed alert is otherwise retried
    /// by the next cycle, so the default is a single attempt.
    max_attempts: u8,
}

impl TelegramNotifier {
    pub fn new(token: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building telegram http client")?;
        Ok(Self {
            token,
            base: API_BASE.to_string(),
            client,
            timeout: Duration::from_secs(10),
            max_attempts: 1,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base.trim_end_matches('/'), self.token)
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// 500ms doubling per attempt, capped at 32s.
fn backoff(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(6);
    Duration::from_millis(500u64 << shift)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        let payload = SendMessage {
            chat_id: channel,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let url = self.endpoint();

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            // The token is part of the URL; keep it out of error text.
            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("telegram HTTP error: {}", e.without_url()),
                },
                Err(e) => anyhow!("telegram request failed: {}", e.without_url()),
            };

            if attempt >= self.max_attempts {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "telegram send retry");
            tokio::time::sleep(backoff(attempt)).await;
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
