// src/notify/mod.rs
pub mod cooldown;
pub mod telegram;

pub use cooldown::Cooldown;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::Alert;

/// Delivers one message to one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, text: &str) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Used when no bot token is configured: logs the message and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, channel: &str, text: &str) -> Result<()> {
        tracing::warn!(
            target: "notify",
            channel,
            chars = text.chars().count(),
            "bot token not set; dropping message"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// HTML body for one breaking alert.
pub fn format_alert_message(a: &Alert) -> String {
    let esc = |s: &str| html_escape::encode_text(s).to_string();

    let mut lines = vec![format!("{} {}", a.urgency.icon(), esc(&a.main_text))];
    if a.has_quote && !a.quoted_text.is_empty() {
        lines.push(String::new());
        lines.push(format!("📎 <b>Quoting @{}:</b>", esc(&a.quoted_author)));
        lines.push(esc(&a.quoted_text));
    }
    lines.push(String::new());
    lines.push(format!("👤 @{}", esc(&a.username)));
    lines.push(format!("📊 {}", esc(&a.reason)));
    lines.push(String::new());
    lines.push(format!("🔗 {}", esc(&a.link)));
    if !a.quoted_link.is_empty() {
        lines.push(format!("📎 {}", esc(&a.quoted_link)));
    }
    lines.join("\n")
}
