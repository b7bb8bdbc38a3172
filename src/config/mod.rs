// src/config/mod.rs
//! Startup configuration. Built once, then handed to every component;
//! nothing below this module reads the process environment.

pub mod accounts;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

pub use accounts::Accounts;

pub const DEFAULT_GROK_API_URL: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_GROK_MODEL: &str = "grok-4-1-fast-reasoning";

/// Upper bound for every configured time span (one leap year).
pub const MAX_SPAN_HOURS: f64 = 366.0 * 24.0;
const MAX_SPAN_MINUTES: i64 = 366 * 24 * 60;
const MAX_OVERLAP_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("no accounts configured; set PRIORITY_ACCOUNTS and/or NORMAL_ACCOUNTS")]
    NoAccounts,
    #[error("accounts file: {0:#}")]
    AccountsFile(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub twitter_api_key: String,
    pub classifier_api_key: String,
    pub classifier_url: String,
    pub classifier_model: String,
    /// Without a bot token notifications are logged and dropped.
    pub telegram_bot_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub overlap: Duration,
    /// Only used before the first checkpoint exists.
    pub default_lookback: Duration,
    pub interval: StdDuration,
    pub page_delay: StdDuration,
    pub max_pages: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            overlap: Duration::seconds(60),
            default_lookback: Duration::minutes(15),
            interval: StdDuration::from_secs(3 * 60),
            page_delay: StdDuration::from_secs(6),
            max_pages: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub select_limit: usize,
    pub min_priority: usize,
    pub min_regular: usize,
    pub max_batch: usize,
    pub subbatch_size: usize,
    pub interval: StdDuration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            select_limit: 50,
            min_priority: 1,
            min_regular: 3,
            max_batch: 10,
            subbatch_size: 5,
            interval: StdDuration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub silence_threshold: Duration,
    pub cooldown: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::hours(2),
            cooldown: Duration::minutes(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyConfig {
    pub alert_chat_id: Option<String>,
    pub watchdog_chat_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub accounts: Accounts,
    pub poll: PollConfig,
    pub batch: BatchConfig,
    pub watchdog: WatchdogConfig,
    pub notify: NotifyConfig,
    pub store_path: PathBuf,
    pub backfill_hours: f64,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let credentials = Credentials {
            twitter_api_key: get("TWITTERAPI_IO_API_KEY")
                .ok_or(ConfigError::Missing("TWITTERAPI_IO_API_KEY"))?,
            classifier_api_key: get("GROK_API_KEY").ok_or(ConfigError::Missing("GROK_API_KEY"))?,
            classifier_url: get("GROK_API_URL").unwrap_or_else(|| DEFAULT_GROK_API_URL.to_string()),
            classifier_model: get("GROK_MODEL").unwrap_or_else(|| DEFAULT_GROK_MODEL.to_string()),
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
        };

        let from_env = Accounts::from_csv(
            get("PRIORITY_ACCOUNTS").as_deref(),
            get("NORMAL_ACCOUNTS").as_deref(),
        );
        let from_file = accounts::load_accounts_default(get("ACCOUNTS_PATH").as_deref())
            .map_err(ConfigError::AccountsFile)?;
        let accounts = from_env.merge(from_file);
        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }

        let poll_defaults = PollConfig::default();
        let poll = PollConfig {
            overlap: Duration::seconds(at_most(
                "POLL_OVERLAP_SECS",
                parse_or(&get, "POLL_OVERLAP_SECS", poll_defaults.overlap.num_seconds())?,
                MAX_OVERLAP_SECS,
            )?),
            default_lookback: Duration::minutes(at_most(
                "DEFAULT_LOOKBACK_MINUTES",
                positive(
                    &get,
                    "DEFAULT_LOOKBACK_MINUTES",
                    poll_defaults.default_lookback.num_minutes(),
                )?,
                MAX_SPAN_MINUTES,
            )?),
            interval: StdDuration::from_secs(
                at_most(
                    "CRON_INTERVAL_MINUTES",
                    positive(&get, "CRON_INTERVAL_MINUTES", 3u64)?,
                    MAX_SPAN_MINUTES as u64,
                )? * 60,
            ),
            page_delay: StdDuration::from_secs(parse_or(
                &get,
                "FETCH_PAGE_DELAY_SECS",
                poll_defaults.page_delay.as_secs(),
            )?),
            max_pages: positive(&get, "FETCH_MAX_PAGES", poll_defaults.max_pages)?,
        };
        if poll.overlap < Duration::zero() {
            return Err(invalid("POLL_OVERLAP_SECS", poll.overlap.num_seconds(), "must be >= 0"));
        }

        let bd = BatchConfig::default();
        let batch = BatchConfig {
            select_limit: positive(&get, "SLOW_PATH_SELECT_LIMIT", bd.select_limit)?,
            min_priority: parse_or(&get, "SLOW_PATH_MIN_PRIORITY", bd.min_priority)?,
            min_regular: parse_or(&get, "SLOW_PATH_MIN_REGULAR", bd.min_regular)?,
            max_batch: positive(&get, "SLOW_PATH_MAX_BATCH", bd.max_batch)?,
            subbatch_size: positive(&get, "SLOW_PATH_SUBBATCH_SIZE", bd.subbatch_size)?,
            interval: StdDuration::from_secs(
                at_most(
                    "SLOW_PATH_INTERVAL_MINUTES",
                    positive(&get, "SLOW_PATH_INTERVAL_MINUTES", 2u64)?,
                    MAX_SPAN_MINUTES as u64,
                )? * 60,
            ),
        };

        let watchdog = WatchdogConfig {
            silence_threshold: hours_f64(span_hours(&get, "WATCHDOG_SILENT_HOURS", 2.0)?),
            cooldown: Duration::minutes(at_most(
                "WATCHDOG_ALERT_COOLDOWN_MINUTES",
                positive(&get, "WATCHDOG_ALERT_COOLDOWN_MINUTES", 60i64)?,
                MAX_SPAN_MINUTES,
            )?),
        };

        let notify = NotifyConfig {
            alert_chat_id: get("TELEGRAM_ALERT_CHAT_ID"),
            watchdog_chat_id: get("TELEGRAM_WATCHDOG_CHAT_ID"),
        };

        let cfg = AppConfig {
            credentials,
            accounts,
            poll,
            batch,
            watchdog,
            notify,
            store_path: get("STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            backfill_hours: span_hours(&get, "BACKFILL_HOURS", 12.0)?,
        };
        cfg.warn_degraded();
        Ok(cfg)
    }

    /// Optional notification paths that are switched off.
    fn warn_degraded(&self) {
        if self.credentials.telegram_bot_token.is_none() {
            tracing::warn!(target: "config", "TELEGRAM_BOT_TOKEN not set; notifications will be logged only");
        }
        if self.notify.alert_chat_id.is_none() {
            tracing::warn!(target: "config", "TELEGRAM_ALERT_CHAT_ID not set; breaking alerts will not be sent");
        }
        if self.notify.watchdog_chat_id.is_none() {
            tracing::warn!(target: "config", "TELEGRAM_WATCHDOG_CHAT_ID not set; silence alerts will not be sent");
        }
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, &e.to_string())),
    }
}

fn positive<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + ToString,
    T::Err: std::fmt::Display,
{
    let v = parse_or(get, key, default)?;
    if v <= T::default() {
        return Err(invalid(key, v.to_string(), "must be > 0"));
    }
    Ok(v)
}

fn at_most<T>(key: &'static str, v: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + ToString,
{
    if v > max {
        return Err(invalid(key, v.to_string(), &format!("must be <= {}", max.to_string())));
    }
    Ok(v)
}

/// Positive, finite hour count no larger than [`MAX_SPAN_HOURS`].
fn span_hours<G>(get: &G, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let v: f64 = parse_or(get, key, default)?;
    if !v.is_finite() || v <= 0.0 || v > MAX_SPAN_HOURS {
        return Err(invalid(
            key,
            v,
            &format!("must be a positive number of hours up to {MAX_SPAN_HOURS}"),
        ));
    }
    Ok(v)
}

fn hours_f64(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| m.get(k).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("TWITTERAPI_IO_API_KEY", "tw-key"),
        ("GROK_API_KEY", "grok-key"),
        ("PRIORITY_ACCOUNTS", "DeItaone"),
        ("NORMAL_ACCOUNTS", "WatcherGuru, tier10k"),
    ];

    #[serial_test::serial]
    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(cfg.poll, PollConfig::default());
        assert_eq!(cfg.batch, BatchConfig::default());
        assert_eq!(cfg.watchdog, WatchdogConfig::default());
        assert_eq!(cfg.credentials.classifier_url, DEFAULT_GROK_API_URL);
        assert_eq!(cfg.accounts.priority, vec!["deitaone".to_string()]);
        assert_eq!(cfg.accounts.normal.len(), 2);
        assert!(cfg.notify.alert_chat_id.is_none());
        assert!(cfg.credentials.telegram_bot_token.is_none());
    }

    #[serial_test::serial]
    #[test]
    fn missing_credentials_are_fatal() {
        let err = AppConfig::from_lookup(lookup(&BASE[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TWITTERAPI_IO_API_KEY")));

        let mut pairs = BASE.to_vec();
        pairs.push(("GROK_API_KEY", "  "));
        let m = lookup(&pairs);
        // the later empty value shadows the key in the map
        let err = AppConfig::from_lookup(m).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GROK_API_KEY")));
    }

    #[serial_test::serial]
    #[test]
    fn no_accounts_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&BASE[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::NoAccounts));
    }

    #[serial_test::serial]
    #[test]
    fn overrides_and_invalid_numbers() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("SLOW_PATH_MAX_BATCH", "20"),
            ("WATCHDOG_SILENT_HOURS", "1.5"),
            ("TELEGRAM_ALERT_CHAT_ID", "-100123"),
        ]);
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.batch.max_batch, 20);
        assert_eq!(cfg.watchdog.silence_threshold, Duration::minutes(90));
        assert_eq!(cfg.notify.alert_chat_id.as_deref(), Some("-100123"));

        let mut bad = BASE.to_vec();
        bad.push(("SLOW_PATH_SUBBATCH_SIZE", "0"));
        let err = AppConfig::from_lookup(lookup(&bad)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SLOW_PATH_SUBBATCH_SIZE", .. }));

        for (key, value) in [
            ("WATCHDOG_SILENT_HOURS", "1e15"),
            ("BACKFILL_HOURS", "9000"),
            ("DEFAULT_LOOKBACK_MINUTES", "9223372036854775807"),
            ("POLL_OVERLAP_SECS", "100000"),
        ] {
            let mut bad = BASE.to_vec();
            bad.push((key, value));
            match AppConfig::from_lookup(lookup(&bad)) {
                Err(ConfigError::Invalid { key: k, .. }) => assert_eq!(k, key),
                other => panic!("{key}={value}: expected invalid, got {:?}", other.map(|_| ())),
            }
        }

        let mut bad = BASE.to_vec();
        bad.push(("CRON_INTERVAL_MINUTES", "soon"));
        let err = AppConfig::from_lookup(lookup(&bad)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CRON_INTERVAL_MINUTES", .. }));
    }
}
