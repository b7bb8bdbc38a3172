// src/pipeline.rs
//! Shared context handed to every cycle. Collaborators sit behind trait
//! objects so tests can swap in fakes and a manual clock.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::analyze::classifier::{Classifier, GrokClassifier};
use crate::clock::{Clock, SystemClock};
use crate::config::{Accounts, AppConfig, BatchConfig, NotifyConfig, PollConfig, WatchdogConfig};
use crate::ingest::providers::TwitterApiFetcher;
use crate::ingest::types::PostFetcher;
use crate::notify::telegram::TelegramNotifier;
use crate::notify::{DisabledNotifier, Notifier};
use crate::store::{DocumentStore, Store};

#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub fetcher: Arc<dyn PostFetcher>,
    pub classifier: Arc<dyn Classifier>,
    pub notifier: Arc<dyn Notifier>,
    pub accounts: Accounts,
    pub poll: PollConfig,
    pub batch: BatchConfig,
    pub watchdog: WatchdogConfig,
    pub notify: NotifyConfig,
}

impl Pipeline {
    /// Context with default tunables and no notification channels.
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn PostFetcher>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        accounts: Accounts,
    ) -> Self {
        Self {
            store,
            clock,
            fetcher,
            classifier,
            notifier,
            accounts,
            poll: PollConfig::default(),
            batch: BatchConfig::default(),
            watchdog: WatchdogConfig::default(),
            notify: NotifyConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn with_notify(mut self, notify: NotifyConfig) -> Self {
        self.notify = notify;
        self
    }

    /// Production wiring: on-disk store, real HTTP collaborators, system clock.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let store = DocumentStore::open(&cfg.store_path)
            .with_context(|| format!("opening store at {}", cfg.store_path.display()))?;
        Self::from_config_with_store(cfg, Arc::new(store))
    }

    /// Same as [`Pipeline::from_config`] but over a caller-provided store.
    pub fn from_config_with_store(cfg: &AppConfig, store: Arc<dyn Store>) -> Result<Self> {
        let creds = &cfg.credentials;
        let fetcher = TwitterApiFetcher::new(
            creds.twitter_api_key.clone(),
            cfg.accounts.clone(),
            &cfg.poll,
        )?;
        let classifier = GrokClassifier::new(
            creds.classifier_api_key.clone(),
            creds.classifier_url.clone(),
            creds.classifier_model.clone(),
        )?;
        let notifier: Arc<dyn Notifier> = match &creds.telegram_bot_token {
            Some(token) => Arc::new(TelegramNotifier::new(token.clone())?),
            None => Arc::new(DisabledNotifier),
        };

        Ok(Self::new(
            store,
            Arc::new(SystemClock),
            Arc::new(fetcher),
            Arc::new(classifier),
            notifier,
            cfg.accounts.clone(),
        )
        .with_poll(cfg.poll)
        .with_batch(cfg.batch)
        .with_watchdog(cfg.watchdog)
        .with_notify(cfg.notify.clone()))
    }
}
