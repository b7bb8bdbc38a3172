// src/store/document.rs
//! In-process document store. Collections live in memory behind a mutex and,
//! when opened on a directory, every mutated collection is rewritten as one JSON
//! file (temp file + rename, so a crash never leaves a half-written document).
//!
//! Disk writes run on the blocking pool. A separate async writer lock keeps
//! them in mutation order, and readers never wait on the disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use super::{
    analysis_order, BulkWrite, Store, StoreError, StoreStats, WriteError, WriteErrorKind,
};
use crate::model::{Alert, AnalysisBatch, Checkpoint, Item, WatchdogState};

const ITEMS_FILE: &str = "items.json";
const ALERTS_FILE: &str = "alerts.json";
const ANALYSES_FILE: &str = "analyses.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Metadata {
    checkpoint: Option<Checkpoint>,
    #[serde(default)]
    watchdog: WatchdogState,
}

#[derive(Debug, Default)]
struct Collections {
    items: Vec<Item>,
    item_index: HashMap<String, usize>,
    alerts: Vec<Alert>,
    alert_ids: HashSet<String>,
    analyses: Vec<AnalysisBatch>,
    metadata: Metadata,
}

impl Collections {
    fn reindex(&mut self) {
        self.item_index = self
            .items
            .iter()
            .enumerate()
            .map(|(i, it)| (it.id.clone(), i))
            .collect();
        self.alert_ids = self.alerts.iter().map(|a| a.id.clone()).collect();
    }

    fn insert_items(&mut self, items: Vec<Item>) -> BulkWrite {
        let mut out = BulkWrite::default();
        for (index, item) in items.into_iter().enumerate() {
            if self.item_index.contains_key(&item.id) {
                out.write_errors.push(WriteError {
                    index,
                    id: item.id,
                    kind: WriteErrorKind::DuplicateKey,
                });
                continue;
            }
            self.item_index.insert(item.id.clone(), self.items.len());
            self.items.push(item);
            out.inserted += 1;
        }
        out
    }

    fn mark(&mut self, ids: &[String], at: DateTime<Utc>) -> usize {
        let mut flipped = 0;
        for id in ids {
            let Some(&pos) = self.item_index.get(id) else {
                continue;
            };
            let it = &mut self.items[pos];
            if !it.processed {
                it.processed = true;
                it.processed_at = Some(at);
                flipped += 1;
            }
        }
        flipped
    }

    fn insert_alerts(&mut self, alerts: Vec<Alert>) -> BulkWrite {
        let mut out = BulkWrite::default();
        for (index, alert) in alerts.into_iter().enumerate() {
            if !self.alert_ids.insert(alert.id.clone()) {
                out.write_errors.push(WriteError {
                    index,
                    id: alert.id,
                    kind: WriteErrorKind::DuplicateKey,
                });
                continue;
            }
            self.alerts.push(alert);
            out.inserted += 1;
        }
        out
    }
}

#[derive(Clone, Copy)]
enum Collection {
    Items,
    Alerts,
    Analyses,
    Metadata,
}

/// Serialized collection waiting to be written.
struct Pending {
    name: &'static str,
    bytes: Vec<u8>,
}

pub struct DocumentStore {
    inner: Mutex<Collections>,
    writer: AsyncMutex<()>,
    dir: Option<PathBuf>,
}

impl DocumentStore {
    /// Volatile store; nothing touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Collections::default()),
            writer: AsyncMutex::new(()),
            dir: None,
        }
    }

    /// Open (or create) a store rooted at `dir`, loading any existing documents.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut c = Collections {
            items: load_doc(&dir, ITEMS_FILE)?.unwrap_or_default(),
            alerts: load_doc(&dir, ALERTS_FILE)?.unwrap_or_default(),
            analyses: load_doc(&dir, ANALYSES_FILE)?.unwrap_or_default(),
            metadata: load_doc(&dir, METADATA_FILE)?.unwrap_or_default(),
            ..Default::default()
        };
        c.reindex();

        tracing::info!(
            target: "store",
            dir = %dir.display(),
            items = c.items.len(),
            alerts = c.alerts.len(),
            "document store opened"
        );

        Ok(Self {
            inner: Mutex::new(c),
            writer: AsyncMutex::new(()),
            dir: Some(dir),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Serialize one collection under the data lock. `None` for in-memory stores.
    fn snapshot(&self, c: &Collections, which: Collection) -> Result<Option<Pending>, StoreError> {
        if self.dir.is_none() {
            return Ok(None);
        }
        let (name, bytes) = match which {
            Collection::Items => (ITEMS_FILE, encode(ITEMS_FILE, &c.items)?),
            Collection::Alerts => (ALERTS_FILE, encode(ALERTS_FILE, &c.alerts)?),
            Collection::Analyses => (ANALYSES_FILE, encode(ANALYSES_FILE, &c.analyses)?),
            Collection::Metadata => (METADATA_FILE, encode(METADATA_FILE, &c.metadata)?),
        };
        Ok(Some(Pending { name, bytes }))
    }

    /// Write a snapshot on the blocking pool. Callers hold `writer` from
    /// before the mutation until this returns.
    async fn flush(&self, pending: Option<Pending>) -> Result<(), StoreError> {
        let (Some(dir), Some(p)) = (self.dir.clone(), pending) else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || write_doc(&dir, p.name, &p.bytes))
            .await
            .map_err(|e| StoreError::Backend(format!("store writer task: {e}")))?
    }
}

#[async_trait]
impl Store for DocumentStore {
    async fn insert_many(&self, items: Vec<Item>) -> Result<BulkWrite, StoreError> {
        let _w = self.writer.lock().await;
        let (out, pending) = {
            let mut c = self.lock()?;
            let out = c.insert_items(items);
            let pending = match out.inserted {
                0 => None,
                _ => self.snapshot(&c, Collection::Items)?,
            };
            (out, pending)
        };
        self.flush(pending).await?;
        Ok(out)
    }

    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<Item>, StoreError> {
        let c = self.lock()?;
        let mut v: Vec<Item> = c.items.iter().filter(|i| !i.processed).cloned().collect();
        v.sort_by(analysis_order);
        v.truncate(limit);
        Ok(v)
    }

    async fn mark_processed(
        &self,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let _w = self.writer.lock().await;
        let (flipped, pending) = {
            let mut c = self.lock()?;
            let flipped = c.mark(ids, at);
            let pending = match flipped {
                0 => None,
                _ => self.snapshot(&c, Collection::Items)?,
            };
            (flipped, pending)
        };
        self.flush(pending).await?;
        Ok(flipped)
    }

    async fn latest_by_ingested_at(&self) -> Result<Option<Item>, StoreError> {
        let c = self.lock()?;
        Ok(c.items.iter().max_by_key(|i| i.ingested_at).cloned())
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
        let c = self.lock()?;
        Ok(c.item_index.get(id).map(|&pos| c.items[pos].clone()))
    }

    async fn checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.lock()?.metadata.checkpoint)
    }

    async fn put_checkpoint(&self, cp: Checkpoint) -> Result<(), StoreError> {
        let _w = self.writer.lock().await;
        let pending = {
            let mut c = self.lock()?;
            c.metadata.checkpoint = Some(cp);
            self.snapshot(&c, Collection::Metadata)?
        };
        self.flush(pending).await
    }

    async fn watchdog_state(&self) -> Result<WatchdogState, StoreError> {
        Ok(self.lock()?.metadata.watchdog)
    }

    async fn put_watchdog_state(&self, state: WatchdogState) -> Result<(), StoreError> {
        let _w = self.writer.lock().await;
        let pending = {
            let mut c = self.lock()?;
            c.metadata.watchdog = state;
            self.snapshot(&c, Collection::Metadata)?
        };
        self.flush(pending).await
    }

    async fn insert_analysis(&self, batch: AnalysisBatch) -> Result<(), StoreError> {
        let _w = self.writer.lock().await;
        let pending = {
            let mut c = self.lock()?;
            c.analyses.push(batch);
            self.snapshot(&c, Collection::Analyses)?
        };
        self.flush(pending).await
    }

    async fn insert_alerts(&self, alerts: Vec<Alert>) -> Result<BulkWrite, StoreError> {
        let _w = self.writer.lock().await;
        let (out, pending) = {
            let mut c = self.lock()?;
            let out = c.insert_alerts(alerts);
            let pending = match out.inserted {
                0 => None,
                _ => self.snapshot(&c, Collection::Alerts)?,
            };
            (out, pending)
        };
        self.flush(pending).await?;
        Ok(out)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let c = self.lock()?;
        Ok(StoreStats {
            items: c.items.len(),
            unprocessed: c.items.iter().filter(|i| !i.processed).count(),
            alerts: c.alerts.len(),
            analyses: c.analyses.len(),
        })
    }
}

fn load_doc<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>, StoreError> {
    let path = dir.join(name);
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(&path)?;
    serde_json::from_str(&s)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn encode<T: Serialize>(name: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn write_doc(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let path = dir.join(name);
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}
