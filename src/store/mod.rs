// src/store/mod.rs
//! Keyed document store. Items and alerts are unique by id; duplicate inserts
//! are reported per document and never abort the rest of a bulk write.

pub mod document;

pub use document::DocumentStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{Alert, AnalysisBatch, Checkpoint, Item, WatchdogState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// Uniqueness constraint on `id` rejected the document. Expected and benign.
    DuplicateKey,
    Backend(String),
}

/// Per-document failure inside an unordered bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    pub index: usize,
    pub id: String,
    pub kind: WriteErrorKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWrite {
    pub inserted: usize,
    pub write_errors: Vec<WriteError>,
}

impl BulkWrite {
    pub fn duplicates(&self) -> usize {
        self.write_errors
            .iter()
            .filter(|e| e.kind == WriteErrorKind::DuplicateKey)
            .count()
    }

    /// First write error that is not a duplicate-key rejection.
    pub fn first_hard_error(&self) -> Option<&WriteError> {
        self.write_errors
            .iter()
            .find(|e| e.kind != WriteErrorKind::DuplicateKey)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub items: usize,
    pub unprocessed: usize,
    pub alerts: usize,
    pub analyses: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Unordered insert. Every document is attempted; failures are reported per document.
    async fn insert_many(&self, items: Vec<Item>) -> Result<BulkWrite, StoreError>;

    /// Up to `limit` unprocessed items in [`analysis_order`].
    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<Item>, StoreError>;

    /// Flip `processed` on the given ids. Already processed items are left untouched.
    /// Returns how many items flipped.
    async fn mark_processed(&self, ids: &[String], at: DateTime<Utc>)
        -> Result<usize, StoreError>;

    async fn latest_by_ingested_at(&self) -> Result<Option<Item>, StoreError>;

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError>;

    async fn checkpoint(&self) -> Result<Option<Checkpoint>, StoreError>;

    async fn put_checkpoint(&self, cp: Checkpoint) -> Result<(), StoreError>;

    async fn watchdog_state(&self) -> Result<WatchdogState, StoreError>;

    async fn put_watchdog_state(&self, state: WatchdogState) -> Result<(), StoreError>;

    async fn insert_analysis(&self, batch: AnalysisBatch) -> Result<(), StoreError>;

    /// Unordered insert, unique by alert id.
    async fn insert_alerts(&self, alerts: Vec<Alert>) -> Result<BulkWrite, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Order in which unprocessed items are offered to the classifier:
/// priority items first, then most recently ingested first.
/// Ties fall back to source timestamp (newest first), then id.
pub fn analysis_order(a: &Item, b: &Item) -> Ordering {
    b.priority_class
        .is_priority()
        .cmp(&a.priority_class.is_priority())
        .then_with(|| b.ingested_at.cmp(&a.ingested_at))
        .then_with(|| b.source_timestamp.cmp(&a.source_timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorityClass;
    use chrono::{Duration, TimeZone};

    #[test]
    fn priority_beats_recency() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let old_priority = Item::new("p", PriorityClass::Priority, t0);
        let new_group = Item::new("g", PriorityClass::Group, t0 + Duration::minutes(5));
        let newer_other = Item::new("o", PriorityClass::Other, t0 + Duration::minutes(9));

        let mut v = vec![new_group, newer_other, old_priority];
        v.sort_by(analysis_order);
        let ids: Vec<_> = v.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["p", "o", "g"]);
    }

    #[test]
    fn bulk_write_separates_duplicates_from_hard_errors() {
        let bw = BulkWrite {
            inserted: 1,
            write_errors: vec![
                WriteError {
                    index: 1,
                    id: "a".into(),
                    kind: WriteErrorKind::DuplicateKey,
                },
                WriteError {
                    index: 2,
                    id: "b".into(),
                    kind: WriteErrorKind::Backend("disk full".into()),
                },
            ],
        };
        assert_eq!(bw.duplicates(), 1);
        assert_eq!(bw.first_hard_error().map(|e| e.id.as_str()), Some("b"));
    }
}
