// src/ingest/dedup.rs
use anyhow::{anyhow, Context, Result};
use metrics::counter;
use std::collections::HashSet;

use crate::model::Item;
use crate::store::{Store, WriteErrorKind};

/// Intra-batch pass: trim ids, drop empty ones, keep the first occurrence of
/// each id. Survivors keep their original order.
pub fn dedup_first_wins(items: Vec<Item>) -> Vec<Item> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut keep = Vec::with_capacity(items.len());
    for mut it in items {
        let id = it.id.trim();
        if id.is_empty() {
            continue;
        }
        if id.len() != it.id.len() {
            it.id = id.to_string();
        }
        if !seen.insert(it.id.clone()) {
            continue;
        }
        keep.push(it);
    }
    keep
}

/// Idempotent write of one poll cycle. Returns how many items were new.
///
/// Duplicate-key rejections from the store are expected (overlapping windows,
/// re-runs) and only reduce the count. Any other write error is returned.
pub async fn dedup_and_insert(store: &dyn Store, items: Vec<Item>) -> Result<usize> {
    let candidates = items.len();
    let unique = dedup_first_wins(items);
    if unique.is_empty() {
        return Ok(0);
    }
    let unique_len = unique.len();

    let res = store
        .insert_many(unique)
        .await
        .context("bulk insert of polled items")?;

    let duplicates = res.duplicates();
    counter!("ingest_inserted_total").increment(res.inserted as u64);
    counter!("ingest_duplicates_total").increment(duplicates as u64);

    tracing::debug!(
        target: "ingest",
        candidates,
        unique = unique_len,
        inserted = res.inserted,
        duplicates,
        "dedup insert"
    );

    if let Some(e) = res.first_hard_error() {
        let reason = match &e.kind {
            WriteErrorKind::Backend(r) => r.as_str(),
            WriteErrorKind::DuplicateKey => "duplicate key",
        };
        return Err(anyhow!(
            "insert of item {} (index {}) failed: {reason}; {} inserted before failure report",
            e.id,
            e.index,
            res.inserted
        ));
    }

    Ok(res.inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorityClass;
    use crate::store::DocumentStore;
    use chrono::Utc;

    fn item(id: &str, text: &str) -> Item {
        Item::new(id, PriorityClass::Other, Utc::now()).with_text(text)
    }

    #[test]
    fn first_occurrence_wins_and_order_is_kept() {
        let out = dedup_first_wins(vec![
            item("B", "b"),
            item("A", "v1"),
            item(" A ", "v2"),
            item("", "empty"),
            item("   ", "blank"),
            item("C", "c"),
        ]);
        let got: Vec<_> = out.iter().map(|i| (i.id.as_str(), i.payload.text.as_str())).collect();
        assert_eq!(got, vec![("B", "b"), ("A", "v1"), ("C", "c")]);
    }

    #[tokio::test]
    async fn repeated_writes_never_duplicate() {
        let store = DocumentStore::in_memory();
        let batch = || vec![item("A", "1"), item("A", "2"), item("B", "")];

        assert_eq!(dedup_and_insert(&store, batch()).await.unwrap(), 2);
        assert_eq!(dedup_and_insert(&store, batch()).await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap().items, 2);
        let a = store.get_item("A").await.unwrap().unwrap();
        assert_eq!(a.payload.text, "1");
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let store = DocumentStore::in_memory();
        assert_eq!(dedup_and_insert(&store, vec![item("", "x")]).await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap().items, 0);
    }
}
