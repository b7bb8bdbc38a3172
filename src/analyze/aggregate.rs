// src/analyze/aggregate.rs
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::model::{Alert, BreakingItem, Urgency};

/// Breaking candidates of one tick into alerts: medium/high only, non-empty
/// id, first occurrence per id wins.
pub fn collect_alerts<'a, I>(breaking: I, now: DateTime<Utc>) -> Vec<Alert>
where
    I: IntoIterator<Item = &'a BreakingItem>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for b in breaking {
        let Some(urgency) = Urgency::parse(&b.urgency).filter(|u| u.is_alertable()) else {
            continue;
        };
        let id = b.tweet_id.trim();
        if id.is_empty() || !seen.insert(id.to_string()) {
            continue;
        }
        out.push(Alert {
            id: id.to_string(),
            created_at: now,
            urgency,
            has_quote: !b.quoted_text.is_empty(),
            main_text: b.main_text.clone(),
            quoted_text: b.quoted_text.clone(),
            quoted_author: b.quoted_author.clone(),
            reason: b.reason.clone(),
            username: b.username.clone(),
            link: b.link.clone(),
            quoted_link: b.quoted_link.clone(),
        });
    }
    out
}
