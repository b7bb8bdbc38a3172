// src/config/accounts.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::PriorityClass;

/// Watched authors, split into the priority list and the normal ("group") list.
/// Handles are stored lower-cased without a leading `@`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Accounts {
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(default, alias = "group")]
    pub normal: Vec<String>,
}

impl Accounts {
    pub fn new(priority: Vec<String>, normal: Vec<String>) -> Self {
        Self {
            priority: clean_list(priority),
            normal: clean_list(normal),
        }
    }

    /// Parse the comma-separated env form (`"a, B ,,c"`).
    pub fn from_csv(priority: Option<&str>, normal: Option<&str>) -> Self {
        Self::new(split_csv(priority), split_csv(normal))
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.normal.is_empty()
    }

    /// Union of both lists. Priority handles win if listed twice.
    pub fn merge(self, other: Accounts) -> Accounts {
        let mut priority = self.priority;
        priority.extend(other.priority);
        let mut normal = self.normal;
        normal.extend(other.normal);
        Accounts::new(priority, normal)
    }

    /// Every watched handle, priority first, without duplicates.
    pub fn all(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.priority
            .iter()
            .chain(self.normal.iter())
            .filter(|a| seen.insert((*a).clone()))
            .cloned()
            .collect()
    }

    /// Priority list match first, then the normal list, else `Other`.
    pub fn classify(&self, author: &str) -> PriorityClass {
        let key = normalize_handle(author);
        if self.priority.iter().any(|a| *a == key) {
            PriorityClass::Priority
        } else if self.normal.iter().any(|a| *a == key) {
            PriorityClass::Group
        } else {
            PriorityClass::Other
        }
    }
}

/// Load accounts from an explicit path. Supports TOML or JSON formats.
pub fn load_accounts_from(path: &Path) -> Result<Accounts> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading accounts from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_accounts(&content, ext.as_str())
}

/// Resolve the accounts file:
/// 1) explicit path (from `ACCOUNTS_PATH`), which must exist
/// 2) config/accounts.toml
/// 3) config/accounts.json
///
/// Returns an empty list set when nothing is found.
pub fn load_accounts_default(explicit: Option<&str>) -> Result<Accounts> {
    if let Some(p) = explicit {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_accounts_from(&pb);
        }
        return Err(anyhow!("ACCOUNTS_PATH points to non-existent path {p}"));
    }
    let toml_p = PathBuf::from("config/accounts.toml");
    if toml_p.exists() {
        return load_accounts_from(&toml_p);
    }
    let json_p = PathBuf::from("config/accounts.json");
    if json_p.exists() {
        return load_accounts_from(&json_p);
    }
    Ok(Accounts::default())
}

fn parse_accounts(s: &str, hint_ext: &str) -> Result<Accounts> {
    let parsed: Accounts = match hint_ext {
        "toml" => toml::from_str(s).context("parsing accounts toml")?,
        "json" => serde_json::from_str(s).context("parsing accounts json")?,
        _ => serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .map_err(|_| anyhow!("unsupported accounts format"))?,
    };
    Ok(Accounts::new(parsed.priority, parsed.normal))
}

fn split_csv(v: Option<&str>) -> Vec<String> {
    v.map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

fn normalize_handle(s: &str) -> String {
    s.trim().trim_start_matches('@').to_lowercase()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = normalize_handle(&it);
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}
