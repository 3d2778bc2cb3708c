//! Identity ledger for resumable deduplication.
//!
//! A place is known by its numeric id when one was found, and by the
//! similarity key of its name paired with the searched locality. Either
//! signal matching counts as a duplicate. The ledger only grows; the output
//! file is the durable copy and is replayed into a fresh ledger on start.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::result_sink::read_persisted_rows;
use crate::text_normalizer::{locality_key, similarity_key};
use crate::url_utils::extract_cid_from_url;

#[derive(Debug, Default)]
pub struct DedupLedger {
    ids: HashSet<String>,
    name_keys: HashSet<(String, String)>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from a previously written record file.
    pub fn seed_from_csv(path: &Path) -> Result<Self> {
        let mut ledger = Self::new();
        for row in read_persisted_rows(path)? {
            let id = extract_cid_from_url(&row.profile_url).unwrap_or_default();
            ledger.record(&id, &row.name, &row.query_location);
        }
        debug!(
            "Seeded ledger from {}: {} ids, {} name keys",
            path.display(),
            ledger.ids.len(),
            ledger.name_keys.len()
        );
        Ok(ledger)
    }

    /// True if the id is known, or the (name, locality) key is known.
    pub fn seen(&self, id: &str, name: &str, locality: &str) -> bool {
        if !id.is_empty() && self.ids.contains(id) {
            return true;
        }
        match name_key(name, locality) {
            Some(key) => self.name_keys.contains(&key),
            None => false,
        }
    }

    /// Remember both representations that are available.
    pub fn record(&mut self, id: &str, name: &str, locality: &str) {
        if !id.is_empty() {
            self.ids.insert(id.to_string());
        }
        if let Some(key) = name_key(name, locality) {
            self.name_keys.insert(key);
        }
    }

    /// Best-effort count of distinct places.
    pub fn count(&self) -> usize {
        if self.ids.is_empty() {
            self.name_keys.len()
        } else {
            self.ids.len()
        }
    }
}

fn name_key(name: &str, locality: &str) -> Option<(String, String)> {
    let key = similarity_key(name);
    if key.is_empty() {
        None
    } else {
        Some((key, locality_key(locality)))
    }
}
