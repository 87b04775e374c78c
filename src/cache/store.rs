//! In-memory view-count store.

use std::collections::HashMap;
use std::sync::RwLock;

use metrics::{counter, gauge};
use time::{Duration, OffsetDateTime};

use crate::domain::views::ViewCountEntry;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "folio_views_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "folio_views_cache_miss_total";
pub(crate) const METRIC_CACHE_ENTRIES: &str = "folio_views_cache_entries";

/// Normalized route → last computed count.
///
/// Entries are never evicted: the key space is the set of routes on the site,
/// which is small and bounded for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ViewCache {
    entries: RwLock<HashMap<String, ViewCountEntry>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `route` regardless of age.
    pub fn get(&self, route: &str) -> Option<ViewCountEntry> {
        rw_read(&self.entries, SOURCE, "get").get(route).cloned()
    }

    /// Entry for `route` if it is younger than `ttl` at `now`.
    ///
    /// Records a hit or miss metric.
    pub fn get_fresh(
        &self,
        route: &str,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Option<ViewCountEntry> {
        let fresh = rw_read(&self.entries, SOURCE, "get_fresh")
            .get(route)
            .filter(|entry| entry.is_fresh(now, ttl))
            .cloned();

        if fresh.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        fresh
    }

    /// Insert or overwrite the entry for its route, returning what was stored.
    ///
    /// `computed_at` never moves backwards for a route: if the supplied
    /// timestamp is older than the existing one, the existing one is kept.
    pub fn store(&self, mut entry: ViewCountEntry) -> ViewCountEntry {
        let mut entries = rw_write(&self.entries, SOURCE, "store");
        if let Some(previous) = entries.get(&entry.path)
            && previous.computed_at > entry.computed_at
        {
            entry.computed_at = previous.computed_at;
        }
        entries.insert(entry.path.clone(), entry.clone());
        gauge!(METRIC_CACHE_ENTRIES).set(entries.len() as f64);
        entry
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
