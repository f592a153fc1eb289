use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

/// Rendered pages keyed by request path and query string.
///
/// Every invalidation bumps a generation counter. A renderer captures the
/// generation before it reads the database and hands it back to [`put`], which
/// discards the page when an invalidation happened in between.
///
/// [`put`]: PageCache::put
pub struct PageCache {
    inner: RwLock<Pages>,
    capacity: usize,
}

#[derive(Default)]
struct Pages {
    entries: HashMap<String, String>,
    // insertion order, oldest first
    order: VecDeque<String>,
    generation: u64,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PageCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: RwLock::new(Pages::default()), capacity: capacity.max(1) }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.get(key).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    /// Stores `html` unless the cache was invalidated after `seen_generation`.
    /// Returns whether the page was kept.
    pub fn put(&self, key: impl Into<String>, html: String, seen_generation: u64) -> bool {
        let key = key.into();
        let mut pages = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if pages.generation != seen_generation {
            debug!(
                event_name = "dashboard.cache.stale_skipped",
                correlation_id = "cache",
                key = %key,
                "rendered page is older than the last invalidation, not cached"
            );
            return false;
        }

        if pages.entries.insert(key.clone(), html).is_none() {
            pages.order.push_back(key);
            while pages.entries.len() > self.capacity {
                let Some(oldest) = pages.order.pop_front() else { break };
                pages.entries.remove(&oldest);
            }
        }
        true
    }

    /// Drops `path` and every cached variant of it (`path?query=...`).
    pub fn invalidate(&self, path: &str) -> usize {
        let variant_prefix = format!("{path}?");
        let keep = |key: &String| key != path && !key.starts_with(&variant_prefix);

        let mut pages = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        pages.generation = pages.generation.wrapping_add(1);
        let before = pages.entries.len();
        pages.entries.retain(|key, _| keep(key));
        pages.order.retain(|key| keep(key));
        let dropped = before - pages.entries.len();

        debug!(
            event_name = "dashboard.cache.invalidated",
            correlation_id = "cache",
            path,
            dropped,
            generation = pages.generation,
            "page cache invalidated"
        );
        dropped
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::PageCache;

    #[test]
    fn invalidate_drops_path_and_its_query_variants_only() {
        let cache = PageCache::default();
        let generation = cache.generation();
        cache.put("/dashboard/invoices", "all".to_string(), generation);
        cache.put("/dashboard/invoices?query=lee", "lee".to_string(), generation);
        cache.put("/dashboard/invoices/create", "form".to_string(), generation);
        cache.put("/dashboard", "overview".to_string(), generation);

        assert_eq!(cache.invalidate("/dashboard/invoices"), 2);

        assert!(cache.get("/dashboard/invoices").is_none());
        assert!(cache.get("/dashboard/invoices?query=lee").is_none());
        assert_eq!(cache.get("/dashboard/invoices/create").as_deref(), Some("form"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn page_rendered_before_an_invalidation_is_not_stored() {
        let cache = PageCache::default();
        let seen = cache.generation();

        cache.invalidate("/dashboard/invoices");

        assert!(!cache.put("/dashboard/invoices", "stale".to_string(), seen));
        assert!(cache.get("/dashboard/invoices").is_none());

        let fresh = cache.generation();
        assert!(cache.put("/dashboard/invoices", "fresh".to_string(), fresh));
        assert_eq!(cache.get("/dashboard/invoices").as_deref(), Some("fresh"));
    }

    #[test]
    fn oldest_entries_are_evicted_past_capacity() {
        let cache = PageCache::with_capacity(2);
        let generation = cache.generation();

        for n in 1..=3 {
            cache.put(format!("/dashboard/invoices?x={n}"), n.to_string(), generation);
        }
        cache.put("/dashboard/invoices?x=3", "again".to_string(), generation);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("/dashboard/invoices?x=1").is_none());
        assert_eq!(cache.get("/dashboard/invoices?x=2").as_deref(), Some("2"));
        assert_eq!(cache.get("/dashboard/invoices?x=3").as_deref(), Some("again"));
    }
}
