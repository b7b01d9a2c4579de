//! Session-local TTL cache for account histories.
//!
//! Owned by a single monitor instance; entries expire after the configured
//! TTL and the map is bounded so a busy stream cannot grow it without
//! limit. Missing-wallet results are cached too, so an unknown wallet does
//! not trigger a lookup on every one of its events.

use polymarket_core::types::HistoryLookup;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct SessionCache {
    entries: HashMap<String, (Instant, HistoryLookup)>,
    ttl: Duration,
    max_entries: usize,
}

impl SessionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries.min(1024)),
            ttl,
            max_entries,
        }
    }

    pub fn get(&mut self, wallet: &str) -> Option<HistoryLookup> {
        let wallet = wallet.to_lowercase();
        match self.entries.get(&wallet) {
            Some((stored_at, lookup)) if stored_at.elapsed() < self.ttl => Some(lookup.clone()),
            Some(_) => {
                self.entries.remove(&wallet);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, wallet: &str, lookup: HistoryLookup) {
        self.evict_expired();
        self.entries
            .insert(wallet.to_lowercase(), (Instant::now(), lookup));
        self.evict_oldest_if_needed();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }

    fn evict_oldest_if_needed(&mut self) {
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(wallet, _)| wallet.clone());
            match oldest {
                Some(wallet) => {
                    self.entries.remove(&wallet);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_and_case_folding() {
        let mut cache = SessionCache::new(Duration::from_secs(300), 100);
        cache.insert("0xABCD", HistoryLookup::Missing);

        assert!(matches!(cache.get("0xabcd"), Some(HistoryLookup::Missing)));
        assert!(cache.get("0xother").is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let mut cache = SessionCache::new(Duration::from_millis(0), 100);
        cache.insert("0xw", HistoryLookup::Missing);
        assert!(cache.get("0xw").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_bound_evicts_oldest() {
        let mut cache = SessionCache::new(Duration::from_secs(300), 2);
        cache.insert("0xa", HistoryLookup::Missing);
        cache.insert("0xb", HistoryLookup::Missing);
        cache.insert("0xc", HistoryLookup::Missing);

        assert_eq!(cache.len(), 2);
        // The first inserted entry went first.
        assert!(cache.get("0xa").is_none());
        assert!(cache.get("0xc").is_some());
    }
}
