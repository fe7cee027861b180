//! A TTL cache for serialized collector output.
//!
//! Keys map to at most one value. Alongside the primary mapping the cache
//! keeps one "bucket" per distinct TTL: an ordered list of the keys
//! currently held at that TTL, appended on insertion. Within a bucket
//! every entry shares the same TTL and insertion order equals order of
//! latest insertion, so the head of a bucket is always the next entry to
//! expire. The periodic sweeper walks each bucket from the head and stops
//! at the first live entry, which bounds sweep cost by the number of
//! expired entries plus the number of non-empty buckets rather than by
//! the size of the cache.
//!
//! Expired entries are also reaped on access: a `get` that observes an
//! expired entry removes it before reporting the miss.

use metric;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;
use time;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    inserted_at: u64,
    ttl_millis: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    buckets: HashMap<String, Vec<String>>,
}

impl Inner {
    fn get_at(&mut self, key: &str, now: u64) -> Option<String> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => now >= entry.inserted_at + entry.ttl_millis,
        };
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn insert_at(&mut self, key: &str, value: String, ttl_millis: u64, now: u64) {
        if let Some(prior) = self.entries.remove(key) {
            self.unbucket(key, prior.ttl_millis);
        }
        let bucket_key = ttl_millis.to_string();
        let bucket = self.buckets
            .entry(bucket_key)
            .or_insert_with(Vec::new);
        bucket.retain(|k| k != key);
        bucket.push(key.to_string());
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value,
                inserted_at: now,
                ttl_millis: ttl_millis,
            },
        );
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            None => false,
            Some(entry) => {
                self.unbucket(key, entry.ttl_millis);
                true
            }
        }
    }

    fn unbucket(&mut self, key: &str, ttl_millis: u64) {
        let bucket_key = ttl_millis.to_string();
        let emptied = match self.buckets.get_mut(&bucket_key) {
            None => false,
            Some(bucket) => {
                bucket.retain(|k| k != key);
                bucket.is_empty()
            }
        };
        if emptied {
            self.buckets.remove(&bucket_key);
        }
    }

    /// Reap the expired prefix of one bucket. Entries past the first
    /// live one cannot have expired earlier than it and are not
    /// examined.
    fn sweep_bucket(&mut self, bucket_key: &str, now: u64) {
        let expired: Vec<String> = match self.buckets.get(bucket_key) {
            None => return,
            Some(bucket) => {
                let mut dead = Vec::new();
                for key in bucket.iter() {
                    let stale = match self.entries.get(key) {
                        None => true,
                        Some(e) => now >= e.inserted_at + e.ttl_millis,
                    };
                    if !stale {
                        break;
                    }
                    dead.push(key.clone());
                }
                dead
            }
        };
        for key in &expired {
            self.entries.remove(key);
        }
        let emptied = match self.buckets.get_mut(bucket_key) {
            None => false,
            Some(bucket) => {
                bucket.drain(..expired.len());
                bucket.is_empty()
            }
        };
        if emptied {
            self.buckets.remove(bucket_key);
        }
    }
}

/// Shared handle to the cache. Clones observe the same storage.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Mutex<Inner>>,
}

impl Cache {
    /// Create a cache and start its sweeper.
    ///
    /// The sweeper holds only a weak reference: once every handle is
    /// dropped it exits at its next tick, and it never holds the process
    /// open past `main`.
    pub fn new(sweep_interval_secs: u64) -> Cache {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let weak = Arc::downgrade(&inner);
        thread::spawn(move || {
            sweeper(&weak, Duration::from_secs(sweep_interval_secs))
        });
        Cache { inner: inner }
    }

    /// Look a key up, reaping it first if it has expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.get_at(key, time::monotonic_millis())
    }

    /// Insert a value under a positive TTL in seconds, replacing any
    /// prior entry for the key.
    pub fn insert(
        &self,
        key: &str,
        value: String,
        ttl_secs: i64,
    ) -> Result<(), metric::Error> {
        if ttl_secs <= 0 {
            return Err(metric::Error::Fatal(
                format!("cache ttl must be positive, got {}", ttl_secs),
            ));
        }
        let ttl_millis = (ttl_secs as u64) * 1_000;
        let mut inner = self.inner.lock().unwrap();
        inner.insert_at(key, value, ttl_millis, time::monotonic_millis());
        Ok(())
    }

    /// Remove a key, reporting whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(key)
    }

    /// TTL in milliseconds of a live entry, for tests.
    #[cfg(test)]
    pub fn entry_ttl_millis(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(key).map(|e| e.ttl_millis)
    }
}

fn sweeper(weak: &Weak<Mutex<Inner>>, interval: Duration) {
    loop {
        thread::sleep(interval);
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let bucket_keys: Vec<String> = {
            let guard = inner.lock().unwrap();
            guard.buckets.keys().cloned().collect()
        };
        // Lock per bucket so a long sweep cannot stall cache users.
        for bucket_key in bucket_keys {
            let mut guard = inner.lock().unwrap();
            guard.sweep_bucket(&bucket_key, time::monotonic_millis());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn test_get_before_expiry_hits() {
        let mut inner = Inner::default();
        inner.insert_at("k", "v".to_string(), 5_000, 1_000);
        assert_eq!(inner.get_at("k", 5_999), Some("v".to_string()));
    }

    #[test]
    fn test_get_at_expiry_misses_and_reaps() {
        let mut inner = Inner::default();
        inner.insert_at("k", "v".to_string(), 5_000, 1_000);
        assert_eq!(inner.get_at("k", 6_000), None);
        assert!(inner.entries.is_empty());
        assert!(inner.buckets.is_empty());
    }

    #[test]
    fn test_unknown_key_misses() {
        let mut inner = Inner::default();
        assert_eq!(inner.get_at("nope", 0), None);
    }

    #[test]
    fn test_insert_replaces_and_rebuckets() {
        let mut inner = Inner::default();
        inner.insert_at("k", "v1".to_string(), 5_000, 0);
        inner.insert_at("k", "v2".to_string(), 9_000, 1);
        assert_eq!(inner.get_at("k", 2), Some("v2".to_string()));
        assert!(inner.buckets.get("5000").is_none());
        assert_eq!(inner.buckets.get("9000").unwrap().len(), 1);
    }

    #[test]
    fn test_reinsert_moves_to_bucket_tail() {
        let mut inner = Inner::default();
        inner.insert_at("a", "1".to_string(), 5_000, 0);
        inner.insert_at("b", "2".to_string(), 5_000, 1);
        inner.insert_at("a", "3".to_string(), 5_000, 2);
        assert_eq!(
            inner.buckets.get("5000").unwrap(),
            &vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_remove() {
        let mut inner = Inner::default();
        inner.insert_at("k", "v".to_string(), 5_000, 0);
        assert!(inner.remove("k"));
        assert!(!inner.remove("k"));
        assert!(inner.buckets.is_empty());
    }

    #[test]
    fn test_sweep_stops_at_first_live_entry() {
        let mut inner = Inner::default();
        inner.insert_at("old1", "v".to_string(), 5_000, 0);
        inner.insert_at("old2", "v".to_string(), 5_000, 100);
        inner.insert_at("new1", "v".to_string(), 5_000, 4_000);
        inner.sweep_bucket("5000", 5_100);
        assert!(inner.entries.get("old1").is_none());
        assert!(inner.entries.get("old2").is_none());
        assert!(inner.entries.get("new1").is_some());
        assert_eq!(
            inner.buckets.get("5000").unwrap(),
            &vec!["new1".to_string()]
        );
    }

    #[test]
    fn test_sweep_removes_empty_bucket() {
        let mut inner = Inner::default();
        inner.insert_at("a", "v".to_string(), 1_000, 0);
        inner.sweep_bucket("1000", 10_000);
        assert!(inner.buckets.is_empty());
        assert!(inner.entries.is_empty());
    }

    #[test]
    fn test_insert_rejects_non_positive_ttl() {
        let cache = Cache::new(3_600);
        assert!(cache.insert("k", "v".to_string(), 0).is_err());
        assert!(cache.insert("k", "v".to_string(), -30).is_err());
        assert!(cache.insert("k", "v".to_string(), 1).is_ok());
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    // Invariant: after any sequence of inserts and removes, every key in
    // a bucket maps to an entry whose TTL equals the bucket's, no key
    // appears twice in one bucket, and every entry appears in exactly
    // the bucket for its TTL.
    #[test]
    fn test_bucket_integrity_qc() {
        fn inner(ops: Vec<(u8, u8)>) -> TestResult {
            let mut cache = Inner::default();
            let mut now = 0;
            for &(k, t) in &ops {
                let key = format!("key_{}", k % 7);
                now += 1;
                if t % 5 == 0 {
                    cache.remove(&key);
                } else {
                    let ttl = u64::from(t % 5) * 1_000;
                    cache.insert_at(&key, "v".to_string(), ttl, now);
                }
            }
            for (bucket_key, bucket) in &cache.buckets {
                assert!(!bucket.is_empty());
                let mut seen = Vec::new();
                for key in bucket {
                    assert!(!seen.contains(key));
                    seen.push(key.clone());
                    let entry = cache.entries.get(key).expect("dangling bucket key");
                    assert_eq!(&entry.ttl_millis.to_string(), bucket_key);
                }
            }
            for (key, entry) in &cache.entries {
                let bucket = cache
                    .buckets
                    .get(&entry.ttl_millis.to_string())
                    .expect("entry with no bucket");
                assert_eq!(bucket.iter().filter(|k| *k == key).count(), 1);
            }
            TestResult::passed()
        }
        QuickCheck::new().quickcheck(inner as fn(Vec<(u8, u8)>) -> TestResult);
    }
}
