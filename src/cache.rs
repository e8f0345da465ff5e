use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Get/set contract the pipeline consumes for memoizing refine results,
/// cluster summaries, and severity assessments. Values are JSON so the
/// heterogeneous call results share one store.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl_seconds: u64);
}

/// In-process cache with per-entry expiry, checked on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Value, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.1 > Instant::now() {
                    return Some(entry.0.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl_seconds: u64) {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries.insert(key.to_string(), (value, expires));
    }
}

/// Stable fingerprint for a set of article ids, independent of input
/// order. Used to key cache entries.
pub fn fingerprint(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_input_order() {
        let forward = fingerprint(&["a".into(), "b".into(), "c".into()]);
        let reverse = fingerprint(&["c".into(), "b".into(), "a".into()]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn fingerprint_distinguishes_different_sets() {
        let one = fingerprint(&["a".into(), "b".into()]);
        let other = fingerprint(&["a".into(), "x".into()]);
        assert_ne!(one, other);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("gone", json!(1), 0);
        assert_eq!(cache.get("gone"), None);

        cache.set("kept", json!(2), 60);
        assert_eq!(cache.get("kept"), Some(json!(2)));
    }
}
