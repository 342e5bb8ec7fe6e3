//! Balance cache seam
//!
//! Best-effort key/value store holding denormalized balances; never
//! authoritative. The money-movement path only ever *deletes* keys, so the
//! trait contract is deletion alone. Failures are logged by the caller and
//! never fail a transfer.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// TTL applied to cached account balances.
pub const ACCOUNT_BALANCE_TTL: Duration = Duration::from_secs(60);

/// Cache key for an account's denormalized balance.
pub fn account_balance_key(account_id: &str) -> String {
    format!("account:balance:{}", account_id)
}

/// Best-effort cache contract consumed by the transaction service.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Remove the given keys. Missing keys are not an error.
    async fn delete(&self, keys: &[String]) -> anyhow::Result<()>;
}

/// In-process TTL cache.
///
/// Expired entries are dropped lazily on read. The write helpers exist so
/// callers (and tests) can observe invalidation; the core path only deletes.
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(ACCOUNT_BALANCE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        MemoryCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + self.ttl));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, deadline) = entry.value();
                if Instant::now() < *deadline {
                    return Some(value.clone());
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

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn delete(&self, keys: &[String]) -> anyhow::Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_key_format() {
        assert_eq!(account_balance_key("42"), "account:balance:42");
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("k1", "100.00");
        assert_eq!(cache.get("k1").as_deref(), Some("100.00"));

        cache.delete(&["k1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(cache.get("k1"), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::with_ttl(Duration::from_millis(20));
        cache.set("k", "v");
        assert!(cache.contains("k"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.contains("k"));
    }
}
