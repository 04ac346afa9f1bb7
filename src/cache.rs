use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

use crate::config::CacheConfig;

/// TTL cache scoped to one orchestration run.
///
/// Keys are prefixed with the scope (run or project id), so two runs sharing
/// a cache never see each other's entries.
#[derive(Clone)]
pub struct ScopedCache<V: Clone + Send + Sync + 'static> {
    scope: String,
    cache: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> ScopedCache<V> {
    pub fn new(scope: impl Into<String>, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            scope: scope.into(),
            cache,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.scope, key)
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let value = self.cache.get(&self.scoped_key(key)).await;
        if value.is_some() {
            debug!(scope = %self.scope, key = %key, "Cache hit");
        }
        value
    }

    pub async fn insert(&self, key: &str, value: V) {
        self.cache.insert(self.scoped_key(key), value).await;
    }

    /// Drop every entry belonging to this scope
    pub async fn clear_scope(&self) {
        let prefix = format!("{}:", self.scope);
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
        debug!(scope = %self.scope, "Cache scope cleared");
    }

    /// A sibling cache sharing storage under a different scope
    pub fn with_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache: ScopedCache<u32> = ScopedCache::new("run-1", &CacheConfig::default());
        assert_eq!(cache.get("a").await, None);

        cache.insert("a", 7).await;
        assert_eq!(cache.get("a").await, Some(7));
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let first: ScopedCache<u32> = ScopedCache::new("run-1", &CacheConfig::default());
        let second = first.with_scope("run-2");

        first.insert("key", 1).await;
        second.insert("key", 2).await;
        assert_eq!(first.get("key").await, Some(1));
        assert_eq!(second.get("key").await, Some(2));

        first.clear_scope().await;
        assert_eq!(first.get("key").await, None);
        assert_eq!(second.get("key").await, Some(2));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let config = CacheConfig {
            ttl_seconds: 1,
            max_capacity: 10,
        };
        let cache: ScopedCache<u32> = ScopedCache::new("run", &config);
        cache.insert("a", 1).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("a").await, None);
    }
}
