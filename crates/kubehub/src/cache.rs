//! Connection-scoped session cache.
//!
//! Maps a fixed key to a value built at most once for the connection's
//! lifetime. Each key owns an async `OnceCell`, so concurrent first use of
//! the same key runs the constructor once and every caller gets the same
//! `Arc`. A failed construction leaves the slot empty.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, trace};

use crate::error::{Error, Result};

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct SessionCache {
    slots: Arc<Mutex<HashMap<String, Arc<OnceCell<Entry>>>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Arc<OnceCell<Entry>> {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    }

    /// Return the cached value for `key`, if one has been built.
    pub async fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
        let cell = {
            let slots = self.slots.lock().await;
            match slots.get(key) {
                Some(c) => c.clone(),
                None => return Ok(None),
            }
        };
        match cell.get() {
            Some(entry) => downcast(key, entry.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Return the value cached under `key`, building it with `init` on first use.
    pub async fn get_or_try_init<T, F, Fut>(&self, key: &str, init: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cell = self.slot(key).await;
        if cell.initialized() {
            trace!(key, "session cache hit");
        }
        let entry = cell
            .get_or_try_init(|| async move {
                debug!(key, "session cache miss, constructing");
                let value = init().await?;
                Ok::<Entry, Error>(Arc::new(value))
            })
            .await?;
        downcast(key, entry.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.get(key).map(|c| c.initialized()).unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|c| c.initialized()).count()
    }
}

fn downcast<T: Any + Send + Sync>(key: &str, entry: Entry) -> Result<Arc<T>> {
    entry.downcast::<T>().map_err(|_| Error::CacheType(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn builds_once_and_returns_same_arc() {
        let cache = SessionCache::new();
        let builds = AtomicUsize::new(0);
        let a = cache
            .get_or_try_init("client/typed", || async { builds.fetch_add(1, Ordering::SeqCst); Ok(String::from("session")) })
            .await
            .unwrap();
        let b = cache
            .get_or_try_init("client/typed", || async { builds.fetch_add(1, Ordering::SeqCst); Ok(String::from("other")) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_constructs_once() {
        let cache = SessionCache::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_init("client/dynamic", || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(42u64)
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut values = Vec::new();
        for h in handles {
            values.push(h.await.unwrap());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn failed_init_leaves_slot_empty() {
        let cache = SessionCache::new();
        let err = cache
            .get_or_try_init::<u32, _, _>("kubeconfig", || async { Err(Error::Config("nope".into())) })
            .await;
        assert!(err.is_err());
        assert!(!cache.contains("kubeconfig").await);
        let v = cache.get_or_try_init("kubeconfig", || async { Ok(7u32) }).await.unwrap();
        assert_eq!(*v, 7);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let cache = SessionCache::new();
        cache.get_or_try_init("k", || async { Ok(1u8) }).await.unwrap();
        let err = cache.get::<String>("k").await.unwrap_err();
        assert!(matches!(err, Error::CacheType(k) if k == "k"));
        assert_eq!(cache.get::<u8>("k").await.unwrap().as_deref(), Some(&1u8));
    }
}
