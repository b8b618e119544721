//! Mutex-guarded cache for tool descriptors discovered from remote backends.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;

use super::tool::ToolDescriptor;
use crate::error::Result;

/// Shared cache of preloaded tool descriptors, keyed by backend id.
///
/// Multiple tasks may race to populate the same entry; the mutex is held
/// across the read-check and the write so the loader runs at most once per
/// key.
#[derive(Default)]
pub struct ToolPreloadCache {
    entries: Mutex<HashMap<String, Vec<ToolDescriptor>>>,
}

impl ToolPreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached descriptors for `key`, loading them on first use.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<Vec<ToolDescriptor>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ToolDescriptor>>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(cached) = entries.get(key) {
            return Ok(cached.clone());
        }
        let loaded = load().await?;
        entries.insert(key.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// Drop the cached entry for `key`, forcing a reload on next access.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn loader_runs_once_per_key() {
        let cache = Arc::new(ToolPreloadCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("backend", move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![ToolDescriptor::new(
                            "remote",
                            "remote tool",
                            serde_json::json!({"type": "object"}),
                        )])
                    })
                    .await
            }));
        }
        for handle in handles {
            let descriptors = handle.await.expect("join").expect("load");
            assert_eq!(descriptors.len(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = ToolPreloadCache::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_load("backend", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Vec::new())
                })
                .await
                .expect("load");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        cache.invalidate("backend").await;
        cache
            .get_or_load("backend", || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .expect("load");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
