use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe buffer of push-mode readings, keyed by derived metric key.
///
/// Populated during one collection pass and read once at dispatch. Both the
/// write and the snapshot path take the exclusive lock.
#[derive(Clone, Default)]
pub struct AccumulationCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl AccumulationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under `key`. The last write for a key wins.
    pub fn insert(&self, key: String, value: String) {
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = metrics.insert(key, value) {
            tracing::debug!(previous = %previous, "Overwrote cached metric");
        }
    }

    /// Copy the current contents out, releasing the lock before returning.
    pub fn snapshot(&self) -> HashMap<String, String> {
        let metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        metrics.clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let metrics = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        metrics.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
