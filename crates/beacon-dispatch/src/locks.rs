//! # Keyed Critical Sections
//!
//! One async mutex per key, created on first use. Operations on different
//! keys run in parallel; operations on the same key queue up in FIFO order
//! (tokio's mutex is fair).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of per-key async mutexes.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        KeyedLocks {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive hold of `key`. Released when the guard drops.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = self.slot(key);
        slot.lock_owned().await
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        // A poisoned map still holds valid mutexes.
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Drop slots nobody holds or waits on, so the map tracks live keys.
        slots.retain(|k, m| k == key || Arc::strong_count(m) > 1);

        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::<String>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(&"counter-1".to_string()).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::<&str>::new();
        let _a = locks.lock(&"a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&"b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let locks = KeyedLocks::<u32>::new();
        for key in 0..10 {
            let _guard = locks.lock(&key).await;
        }
        // Only the most recently requested key survives pruning.
        assert_eq!(locks.len(), 1);
    }
}
