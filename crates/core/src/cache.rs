//! Memoizing write-through overlay over persisted per-key aggregates.
//!
//! The [`WriteCache`] sits between the ingestion loop and the store: reads
//! are served from memory when possible, writes are applied tentatively
//! ("save") without a store round-trip, and entries can be discarded
//! ("revert") when a block is unwound. The durable write itself remains the
//! loop's responsibility.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, OnceCell};

use crate::error::StorageResult;

/// Fetch operation invoked on a cache miss.
///
/// Returns `None` when the store holds no value for the key; that absence
/// is memoized like any other result.
pub type FetchFn<K, V> =
    Arc<dyn Fn(K) -> BoxFuture<'static, StorageResult<Option<V>>> + Send + Sync>;

/// Memoizing overlay with create/fetch/revert semantics.
///
/// # Concurrency
///
/// Concurrent `get` calls for the same key share a single in-flight fetch:
/// the per-key cell guarantees at most one fetch runs at a time, and later
/// callers wait on its result. Failed fetches are *not* memoized - the cell
/// stays empty and the next `get` retries.
pub struct WriteCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<Option<V>>>>>,
    fetch: FetchFn<K, V>,
}

impl<K, V> WriteCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create a cache backed by the given fetch operation.
    pub fn new(fetch: FetchFn<K, V>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fetch,
        }
    }

    /// Get the value for `key`.
    ///
    /// A cache hit returns the cached value (including a memoized absence).
    /// A miss invokes the fetch operation and memoizes its result. Fetch
    /// failures propagate to the caller and are retried on the next access.
    pub async fn get(&self, key: &K) -> StorageResult<Option<V>> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = cell
            .get_or_try_init(|| (self.fetch)(key.clone()))
            .await?;

        Ok(value.clone())
    }

    /// Store `value` under `key`, overwriting any prior entry.
    ///
    /// This is a tentative apply: the backing store is not touched.
    pub async fn save(&self, key: K, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(key, Arc::new(OnceCell::new_with(Some(Some(value)))));
    }

    /// Discard the entry at `key`, if any.
    ///
    /// Reverting a key with no cached entry is a no-op. A subsequent `get`
    /// falls through to the store again.
    pub async fn revert(&self, key: &K) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }
}
