//! Thread-safe key/value directory shared by the bus, the subscription manager
//! and the task manager.
//!
//! [`ConcurrentRegistry`] wraps a `HashMap` in a `parking_lot::RwLock`:
//!
//! - any number of concurrent readers (`get`, `len`, `iterate`)
//! - writers (`set`, `delete`, `update`, `drain`) are exclusive with each
//!   other and with readers
//! - `update` is an atomic read-modify-write: the mutation is applied to a
//!   copy and committed only if it succeeds
//! - `iterate` copies the entries under a shared-read section and hands back
//!   an owned iterator, so consuming it never holds the lock
//!
//! # Example
//!
//! ```
//! use prometheus_pubsub::core::ConcurrentRegistry;
//!
//! let registry: ConcurrentRegistry<String, u32> = ConcurrentRegistry::new();
//! registry.set("a".to_string(), 1);
//! registry.update("a".to_string(), |v| -> Result<(), String> {
//!     *v += 1;
//!     Ok(())
//! });
//! assert_eq!(registry.get(&"a".to_string()), Some(2));
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use parking_lot::RwLock;

/// Generic reader/writer-locked key/value store.
#[derive(Debug)]
pub struct ConcurrentRegistry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for ConcurrentRegistry<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> ConcurrentRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the value stored under `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().get(key).cloned()
    }

    /// True if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().contains_key(key)
    }

    /// Store `value` under `key`, overwriting any previous value.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Store `value` under `key` and return the value it replaced.
    pub fn replace(&self, key: K, value: V) -> Option<V> {
        self.entries.write().insert(key, value)
    }

    /// Remove `key`, returning the removed value. Missing keys are a no-op.
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Atomically read, mutate and write back the value under `key`.
    ///
    /// The closure receives a copy of the current value, or `V::default()` if
    /// the key is absent. On `Ok` the copy is committed (inserting the key if
    /// needed); on `Err` the copy is discarded and the error is logged, never
    /// returned. The whole operation runs under the exclusive section.
    ///
    /// Returns `true` if the mutation was committed.
    pub fn update<F, E>(&self, key: K, mutate: F) -> bool
    where
        V: Default,
        F: FnOnce(&mut V) -> Result<(), E>,
        E: Display,
    {
        let mut entries = self.entries.write();
        let mut value = entries.get(&key).cloned().unwrap_or_default();
        match mutate(&mut value) {
            Ok(()) => {
                entries.insert(key, value);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to update registry entry");
                false
            }
        }
    }

    /// Snapshot every entry and return a one-shot iterator over the copies.
    ///
    /// The shared-read section is released before this returns, so holding or
    /// slowly consuming the iterator never blocks writers.
    pub fn iterate(&self) -> std::vec::IntoIter<(K, V)> {
        let snapshot: Vec<(K, V)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        snapshot.into_iter()
    }

    /// Keep only the entries for which `keep` returns true, returning how
    /// many were removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, v| keep(k, v));
        before - entries.len()
    }

    /// Remove and return every entry under a single exclusive section.
    pub fn drain(&self) -> Vec<(K, V)> {
        self.entries.write().drain().collect()
    }
}
