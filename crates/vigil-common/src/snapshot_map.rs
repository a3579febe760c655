//! An ordered map whose readers can freeze a point-in-time view while writers
//! keep going. Snapshots are copy-on-write: taking one is an `Arc` clone, and
//! the first write issued while a snapshot is alive pays for the copy. A
//! snapshot is released by dropping it, on every exit path, which makes the
//! RAII guard the natural way to hold one.
//!
//! # Example
//! ```
//! use vigil_common::SnapshotMap;
//!
//! let map = SnapshotMap::new();
//! map.insert(1u8, "one");
//!
//! let frozen = map.snapshot();
//! map.insert(2u8, "two");
//!
//! // The snapshot still sees the pre-write content
//! assert_eq!(frozen.len(), 1);
//! assert_eq!(map.len(), 2);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

/// An ordered map supporting copy-on-write snapshots.
///
/// All operations take `&self`; the map is internally synchronized and can be
/// shared between threads behind an [Arc]. Writers are only blocked for the
/// duration of the write itself, never for the lifetime of a snapshot.
#[derive(Debug, Default)]
pub struct SnapshotMap<K: Ord + Clone, V: Clone> {
    inner: RwLock<Arc<BTreeMap<K, V>>>,
}

impl<K: Ord + Clone, V: Clone> SnapshotMap<K, V> {
    pub fn new() -> Self {
        SnapshotMap {
            inner: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    /// Inserts a key-value pair, returning the previous value if any.
    ///
    /// If a snapshot is outstanding the underlying tree is cloned first, so
    /// the snapshot keeps observing the content it froze.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        Arc::make_mut(&mut *self.write_guard()).insert(key, value)
    }

    /// Removes a key, returning its value if it was present
    pub fn remove(&self, key: &K) -> Option<V> {
        Arc::make_mut(&mut *self.write_guard()).remove(key)
    }

    /// Returns a clone of the value stored under `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.read_guard().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.read_guard().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Freezes the current content into a [MapSnapshot].
    ///
    /// The returned view is immutable and iterates in key order. Dropping it
    /// releases the snapshot; once the last one is gone, writers stop paying
    /// the copy-on-write cost.
    pub fn snapshot(&self) -> MapSnapshot<K, V> {
        MapSnapshot {
            inner: self.read_guard().clone(),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Arc<BTreeMap<K, V>>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Arc<BTreeMap<K, V>>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A frozen, immutable view of a [SnapshotMap], released on drop
#[derive(Debug, Clone)]
pub struct MapSnapshot<K: Ord + Clone, V: Clone> {
    inner: Arc<BTreeMap<K, V>>,
}

impl<K: Ord + Clone, V: Clone> MapSnapshot<K, V> {
    /// Iterates the frozen content in key order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
