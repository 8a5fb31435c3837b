//! Key Lock Manager
//!
//! Serializes access to individual keys while letting unrelated keys run in
//! parallel, and offers a global barrier for batch operations.
//!
//! ## Layout
//!
//! ```text
//!                    ┌──────────────────────────┐
//!                    │   global: RwLock<()>     │
//!                    └────────────┬─────────────┘
//!          shared (single/multi-key)  │  exclusive (batch / admin)
//!           ┌─────────────┬──────────┴──┬─────────────┐
//!      ┌────┴────┐   ┌────┴────┐   ┌────┴────┐   ┌────┴────┐
//!      │ Shard 0 │   │ Shard 1 │   │ Shard 2 │   │ Shard N │
//!      │  Mutex  │   │  Mutex  │   │  Mutex  │   │  Mutex  │
//!      └─────────┘   └─────────┘   └─────────┘   └─────────┘
//! ```
//!
//! A key maps to `crc32(key) % N`. The shard count is fixed at construction.
//!
//! ## Ordering
//!
//! The global lock is always taken before any shard lock. Multi-shard
//! acquisition locks the deduplicated shard ids in ascending order, so two
//! callers can never wait on each other in a cycle and a shard is never
//! locked twice by the same operation.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Maps keys onto a fixed pool of shard locks.
pub struct KeyLockManager {
    global: RwLock<()>,
    shards: Box<[Mutex<()>]>,
}

impl std::fmt::Debug for KeyLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLockManager")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Held while a single key is being operated on.
///
/// Field order matters: the shard guard drops before the global guard.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    _shard: MutexGuard<'a, ()>,
    _global: RwLockReadGuard<'a, ()>,
}

/// Held while a fixed set of keys is being operated on.
#[must_use = "the keys are unlocked as soon as the guard is dropped"]
pub struct MultiKeyGuard<'a> {
    _shards: Vec<MutexGuard<'a, ()>>,
    _global: RwLockReadGuard<'a, ()>,
}

/// Held while the whole keyspace is locked.
#[must_use = "the keyspace is unlocked as soon as the guard is dropped"]
pub struct GlobalGuard<'a> {
    _global: RwLockWriteGuard<'a, ()>,
}

impl KeyLockManager {
    /// Creates a lock manager with `shard_count` shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count).map(|_| Mutex::new(())).collect();
        Self {
            global: RwLock::new(()),
            shards,
        }
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    pub fn shard_id(&self, key: &[u8]) -> usize {
        crc32fast::hash(key) as usize % self.shards.len()
    }

    /// Sorted, deduplicated shard ids for a set of keys.
    pub fn shard_ids<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<usize> {
        let mut ids: Vec<usize> = keys.iter().map(|k| self.shard_id(k.as_ref())).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Locks a single key: global shared, then the key's shard.
    pub fn lock_key(&self, key: &[u8]) -> KeyGuard<'_> {
        let global = self.global.read();
        let shard = self.shards[self.shard_id(key)].lock();
        KeyGuard {
            _shard: shard,
            _global: global,
        }
    }

    /// Locks every shard touched by `keys`, each exactly once.
    pub fn lock_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> MultiKeyGuard<'_> {
        let global = self.global.read();
        let shards = self
            .shard_ids(keys)
            .into_iter()
            .map(|id| self.shards[id].lock())
            .collect();
        MultiKeyGuard {
            _shards: shards,
            _global: global,
        }
    }

    /// Locks the whole keyspace exclusively.
    pub fn lock_global(&self) -> GlobalGuard<'_> {
        GlobalGuard {
            _global: self.global.write(),
        }
    }
}
