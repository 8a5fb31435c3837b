//! Engine Adapter
//!
//! The [`Engine`] trait is the boundary between the command layer and the
//! store that actually holds the data. Every call is synchronous and hands
//! back owned values (`Bytes`, `Vec`, ...), so nothing allocated on one side
//! has to be released on the other.
//!
//! The command layer guarantees that, for any given key, calls arrive
//! serialized by the [`KeyLockManager`](crate::storage::KeyLockManager).
//! An engine still has to be `Sync`, because calls for different keys run in
//! parallel.
//!
//! Engines do not enforce version rules or existence preconditions; the
//! [`CommandProcessor`](crate::commands::CommandProcessor) does that before
//! calling in. Engines do own:
//!
//! - data types (returning [`EngineError::WrongType`] on a mismatch)
//! - the key's record version, raised to the highest version written
//! - lazy expiry: expired keys are invisible to every call except
//!   [`Engine::fetch_expired_batch`] and [`Engine::delete`]

use crate::error::{EngineError, EngineResult};
use crate::storage::{Record, ValueItem, Version};
use bytes::Bytes;
use std::path::PathBuf;

/// Parameters an engine is opened with.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub path: PathBuf,
    pub cache_size: usize,
    pub write_buffer_size: usize,
}

/// A sorted-set entry as stored: member, score and the version that wrote it.
pub type ZEntry = (Bytes, i64, Version);

/// A multi-type key-value store with per-key expiry.
pub trait Engine: Send + Sync + 'static {
    /// Opens (or creates) the store described by `options`.
    fn open(options: &EngineOptions) -> EngineResult<Self>
    where
        Self: Sized;

    /// Releases the store. Every later call returns `EngineError::Closed`.
    fn close(&self) -> EngineResult<()>;

    // ---- key metadata ----

    /// Type, version and expiry of a live key.
    fn record(&self, key: &Bytes) -> EngineResult<Option<Record>>;

    /// Replaces the expiry of a live key and raises its version to at least
    /// `version`. A string value takes the raised version too. Returns
    /// `false` if the key does not exist.
    fn set_expire(&self, key: &Bytes, expire_at: Option<u64>, version: Version)
        -> EngineResult<bool>;

    /// Removes a key of any type, expired or not.
    fn delete(&self, key: &Bytes) -> EngineResult<bool>;

    // ---- strings ----

    fn get(&self, key: &Bytes) -> EngineResult<Option<ValueItem>>;

    /// Stores a string, replacing whatever the key held before.
    fn put(&self, key: &Bytes, item: ValueItem, expire_at: Option<u64>) -> EngineResult<()>;

    /// Strings for several keys. Keys holding another type read as `None`.
    fn multi_get(&self, keys: &[Bytes]) -> EngineResult<Vec<Option<ValueItem>>> {
        keys.iter()
            .map(|key| match self.get(key) {
                Err(EngineError::WrongType) => Ok(None),
                other => other,
            })
            .collect()
    }

    fn multi_put(&self, items: Vec<(Bytes, ValueItem, Option<u64>)>) -> EngineResult<()> {
        for (key, item, expire_at) in items {
            self.put(&key, item, expire_at)?;
        }
        Ok(())
    }

    fn multi_delete(&self, keys: &[Bytes]) -> EngineResult<Vec<bool>> {
        keys.iter().map(|key| self.delete(key)).collect()
    }

    // ---- hashes ----

    fn hget(&self, key: &Bytes, field: &Bytes) -> EngineResult<Option<ValueItem>>;

    /// Sets one field, creating the hash if needed. Returns `true` if the
    /// field is new.
    fn hset(&self, key: &Bytes, field: Bytes, item: ValueItem) -> EngineResult<bool>;

    /// Removes one field. A hash left empty is removed.
    fn hdel(&self, key: &Bytes, field: &Bytes, version: Version) -> EngineResult<bool>;

    /// All fields in byte order.
    fn hgetall(&self, key: &Bytes) -> EngineResult<Vec<(Bytes, ValueItem)>>;

    fn hlen(&self, key: &Bytes) -> EngineResult<usize>;

    // ---- sets ----

    /// Adds a member, or re-stamps an existing one with `version`. Returns
    /// `true` if the member is new.
    fn sadd(&self, key: &Bytes, member: Bytes, version: Version) -> EngineResult<bool>;

    /// Removes a member. A set left empty is removed.
    fn srem(&self, key: &Bytes, member: &Bytes, version: Version) -> EngineResult<bool>;

    /// Version a member was last written at.
    fn smember(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<Version>>;

    /// All members in byte order.
    fn smembers(&self, key: &Bytes) -> EngineResult<Vec<(Bytes, Version)>>;

    fn scard(&self, key: &Bytes) -> EngineResult<usize>;

    // ---- sorted sets ----

    /// Adds or re-scores a member. Returns `true` if the member is new.
    fn zadd(&self, key: &Bytes, member: Bytes, score: i64, version: Version) -> EngineResult<bool>;

    /// Removes a member. A set left empty is removed.
    fn zrem(&self, key: &Bytes, member: &Bytes, version: Version) -> EngineResult<bool>;

    fn zscore(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<(i64, Version)>>;

    fn zcard(&self, key: &Bytes) -> EngineResult<usize>;

    /// Members with ascending rank in `start..=stop`.
    fn zrange_by_rank(&self, key: &Bytes, start: usize, stop: usize) -> EngineResult<Vec<ZEntry>>;

    /// Members with `min <= score <= max`, ascending.
    fn zrange_by_score(&self, key: &Bytes, min: i64, max: i64) -> EngineResult<Vec<ZEntry>>;

    fn zcount(&self, key: &Bytes, min: i64, max: i64) -> EngineResult<usize> {
        Ok(self.zrange_by_score(key, min, max)?.len())
    }

    /// Removes members with `min <= score <= max`. Returns how many went.
    fn zrem_by_score(&self, key: &Bytes, min: i64, max: i64, version: Version)
        -> EngineResult<usize>;

    /// Ascending rank of a member.
    fn zrank(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<usize>>;

    // ---- expiration ----

    /// Up to `limit` keys whose expiry is at or before `now_ms`, soonest first.
    fn fetch_expired_batch(&self, now_ms: u64, limit: usize) -> EngineResult<Vec<Bytes>>;
}
