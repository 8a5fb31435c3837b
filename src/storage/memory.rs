//! In-memory reference engine.
//!
//! `MemoryEngine` keeps every key in one of 64 `RwLock<HashMap>` shards and
//! tracks expiring keys in an ordered `(expire_at, key)` index, which is what
//! makes [`Engine::fetch_expired_batch`] cheap.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryEngine                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │                                                             │
//! │  expiry index: Mutex<BTreeSet<(expire_at_ms, key)>>         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A shard lock is always taken before the index lock.
//!
//! Expired slots stay in their shard until they are deleted or overwritten,
//! but every read treats them as absent.

use crate::error::{EngineError, EngineResult};
use crate::storage::engine::{Engine, EngineOptions, ZEntry};
use crate::storage::version::now_ms;
use crate::storage::{DataType, Record, ValueItem, Version};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Number of data shards.
const NUM_SHARDS: usize = 64;

#[derive(Debug, Clone, Default)]
struct ZSet {
    by_member: HashMap<Bytes, (i64, Version)>,
    by_score: BTreeSet<(i64, Bytes)>,
}

impl ZSet {
    fn insert(&mut self, member: Bytes, score: i64, version: Version) -> bool {
        let is_new = match self.by_member.insert(member.clone(), (score, version)) {
            Some((old_score, _)) => {
                self.by_score.remove(&(old_score, member.clone()));
                false
            }
            None => true,
        };
        self.by_score.insert((score, member));
        is_new
    }

    fn remove(&mut self, member: &Bytes) -> bool {
        match self.by_member.remove(member) {
            Some((score, _)) => {
                self.by_score.remove(&(score, member.clone()));
                true
            }
            None => false,
        }
    }

    fn entry(&self, score: i64, member: &Bytes) -> ZEntry {
        let version = self
            .by_member
            .get(member)
            .map(|(_, v)| *v)
            .unwrap_or_default();
        (member.clone(), score, version)
    }

    fn score_range(&self, min: i64, max: i64) -> impl Iterator<Item = &(i64, Bytes)> {
        self.by_score
            .range((min, Bytes::new())..)
            .take_while(move |(score, _)| *score <= max)
    }
}

#[derive(Debug, Clone)]
enum Value {
    String(ValueItem),
    Hash(BTreeMap<Bytes, ValueItem>),
    Set(BTreeMap<Bytes, Version>),
    ZSet(ZSet),
}

/// A stored key.
#[derive(Debug, Clone)]
struct Slot {
    version: Version,
    expire_at: Option<u64>,
    value: Value,
}

impl Slot {
    fn new(value: Value, version: Version) -> Self {
        Self {
            version,
            expire_at: None,
            value,
        }
    }

    #[inline]
    fn is_expired(&self, now: u64) -> bool {
        self.expire_at.map(|at| now >= at).unwrap_or(false)
    }

    #[inline]
    fn bump(&mut self, version: Version) {
        if version > self.version {
            self.version = version;
        }
    }

    fn kind(&self) -> DataType {
        match self.value {
            Value::String(_) => DataType::String,
            Value::Hash(_) => DataType::Hash,
            Value::Set(_) => DataType::Set,
            Value::ZSet(_) => DataType::ZSet,
        }
    }

    fn record(&self) -> Record {
        Record {
            kind: self.kind(),
            version: self.version,
            expire_at: self.expire_at,
        }
    }

    fn hash(&self) -> EngineResult<&BTreeMap<Bytes, ValueItem>> {
        match &self.value {
            Value::Hash(fields) => Ok(fields),
            _ => Err(EngineError::WrongType),
        }
    }

    fn set(&self) -> EngineResult<&BTreeMap<Bytes, Version>> {
        match &self.value {
            Value::Set(members) => Ok(members),
            _ => Err(EngineError::WrongType),
        }
    }

    fn zset(&self) -> EngineResult<&ZSet> {
        match &self.value {
            Value::ZSet(set) => Ok(set),
            _ => Err(EngineError::WrongType),
        }
    }
}

type ShardMap = HashMap<Bytes, Slot>;

/// The in-memory [`Engine`].
pub struct MemoryEngine {
    shards: Vec<RwLock<ShardMap>>,
    expiry_index: Mutex<BTreeSet<(u64, Bytes)>>,
    closed: AtomicBool,
    options: EngineOptions,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("path", &self.options.path)
            .field("shards", &self.shards.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryEngine {
    fn with_options(options: EngineOptions) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            expiry_index: Mutex::new(BTreeSet::new()),
            closed: AtomicBool::new(false),
            options,
        }
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = now_ms();
        self.shards
            .iter()
            .map(|shard| shard.read().values().filter(|s| !s.is_expired(now)).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored keys, including expired ones not yet reclaimed.
    pub fn stored_len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    #[inline]
    fn check_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard(&self, key: &[u8]) -> &RwLock<ShardMap> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn reindex(&self, key: &Bytes, old: Option<u64>, new: Option<u64>) {
        if old == new {
            return;
        }
        let mut index = self.expiry_index.lock();
        if let Some(at) = old {
            index.remove(&(at, key.clone()));
        }
        if let Some(at) = new {
            index.insert((at, key.clone()));
        }
    }

    /// Runs `f` against a live slot under the shard read lock.
    fn read_live<T>(
        &self,
        key: &Bytes,
        f: impl FnOnce(&Slot) -> EngineResult<T>,
    ) -> EngineResult<Option<T>> {
        self.check_open()?;
        let now = now_ms();
        let data = self.shard(key).read();
        match data.get(key) {
            Some(slot) if !slot.is_expired(now) => f(slot).map(Some),
            _ => Ok(None),
        }
    }

    /// Runs `f` with the shard write-locked after dropping an expired slot
    /// for `key`, so `f` only ever sees live data.
    fn write_live<T>(
        &self,
        key: &Bytes,
        f: impl FnOnce(&mut ShardMap) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.check_open()?;
        let now = now_ms();
        let mut data = self.shard(key).write();
        if data.get(key).is_some_and(|slot| slot.is_expired(now)) {
            if let Some(slot) = data.remove(key) {
                self.reindex(key, slot.expire_at, None);
            }
        }
        f(&mut *data)
    }

    /// Drops `key` once its hash, set or sorted set has no entries left.
    fn remove_if_empty(&self, data: &mut ShardMap, key: &Bytes) {
        let empty = match data.get(key).map(|slot| &slot.value) {
            Some(Value::Hash(fields)) => fields.is_empty(),
            Some(Value::Set(members)) => members.is_empty(),
            Some(Value::ZSet(set)) => set.by_member.is_empty(),
            _ => false,
        };
        if empty {
            if let Some(slot) = data.remove(key) {
                self.reindex(key, slot.expire_at, None);
            }
        }
    }
}

impl Engine for MemoryEngine {
    fn open(options: &EngineOptions) -> EngineResult<Self> {
        std::fs::create_dir_all(&options.path)?;
        debug!(
            path = %options.path.display(),
            cache_size = options.cache_size,
            write_buffer_size = options.write_buffer_size,
            "Memory engine opened"
        );
        Ok(Self::with_options(options.clone()))
    }

    fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Closed);
        }
        for shard in &self.shards {
            shard.write().clear();
        }
        self.expiry_index.lock().clear();
        debug!("Memory engine closed");
        Ok(())
    }

    fn record(&self, key: &Bytes) -> EngineResult<Option<Record>> {
        self.read_live(key, |slot| Ok(slot.record()))
    }

    fn set_expire(
        &self,
        key: &Bytes,
        expire_at: Option<u64>,
        version: Version,
    ) -> EngineResult<bool> {
        self.write_live(key, |data| match data.get_mut(key) {
            Some(slot) => {
                let old = std::mem::replace(&mut slot.expire_at, expire_at);
                slot.bump(version);
                // a string's item version is the key version readers see
                if let Value::String(item) = &mut slot.value {
                    item.version = slot.version;
                }
                self.reindex(key, old, expire_at);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    fn delete(&self, key: &Bytes) -> EngineResult<bool> {
        self.check_open()?;
        let mut data = self.shard(key).write();
        match data.remove(key) {
            Some(slot) => {
                self.reindex(key, slot.expire_at, None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, key: &Bytes) -> EngineResult<Option<ValueItem>> {
        self.read_live(key, |slot| match &slot.value {
            Value::String(item) => Ok(item.clone()),
            _ => Err(EngineError::WrongType),
        })
    }

    fn put(&self, key: &Bytes, item: ValueItem, expire_at: Option<u64>) -> EngineResult<()> {
        self.write_live(key, |data| {
            let version = item.version;
            let mut slot = Slot::new(Value::String(item), version);
            slot.expire_at = expire_at;
            let old = data.insert(key.clone(), slot);
            let (old_expire, old_version) = old
                .map(|s| (s.expire_at, s.version))
                .unwrap_or((None, Version::ZERO));
            if let Some(slot) = data.get_mut(key) {
                slot.bump(old_version);
            }
            self.reindex(key, old_expire, expire_at);
            Ok(())
        })
    }

    fn hget(&self, key: &Bytes, field: &Bytes) -> EngineResult<Option<ValueItem>> {
        let found = self.read_live(key, |slot| Ok(slot.hash()?.get(field).cloned()))?;
        Ok(found.flatten())
    }

    fn hset(&self, key: &Bytes, field: Bytes, item: ValueItem) -> EngineResult<bool> {
        self.write_live(key, |data| {
            let version = item.version;
            match data.get_mut(key) {
                Some(slot) => {
                    let Value::Hash(fields) = &mut slot.value else {
                        return Err(EngineError::WrongType);
                    };
                    let is_new = fields.insert(field, item).is_none();
                    slot.bump(version);
                    Ok(is_new)
                }
                None => {
                    let mut fields = BTreeMap::new();
                    fields.insert(field, item);
                    data.insert(key.clone(), Slot::new(Value::Hash(fields), version));
                    Ok(true)
                }
            }
        })
    }

    fn hdel(&self, key: &Bytes, field: &Bytes, version: Version) -> EngineResult<bool> {
        self.write_live(key, |data| {
            let Some(slot) = data.get_mut(key) else {
                return Ok(false);
            };
            let Value::Hash(fields) = &mut slot.value else {
                return Err(EngineError::WrongType);
            };
            let removed = fields.remove(field).is_some();
            slot.bump(version);
            self.remove_if_empty(data, key);
            Ok(removed)
        })
    }

    fn hgetall(&self, key: &Bytes) -> EngineResult<Vec<(Bytes, ValueItem)>> {
        let found = self.read_live(key, |slot| {
            Ok(slot
                .hash()?
                .iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect())
        })?;
        Ok(found.unwrap_or_default())
    }

    fn hlen(&self, key: &Bytes) -> EngineResult<usize> {
        let found = self.read_live(key, |slot| Ok(slot.hash()?.len()))?;
        Ok(found.unwrap_or(0))
    }

    fn sadd(&self, key: &Bytes, member: Bytes, version: Version) -> EngineResult<bool> {
        self.write_live(key, |data| match data.get_mut(key) {
            Some(slot) => {
                let Value::Set(members) = &mut slot.value else {
                    return Err(EngineError::WrongType);
                };
                let is_new = members.insert(member, version).is_none();
                slot.bump(version);
                Ok(is_new)
            }
            None => {
                let mut members = BTreeMap::new();
                members.insert(member, version);
                data.insert(key.clone(), Slot::new(Value::Set(members), version));
                Ok(true)
            }
        })
    }

    fn srem(&self, key: &Bytes, member: &Bytes, version: Version) -> EngineResult<bool> {
        self.write_live(key, |data| {
            let Some(slot) = data.get_mut(key) else {
                return Ok(false);
            };
            let Value::Set(members) = &mut slot.value else {
                return Err(EngineError::WrongType);
            };
            let removed = members.remove(member).is_some();
            slot.bump(version);
            self.remove_if_empty(data, key);
            Ok(removed)
        })
    }

    fn smember(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<Version>> {
        let found = self.read_live(key, |slot| Ok(slot.set()?.get(member).copied()))?;
        Ok(found.flatten())
    }

    fn smembers(&self, key: &Bytes) -> EngineResult<Vec<(Bytes, Version)>> {
        let found = self.read_live(key, |slot| {
            Ok(slot.set()?.iter().map(|(m, v)| (m.clone(), *v)).collect())
        })?;
        Ok(found.unwrap_or_default())
    }

    fn scard(&self, key: &Bytes) -> EngineResult<usize> {
        let found = self.read_live(key, |slot| Ok(slot.set()?.len()))?;
        Ok(found.unwrap_or(0))
    }

    fn zadd(&self, key: &Bytes, member: Bytes, score: i64, version: Version) -> EngineResult<bool> {
        self.write_live(key, |data| match data.get_mut(key) {
            Some(slot) => {
                let Value::ZSet(set) = &mut slot.value else {
                    return Err(EngineError::WrongType);
                };
                let is_new = set.insert(member, score, version);
                slot.bump(version);
                Ok(is_new)
            }
            None => {
                let mut set = ZSet::default();
                set.insert(member, score, version);
                data.insert(key.clone(), Slot::new(Value::ZSet(set), version));
                Ok(true)
            }
        })
    }

    fn zrem(&self, key: &Bytes, member: &Bytes, version: Version) -> EngineResult<bool> {
        self.write_live(key, |data| {
            let Some(slot) = data.get_mut(key) else {
                return Ok(false);
            };
            let Value::ZSet(set) = &mut slot.value else {
                return Err(EngineError::WrongType);
            };
            let removed = set.remove(member);
            slot.bump(version);
            self.remove_if_empty(data, key);
            Ok(removed)
        })
    }

    fn zscore(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<(i64, Version)>> {
        let found = self.read_live(key, |slot| Ok(slot.zset()?.by_member.get(member).copied()))?;
        Ok(found.flatten())
    }

    fn zcard(&self, key: &Bytes) -> EngineResult<usize> {
        let found = self.read_live(key, |slot| Ok(slot.zset()?.by_member.len()))?;
        Ok(found.unwrap_or(0))
    }

    fn zrange_by_rank(&self, key: &Bytes, start: usize, stop: usize) -> EngineResult<Vec<ZEntry>> {
        if stop < start {
            return Ok(Vec::new());
        }
        let found = self.read_live(key, |slot| {
            let set = slot.zset()?;
            Ok(set
                .by_score
                .iter()
                .skip(start)
                .take(stop - start + 1)
                .map(|(score, member)| set.entry(*score, member))
                .collect())
        })?;
        Ok(found.unwrap_or_default())
    }

    fn zrange_by_score(&self, key: &Bytes, min: i64, max: i64) -> EngineResult<Vec<ZEntry>> {
        if min > max {
            return Ok(Vec::new());
        }
        let found = self.read_live(key, |slot| {
            let set = slot.zset()?;
            Ok(set
                .score_range(min, max)
                .map(|(score, member)| set.entry(*score, member))
                .collect())
        })?;
        Ok(found.unwrap_or_default())
    }

    fn zcount(&self, key: &Bytes, min: i64, max: i64) -> EngineResult<usize> {
        if min > max {
            return Ok(0);
        }
        let found = self.read_live(key, |slot| Ok(slot.zset()?.score_range(min, max).count()))?;
        Ok(found.unwrap_or(0))
    }

    fn zrem_by_score(
        &self,
        key: &Bytes,
        min: i64,
        max: i64,
        version: Version,
    ) -> EngineResult<usize> {
        if min > max {
            return Ok(0);
        }
        self.write_live(key, |data| {
            let Some(slot) = data.get_mut(key) else {
                return Ok(0);
            };
            let Value::ZSet(set) = &mut slot.value else {
                return Err(EngineError::WrongType);
            };
            let doomed: Vec<Bytes> = set.score_range(min, max).map(|(_, m)| m.clone()).collect();
            for member in &doomed {
                set.remove(member);
            }
            if !doomed.is_empty() {
                slot.bump(version);
            }
            self.remove_if_empty(data, key);
            Ok(doomed.len())
        })
    }

    fn zrank(&self, key: &Bytes, member: &Bytes) -> EngineResult<Option<usize>> {
        let found = self.read_live(key, |slot| {
            let set = slot.zset()?;
            Ok(set
                .by_member
                .get(member)
                .map(|(score, _)| set.by_score.range(..(*score, member.clone())).count()))
        })?;
        Ok(found.flatten())
    }

    fn fetch_expired_batch(&self, now_ms: u64, limit: usize) -> EngineResult<Vec<Bytes>> {
        self.check_open()?;
        let index = self.expiry_index.lock();
        Ok(index
            .iter()
            .take_while(|(at, _)| *at <= now_ms)
            .take(limit)
            .map(|(_, key)| key.clone())
            .collect())
    }
}
