//! Hash commands.
//!
//! A hash maps fields to versioned values under one key. Field writes must
//! carry a version newer than the field's current one; `version_care` is
//! checked against the key's version, which
//! [`key_version`](CommandProcessor::key_version) reports. Field versions
//! returned by `hget` can lag behind it after an expire or a delete.

use super::handler::{engine_status, reject_zero, CommandProcessor};
use super::string::parse_i64;
use crate::storage::{DataType, Engine, MetaData, Status, ValueItem, Version};
use bytes::Bytes;
use std::collections::HashMap;

impl<E: Engine> CommandProcessor<E> {
    /// Fails with `VersionMismatch` if `field` already holds a version at or
    /// above `version`. The key must be locked.
    fn check_field(&self, key: &Bytes, field: &Bytes, version: Version) -> Result<(), Status> {
        match self.engine.hget(key, field).map_err(engine_status)? {
            Some(stored) if version <= stored.version => Err(Status::VersionMismatch),
            _ => Ok(()),
        }
    }

    fn hset_locked(&self, key: &Bytes, field: Bytes, value: ValueItem) -> Status {
        if let Err(status) = self.check_field(key, &field, value.version) {
            return status;
        }
        match self.engine.hset(key, field, value) {
            Ok(_) => Status::Ok,
            Err(e) => engine_status(e),
        }
    }

    pub fn hset(&self, key: &Bytes, field: Bytes, value: ValueItem, meta: &MetaData) -> Status {
        if let Err(status) = reject_zero(value.version) {
            return status;
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::Hash)) {
            return status;
        }
        self.hset_locked(key, field, value)
    }

    pub fn hget(&self, key: &Bytes, field: &Bytes) -> (Status, ValueItem) {
        let _guard = self.locks.lock_key(key);
        match self.engine.hget(key, field) {
            Ok(Some(item)) => (Status::Ok, item),
            Ok(None) => (Status::OkButNotExist, ValueItem::empty()),
            Err(e) => (engine_status(e), ValueItem::empty()),
        }
    }

    pub fn hget_with_byte(&self, key: &[u8], field: &[u8]) -> (Status, ValueItem) {
        self.hget(&Bytes::copy_from_slice(key), &Bytes::copy_from_slice(field))
    }

    /// Sets several fields, returning a status per field.
    ///
    /// If the key-level checks fail every field gets that status.
    pub fn hmset(
        &self,
        key: &Bytes,
        values: HashMap<Bytes, ValueItem>,
        meta: &MetaData,
    ) -> (Status, HashMap<Bytes, Status>) {
        if values.is_empty() {
            return (Status::WrongArgCount, HashMap::new());
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::Hash)) {
            let per_field = values.into_keys().map(|f| (f, status)).collect();
            return (status, per_field);
        }

        let per_field = values
            .into_iter()
            .map(|(field, value)| {
                let status = if value.version.is_zero() {
                    Status::Error
                } else {
                    self.hset_locked(key, field.clone(), value)
                };
                (field, status)
            })
            .collect();
        (Status::Ok, per_field)
    }

    /// Values of `fields` in input order; missing fields yield the empty marker.
    pub fn hmget(&self, key: &Bytes, fields: &[Bytes]) -> (Status, Vec<ValueItem>) {
        if fields.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.read_record(key, DataType::Hash) {
            return (status, vec![ValueItem::empty(); fields.len()]);
        }
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            match self.engine.hget(key, field) {
                Ok(value) => values.push(value.unwrap_or_default()),
                Err(e) => return (engine_status(e), Vec::new()),
            }
        }
        (Status::Ok, values)
    }

    /// Removes fields, each guarded by the version it was last seen at.
    ///
    /// Per field: version 0 → `Error`; missing → `OkButNotExist`; stored
    /// version newer than the given one → `VersionMismatch`.
    pub fn hdel(
        &self,
        key: &Bytes,
        fields: HashMap<Bytes, Version>,
        meta: &MetaData,
    ) -> (Status, HashMap<Bytes, Status>) {
        if fields.is_empty() {
            return (Status::WrongArgCount, HashMap::new());
        }
        let _guard = self.locks.lock_key(key);
        let status = match self.precheck(key, meta, Some(DataType::Hash)) {
            Ok(Some(_)) => None,
            Ok(None) => Some(Status::OkButNotExist),
            Err(status) => Some(status),
        };
        if let Some(status) = status {
            let per_field = fields.into_keys().map(|f| (f, status)).collect();
            return (status, per_field);
        }

        let per_field = fields
            .into_iter()
            .map(|(field, version)| {
                let status = self.hdel_one(key, &field, version);
                (field, status)
            })
            .collect();
        (Status::Ok, per_field)
    }

    fn hdel_one(&self, key: &Bytes, field: &Bytes, version: Version) -> Status {
        if version.is_zero() {
            return Status::Error;
        }
        match self.engine.hget(key, field) {
            Ok(None) => return Status::OkButNotExist,
            Ok(Some(stored)) if stored.version > version => return Status::VersionMismatch,
            Ok(Some(_)) => {}
            Err(e) => return engine_status(e),
        }
        match self.engine.hdel(key, field, version) {
            Ok(_) => Status::Ok,
            Err(e) => engine_status(e),
        }
    }

    /// Adds `delta` to the integer stored in `field`; a missing field counts
    /// as 0.
    pub fn hincrby(
        &self,
        key: &Bytes,
        field: &Bytes,
        version: Version,
        delta: i64,
        meta: &MetaData,
    ) -> (Status, i64) {
        if let Err(status) = reject_zero(version) {
            return (status, 0);
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::Hash)) {
            return (status, 0);
        }

        let current = match self.engine.hget(key, field) {
            Ok(Some(stored)) if version <= stored.version => return (Status::VersionMismatch, 0),
            Ok(Some(stored)) => match parse_i64(&stored.value) {
                Some(n) => n,
                None => return (Status::NotANumber, 0),
            },
            Ok(None) => 0,
            Err(e) => return (engine_status(e), 0),
        };
        let Some(next) = current.checked_add(delta) else {
            return (Status::Overflow, 0);
        };

        let value = ValueItem::new(Bytes::from(next.to_string()), version);
        match self.engine.hset(key, field.clone(), value) {
            Ok(_) => (Status::Ok, next),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// `Ok` if the field exists, `OkButNotExist` otherwise.
    pub fn hexists(&self, key: &Bytes, field: &Bytes) -> Status {
        let _guard = self.locks.lock_key(key);
        match self.engine.hget(key, field) {
            Ok(Some(_)) => Status::Ok,
            Ok(None) => Status::OkButNotExist,
            Err(e) => engine_status(e),
        }
    }

    pub fn hlen(&self, key: &Bytes) -> (Status, u64) {
        let _guard = self.locks.lock_key(key);
        match self.engine.hlen(key) {
            Ok(0) => (Status::OkButNotExist, 0),
            Ok(n) => (Status::Ok, n as u64),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// All fields and values, in field byte order. Runs under the global lock.
    pub fn hgetall(&self, key: &Bytes) -> (Status, Vec<(Bytes, ValueItem)>) {
        let _guard = self.locks.lock_global();
        match self.engine.hgetall(key) {
            Ok(fields) if fields.is_empty() => (Status::OkButNotExist, fields),
            Ok(fields) => (Status::Ok, fields),
            Err(e) => (engine_status(e), Vec::new()),
        }
    }

    pub fn hkeys(&self, key: &Bytes) -> (Status, Vec<Bytes>) {
        let (status, fields) = self.hgetall(key);
        (status, fields.into_iter().map(|(f, _)| f).collect())
    }

    pub fn hvals(&self, key: &Bytes) -> (Status, Vec<Bytes>) {
        let (status, fields) = self.hgetall(key);
        (status, fields.into_iter().map(|(_, v)| v.value).collect())
    }
}
