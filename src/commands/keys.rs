//! Key and TTL commands.

use super::handler::{engine_status, reject_zero, CommandProcessor};
use crate::error::EngineResult;
use crate::storage::version::remaining_ms;
use crate::storage::{DataType, Engine, Record, Status, TtlUnit, ValueItem, Version};
use bytes::Bytes;
use tracing::debug;

impl<E: Engine> CommandProcessor<E> {
    /// Sets a TTL in seconds.
    pub fn expire(&self, key: &Bytes, seconds: u64, version: Version) -> Status {
        self.expire_in(key, seconds, TtlUnit::Seconds, version)
    }

    /// Sets a TTL in milliseconds.
    pub fn pexpire(&self, key: &Bytes, millis: u64, version: Version) -> Status {
        self.expire_in(key, millis, TtlUnit::Milliseconds, version)
    }

    fn expire_in(&self, key: &Bytes, ttl: u64, unit: TtlUnit, version: Version) -> Status {
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.live_record_at(key, version) {
            return status;
        }
        let expire_at = self.expiry_mode.expire_at(ttl, unit, version);
        match self.engine.set_expire(key, Some(expire_at), version) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::OkButNotExist,
            Err(e) => engine_status(e),
        }
    }

    /// Clears the TTL. `NoExpireSet` if there was none.
    pub fn persist(&self, key: &Bytes, version: Version) -> Status {
        let _guard = self.locks.lock_key(key);
        let record = match self.live_record_at(key, version) {
            Ok(record) => record,
            Err(status) => return status,
        };
        if record.expire_at.is_none() {
            return Status::NoExpireSet;
        }
        match self.engine.set_expire(key, None, version) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::OkButNotExist,
            Err(e) => engine_status(e),
        }
    }

    /// Record of a live key that `version` may modify. A zero `version`
    /// skips the ordering check.
    fn live_record_at(&self, key: &Bytes, version: Version) -> Result<Record, Status> {
        let record = self
            .engine
            .record(key)
            .map_err(engine_status)?
            .ok_or(Status::OkButNotExist)?;
        if !version.is_zero() && version < record.version {
            return Err(Status::VersionMismatch);
        }
        Ok(record)
    }

    pub fn exists(&self, key: &Bytes) -> Status {
        let _guard = self.locks.lock_key(key);
        match self.engine.record(key) {
            Ok(Some(_)) => Status::Ok,
            Ok(None) => Status::OkButNotExist,
            Err(e) => engine_status(e),
        }
    }

    /// Remaining time to live in whole seconds, rounded up.
    pub fn ttl(&self, key: &Bytes) -> (Status, u64) {
        match self.pttl(key) {
            (Status::Ok, ms) => (Status::Ok, ms.div_ceil(1000)),
            other => other,
        }
    }

    /// Remaining time to live in milliseconds.
    pub fn pttl(&self, key: &Bytes) -> (Status, u64) {
        let _guard = self.locks.lock_key(key);
        match self.engine.record(key) {
            Ok(Some(Record {
                expire_at: Some(at),
                ..
            })) => (Status::Ok, remaining_ms(at)),
            Ok(Some(_)) => (Status::NoExpireSet, 0),
            Ok(None) => (Status::OkButNotExist, 0),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// Data type held by `key`.
    pub fn key_type(&self, key: &Bytes) -> (Status, Option<DataType>) {
        let _guard = self.locks.lock_key(key);
        match self.engine.record(key) {
            Ok(Some(record)) => (Status::Ok, Some(record.kind)),
            Ok(None) => (Status::OkButNotExist, None),
            Err(e) => (engine_status(e), None),
        }
    }

    /// Version of `key` as a whole, the one `version_care` compares against.
    ///
    /// For strings this equals the version `get` returns. For hashes, sorted
    /// sets and sets it is the highest version written to any part of the key.
    pub fn key_version(&self, key: &Bytes) -> (Status, Version) {
        let _guard = self.locks.lock_key(key);
        match self.engine.record(key) {
            Ok(Some(record)) => (Status::Ok, record.version),
            Ok(None) => (Status::OkButNotExist, Version::ZERO),
            Err(e) => (engine_status(e), Version::ZERO),
        }
    }

    /// Moves `src` to `dst`, written at `version`. The TTL moves with it.
    ///
    /// With `nx`, an existing `dst` gives `OkButAlreadyExists`. Otherwise
    /// `dst` is replaced, provided `version` is newer than it.
    pub fn rename(&self, src: &Bytes, dst: &Bytes, version: Version, nx: bool) -> Status {
        if let Err(status) = reject_zero(version) {
            return status;
        }
        let _guard = self.locks.lock_keys(&[src, dst]);

        let source = match self.engine.record(src) {
            Ok(Some(record)) => record,
            Ok(None) => return Status::OkButNotExist,
            Err(e) => return engine_status(e),
        };
        if src == dst {
            return Status::Ok;
        }
        match self.engine.record(dst) {
            Ok(Some(_)) if nx => return Status::OkButAlreadyExists,
            Ok(Some(target)) if version <= target.version => return Status::VersionMismatch,
            Ok(_) => {}
            Err(e) => return engine_status(e),
        }

        match self.move_key(src, dst, source, version) {
            Ok(()) => {
                debug!(kind = %source.kind, "Key renamed");
                Status::Ok
            }
            Err(e) => engine_status(e),
        }
    }

    fn move_key(&self, src: &Bytes, dst: &Bytes, source: Record, version: Version) -> EngineResult<()> {
        match source.kind {
            DataType::String => {
                let value = self.engine.get(src)?.unwrap_or_default().value;
                self.engine
                    .put(dst, ValueItem::new(value, version), source.expire_at)?;
            }
            DataType::Hash => {
                let fields = self.engine.hgetall(src)?;
                self.engine.delete(dst)?;
                for (field, item) in fields {
                    self.engine.hset(dst, field, item)?;
                }
                self.engine.set_expire(dst, source.expire_at, version)?;
            }
            DataType::Set => {
                let members = self.engine.smembers(src)?;
                self.engine.delete(dst)?;
                for (member, member_version) in members {
                    self.engine.sadd(dst, member, member_version)?;
                }
                self.engine.set_expire(dst, source.expire_at, version)?;
            }
            DataType::ZSet => {
                let len = self.engine.zcard(src)?;
                let members = if len == 0 {
                    Vec::new()
                } else {
                    self.engine.zrange_by_rank(src, 0, len - 1)?
                };
                self.engine.delete(dst)?;
                for (member, score, member_version) in members {
                    self.engine.zadd(dst, member, score, member_version)?;
                }
                self.engine.set_expire(dst, source.expire_at, version)?;
            }
        }
        self.engine.delete(src)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::handler::test_support::*;
    use super::*;
    use crate::storage::{ExpiryMode, MetaData, ScoredValue, SetOpt};
    use std::time::Duration;

    fn meta() -> MetaData {
        MetaData::default()
    }

    #[test]
    fn test_expire_and_ttl() {
        let p = processor();
        p.set(&b("k"), item("v", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.ttl(&b("k")), (Status::NoExpireSet, 0));

        assert_eq!(p.expire(&b("k"), 5, v(1)), Status::Ok);
        let (status, secs) = p.ttl(&b("k"));
        assert_eq!(status, Status::Ok);
        assert!(secs > 0 && secs <= 5);

        let (_, ms) = p.pttl(&b("k"));
        assert!(ms > 4_000 && ms <= 5_000);
    }

    #[test]
    fn test_expire_missing_key() {
        let p = processor();
        assert_eq!(p.expire(&b("k"), 5, v(1)), Status::OkButNotExist);
        assert_eq!(p.ttl(&b("k")), (Status::OkButNotExist, 0));
        assert_eq!(p.persist(&b("k"), v(1)), Status::OkButNotExist);
    }

    #[test]
    fn test_expire_zero_ttl_does_not_delete() {
        let p = processor();
        p.set(&b("k"), item("v", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.pexpire(&b("k"), 0, v(1)), Status::Ok);
        // floored to 1ms in the future
        assert!(p.pttl(&b("k")).1 <= 1);
    }

    #[test]
    fn test_expire_version_ordering() {
        let p = processor();
        p.set(&b("k"), item("v", 10), &meta(), SetOpt::Exist);
        assert_eq!(p.expire(&b("k"), 5, v(9)), Status::VersionMismatch);
        assert_eq!(p.ttl(&b("k")).0, Status::NoExpireSet);
        assert_eq!(p.expire(&b("k"), 5, Version::ZERO), Status::Ok);
        assert_eq!(p.expire(&b("k"), 5, v(12)), Status::Ok);
        // the expire raised the key's version
        assert_eq!(
            p.set(&b("k"), item("w", 11), &meta(), SetOpt::Exist),
            Status::VersionMismatch
        );
    }

    #[test]
    fn test_get_version_after_expire_satisfies_version_care() {
        let p = processor();
        p.set(&b("k"), item("v", 10), &meta(), SetOpt::Exist);
        assert_eq!(p.expire(&b("k"), 100, v(12)), Status::Ok);

        let (status, current) = p.get(&b("k"));
        assert_eq!(status, Status::Ok);
        assert_eq!(current.version, v(12));
        assert_eq!(
            p.set(&b("k"), item("w", 13), &MetaData::expecting(current.version), SetOpt::Exist),
            Status::Ok
        );

        assert_eq!(p.persist(&b("k"), v(15)), Status::NoExpireSet);
        assert_eq!(p.expire(&b("k"), 100, v(14)), Status::Ok);
        assert_eq!(p.persist(&b("k"), v(15)), Status::Ok);
        let (_, current) = p.get(&b("k"));
        assert_eq!(current, item("w", 15));
        assert_eq!(
            p.set(&b("k"), item("x", 16), &MetaData::expecting(current.version), SetOpt::Exist),
            Status::Ok
        );
    }

    #[test]
    fn test_key_version_drives_version_care_on_hashes() {
        let p = processor();
        assert_eq!(p.key_version(&b("h")), (Status::OkButNotExist, Version::ZERO));
        p.hset(&b("h"), b("a"), item("1", 3), &meta());
        p.hset(&b("h"), b("b"), item("2", 7), &meta());
        assert_eq!(p.expire(&b("h"), 100, v(9)), Status::Ok);

        // field versions stay as written, the key version moved on
        assert_eq!(p.hget(&b("h"), &b("b")).1.version, v(7));
        let (status, current) = p.key_version(&b("h"));
        assert_eq!(status, Status::Ok);
        assert_eq!(current, v(9));

        assert_eq!(
            p.hset(&b("h"), b("c"), item("3", 10), &MetaData::expecting(v(7))),
            Status::VersionMismatch
        );
        assert_eq!(
            p.hset(&b("h"), b("c"), item("3", 10), &MetaData::expecting(current)),
            Status::Ok
        );
    }

    #[test]
    fn test_persist() {
        let p = processor();
        p.set_ex(&b("k"), item("v", 1), 100);
        assert_eq!(p.persist(&b("k"), v(2)), Status::Ok);
        assert_eq!(p.ttl(&b("k")).0, Status::NoExpireSet);
        assert_eq!(p.persist(&b("k"), v(3)), Status::NoExpireSet);
    }

    #[test]
    fn test_ttl_non_increasing_until_expiry() {
        let p = processor();
        p.set(&b("k"), item("v", 1), &meta(), SetOpt::Exist);
        p.pexpire(&b("k"), 120, v(1));

        let mut last = u64::MAX;
        loop {
            let (status, ms) = p.pttl(&b("k"));
            if status == Status::OkButNotExist {
                break;
            }
            assert_eq!(status, Status::Ok);
            assert!(ms <= last);
            last = ms;
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(p.exists(&b("k")), Status::OkButNotExist);
    }

    #[test]
    fn test_version_relative_expiry() {
        let p = processor_with(ExpiryMode::VersionRelative);
        let minted = crate::storage::mint_version();
        p.set(&b("k"), ValueItem::new(b("v"), minted), &meta(), SetOpt::Exist);
        std::thread::sleep(Duration::from_millis(30));
        p.pexpire(&b("k"), 1_000, minted);
        let (_, ms) = p.pttl(&b("k"));
        assert!(ms <= 975, "remaining {}", ms);
    }

    #[test]
    fn test_key_type() {
        let p = processor();
        p.set(&b("s"), item("v", 1), &meta(), SetOpt::Exist);
        p.hset(&b("h"), b("f"), item("v", 1), &meta());
        p.zadd(&b("z"), vec![ScoredValue::new(b("m"), 1, v(1))], &meta());
        p.sadd(&b("set"), vec![item("m", 1)], &meta());

        assert_eq!(p.key_type(&b("s")), (Status::Ok, Some(DataType::String)));
        assert_eq!(p.key_type(&b("h")), (Status::Ok, Some(DataType::Hash)));
        assert_eq!(p.key_type(&b("set")), (Status::Ok, Some(DataType::Set)));
        assert_eq!(p.key_type(&b("z")), (Status::Ok, Some(DataType::ZSet)));
        assert_eq!(p.key_type(&b("none")), (Status::OkButNotExist, None));
    }

    #[test]
    fn test_rename_string_keeps_ttl() {
        let p = processor();
        p.set_ex(&b("a"), item("v", 1), 100);
        assert_eq!(p.rename(&b("a"), &b("b"), v(2), false), Status::Ok);
        assert_eq!(p.exists(&b("a")), Status::OkButNotExist);
        assert_eq!(p.get(&b("b")).1, item("v", 2));
        assert_eq!(p.ttl(&b("b")).0, Status::Ok);
    }

    #[test]
    fn test_rename_nx_and_versions() {
        let p = processor();
        p.set(&b("a"), item("1", 1), &meta(), SetOpt::Exist);
        p.set(&b("b"), item("2", 5), &meta(), SetOpt::Exist);
        assert_eq!(p.rename(&b("a"), &b("b"), v(6), true), Status::OkButAlreadyExists);
        assert_eq!(p.rename(&b("a"), &b("b"), v(5), false), Status::VersionMismatch);
        assert_eq!(p.rename(&b("a"), &b("b"), v(6), false), Status::Ok);
        assert_eq!(p.get(&b("b")).1, item("1", 6));
        assert_eq!(p.rename(&b("missing"), &b("b"), v(7), false), Status::OkButNotExist);
        assert_eq!(p.rename(&b("b"), &b("b"), v(7), false), Status::Ok);
    }

    #[test]
    fn test_rename_collections() {
        let p = processor();
        p.hset(&b("h"), b("f"), item("v", 1), &meta());
        p.zadd(
            &b("z"),
            vec![ScoredValue::new(b("x"), 2, v(1)), ScoredValue::new(b("y"), 1, v(1))],
            &meta(),
        );
        p.set(&b("h2"), item("old", 1), &meta(), SetOpt::Exist);

        assert_eq!(p.rename(&b("h"), &b("h2"), v(3), false), Status::Ok);
        assert_eq!(p.hget(&b("h2"), &b("f")).1, item("v", 1));

        assert_eq!(p.rename(&b("z"), &b("z2"), v(3), false), Status::Ok);
        let (_, members) = p.zrange(&b("z2"), 0, -1, true);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].member, b("y"));
        assert_eq!(p.exists(&b("z")), Status::OkButNotExist);

        p.sadd(&b("s"), vec![item("a", 1), item("b", 2)], &meta());
        p.expire(&b("s"), 100, v(3));
        assert_eq!(p.rename(&b("s"), &b("s2"), v(4), false), Status::Ok);
        assert_eq!(p.smembers(&b("s2")), (Status::Ok, vec![item("a", 1), item("b", 2)]));
        assert_eq!(p.key_version(&b("s2")), (Status::Ok, v(4)));
        assert_eq!(p.ttl(&b("s2")).0, Status::Ok);
        assert_eq!(p.exists(&b("s")), Status::OkButNotExist);
    }
}
