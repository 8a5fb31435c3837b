//! String commands.

use super::handler::{engine_status, reject_zero, CommandProcessor};
use crate::storage::{
    DataType, Engine, MetaData, SetOpt, Status, TtlUnit, ValueItem, Version,
};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

impl<E: Engine> CommandProcessor<E> {
    /// Stores `value` under `key` subject to `opt` and `meta`.
    ///
    /// - version 0 → `Error`, nothing written
    /// - `NotExist*` on a live key → `OkButAlreadyExists`
    /// - a version not newer than the key's → `VersionMismatch`
    ///
    /// `*AndExpire` options store `meta.expire_time`; the others clear any TTL.
    pub fn set(&self, key: &Bytes, value: ValueItem, meta: &MetaData, opt: SetOpt) -> Status {
        if let Err(status) = reject_zero(value.version) {
            return status;
        }
        let _guard = self.locks.lock_key(key);
        self.set_locked(key, value, meta, opt)
    }

    /// `set` with `ExistAndExpire` and a TTL in seconds.
    pub fn set_ex(&self, key: &Bytes, value: ValueItem, seconds: u64) -> Status {
        if let Err(status) = reject_zero(value.version) {
            return status;
        }
        let expire_at = self
            .expiry_mode
            .expire_at(seconds, TtlUnit::Seconds, value.version);
        let meta = MetaData::default().with_expire_time(expire_at);
        let _guard = self.locks.lock_key(key);
        self.set_locked(key, value, &meta, SetOpt::ExistAndExpire)
    }

    /// `set` driven by option tokens: `[EX seconds | PX millis] [NX | XX]`.
    ///
    /// `NX` requires the key to be absent, `XX` requires it to exist.
    /// Anything else malformed returns `WrongArgCount`.
    pub fn set_with_second(
        &self,
        key: &Bytes,
        value: ValueItem,
        meta: &MetaData,
        args: &[&str],
    ) -> Status {
        if let Err(status) = reject_zero(value.version) {
            return status;
        }

        let mut tokens = args;
        let mut opt = SetOpt::ExistAndExpire;
        let mut must_exist = false;
        if let Some((last, rest)) = tokens.split_last() {
            if last.eq_ignore_ascii_case("NX") {
                opt = SetOpt::NotExistAndExpire;
                tokens = rest;
            } else if last.eq_ignore_ascii_case("XX") {
                must_exist = true;
                tokens = rest;
            }
        }

        let expire_time = match tokens {
            [] => 0,
            [unit, ttl] => {
                let unit = if unit.eq_ignore_ascii_case("EX") {
                    TtlUnit::Seconds
                } else if unit.eq_ignore_ascii_case("PX") {
                    TtlUnit::Milliseconds
                } else {
                    return Status::WrongArgCount;
                };
                let Ok(ttl) = ttl.parse::<u64>() else {
                    return Status::WrongArgCount;
                };
                self.expiry_mode.expire_at(ttl, unit, value.version)
            }
            _ => return Status::WrongArgCount,
        };
        let meta = MetaData {
            expire_time,
            ..*meta
        };

        let _guard = self.locks.lock_key(key);
        if must_exist {
            match self.engine.record(key) {
                Ok(Some(_)) => {}
                Ok(None) => return Status::OkButNotExist,
                Err(e) => return engine_status(e),
            }
        }
        self.set_locked(key, value, &meta, opt)
    }

    /// Write path shared by every string setter. The key must be locked.
    pub(crate) fn set_locked(
        &self,
        key: &Bytes,
        value: ValueItem,
        meta: &MetaData,
        opt: SetOpt,
    ) -> Status {
        let record = match self.precheck(key, meta, None) {
            Ok(record) => record,
            Err(status) => return status,
        };
        if let Some(record) = record {
            if opt.requires_absent() {
                return Status::OkButAlreadyExists;
            }
            if value.version <= record.version {
                debug!(
                    stored = %record.version,
                    offered = %value.version,
                    "Stale write rejected"
                );
                return Status::VersionMismatch;
            }
        }
        let expire_at = if opt.applies_expire() {
            meta.expire_at()
        } else {
            None
        };
        match self.engine.put(key, value, expire_at) {
            Ok(()) => Status::Ok,
            Err(e) => engine_status(e),
        }
    }

    /// Returns the string stored at `key`.
    pub fn get(&self, key: &Bytes) -> (Status, ValueItem) {
        let _guard = self.locks.lock_key(key);
        match self.engine.get(key) {
            Ok(Some(item)) => (Status::Ok, item),
            Ok(None) => (Status::OkButNotExist, ValueItem::empty()),
            Err(e) => (engine_status(e), ValueItem::empty()),
        }
    }

    /// [`get`](Self::get) for a key given as a byte slice.
    pub fn get_with_byte(&self, key: &[u8]) -> (Status, ValueItem) {
        self.get(&Bytes::copy_from_slice(key))
    }

    /// Stores `value` unconditionally and returns what was there before.
    ///
    /// An absent key yields `Ok` with the empty marker. The TTL is cleared.
    pub fn get_set(&self, key: &Bytes, value: ValueItem, meta: &MetaData) -> (Status, ValueItem) {
        if let Err(status) = reject_zero(value.version) {
            return (status, ValueItem::empty());
        }
        let _guard = self.locks.lock_key(key);
        let old = match self.engine.get(key) {
            Ok(old) => old.unwrap_or_default(),
            Err(e) => return (engine_status(e), ValueItem::empty()),
        };
        match self.set_locked(key, value, meta, SetOpt::Exist) {
            Status::Ok => (Status::Ok, old),
            status => (status, ValueItem::empty()),
        }
    }

    /// Deletes each key independently, returning one status per key.
    ///
    /// `keys` and `versions` must have the same length; otherwise nothing is
    /// touched and `(Error, [])` is returned. No keys at all is `(Ok, [])`.
    /// Per key:
    ///
    /// - absent → `OkButNotExist`
    /// - with `version_care`, the stored version must equal `versions[i]`
    /// - without it, a non-zero `versions[i]` older than the stored version
    ///   → `VersionMismatch`
    pub fn del(
        &self,
        keys: &[Bytes],
        versions: &[Version],
        meta: &MetaData,
    ) -> (Status, Vec<Status>) {
        if keys.len() != versions.len() {
            return (Status::Error, Vec::new());
        }
        if keys.is_empty() {
            return (Status::Ok, Vec::new());
        }

        let _guard = self.locks.lock_global();
        let mut statuses = Vec::with_capacity(keys.len());
        let mut doomed = Vec::new();
        let mut doomed_at = Vec::new();

        for (i, (key, &version)) in keys.iter().zip(versions).enumerate() {
            let record = match self.engine.record(key) {
                Ok(record) => record,
                Err(e) => {
                    statuses.push(engine_status(e));
                    continue;
                }
            };
            let status = match record {
                None => {
                    // An expired leftover still occupies storage.
                    doomed.push(key.clone());
                    doomed_at.push(None);
                    Status::OkButNotExist
                }
                Some(record) if meta.version_care && record.version != version => {
                    Status::VersionMismatch
                }
                Some(record) if !version.is_zero() && record.version > version => {
                    Status::VersionMismatch
                }
                Some(_) => {
                    doomed.push(key.clone());
                    doomed_at.push(Some(i));
                    Status::Ok
                }
            };
            statuses.push(status);
        }

        if !doomed.is_empty() {
            if let Err(e) = self.engine.multi_delete(&doomed) {
                let status = engine_status(e);
                for i in doomed_at.into_iter().flatten() {
                    statuses[i] = status;
                }
            }
        }
        (Status::Ok, statuses)
    }

    pub fn incr(&self, key: &Bytes, meta: &MetaData, version: Version) -> (Status, i64) {
        self.incr_decr(key, meta, version, 1)
    }

    pub fn decr(&self, key: &Bytes, meta: &MetaData, version: Version) -> (Status, i64) {
        self.incr_decr(key, meta, version, -1)
    }

    pub fn incrby(&self, key: &Bytes, meta: &MetaData, version: Version, delta: i64) -> (Status, i64) {
        self.incr_decr(key, meta, version, delta)
    }

    pub fn decrby(&self, key: &Bytes, meta: &MetaData, version: Version, delta: i64) -> (Status, i64) {
        match delta.checked_neg() {
            Some(delta) => self.incr_decr(key, meta, version, delta),
            None => (Status::Overflow, 0),
        }
    }

    /// Adds `delta` to the integer stored at `key` and returns the result.
    ///
    /// An absent key counts as 0. The TTL is preserved. A value that is not
    /// a base-10 `i64` gives `NotANumber`; leaving the `i64` range gives
    /// `Overflow`.
    pub fn incr_decr(
        &self,
        key: &Bytes,
        meta: &MetaData,
        version: Version,
        delta: i64,
    ) -> (Status, i64) {
        if let Err(status) = reject_zero(version) {
            return (status, 0);
        }
        let _guard = self.locks.lock_key(key);

        let record = match self.precheck(key, meta, Some(DataType::String)) {
            Ok(record) => record,
            Err(status) => return (status, 0),
        };
        if record.is_some_and(|r| version <= r.version) {
            return (Status::VersionMismatch, 0);
        }

        let current = match self.engine.get(key) {
            Ok(Some(item)) => match parse_i64(&item.value) {
                Some(n) => n,
                None => return (Status::NotANumber, 0),
            },
            Ok(None) => 0,
            Err(e) => return (engine_status(e), 0),
        };
        let Some(next) = current.checked_add(delta) else {
            return (Status::Overflow, 0);
        };

        let item = ValueItem::new(Bytes::from(next.to_string()), version);
        let expire_at = record.and_then(|r| r.expire_at);
        match self.engine.put(key, item, expire_at) {
            Ok(()) => (Status::Ok, next),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// Stores several strings under the global lock, one status per item.
    ///
    /// Each item is checked as [`set`](Self::set) would check it. A key that
    /// appears twice sees the earlier item as already written.
    pub fn mset(
        &self,
        items: Vec<(Bytes, ValueItem)>,
        meta: &MetaData,
        opt: SetOpt,
    ) -> (Status, Vec<Status>) {
        if items.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }

        let _guard = self.locks.lock_global();
        let expire_at = if opt.applies_expire() {
            meta.expire_at()
        } else {
            None
        };
        let mut statuses = Vec::with_capacity(items.len());
        let mut pending: HashMap<Bytes, Version> = HashMap::new();
        let mut writes = Vec::new();
        let mut written_at = Vec::new();

        for (i, (key, value)) in items.into_iter().enumerate() {
            if value.version.is_zero() {
                statuses.push(Status::Error);
                continue;
            }
            let current = match pending.get(&key) {
                Some(&version) => Some(version),
                None => match self.precheck(&key, meta, None) {
                    Ok(record) => record.map(|r| r.version),
                    Err(status) => {
                        statuses.push(status);
                        continue;
                    }
                },
            };
            let status = match current {
                Some(_) if opt.requires_absent() => Status::OkButAlreadyExists,
                Some(stored) if value.version <= stored => Status::VersionMismatch,
                _ => {
                    pending.insert(key.clone(), value.version);
                    written_at.push(i);
                    writes.push((key, value, expire_at));
                    Status::Ok
                }
            };
            statuses.push(status);
        }

        if !writes.is_empty() {
            if let Err(e) = self.engine.multi_put(writes) {
                let status = engine_status(e);
                for i in written_at {
                    statuses[i] = status;
                }
            }
        }
        (Status::Ok, statuses)
    }

    /// Reads several strings under the global lock, in input order.
    ///
    /// Absent keys and keys of another type yield the empty marker.
    pub fn mget(&self, keys: &[Bytes]) -> (Status, Vec<ValueItem>) {
        if keys.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_global();
        match self.engine.multi_get(keys) {
            Ok(values) => (
                Status::Ok,
                values.into_iter().map(Option::unwrap_or_default).collect(),
            ),
            Err(e) => (engine_status(e), Vec::new()),
        }
    }
}

pub(crate) fn parse_i64(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::super::handler::test_support::*;
    use super::*;
    use crate::storage::now_ms;

    fn meta() -> MetaData {
        MetaData::default()
    }

    #[test]
    fn test_set_and_get() {
        let p = processor();
        assert_eq!(p.set(&b("k"), item("hello", 7), &meta(), SetOpt::Exist), Status::Ok);
        assert_eq!(p.get(&b("k")), (Status::Ok, item("hello", 7)));
        assert_eq!(p.get_with_byte(b"k"), (Status::Ok, item("hello", 7)));
    }

    #[test]
    fn test_get_missing() {
        let p = processor();
        let (status, value) = p.get(&b("nope"));
        assert_eq!(status, Status::OkButNotExist);
        assert!(value.is_nil());
    }

    #[test]
    fn test_zero_version_rejected() {
        let p = processor();
        assert_eq!(p.set(&b("k"), item("v", 0), &meta(), SetOpt::Exist), Status::Error);
        assert_eq!(p.get(&b("k")).0, Status::OkButNotExist);
        assert_eq!(p.set_ex(&b("k"), item("v", 0), 10), Status::Error);
    }

    #[test]
    fn test_not_exist_precondition() {
        let p = processor();
        assert_eq!(p.set(&b("k"), item("a", 1), &meta(), SetOpt::NotExist), Status::Ok);
        assert_eq!(
            p.set(&b("k"), item("b", 2), &meta(), SetOpt::NotExist),
            Status::OkButAlreadyExists
        );
        assert_eq!(p.get(&b("k")).1, item("a", 1));
    }

    #[test]
    fn test_stale_write_rejected() {
        let p = processor();
        p.set(&b("k"), item("new", 10), &meta(), SetOpt::Exist);
        assert_eq!(
            p.set(&b("k"), item("old", 5), &meta(), SetOpt::Exist),
            Status::VersionMismatch
        );
        assert_eq!(
            p.set(&b("k"), item("same", 10), &meta(), SetOpt::Exist),
            Status::VersionMismatch
        );
        assert_eq!(p.get(&b("k")).1, item("new", 10));
    }

    #[test]
    fn test_version_care() {
        let p = processor();
        p.set(&b("k"), item("v1", 10), &meta(), SetOpt::Exist);

        let wrong = MetaData::expecting(v(9));
        assert_eq!(p.set(&b("k"), item("v2", 11), &wrong, SetOpt::Exist), Status::VersionMismatch);
        assert_eq!(p.get(&b("k")).1, item("v1", 10));

        let right = MetaData::expecting(v(10));
        assert_eq!(p.set(&b("k"), item("v2", 11), &right, SetOpt::Exist), Status::Ok);
    }

    #[test]
    fn test_plain_set_clears_ttl() {
        let p = processor();
        let m = meta().with_expire_time(now_ms() + 60_000);
        p.set(&b("k"), item("a", 1), &m, SetOpt::ExistAndExpire);
        assert_eq!(p.ttl(&b("k")).0, Status::Ok);
        p.set(&b("k"), item("b", 2), &m, SetOpt::Exist);
        assert_eq!(p.ttl(&b("k")).0, Status::NoExpireSet);
    }

    #[test]
    fn test_set_ex_applies_ttl() {
        let p = processor();
        assert_eq!(p.set_ex(&b("k"), item("v", 1), 10), Status::Ok);
        let (status, secs) = p.ttl(&b("k"));
        assert_eq!(status, Status::Ok);
        assert!(secs > 0 && secs <= 10);
    }

    #[test]
    fn test_set_with_second_options() {
        let p = processor();
        assert_eq!(p.set_with_second(&b("k"), item("v", 1), &meta(), &["EX", "100"]), Status::Ok);
        let (_, ms) = p.pttl(&b("k"));
        assert!(ms > 99_000 && ms <= 100_000);

        assert_eq!(
            p.set_with_second(&b("k"), item("v", 2), &meta(), &["PX", "500", "NX"]),
            Status::OkButAlreadyExists
        );
        assert_eq!(
            p.set_with_second(&b("other"), item("v", 3), &meta(), &["XX"]),
            Status::OkButNotExist
        );
        assert_eq!(p.set_with_second(&b("k"), item("v", 4), &meta(), &["px", "500", "xx"]), Status::Ok);
        let (_, ms) = p.pttl(&b("k"));
        assert!(ms <= 500);
        assert_eq!(p.set_with_second(&b("plain"), item("v", 5), &meta(), &[]), Status::Ok);
        assert_eq!(p.ttl(&b("plain")).0, Status::NoExpireSet);
    }

    #[test]
    fn test_set_with_second_malformed() {
        let p = processor();
        let cases: [&[&str]; 4] = [&["EX"], &["ZZ", "10"], &["EX", "ten"], &["EX", "1", "2", "NX"]];
        for args in cases {
            assert_eq!(
                p.set_with_second(&b("k"), item("v", 1), &meta(), args),
                Status::WrongArgCount,
                "args: {:?}",
                args
            );
        }
        assert_eq!(p.exists(&b("k")), Status::OkButNotExist);
    }

    #[test]
    fn test_get_set() {
        let p = processor();
        assert_eq!(p.get_set(&b("k"), item("a", 1), &meta()), (Status::Ok, ValueItem::empty()));
        assert_eq!(p.get_set(&b("k"), item("b", 2), &meta()), (Status::Ok, item("a", 1)));
        assert_eq!(p.get(&b("k")).1, item("b", 2));
        assert_eq!(p.get_set(&b("k"), item("c", 1), &meta()).0, Status::VersionMismatch);
    }

    #[test]
    fn test_del_per_key_statuses() {
        let p = processor();
        p.set(&b("a"), item("1", 10), &meta(), SetOpt::Exist);
        p.set(&b("b"), item("2", 10), &meta(), SetOpt::Exist);

        let (status, per_key) = p.del(&[b("a"), b("b"), b("c")], &[v(0), v(5), v(0)], &meta());
        assert_eq!(status, Status::Ok);
        assert_eq!(
            per_key,
            vec![Status::Ok, Status::VersionMismatch, Status::OkButNotExist]
        );
        assert_eq!(p.exists(&b("a")), Status::OkButNotExist);
        assert_eq!(p.exists(&b("b")), Status::Ok);
    }

    #[test]
    fn test_del_version_care() {
        let p = processor();
        p.set(&b("a"), item("1", 10), &meta(), SetOpt::Exist);
        let care = MetaData::expecting(Version::ZERO);
        let (_, per_key) = p.del(&[b("a")], &[v(11)], &care);
        assert_eq!(per_key, vec![Status::VersionMismatch]);
        let (_, per_key) = p.del(&[b("a")], &[v(10)], &care);
        assert_eq!(per_key, vec![Status::Ok]);
    }

    #[test]
    fn test_del_length_mismatch_does_nothing() {
        let p = processor();
        p.set(&b("a"), item("1", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.del(&[b("a")], &[], &meta()), (Status::Error, vec![]));
        assert_eq!(p.exists(&b("a")), Status::Ok);
    }

    #[test]
    fn test_del_no_keys_is_ok() {
        let p = processor();
        p.set(&b("a"), item("1", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.del(&[], &[], &meta()), (Status::Ok, vec![]));
        assert_eq!(p.del(&[], &[], &MetaData::expecting(v(1))), (Status::Ok, vec![]));
        assert_eq!(p.exists(&b("a")), Status::Ok);
    }

    #[test]
    fn test_incr_family() {
        let p = processor();
        assert_eq!(p.incr(&b("n"), &meta(), v(1)), (Status::Ok, 1));
        assert_eq!(p.incrby(&b("n"), &meta(), v(2), 10), (Status::Ok, 11));
        assert_eq!(p.decr(&b("n"), &meta(), v(3)), (Status::Ok, 10));
        assert_eq!(p.decrby(&b("n"), &meta(), v(4), 4), (Status::Ok, 6));
        assert_eq!(p.get(&b("n")).1, item("6", 4));
        assert_eq!(p.incr(&b("n"), &meta(), v(4)), (Status::VersionMismatch, 0));
    }

    #[test]
    fn test_incr_not_a_number_and_overflow() {
        let p = processor();
        p.set(&b("s"), item("abc", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.incr(&b("s"), &meta(), v(2)).0, Status::NotANumber);

        p.set(&b("max"), item(&i64::MAX.to_string(), 1), &meta(), SetOpt::Exist);
        assert_eq!(p.incr(&b("max"), &meta(), v(2)).0, Status::Overflow);
        assert_eq!(p.decrby(&b("x"), &meta(), v(1), i64::MIN).0, Status::Overflow);
        assert_eq!(p.get(&b("max")).1.version, v(1));
    }

    #[test]
    fn test_incr_preserves_ttl() {
        let p = processor();
        p.set_ex(&b("n"), item("5", 1), 100);
        assert_eq!(p.incr(&b("n"), &meta(), v(2)), (Status::Ok, 6));
        assert_eq!(p.ttl(&b("n")).0, Status::Ok);
    }

    #[test]
    fn test_mset_and_mget() {
        let p = processor();
        p.set(&b("b"), item("old", 50), &meta(), SetOpt::Exist);

        let (status, per_item) = p.mset(
            vec![
                (b("a"), item("1", 10)),
                (b("b"), item("2", 10)),
                (b("c"), item("3", 0)),
                (b("a"), item("1b", 11)),
            ],
            &meta(),
            SetOpt::Exist,
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(
            per_item,
            vec![Status::Ok, Status::VersionMismatch, Status::Error, Status::Ok]
        );

        let (status, values) = p.mget(&[b("a"), b("b"), b("c")]);
        assert_eq!(status, Status::Ok);
        assert_eq!(values, vec![item("1b", 11), item("old", 50), ValueItem::empty()]);
    }

    #[test]
    fn test_mset_not_exist_and_empty_inputs() {
        let p = processor();
        p.set(&b("a"), item("x", 1), &meta(), SetOpt::Exist);
        let (_, per_item) = p.mset(
            vec![(b("a"), item("1", 10)), (b("z"), item("2", 10))],
            &meta(),
            SetOpt::NotExist,
        );
        assert_eq!(per_item, vec![Status::OkButAlreadyExists, Status::Ok]);

        assert_eq!(p.mset(vec![], &meta(), SetOpt::Exist).0, Status::WrongArgCount);
        assert_eq!(p.mget(&[]).0, Status::WrongArgCount);
    }
}
