//! Set commands.
//!
//! A set holds distinct members, each stamped with the version that last
//! wrote it. Member writes follow the same ordering rules as sorted-set
//! members.

use super::handler::{engine_status, reject_zero, CommandProcessor};
use crate::storage::{now_us, DataType, Engine, MetaData, Status, ValueItem, Version};
use bytes::Bytes;
use tracing::debug;

impl<E: Engine> CommandProcessor<E> {
    /// Adds members, one status per item: `Ok` for a new member,
    /// `OkButAlreadyExists` for one re-stamped with a newer version.
    pub fn sadd(
        &self,
        key: &Bytes,
        members: Vec<ValueItem>,
        meta: &MetaData,
    ) -> (Status, Vec<Status>) {
        if members.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::Set)) {
            return (status, vec![status; members.len()]);
        }

        let statuses = members
            .into_iter()
            .map(|item| self.sadd_one(key, item))
            .collect();
        (Status::Ok, statuses)
    }

    fn sadd_one(&self, key: &Bytes, item: ValueItem) -> Status {
        if let Err(status) = reject_zero(item.version) {
            return status;
        }
        match self.engine.smember(key, &item.value) {
            Ok(Some(stored)) if item.version <= stored => return Status::VersionMismatch,
            Ok(_) => {}
            Err(e) => return engine_status(e),
        }
        match self.engine.sadd(key, item.value, item.version) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::OkButAlreadyExists,
            Err(e) => engine_status(e),
        }
    }

    /// Removes members, each guarded by the version it was last seen at.
    pub fn srem(
        &self,
        key: &Bytes,
        members: Vec<ValueItem>,
        meta: &MetaData,
    ) -> (Status, Vec<Status>) {
        if members.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_key(key);
        let status = match self.precheck(key, meta, Some(DataType::Set)) {
            Ok(Some(_)) => None,
            Ok(None) => Some(Status::OkButNotExist),
            Err(status) => Some(status),
        };
        if let Some(status) = status {
            return (status, vec![status; members.len()]);
        }

        let statuses = members
            .iter()
            .map(|m| self.srem_one(key, &m.value, m.version))
            .collect();
        (Status::Ok, statuses)
    }

    fn srem_one(&self, key: &Bytes, member: &Bytes, version: Version) -> Status {
        if version.is_zero() {
            return Status::Error;
        }
        match self.engine.smember(key, member) {
            Ok(None) => return Status::OkButNotExist,
            Ok(Some(stored)) if stored > version => return Status::VersionMismatch,
            Ok(Some(_)) => {}
            Err(e) => return engine_status(e),
        }
        match self.engine.srem(key, member, version) {
            Ok(_) => Status::Ok,
            Err(e) => engine_status(e),
        }
    }

    /// All members in byte order, each with the version that wrote it.
    pub fn smembers(&self, key: &Bytes) -> (Status, Vec<ValueItem>) {
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.read_record(key, DataType::Set) {
            return (status, Vec::new());
        }
        match self.engine.smembers(key) {
            Ok(members) => (
                Status::Ok,
                members
                    .into_iter()
                    .map(|(member, version)| ValueItem::new(member, version))
                    .collect(),
            ),
            Err(e) => (engine_status(e), Vec::new()),
        }
    }

    pub fn scard(&self, key: &Bytes) -> (Status, u64) {
        let _guard = self.locks.lock_key(key);
        match self.engine.scard(key) {
            Ok(0) => (Status::OkButNotExist, 0),
            Ok(n) => (Status::Ok, n as u64),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// `Ok` if `member` is in the set, `OkButNotExist` otherwise.
    pub fn sismember(&self, key: &Bytes, member: &Bytes) -> Status {
        let _guard = self.locks.lock_key(key);
        match self.engine.smember(key, member) {
            Ok(Some(_)) => Status::Ok,
            Ok(None) => Status::OkButNotExist,
            Err(e) => engine_status(e),
        }
    }

    /// Removes an arbitrary member and returns it stamped with `version`.
    ///
    /// `version` must not be older than the key's current version.
    pub fn spop(&self, key: &Bytes, version: Version, meta: &MetaData) -> (Status, ValueItem) {
        if let Err(status) = reject_zero(version) {
            return (status, ValueItem::empty());
        }
        let _guard = self.locks.lock_key(key);
        match self.precheck(key, meta, Some(DataType::Set)) {
            Ok(Some(record)) if record.version > version => {
                return (Status::VersionMismatch, ValueItem::empty())
            }
            Ok(Some(_)) => {}
            Ok(None) => return (Status::OkButNotExist, ValueItem::empty()),
            Err(status) => return (status, ValueItem::empty()),
        }

        let mut members = match self.engine.smembers(key) {
            Ok(members) if members.is_empty() => {
                return (Status::OkButNotExist, ValueItem::empty())
            }
            Ok(members) => members,
            Err(e) => return (engine_status(e), ValueItem::empty()),
        };
        let offset = (now_us() % members.len() as u64) as usize;
        let (member, _) = members.swap_remove(offset);

        match self.engine.srem(key, &member, version) {
            Ok(_) => {
                debug!(remaining = members.len(), "Member popped");
                (Status::Ok, ValueItem::new(member, version))
            }
            Err(e) => (engine_status(e), ValueItem::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::handler::test_support::*;
    use super::*;
    use crate::storage::SetOpt;

    fn meta() -> MetaData {
        MetaData::default()
    }

    #[test]
    fn test_sadd_statuses() {
        let p = processor();
        let (status, per_item) = p.sadd(&b("s"), vec![item("a", 1), item("b", 1)], &meta());
        assert_eq!(status, Status::Ok);
        assert_eq!(per_item, vec![Status::Ok, Status::Ok]);

        let (_, per_item) = p.sadd(
            &b("s"),
            vec![item("a", 2), item("b", 1), item("c", 0)],
            &meta(),
        );
        assert_eq!(
            per_item,
            vec![Status::OkButAlreadyExists, Status::VersionMismatch, Status::Error]
        );
        assert_eq!(p.scard(&b("s")), (Status::Ok, 2));
        assert_eq!(p.sadd(&b("s"), Vec::new(), &meta()).0, Status::WrongArgCount);
    }

    #[test]
    fn test_set_wrong_type() {
        let p = processor();
        p.set(&b("k"), item("v", 1), &meta(), SetOpt::Exist);
        let (status, per_item) = p.sadd(&b("k"), vec![item("a", 2)], &meta());
        assert_eq!(status, Status::WrongType);
        assert_eq!(per_item, vec![Status::WrongType]);
        assert_eq!(p.smembers(&b("k")).0, Status::WrongType);
        assert_eq!(p.sismember(&b("k"), &b("a")), Status::WrongType);
    }

    #[test]
    fn test_smembers_and_sismember() {
        let p = processor();
        p.sadd(&b("s"), vec![item("b", 2), item("a", 1)], &meta());
        assert_eq!(
            p.smembers(&b("s")),
            (Status::Ok, vec![item("a", 1), item("b", 2)])
        );
        assert_eq!(p.sismember(&b("s"), &b("a")), Status::Ok);
        assert_eq!(p.sismember(&b("s"), &b("z")), Status::OkButNotExist);
        assert_eq!(p.smembers(&b("none")), (Status::OkButNotExist, Vec::new()));
        assert_eq!(p.scard(&b("none")), (Status::OkButNotExist, 0));
    }

    #[test]
    fn test_srem() {
        let p = processor();
        p.sadd(&b("s"), vec![item("a", 3), item("b", 3)], &meta());
        let (status, per_item) = p.srem(
            &b("s"),
            vec![item("a", 2), item("b", 4), item("x", 4), item("a", 0)],
            &meta(),
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(
            per_item,
            vec![Status::VersionMismatch, Status::Ok, Status::OkButNotExist, Status::Error]
        );
        assert_eq!(p.srem(&b("s"), vec![item("a", 5)], &meta()).1, vec![Status::Ok]);
        assert_eq!(p.exists(&b("s")), Status::OkButNotExist);
        assert_eq!(p.srem(&b("s"), vec![item("a", 6)], &meta()).0, Status::OkButNotExist);
    }

    #[test]
    fn test_spop_drains_the_set() {
        let p = processor();
        p.sadd(&b("s"), vec![item("a", 1), item("b", 1), item("c", 1)], &meta());

        let mut popped = Vec::new();
        for version in 2..5 {
            let (status, member) = p.spop(&b("s"), v(version), &meta());
            assert_eq!(status, Status::Ok);
            assert_eq!(member.version, v(version));
            assert_eq!(p.sismember(&b("s"), &member.value), Status::OkButNotExist);
            popped.push(member.value);
        }
        popped.sort();
        assert_eq!(popped, vec![b("a"), b("b"), b("c")]);
        assert_eq!(p.spop(&b("s"), v(5), &meta()).0, Status::OkButNotExist);
    }

    #[test]
    fn test_spop_versions() {
        let p = processor();
        p.sadd(&b("s"), vec![item("a", 4)], &meta());
        assert_eq!(p.spop(&b("s"), v(0), &meta()).0, Status::Error);
        assert_eq!(p.spop(&b("s"), v(3), &meta()).0, Status::VersionMismatch);
        assert_eq!(
            p.spop(&b("s"), v(5), &MetaData::expecting(v(1))).0,
            Status::VersionMismatch
        );
        assert_eq!(p.spop(&b("s"), v(5), &MetaData::expecting(v(4))), (Status::Ok, item("a", 5)));
    }
}
