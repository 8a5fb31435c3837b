//! Sorted-set commands.
//!
//! Members are ordered by `i64` score, ties broken by member bytes. Score
//! bounds are given as strings so `-inf` / `+inf` can be expressed; anything
//! else must parse as an `i64`.

use super::handler::{engine_status, reject_zero, CommandProcessor};
use crate::storage::engine::ZEntry;
use crate::storage::{
    DataType, Engine, MetaData, ScoredMember, ScoredValue, Status, ValueItem, Version,
};
use bytes::Bytes;

/// Parses a score bound.
pub(crate) fn parse_score(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("-inf") {
        Some(i64::MIN)
    } else if raw.eq_ignore_ascii_case("+inf") || raw.eq_ignore_ascii_case("inf") {
        Some(i64::MAX)
    } else {
        raw.parse().ok()
    }
}

/// Resolves an inclusive rank range with negative indices counted from the
/// end. `None` if nothing is left after clamping.
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn to_members(entries: Vec<ZEntry>, withscore: bool) -> Vec<ScoredMember> {
    entries
        .into_iter()
        .map(|(member, score, version)| ScoredMember {
            member,
            version,
            score: withscore.then_some(score),
        })
        .collect()
}

impl<E: Engine> CommandProcessor<E> {
    /// Adds or re-scores members, one status per item: `Ok` for a new
    /// member, `OkButAlreadyExists` for a re-scored one.
    pub fn zadd(
        &self,
        key: &Bytes,
        items: Vec<ScoredValue>,
        meta: &MetaData,
    ) -> (Status, Vec<Status>) {
        if items.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::ZSet)) {
            return (status, vec![status; items.len()]);
        }

        let statuses = items
            .into_iter()
            .map(|item| self.zadd_one(key, item))
            .collect();
        (Status::Ok, statuses)
    }

    fn zadd_one(&self, key: &Bytes, item: ScoredValue) -> Status {
        if let Err(status) = reject_zero(item.version) {
            return status;
        }
        match self.engine.zscore(key, &item.member) {
            Ok(Some((_, stored))) if item.version <= stored => return Status::VersionMismatch,
            Ok(_) => {}
            Err(e) => return engine_status(e),
        }
        match self.engine.zadd(key, item.member, item.score, item.version) {
            Ok(true) => Status::Ok,
            Ok(false) => Status::OkButAlreadyExists,
            Err(e) => engine_status(e),
        }
    }

    /// Removes members, each guarded by the version it was last seen at.
    pub fn zrem(
        &self,
        key: &Bytes,
        members: Vec<ValueItem>,
        meta: &MetaData,
    ) -> (Status, Vec<Status>) {
        if members.is_empty() {
            return (Status::WrongArgCount, Vec::new());
        }
        let _guard = self.locks.lock_key(key);
        let status = match self.precheck(key, meta, Some(DataType::ZSet)) {
            Ok(Some(_)) => None,
            Ok(None) => Some(Status::OkButNotExist),
            Err(status) => Some(status),
        };
        if let Some(status) = status {
            return (status, vec![status; members.len()]);
        }

        let statuses = members
            .iter()
            .map(|m| self.zrem_one(key, &m.value, m.version))
            .collect();
        (Status::Ok, statuses)
    }

    fn zrem_one(&self, key: &Bytes, member: &Bytes, version: Version) -> Status {
        if version.is_zero() {
            return Status::Error;
        }
        match self.engine.zscore(key, member) {
            Ok(None) => return Status::OkButNotExist,
            Ok(Some((_, stored))) if stored > version => return Status::VersionMismatch,
            Ok(Some(_)) => {}
            Err(e) => return engine_status(e),
        }
        match self.engine.zrem(key, member, version) {
            Ok(_) => Status::Ok,
            Err(e) => engine_status(e),
        }
    }

    /// Adds `delta` to a member's score, a missing member counting as 0.
    /// Returns the new score.
    pub fn zincrby(
        &self,
        key: &Bytes,
        member: &Bytes,
        version: Version,
        delta: i64,
        meta: &MetaData,
    ) -> (Status, i64) {
        if let Err(status) = reject_zero(version) {
            return (status, 0);
        }
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.precheck(key, meta, Some(DataType::ZSet)) {
            return (status, 0);
        }

        let current = match self.engine.zscore(key, member) {
            Ok(Some((_, stored))) if version <= stored => return (Status::VersionMismatch, 0),
            Ok(Some((score, _))) => score,
            Ok(None) => 0,
            Err(e) => return (engine_status(e), 0),
        };
        let Some(next) = current.checked_add(delta) else {
            return (Status::Overflow, 0);
        };

        match self.engine.zadd(key, member.clone(), next, version) {
            Ok(_) => (Status::Ok, next),
            Err(e) => (engine_status(e), 0),
        }
    }

    pub fn zcard(&self, key: &Bytes) -> (Status, u64) {
        let _guard = self.locks.lock_key(key);
        match self.engine.zcard(key) {
            Ok(0) => (Status::OkButNotExist, 0),
            Ok(n) => (Status::Ok, n as u64),
            Err(e) => (engine_status(e), 0),
        }
    }

    pub fn zscore(&self, key: &Bytes, member: &Bytes) -> (Status, i64) {
        let _guard = self.locks.lock_key(key);
        match self.engine.zscore(key, member) {
            Ok(Some((score, _))) => (Status::Ok, score),
            Ok(None) => (Status::OkButNotExist, 0),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// Number of members with `min <= score <= max`.
    pub fn zcount(&self, key: &Bytes, min: &str, max: &str) -> (Status, u64) {
        let (Some(min), Some(max)) = (parse_score(min), parse_score(max)) else {
            return (Status::NotANumber, 0);
        };
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.read_record(key, DataType::ZSet) {
            return (status, 0);
        }
        match self.engine.zcount(key, min, max) {
            Ok(n) => (Status::Ok, n as u64),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// Members with ascending rank in `start..=stop`.
    pub fn zrange(
        &self,
        key: &Bytes,
        start: i64,
        stop: i64,
        withscore: bool,
    ) -> (Status, Vec<ScoredMember>) {
        self.range_by_rank(key, start, stop, withscore, false)
    }

    /// Members with descending rank in `start..=stop`.
    pub fn zrevrange(
        &self,
        key: &Bytes,
        start: i64,
        stop: i64,
        withscore: bool,
    ) -> (Status, Vec<ScoredMember>) {
        self.range_by_rank(key, start, stop, withscore, true)
    }

    fn range_by_rank(
        &self,
        key: &Bytes,
        start: i64,
        stop: i64,
        withscore: bool,
        reverse: bool,
    ) -> (Status, Vec<ScoredMember>) {
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.read_record(key, DataType::ZSet) {
            return (status, Vec::new());
        }
        let len = match self.engine.zcard(key) {
            Ok(len) => len,
            Err(e) => return (engine_status(e), Vec::new()),
        };
        let Some((start, stop)) = normalize_range(start, stop, len) else {
            return (Status::OkRangeEmpty, Vec::new());
        };
        // Descending ranks map onto the mirrored ascending window.
        let (lo, hi) = if reverse {
            (len - 1 - stop, len - 1 - start)
        } else {
            (start, stop)
        };

        match self.engine.zrange_by_rank(key, lo, hi) {
            Ok(mut entries) => {
                if reverse {
                    entries.reverse();
                }
                (Status::Ok, to_members(entries, withscore))
            }
            Err(e) => (engine_status(e), Vec::new()),
        }
    }

    /// Members with `min <= score <= max`; `reverse` only flips the output
    /// order.
    pub fn zrange_by_score(
        &self,
        key: &Bytes,
        min: &str,
        max: &str,
        withscore: bool,
        reverse: bool,
    ) -> (Status, Vec<ScoredMember>) {
        let (Some(min), Some(max)) = (parse_score(min), parse_score(max)) else {
            return (Status::NotANumber, Vec::new());
        };
        let _guard = self.locks.lock_key(key);
        if let Err(status) = self.read_record(key, DataType::ZSet) {
            return (status, Vec::new());
        }
        match self.engine.zrange_by_score(key, min, max) {
            Ok(entries) if entries.is_empty() => (Status::OkRangeEmpty, Vec::new()),
            Ok(mut entries) => {
                if reverse {
                    entries.reverse();
                }
                (Status::Ok, to_members(entries, withscore))
            }
            Err(e) => (engine_status(e), Vec::new()),
        }
    }

    /// Removes members with `min <= score <= max`, returning how many went.
    ///
    /// `version` must not be older than the key's current version.
    pub fn zrem_range_by_score(
        &self,
        key: &Bytes,
        min: &str,
        max: &str,
        version: Version,
        meta: &MetaData,
    ) -> (Status, u64) {
        if let Err(status) = reject_zero(version) {
            return (status, 0);
        }
        let (Some(min), Some(max)) = (parse_score(min), parse_score(max)) else {
            return (Status::NotANumber, 0);
        };
        let _guard = self.locks.lock_key(key);
        match self.precheck(key, meta, Some(DataType::ZSet)) {
            Ok(Some(record)) if record.version > version => return (Status::VersionMismatch, 0),
            Ok(Some(_)) => {}
            Ok(None) => return (Status::OkButNotExist, 0),
            Err(status) => return (status, 0),
        }
        match self.engine.zrem_by_score(key, min, max, version) {
            Ok(0) => (Status::OkRangeEmpty, 0),
            Ok(n) => (Status::Ok, n as u64),
            Err(e) => (engine_status(e), 0),
        }
    }

    /// Removes members with ascending rank in `start..=stop`, returning how
    /// many went. Negative indices count from the end.
    ///
    /// `version` must not be older than the key's current version.
    pub fn zrem_range_by_rank(
        &self,
        key: &Bytes,
        start: i64,
        stop: i64,
        version: Version,
        meta: &MetaData,
    ) -> (Status, u64) {
        if let Err(status) = reject_zero(version) {
            return (status, 0);
        }
        let _guard = self.locks.lock_key(key);
        match self.precheck(key, meta, Some(DataType::ZSet)) {
            Ok(Some(record)) if record.version > version => return (Status::VersionMismatch, 0),
            Ok(Some(_)) => {}
            Ok(None) => return (Status::OkButNotExist, 0),
            Err(status) => return (status, 0),
        }

        let len = match self.engine.zcard(key) {
            Ok(len) => len,
            Err(e) => return (engine_status(e), 0),
        };
        let Some((start, stop)) = normalize_range(start, stop, len) else {
            return (Status::OkRangeEmpty, 0);
        };
        let doomed = match self.engine.zrange_by_rank(key, start, stop) {
            Ok(entries) => entries,
            Err(e) => return (engine_status(e), 0),
        };

        let mut removed = 0;
        for (member, _, _) in &doomed {
            match self.engine.zrem(key, member, version) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => return (engine_status(e), removed),
            }
        }
        (Status::Ok, removed)
    }

    /// Ascending rank of `member`.
    pub fn zrank(&self, key: &Bytes, member: &Bytes) -> (Status, u64) {
        self.rank(key, member, false)
    }

    /// Descending rank of `member`.
    pub fn zrevrank(&self, key: &Bytes, member: &Bytes) -> (Status, u64) {
        self.rank(key, member, true)
    }

    fn rank(&self, key: &Bytes, member: &Bytes, reverse: bool) -> (Status, u64) {
        let _guard = self.locks.lock_key(key);
        let rank = match self.engine.zrank(key, member) {
            Ok(Some(rank)) => rank,
            Ok(None) => return (Status::OkButNotExist, 0),
            Err(e) => return (engine_status(e), 0),
        };
        if !reverse {
            return (Status::Ok, rank as u64);
        }
        match self.engine.zcard(key) {
            Ok(len) => (Status::Ok, (len - 1 - rank) as u64),
            Err(e) => (engine_status(e), 0),
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

    fn seeded() -> crate::commands::CommandProcessor<crate::storage::MemoryEngine> {
        let p = processor();
        let (status, _) = p.zadd(
            &b("z"),
            vec![
                ScoredValue::new(b("a"), 10, v(1)),
                ScoredValue::new(b("b"), 5, v(1)),
                ScoredValue::new(b("c"), 20, v(1)),
            ],
            &meta(),
        );
        assert_eq!(status, Status::Ok);
        p
    }

    fn names(members: &[ScoredMember]) -> Vec<Bytes> {
        members.iter().map(|m| m.member.clone()).collect()
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("42"), Some(42));
        assert_eq!(parse_score("-7"), Some(-7));
        assert_eq!(parse_score("-inf"), Some(i64::MIN));
        assert_eq!(parse_score("+inf"), Some(i64::MAX));
        assert_eq!(parse_score("1.5"), None);
        assert_eq!(parse_score("abc"), None);
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 3), Some((0, 2)));
        assert_eq!(normalize_range(-2, -1, 3), Some((1, 2)));
        assert_eq!(normalize_range(1, 100, 3), Some((1, 2)));
        assert_eq!(normalize_range(-100, 0, 3), Some((0, 0)));
        assert_eq!(normalize_range(2, 1, 3), None);
        assert_eq!(normalize_range(5, 10, 3), None);
        assert_eq!(normalize_range(0, -1, 0), None);
    }

    #[test]
    fn test_zrange_ordering() {
        let p = seeded();
        let (status, members) = p.zrange(&b("z"), 0, -1, true);
        assert_eq!(status, Status::Ok);
        assert_eq!(names(&members), vec![b("b"), b("a"), b("c")]);
        let scores: Vec<Option<i64>> = members.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![Some(5), Some(10), Some(20)]);

        let (_, rev) = p.zrevrange(&b("z"), 0, -1, true);
        let mut expected = members.clone();
        expected.reverse();
        assert_eq!(rev, expected);
    }

    #[test]
    fn test_zrange_without_scores_and_partial() {
        let p = seeded();
        let (_, members) = p.zrange(&b("z"), 1, 1, false);
        assert_eq!(names(&members), vec![b("a")]);
        assert_eq!(members[0].score, None);

        let (_, members) = p.zrevrange(&b("z"), 0, 1, false);
        assert_eq!(names(&members), vec![b("c"), b("a")]);

        assert_eq!(p.zrange(&b("z"), 5, 10, false).0, Status::OkRangeEmpty);
        assert_eq!(p.zrange(&b("none"), 0, -1, false).0, Status::OkButNotExist);
    }

    #[test]
    fn test_zadd_statuses() {
        let p = seeded();
        let (_, statuses) = p.zadd(
            &b("z"),
            vec![
                ScoredValue::new(b("a"), 1, v(2)),
                ScoredValue::new(b("b"), 1, v(1)),
                ScoredValue::new(b("d"), 1, v(0)),
                ScoredValue::new(b("e"), 1, v(2)),
            ],
            &meta(),
        );
        assert_eq!(
            statuses,
            vec![
                Status::OkButAlreadyExists,
                Status::VersionMismatch,
                Status::Error,
                Status::Ok
            ]
        );
        assert_eq!(p.zscore(&b("z"), &b("a")), (Status::Ok, 1));
        assert_eq!(p.zcard(&b("z")), (Status::Ok, 4));
    }

    #[test]
    fn test_zadd_wrong_type() {
        let p = processor();
        p.set(&b("s"), item("v", 1), &meta(), SetOpt::Exist);
        let (status, statuses) = p.zadd(&b("s"), vec![ScoredValue::new(b("a"), 1, v(2))], &meta());
        assert_eq!(status, Status::WrongType);
        assert_eq!(statuses, vec![Status::WrongType]);
    }

    #[test]
    fn test_zrem() {
        let p = seeded();
        let (status, statuses) = p.zrem(
            &b("z"),
            vec![item("a", 1), item("missing", 1), item("b", 0)],
            &meta(),
        );
        assert_eq!(status, Status::Ok);
        assert_eq!(statuses, vec![Status::Ok, Status::OkButNotExist, Status::Error]);
        assert_eq!(p.zcard(&b("z")), (Status::Ok, 2));
    }

    #[test]
    fn test_zrange_by_score() {
        let p = seeded();
        let (status, members) = p.zrange_by_score(&b("z"), "5", "10", true, false);
        assert_eq!(status, Status::Ok);
        assert_eq!(names(&members), vec![b("b"), b("a")]);

        let (_, members) = p.zrange_by_score(&b("z"), "-inf", "+inf", false, true);
        assert_eq!(names(&members), vec![b("c"), b("a"), b("b")]);

        assert_eq!(p.zrange_by_score(&b("z"), "11", "19", false, false).0, Status::OkRangeEmpty);
        assert_eq!(p.zrange_by_score(&b("z"), "20", "5", false, false).0, Status::OkRangeEmpty);
        assert_eq!(p.zrange_by_score(&b("z"), "x", "5", false, false).0, Status::NotANumber);
    }

    #[test]
    fn test_zcount() {
        let p = seeded();
        assert_eq!(p.zcount(&b("z"), "5", "10"), (Status::Ok, 2));
        assert_eq!(p.zcount(&b("z"), "-inf", "inf"), (Status::Ok, 3));
        assert_eq!(p.zcount(&b("z"), "five", "10").0, Status::NotANumber);
        assert_eq!(p.zcount(&b("none"), "0", "1").0, Status::OkButNotExist);
    }

    #[test]
    fn test_zrem_range_by_score() {
        let p = seeded();
        assert_eq!(p.zrem_range_by_score(&b("z"), "0", "10", v(0), &meta()).0, Status::Error);
        assert_eq!(
            p.zrem_range_by_score(&b("z"), "0", "10", v(5), &meta()),
            (Status::Ok, 2)
        );
        assert_eq!(
            p.zrem_range_by_score(&b("z"), "0", "10", v(5), &meta()),
            (Status::OkRangeEmpty, 0)
        );
        assert_eq!(
            p.zrem_range_by_score(&b("z"), "0", "100", v(4), &meta()).0,
            Status::VersionMismatch
        );
        assert_eq!(p.zrem_range_by_score(&b("z"), "0", "100", v(6), &meta()), (Status::Ok, 1));
        assert_eq!(p.exists(&b("z")), Status::OkButNotExist);
    }

    #[test]
    fn test_zincrby() {
        let p = seeded();
        assert_eq!(p.zincrby(&b("z"), &b("a"), v(2), 5, &meta()), (Status::Ok, 15));
        assert_eq!(p.zscore(&b("z"), &b("a")), (Status::Ok, 15));
        assert_eq!(p.zrank(&b("z"), &b("a")), (Status::Ok, 1));

        // missing member starts from 0
        assert_eq!(p.zincrby(&b("z"), &b("d"), v(3), -4, &meta()), (Status::Ok, -4));
        assert_eq!(p.zrank(&b("z"), &b("d")), (Status::Ok, 0));
        assert_eq!(p.zincrby(&b("fresh"), &b("m"), v(1), 7, &meta()), (Status::Ok, 7));

        assert_eq!(p.zincrby(&b("z"), &b("a"), v(2), 1, &meta()).0, Status::VersionMismatch);
        assert_eq!(p.zincrby(&b("z"), &b("a"), v(0), 1, &meta()).0, Status::Error);
        assert_eq!(p.zincrby(&b("z"), &b("c"), v(4), i64::MAX, &meta()).0, Status::Overflow);
        assert_eq!(p.zscore(&b("z"), &b("c")), (Status::Ok, 20));

        p.set(&b("s"), item("v", 1), &meta(), SetOpt::Exist);
        assert_eq!(p.zincrby(&b("s"), &b("m"), v(2), 1, &meta()).0, Status::WrongType);
    }

    #[test]
    fn test_zrem_range_by_rank() {
        let p = seeded();
        assert_eq!(p.zrem_range_by_rank(&b("z"), 0, 0, v(0), &meta()).0, Status::Error);
        assert_eq!(p.zrem_range_by_rank(&b("none"), 0, -1, v(2), &meta()).0, Status::OkButNotExist);

        // drops "b", the lowest score
        assert_eq!(p.zrem_range_by_rank(&b("z"), 0, 0, v(2), &meta()), (Status::Ok, 1));
        assert_eq!(p.zrank(&b("z"), &b("b")).0, Status::OkButNotExist);
        assert_eq!(p.zrem_range_by_rank(&b("z"), 5, 10, v(2), &meta()), (Status::OkRangeEmpty, 0));
        assert_eq!(
            p.zrem_range_by_rank(&b("z"), -1, -1, v(1), &meta()).0,
            Status::VersionMismatch
        );

        // drops "c", the highest score
        assert_eq!(p.zrem_range_by_rank(&b("z"), -1, -1, v(3), &meta()), (Status::Ok, 1));
        assert_eq!(names(&p.zrange(&b("z"), 0, -1, false).1), vec![b("a")]);
        assert_eq!(p.zrem_range_by_rank(&b("z"), 0, -1, v(4), &meta()), (Status::Ok, 1));
        assert_eq!(p.exists(&b("z")), Status::OkButNotExist);
    }

    #[test]
    fn test_zrank_and_zrevrank() {
        let p = seeded();
        assert_eq!(p.zrank(&b("z"), &b("b")), (Status::Ok, 0));
        assert_eq!(p.zrank(&b("z"), &b("c")), (Status::Ok, 2));
        assert_eq!(p.zrevrank(&b("z"), &b("c")), (Status::Ok, 0));
        assert_eq!(p.zrevrank(&b("z"), &b("b")), (Status::Ok, 2));
        assert_eq!(p.zrank(&b("z"), &b("nope")).0, Status::OkButNotExist);
    }
}
