//! Core value types shared by the command layer and the engine.

use bytes::Bytes;
use std::fmt;

/// Outcome of a command.
///
/// `Ok*` variants mean the command ran; everything else means it either
/// did not run (validation) or failed in the engine. The numeric codes are
/// stable and exposed through [`Status::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    /// Existence precondition failed because the key is already present.
    OkButAlreadyExists,
    /// The key (or field, or member) does not exist.
    OkButNotExist,
    /// A range query matched nothing on an existing key.
    OkRangeEmpty,
    Error,
    WrongArgCount,
    VersionMismatch,
    WrongType,
    NotANumber,
    Overflow,
    OutOfRange,
    NoExpireSet,
}

impl Status {
    /// Stable integer code for this status.
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::OkButNotExist => 3,
            Status::OkButAlreadyExists => 5,
            Status::OkRangeEmpty => -12,
            Status::Error => -1,
            Status::WrongArgCount => -5,
            Status::VersionMismatch => -11,
            Status::WrongType => -13,
            Status::NotANumber => -15,
            Status::Overflow => -16,
            Status::OutOfRange => -19,
            Status::NoExpireSet => -26,
        }
    }

    /// True for `Ok` and the `OkBut*`/`OkRangeEmpty` outcomes.
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(
            self,
            Status::Ok | Status::OkButAlreadyExists | Status::OkButNotExist | Status::OkRangeEmpty
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::OkButAlreadyExists => "OK_BUT_ALREADY_EXISTS",
            Status::OkButNotExist => "OK_BUT_NOT_EXIST",
            Status::OkRangeEmpty => "OK_RANGE_EMPTY",
            Status::Error => "ERROR",
            Status::WrongArgCount => "ERROR_WRONG_ARG_COUNT",
            Status::VersionMismatch => "ERROR_VERSION_MISMATCH",
            Status::WrongType => "ERROR_WRONG_TYPE",
            Status::NotANumber => "ERROR_NOT_A_NUMBER",
            Status::Overflow => "ERROR_OVERFLOW",
            Status::OutOfRange => "ERROR_OUT_OF_RANGE",
            Status::NoExpireSet => "ERROR_NO_EXPIRE_SET",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// A write version.
///
/// The upper 56 bits carry the mint time in microseconds, the low 8 bits a
/// sub-counter. `Version::ZERO` means "unversioned" and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Version(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Mint time encoded in the version, in microseconds since the epoch.
    #[inline]
    pub const fn mint_time_us(self) -> u64 {
        self.0 >> 8
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Version(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value together with the version that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueItem {
    pub value: Bytes,
    pub version: Version,
}

impl ValueItem {
    pub fn new(value: impl Into<Bytes>, version: Version) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }

    /// The "no value" marker returned for absent keys and fields.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.value.is_empty() && self.version.is_zero()
    }
}

/// Per-call optimistic-concurrency and expiry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetaData {
    /// Version the caller expects the key to be at.
    pub last_version: Version,
    /// Whether `last_version` must match the stored version.
    pub version_care: bool,
    /// Absolute expiry in epoch milliseconds, 0 for none.
    pub expire_time: u64,
}

impl MetaData {
    /// Meta that requires the key to currently be at `version`.
    pub fn expecting(version: Version) -> Self {
        Self {
            last_version: version,
            version_care: true,
            expire_time: 0,
        }
    }

    pub fn with_expire_time(mut self, expire_at_ms: u64) -> Self {
        self.expire_time = expire_at_ms;
        self
    }

    /// `expire_time` as an optional instant.
    #[inline]
    pub fn expire_at(&self) -> Option<u64> {
        (self.expire_time > 0).then_some(self.expire_time)
    }
}

/// Existence precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpt {
    /// Write only if the key is absent.
    NotExist,
    /// Write whether or not the key exists.
    Exist,
    /// Like `NotExist`, applying `MetaData::expire_time` with the write.
    NotExistAndExpire,
    /// Like `Exist`, applying `MetaData::expire_time` with the write.
    ExistAndExpire,
}

impl SetOpt {
    #[inline]
    pub fn requires_absent(self) -> bool {
        matches!(self, SetOpt::NotExist | SetOpt::NotExistAndExpire)
    }

    #[inline]
    pub fn applies_expire(self) -> bool {
        matches!(self, SetOpt::NotExistAndExpire | SetOpt::ExistAndExpire)
    }
}

/// Kind of value a key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Hash,
    Set,
    ZSet,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Hash => "hash",
            DataType::Set => "set",
            DataType::ZSet => "zset",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-side metadata of a live key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub kind: DataType,
    /// Highest version written to any part of the key.
    pub version: Version,
    /// Absolute expiry in epoch milliseconds.
    pub expire_at: Option<u64>,
}

/// A sorted-set member to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredValue {
    pub member: Bytes,
    pub score: i64,
    pub version: Version,
}

impl ScoredValue {
    pub fn new(member: impl Into<Bytes>, score: i64, version: Version) -> Self {
        Self {
            member: member.into(),
            score,
            version,
        }
    }
}

/// A sorted-set member as returned by range queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: Bytes,
    pub version: Version,
    /// Present only when the caller asked for scores.
    pub score: Option<i64>,
}
