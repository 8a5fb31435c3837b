//! Command Processor core.
//!
//! `CommandProcessor` owns the engine, the key lock manager and the expiry
//! mode. The operations themselves live in one `impl` block per data type
//! (`string.rs`, `hash.rs`, `zset.rs`, `keys.rs`); this file holds the
//! pieces they share.
//!
//! Every operation follows the same shape:
//!
//! ```text
//!   validate arguments ──(bad)──────────────────────────────> Status
//!          │
//!   lock (key / keys / global)
//!          │
//!   precheck: record, version_care, data type ──(fail)──────> Status
//!          │
//!   engine call ──(EngineError)─────────────────────────────> Status
//!          │
//!   guard dropped ──────────────────────────────────────────> Status (+ data)
//! ```

use crate::error::{EngineError, EngineResult};
use crate::storage::{
    DataType, Engine, ExpiryMode, KeyLockManager, MetaData, Record, Status, Version,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

/// Executes typed commands against an [`Engine`].
///
/// The processor is `Send + Sync` and meant to be shared behind an `Arc`.
pub struct CommandProcessor<E: Engine> {
    pub(crate) engine: E,
    pub(crate) locks: KeyLockManager,
    pub(crate) expiry_mode: ExpiryMode,
}

impl<E: Engine> std::fmt::Debug for CommandProcessor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("locks", &self.locks)
            .field("expiry_mode", &self.expiry_mode)
            .finish()
    }
}

/// Maps an engine failure to the status reported to callers.
pub(crate) fn engine_status(err: EngineError) -> Status {
    match err {
        EngineError::WrongType => Status::WrongType,
        other => {
            warn!(error = %other, "Engine call failed");
            Status::Error
        }
    }
}

/// Rejects version 0 on a written value.
#[inline]
pub(crate) fn reject_zero(version: Version) -> Result<(), Status> {
    if version.is_zero() {
        debug!("Rejecting write with version 0");
        Err(Status::Error)
    } else {
        Ok(())
    }
}

impl<E: Engine> CommandProcessor<E> {
    /// Creates a processor over `engine` with `shard_count` key-lock shards.
    pub fn new(engine: E, shard_count: usize, expiry_mode: ExpiryMode) -> Self {
        Self {
            engine,
            locks: KeyLockManager::new(shard_count),
            expiry_mode,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn locks(&self) -> &KeyLockManager {
        &self.locks
    }

    pub fn expiry_mode(&self) -> ExpiryMode {
        self.expiry_mode
    }

    /// Closes the engine once every in-flight command has finished.
    pub fn finalize(&self) -> Status {
        let _guard = self.locks.lock_global();
        match self.engine.close() {
            Ok(()) => {
                info!("Engine finalized");
                Status::Ok
            }
            Err(e) => engine_status(e),
        }
    }

    /// Fetches up to `limit` expired keys under the global lock.
    pub fn fetch_expired(&self, now_ms: u64, limit: usize) -> EngineResult<Vec<Bytes>> {
        let _guard = self.locks.lock_global();
        self.engine.fetch_expired_batch(now_ms, limit)
    }

    /// Loads the key's record and applies the checks every mutation shares:
    /// `version_care` and, when `kind` is given, the data type.
    ///
    /// Must be called with the key locked.
    pub(crate) fn precheck(
        &self,
        key: &Bytes,
        meta: &MetaData,
        kind: Option<DataType>,
    ) -> Result<Option<Record>, Status> {
        let record = self.engine.record(key).map_err(engine_status)?;
        if meta.version_care {
            let current = record.map(|r| r.version).unwrap_or(Version::ZERO);
            if current != meta.last_version {
                debug!(
                    expected = %meta.last_version,
                    current = %current,
                    "Version mismatch"
                );
                return Err(Status::VersionMismatch);
            }
        }
        if let (Some(kind), Some(record)) = (kind, record) {
            if record.kind != kind {
                return Err(Status::WrongType);
            }
        }
        Ok(record)
    }

    /// Like [`precheck`](Self::precheck), for reads: only the data type.
    pub(crate) fn read_record(&self, key: &Bytes, kind: DataType) -> Result<Record, Status> {
        match self.engine.record(key).map_err(engine_status)? {
            None => Err(Status::OkButNotExist),
            Some(record) if record.kind != kind => Err(Status::WrongType),
            Some(record) => Ok(record),
        }
    }
}
