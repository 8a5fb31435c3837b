//! # verkv - A Versioned, Concurrency-Safe Command Layer over a Multi-Type KV Engine
//!
//! verkv puts typed, Redis-like commands in front of a key-value engine that
//! stores strings, hashes, sets and sorted sets with per-key expiry. Every write
//! carries a version; the command layer makes sure concurrent commands on the
//! same key are serialized and that stale writes are rejected.
//!
//! ## Features
//!
//! - **Per-Key Serialization**: A sharded lock manager serializes commands on
//!   keys that hash to the same shard while other keys proceed in parallel
//! - **Versioned Writes**: Optimistic concurrency through per-call version
//!   expectations and monotonic version minting
//! - **TTL Support**: Relative TTLs become absolute deadlines; expired keys are
//!   hidden immediately and reclaimed in the background
//! - **Pluggable Engine**: Anything implementing [`Engine`](storage::Engine)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Storage                                   │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                       CommandProcessor                           │   │
//! │  │   validate ──> KeyLockManager ──> version checks ──> engine call │   │
//! │  └───────────────────────────────┬──────────────────────────────────┘   │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                    Engine (MemoryEngine)                         │   │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐   expiry index      │   │
//! │  │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │   (expire_at, key)  │   │
//! │  │  └────────┘ └────────┘ └────────┘ └────────┘                     │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │                                  ▲                                      │
//! │                                  │                                      │
//! │                ┌─────────────────┴───────────────────────┐              │
//! │                │          ExpirationReaper               │              │
//! │                │       (Background Tokio Task)           │              │
//! │                └─────────────────────────────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use verkv::storage::{mint_version, MetaData, SetOpt, Status, ValueItem};
//! use verkv::{Config, Storage};
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage: Storage = Storage::open(Config::new("./data"))?;
//!
//!     let key = Bytes::from("name");
//!     let status = storage.set(
//!         &key,
//!         ValueItem::new("Ariz", mint_version()),
//!         &MetaData::default(),
//!         SetOpt::Exist,
//!     );
//!     assert_eq!(status, Status::Ok);
//!
//!     let (_, item) = storage.get(&key);
//!     assert_eq!(item.value, Bytes::from("Ariz"));
//!
//!     storage.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Value types, versions, key locks, the engine boundary and
//!   the expiration reaper
//! - [`commands`]: The command processor
//! - [`config`]: Storage configuration
//! - [`error`]: Engine and setup errors
//!
//! ## Design Highlights
//!
//! ### Lock Ordering
//!
//! Single-key commands take the global lock shared, then one shard mutex.
//! Multi-key commands lock their distinct shards in ascending order. Commands
//! that need a consistent view of everything (`del`, `hgetall`, the reaper's
//! fetch, `finalize`) take the global lock exclusively.
//!
//! ### Lazy + Active Expiry
//!
//! 1. **Lazy**: The engine treats a key past its deadline as absent
//! 2. **Active**: The reaper deletes expired keys in batches, through the
//!    same versioned `del` every caller uses

pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

pub use commands::CommandProcessor;
pub use config::Config;
pub use error::{EngineError, EngineResult, StorageError};

use std::ops::Deref;
use std::sync::Arc;
use storage::{Engine, ExpirationReaper, MemoryEngine, Status};
use tracing::{info, warn};

/// Version of verkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An opened store: the command processor plus its running reaper.
///
/// Derefs to [`CommandProcessor`], so commands are called directly on it.
#[derive(Debug)]
pub struct Storage<E: Engine = MemoryEngine> {
    processor: Arc<CommandProcessor<E>>,
    reaper: ExpirationReaper,
}

impl<E: Engine> Storage<E> {
    /// Opens the engine described by `config` and starts the reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: Config) -> Result<Self, StorageError> {
        config.validate()?;
        config.ensure_dirs()?;

        let engine = E::open(&config.engine_options())?;
        let processor = Arc::new(CommandProcessor::new(
            engine,
            config.shard_count,
            config.expiry_mode,
        ));
        let reaper = ExpirationReaper::start(Arc::clone(&processor), config.reaper);

        info!(
            data_dir = %config.data_dir.display(),
            shards = config.shard_count,
            expiry_mode = ?config.expiry_mode,
            "Storage opened"
        );

        Ok(Self { processor, reaper })
    }

    /// A shared handle to the processor, for use from other tasks or threads.
    pub fn processor(&self) -> Arc<CommandProcessor<E>> {
        Arc::clone(&self.processor)
    }

    /// Stops the reaper, then closes the engine.
    pub async fn close(self) -> Status {
        let Storage { processor, reaper } = self;
        reaper.shutdown().await;
        let status = processor.finalize();
        if status != Status::Ok {
            warn!(status = %status, "Engine did not close cleanly");
        }
        status
    }
}

impl<E: Engine> Deref for Storage<E> {
    type Target = CommandProcessor<E>;

    fn deref(&self) -> &Self::Target {
        &self.processor
    }
}
