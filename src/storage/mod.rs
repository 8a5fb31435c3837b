//! Storage Module
//!
//! Everything below the command layer: the value types, version minting,
//! the key lock manager, the [`Engine`] boundary with its in-memory
//! implementation, and the background expiration reaper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KeyLockManager                           │
//! │  global RwLock  +  ┌─────────┐ ┌─────────┐ ┌─────────┐      │
//! │                    │ Mutex 0 │ │ Mutex 1 │ │ Mutex N │      │
//! │                    └─────────┘ └─────────┘ └─────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Engine (MemoryEngine)                      │
//! │    strings · hashes · sets · sorted sets · expiry index     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │   ExpirationReaper        │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use verkv::storage::{mint_version, ExpiryMode, TtlUnit};
//!
//! let version = mint_version();
//! assert!(mint_version() > version);
//!
//! let at = ExpiryMode::Absolute.expire_at_from(1_000, 5, TtlUnit::Seconds, version);
//! assert_eq!(at, 6_000);
//! ```

pub mod engine;
pub mod expiry;
pub mod lock;
pub mod memory;
pub mod types;
pub mod version;

pub use engine::{Engine, EngineOptions, ZEntry};
pub use expiry::{ExpirationReaper, ReaperConfig};
pub use lock::{GlobalGuard, KeyGuard, KeyLockManager, MultiKeyGuard};
pub use memory::MemoryEngine;
pub use types::{
    DataType, MetaData, Record, ScoredMember, ScoredValue, SetOpt, Status, ValueItem, Version,
};
pub use version::{mint_version, now_ms, now_us, remaining_ms, ExpiryMode, TtlUnit};
