//! Command Processor Module
//!
//! Typed commands over an [`Engine`](crate::storage::Engine). Each command
//! validates its arguments, takes the key locks it needs, applies the
//! version and existence rules, calls the engine and reports a
//! [`Status`](crate::storage::Status).
//!
//! ## Architecture
//!
//! ```text
//! Caller (any thread)
//!       │
//!       ▼
//! ┌──────────────────────┐
//! │  CommandProcessor    │  (this module)
//! │                      │
//! │  - Validate          │
//! │  - Lock              │
//! │  - Version check     │
//! │  - Execute           │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │  Engine              │  (storage module)
//! └──────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `set`, `set_ex`, `set_with_second`, `get`, `get_set`, `del`
//! - `incr`, `incrby`, `decr`, `decrby`
//! - `mset`, `mget`
//!
//! ### Hash Commands
//! - `hset`, `hget`, `hmset`, `hmget`, `hdel`, `hincrby`
//! - `hexists`, `hlen`, `hgetall`, `hkeys`, `hvals`
//!
//! ### Set Commands
//! - `sadd`, `srem`, `spop`, `smembers`, `scard`, `sismember`
//!
//! ### Sorted-Set Commands
//! - `zadd`, `zrem`, `zincrby`, `zcard`, `zscore`, `zcount`, `zrank`, `zrevrank`
//! - `zrange`, `zrevrange`, `zrange_by_score`
//! - `zrem_range_by_score`, `zrem_range_by_rank`
//!
//! ### Key Commands
//! - `expire`, `pexpire`, `persist`, `ttl`, `pttl`
//! - `exists`, `key_type`, `key_version`, `rename`

mod handler;
mod hash;
mod keys;
mod set;
mod string;
mod zset;

pub use handler::CommandProcessor;
