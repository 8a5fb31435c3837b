//! Version clock and expiry translation.
//!
//! Versions are minted from the wall clock: microseconds since the epoch
//! shifted left by 8 bits, leaving the low byte as a sub-counter. Minting is
//! strictly increasing within a process; two calls in the same microsecond
//! get consecutive sub-counter values.
//!
//! Expiry instants are always absolute epoch milliseconds. [`ExpiryMode`]
//! decides how a caller's relative TTL is turned into one:
//!
//! ```text
//!   Absolute:         expire_at = now + max(1, ttl_ms)
//!   VersionRelative:  age       = now - mint_ms(version)
//!                     expire_at = now + max(1, ttl_ms - age)
//! ```
//!
//! Both forms floor the relative part to 1ms so a computed expiry is never
//! in the past.

use crate::storage::Version;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_MINTED: AtomicU64 = AtomicU64::new(0);

/// Current time in milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Current time in microseconds since the Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Mints a fresh version from the wall clock.
pub fn mint_version() -> Version {
    let candidate = now_us() << 8;
    let prev = LAST_MINTED
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(candidate.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    Version::new(candidate.max(prev + 1))
}

/// Unit of a caller-supplied TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Seconds,
    Milliseconds,
}

impl TtlUnit {
    /// Converts `ttl` in this unit to milliseconds, saturating.
    #[inline]
    pub fn to_millis(self, ttl: u64) -> u64 {
        match self {
            TtlUnit::Seconds => ttl.saturating_mul(1000),
            TtlUnit::Milliseconds => ttl,
        }
    }
}

/// How relative TTLs become absolute expiry instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryMode {
    /// TTL counts from now, regardless of the version.
    #[default]
    Absolute,
    /// TTL counts from the version's mint time. Versions minted in the
    /// future (clock skew) or version 0 fall back to counting from now.
    VersionRelative,
}

impl ExpiryMode {
    /// Absolute expiry for a TTL of `ttl` `unit`s, evaluated at `now`.
    pub fn expire_at_from(self, now: u64, ttl: u64, unit: TtlUnit, version: Version) -> u64 {
        let ttl_ms = unit.to_millis(ttl);
        let relative = match self {
            ExpiryMode::Absolute => ttl_ms,
            ExpiryMode::VersionRelative if version.is_zero() => ttl_ms,
            ExpiryMode::VersionRelative => {
                let minted_ms = version.mint_time_us() / 1000;
                let age = now.saturating_sub(minted_ms);
                ttl_ms.saturating_sub(age)
            }
        };
        now.saturating_add(relative.max(1))
    }

    /// Absolute expiry for a TTL of `ttl` `unit`s from the current time.
    #[inline]
    pub fn expire_at(self, ttl: u64, unit: TtlUnit, version: Version) -> u64 {
        self.expire_at_from(now_ms(), ttl, unit, version)
    }
}

/// Milliseconds left until `expire_at`, clamped to 0.
#[inline]
pub fn remaining_ms(expire_at: u64) -> u64 {
    expire_at.saturating_sub(now_ms())
}
