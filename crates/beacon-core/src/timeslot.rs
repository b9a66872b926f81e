//! Time-windowed key scheme.
//!
//! Announce and lookup keys carry the start of the wall-clock window they
//! were derived in. A lookup asks for the current and the previous window,
//! so a service that re-announces at least once per window stays visible and
//! one that stops becomes unreachable within two windows. Nothing is ever
//! swept: old keys simply stop being asked for.

use std::time::{SystemTime, UNIX_EPOCH};

/// Window arithmetic over Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeslot {
    window_ms: u64,
}

impl Timeslot {
    /// `window_ms` must be non-zero; `BeaconConfig::validate` enforces it.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: window_ms.max(1),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Start of the window `offset` windows away from now.
    pub fn bucket(&self, offset: i64) -> i64 {
        self.bucket_at(offset, now_ms())
    }

    /// Start of the window `offset` windows away from `now_ms`.
    pub fn bucket_at(&self, offset: i64, now_ms: i64) -> i64 {
        let window = self.window_ms as i64;
        let ts = now_ms + offset * window;
        ts - ts.rem_euclid(window)
    }

    /// Key a service is announced under right now.
    pub fn announce_key(&self, name: &str) -> String {
        self.announce_key_at(name, now_ms())
    }

    pub fn announce_key_at(&self, name: &str, now_ms: i64) -> String {
        format!("{}-{}", name, self.bucket_at(0, now_ms))
    }

    /// Keys a lookup asks for: current window first, then the previous one.
    pub fn lookup_keys(&self, name: &str) -> [String; 2] {
        self.lookup_keys_at(name, now_ms())
    }

    pub fn lookup_keys_at(&self, name: &str, now_ms: i64) -> [String; 2] {
        [
            format!("{}-{}", name, self.bucket_at(0, now_ms)),
            format!("{}-{}", name, self.bucket_at(-1, now_ms)),
        ]
    }
}

/// Milliseconds since the Unix epoch. A clock before the epoch reads as 0.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
