use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::errors::AuthError;

const DEFAULT_WINDOW_SECS: i64 = 60;
const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    window: i64,
    count: u32,
}

/// Per-key fixed-window rate limiter.
///
/// Windows are clock-aligned: `window = floor(unix_seconds / window_secs)`.
/// Counters live in a sharded map so concurrent checks for the same key
/// serialize on that key's shard while distinct keys rarely contend. The
/// fixed-window scheme permits up to 2x the limit across a window boundary;
/// that imprecision is accepted in exchange for O(1) state per active key.
///
/// Only admitted requests are counted, so a stored count never exceeds the
/// key's limit.
#[derive(Clone)]
pub struct RateLimiter {
    window_secs: i64,
    shards: Arc<Vec<Mutex<HashMap<i64, WindowEntry>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SECS)
    }

    pub fn with_window(window_secs: i64) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            window_secs,
            shards: Arc::new(shards),
        }
    }

    /// Admits or throttles one request for `key_id` at time `now`.
    ///
    /// An entry left over from an earlier window is reset in place, which
    /// doubles as lazy eviction for keys that stay active.
    pub fn check(&self, key_id: i64, limit: u32, now: DateTime<Utc>) -> Result<(), AuthError> {
        let secs = now.timestamp();
        let window = secs.div_euclid(self.window_secs);

        let mut shard = self.shard(key_id).lock().map_err(|_| AuthError::Unavailable)?;
        let entry = shard
            .entry(key_id)
            .or_insert(WindowEntry { window, count: 0 });
        if entry.window != window {
            *entry = WindowEntry { window, count: 0 };
        }

        if entry.count >= limit {
            let retry_after = (window + 1) * self.window_secs - secs;
            return Err(AuthError::RateLimited {
                retry_after: retry_after as u64,
            });
        }
        entry.count += 1;
        Ok(())
    }

    /// Requests left in the current window, for response headers.
    pub fn remaining(&self, key_id: i64, limit: u32, now: DateTime<Utc>) -> u32 {
        let window = now.timestamp().div_euclid(self.window_secs);
        let shard = match self.shard(key_id).lock() {
            Ok(shard) => shard,
            Err(_) => return limit,
        };
        match shard.get(&key_id) {
            Some(entry) if entry.window == window => limit.saturating_sub(entry.count),
            _ => limit,
        }
    }

    /// Drops every counter from a past window. Lazy eviction in `check`
    /// covers keys that keep making requests; this sweep reclaims state for
    /// keys that went quiet.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let window = now.timestamp().div_euclid(self.window_secs);
        for shard in self.shards.iter() {
            if let Ok(mut shard) = shard.lock() {
                shard.retain(|_, entry| entry.window == window);
            }
        }
    }

    /// Number of tracked counters, across all shards.
    pub fn tracked_keys(&self) -> usize {
        self.shards
            .iter()
            .filter_map(|shard| shard.lock().ok())
            .map(|shard| shard.len())
            .sum()
    }

    fn shard(&self, key_id: i64) -> &Mutex<HashMap<i64, WindowEntry>> {
        let mut hasher = DefaultHasher::new();
        key_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
