//! Short-TTL cache for the eligible-identity list
//!
//! Selection runs on every outbound message; refetching and re-resetting
//! the full identity list each time would dominate the cost. This cache
//! bounds repeated reads to one backend fetch per TTL window.
//!
//! Unlike a module-global with a timestamp, the cache is an explicit
//! component owned by the state store, with an `invalidate()` hook every
//! write calls, so a just-paused or just-exhausted identity is never
//! served for longer than the write takes to land.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::types::SendingIdentity;

/// Configuration for the eligible-list cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached list stays valid (default: 30s)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

const fn default_ttl_secs() -> u64 {
    30
}

/// Cached identity list with its expiry time.
#[derive(Debug)]
struct CachedList {
    identities: Arc<Vec<SendingIdentity>>,
    expires_at: Instant,
}

/// One-slot TTL cache over the active identity list.
#[derive(Debug)]
pub struct EligibleCache {
    ttl: Duration,
    slot: parking_lot::Mutex<Option<CachedList>>,
}

impl EligibleCache {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            slot: parking_lot::Mutex::new(None),
        }
    }

    /// The cached list, if present and unexpired.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Vec<SendingIdentity>>> {
        let slot = self.slot.lock();
        slot.as_ref().and_then(|cached| {
            (cached.expires_at > Instant::now()).then(|| Arc::clone(&cached.identities))
        })
    }

    /// Replace the cached list, restarting the TTL window.
    pub fn store(&self, identities: Arc<Vec<SendingIdentity>>) {
        let mut slot = self.slot.lock();
        *slot = Some(CachedList {
            identities,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Drop the cached list immediately.
    ///
    /// Called on every state write so stale capacity or pause state
    /// cannot outlive the write.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock();
        *slot = None;
    }
}
