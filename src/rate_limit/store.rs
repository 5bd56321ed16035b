//! Window Store
//!
//! Shared key-value storage for sliding-window timestamp lists. The limiter
//! only needs `get` and `set` with a TTL, which is what any cache backend
//! offers; [`MemoryWindowStore`] is the in-process implementation.
//!
//! [`MemoryWindowStore`] drops expired lists on every
//! [`SWEEP_EVERY_SETS`]th write, so a limiter embedded without the server's
//! purge loop stays bounded by the number of recently active identities.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::clock::{Clock, SystemClock};
use super::error::RateLimitError;
use super::tier::EndpointClass;

/// Writes between sweeps of expired lists in [`MemoryWindowStore`]
pub const SWEEP_EVERY_SETS: u64 = 1024;

/// Which of the two sliding windows a list belongs to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Hourly window
    Rate,
    /// Per-minute window
    Burst,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Rate => "rate",
            WindowKind::Burst => "burst",
        }
    }
}

/// Key identifying one timestamp list
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct WindowKey {
    /// `user:<id>` or `ip:<address>`
    pub identifier: String,

    pub endpoint_class: EndpointClass,

    pub kind: WindowKind,
}

impl WindowKey {
    pub fn new(identifier: &str, endpoint_class: EndpointClass, kind: WindowKind) -> Self {
        Self {
            identifier: identifier.to_string(),
            endpoint_class,
            kind,
        }
    }

    pub fn rate(identifier: &str, endpoint_class: EndpointClass) -> Self {
        Self::new(identifier, endpoint_class, WindowKind::Rate)
    }

    pub fn burst(identifier: &str, endpoint_class: EndpointClass) -> Self {
        Self::new(identifier, endpoint_class, WindowKind::Burst)
    }

    /// Cache key, e.g. `rate_limit:ip:10.0.0.1:api:burst`
    pub fn cache_key(&self) -> String {
        format!(
            "rate_limit:{}:{}:{}",
            self.identifier,
            self.endpoint_class,
            self.kind.as_str()
        )
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Backend holding timestamp lists
#[async_trait]
pub trait WindowStore: Send + Sync + fmt::Debug {
    /// Read the list stored under `key`, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u64>>, RateLimitError>;

    /// Replace the list under `key`, expiring it after `ttl`
    async fn set(&self, key: &str, timestamps: Vec<u64>, ttl: Duration)
        -> Result<(), RateLimitError>;

    /// Number of live lists, if the backend can tell
    async fn len(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone)]
struct StoredWindow {
    timestamps: Vec<u64>,
    expires_at: u64,
}

/// In-memory window store
#[derive(Debug, Clone)]
pub struct MemoryWindowStore {
    windows: Arc<RwLock<HashMap<String, StoredWindow>>>,
    clock: Arc<dyn Clock>,
    sets: Arc<AtomicU64>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose expiry follows the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            clock,
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop expired lists, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| w.expires_at > now);
        before - windows.len()
    }

    /// Remove everything
    pub async fn clear(&self) {
        self.windows.write().await.clear();
    }

    /// Stored entry count, including expired entries not yet purged
    pub async fn count(&self) -> usize {
        self.windows.read().await.len()
    }
}

impl Default for MemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u64>>, RateLimitError> {
        let now = self.clock.now();
        let windows = self.windows.read().await;
        Ok(windows
            .get(key)
            .filter(|w| w.expires_at > now)
            .map(|w| w.timestamps.clone()))
    }

    async fn set(
        &self,
        key: &str,
        timestamps: Vec<u64>,
        ttl: Duration,
    ) -> Result<(), RateLimitError> {
        let now = self.clock.now();
        let expires_at = now.saturating_add(ttl.as_secs());
        let mut windows = self.windows.write().await;

        let sets = self.sets.fetch_add(1, Ordering::Relaxed) + 1;
        if sets % SWEEP_EVERY_SETS == 0 {
            windows.retain(|_, w| w.expires_at > now);
        }

        windows.insert(
            key.to_string(),
            StoredWindow {
                timestamps,
                expires_at,
            },
        );
        Ok(())
    }

    async fn len(&self) -> Option<usize> {
        let now = self.clock.now();
        let windows = self.windows.read().await;
        Some(windows.values().filter(|w| w.expires_at > now).count())
    }
}
