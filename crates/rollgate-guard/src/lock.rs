//! Keyed mutual exclusion with TTL leases.
//!
//! A lock is a lease `{key, token, expires_at}` held in a [`LockBackend`].
//! Acquisition retries a fixed number of times with a fixed delay and then
//! fails fast; the TTL bounds how long a crashed holder can keep others
//! out. The returned [`LockGuard`] releases the lease when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use rollgate_core::config::{ConfigError, LockSettings};
use rollgate_state::{epoch_millis, StateStore};

use crate::error::LockError;

/// Storage for lock leases.
pub trait LockBackend: Send + Sync {
    /// Take the lease on `key` for `token` unless another token holds an
    /// unexpired lease. Re-acquiring with the same token refreshes it.
    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Release the lease if `token` holds it.
    fn release(&self, key: &str, token: &str) -> Result<bool, LockError>;
}

impl LockBackend for StateStore {
    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        Ok(self.try_acquire_lock(key, token, ttl.as_millis() as u64, epoch_millis())?)
    }

    fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        Ok(self.release_lock(key, token)?)
    }
}

/// Process-local lease table.
#[derive(Debug, Default)]
pub struct MemoryLockBackend {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn leases(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, LockError> {
        self.leases
            .lock()
            .map_err(|_| LockError::Backend("lease table poisoned".to_string()))
    }
}

impl LockBackend for MemoryLockBackend {
    fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut leases = self.leases()?;
        let now = Instant::now();
        let free = match leases.get(key) {
            Some((holder, expires_at)) => holder == token || *expires_at <= now,
            None => true,
        };
        if free {
            leases.insert(key.to_string(), (token.to_string(), now + ttl));
        }
        Ok(free)
    }

    fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut leases = self.leases()?;
        if leases.get(key).is_some_and(|(holder, _)| holder == token) {
            leases.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Acquisition window and lease length.
#[derive(Debug, Clone, PartialEq)]
pub struct LockConfig {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(500),
            ttl: Duration::from_secs(60),
        }
    }
}

impl TryFrom<&LockSettings> for LockConfig {
    type Error = ConfigError;

    fn try_from(settings: &LockSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            attempts: settings.attempts.max(1),
            retry_delay: settings.retry_delay()?,
            ttl: settings.ttl()?,
        })
    }
}

/// Keyed lock over a shared backend. Cheap to clone.
#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn LockBackend>,
    config: LockConfig,
}

impl DistributedLock {
    pub fn new(backend: Arc<dyn LockBackend>, config: LockConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock for an external account scope.
    pub async fn acquire(&self, scope: &str) -> Result<LockGuard, LockError> {
        let key = format!("store:{scope}");
        let token = uuid::Uuid::new_v4().to_string();
        let attempts = self.config.attempts.max(1);

        for attempt in 1..=attempts {
            if self.backend.try_acquire(&key, &token, self.config.ttl)? {
                debug!(%key, attempt, "lock acquired");
                return Ok(LockGuard {
                    backend: Arc::clone(&self.backend),
                    key,
                    token,
                    released: false,
                });
            }
            debug!(%key, attempt, attempts, "lock busy");
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        warn!(%key, attempts, "giving up on lock");
        Err(LockError::Contended { key, attempts })
    }
}

/// A held lease. Released on drop.
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release explicitly and report whether the lease was still ours.
    pub fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        self.backend.release(&self.key, &self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.backend.release(&self.key, &self.token) {
            Ok(true) => debug!(key = %self.key, "lock released"),
            Ok(false) => warn!(key = %self.key, "lock lease expired before release"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to release lock"),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}
