//! Retry shell: classified retries around a single store call.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use rollgate_core::config::{ConfigError, RetrySettings};
use rollgate_storefront::{ErrorCategory, StoreResult};

use crate::error::{LockError, ShellError};
use crate::lock::{DistributedLock, LockGuard};

/// What the shell does with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Idempotent duplicate: treat as success.
    Allowed,
    /// Transient conflict: repeat the same call.
    Retryable,
    /// Needs the skip-review fallback.
    ReviewBlocked,
    Fatal,
}

impl Disposition {
    pub fn of(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Duplicate => Self::Allowed,
            ErrorCategory::Transient => Self::Retryable,
            ErrorCategory::ReviewBlocked => Self::ReviewBlocked,
            ErrorCategory::Permission | ErrorCategory::Precondition | ErrorCategory::NotFound => {
                Self::Fatal
            }
        }
    }
}

/// Attempt ceilings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts while the store keeps reporting transient conflicts.
    pub conflict_attempts: u32,
    /// Attempts with `skip_review` set after a review rejection.
    pub skip_review_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            conflict_attempts: 4,
            skip_review_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl TryFrom<&RetrySettings> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(settings: &RetrySettings) -> Result<Self, Self::Error> {
        Ok(Self {
            conflict_attempts: settings.conflict_attempts.max(1),
            skip_review_attempts: settings.skip_review_attempts,
            retry_delay: settings.retry_delay()?,
        })
    }
}

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Retry review rejections with `skip_review` set.
    pub skip_review_fallback: bool,
}

/// How a successful call got there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallReport {
    pub attempts: u32,
    /// The final attempt ran with `skip_review` set.
    pub skip_review: bool,
    /// The store reported the change as already applied.
    pub duplicate: bool,
}

/// Lock + retry wrapper for mutating store calls.
#[derive(Clone)]
pub struct RetryShell {
    lock: DistributedLock,
    policy: RetryPolicy,
}

impl RetryShell {
    pub fn new(lock: DistributedLock, policy: RetryPolicy) -> Self {
        Self { lock, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Acquire the scope's lock without running anything yet.
    pub async fn acquire(&self, scope: &str) -> Result<LockGuard, LockError> {
        self.lock.acquire(scope).await
    }

    /// Lock `scope`, run `call` under the retry policy, release the lock.
    ///
    /// `call` receives the `skip_review` flag for each attempt.
    pub async fn run<F, Fut>(
        &self,
        scope: &str,
        options: CallOptions,
        call: F,
    ) -> Result<CallReport, ShellError>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        let guard = self.acquire(scope).await?;
        let result = self.invoke(&guard, options, call).await;
        drop(guard);
        result
    }

    /// Run `call` under the retry policy while `guard` is held.
    pub async fn invoke<F, Fut>(
        &self,
        guard: &LockGuard,
        options: CallOptions,
        mut call: F,
    ) -> Result<CallReport, ShellError>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        let mut attempts = 0;
        let mut conflicts = 0;
        let mut review_attempts = 0;
        let mut skip_review = false;

        loop {
            attempts += 1;
            if skip_review {
                review_attempts += 1;
            }

            let err = match call(skip_review).await {
                Ok(()) => {
                    debug!(key = guard.key(), attempts, skip_review, "store call succeeded");
                    return Ok(CallReport {
                        attempts,
                        skip_review,
                        duplicate: false,
                    });
                }
                Err(err) => err,
            };

            match Disposition::of(err.category) {
                Disposition::Allowed => {
                    info!(
                        key = guard.key(),
                        resource = %err.resource,
                        "store reports change already applied"
                    );
                    return Ok(CallReport {
                        attempts,
                        skip_review,
                        duplicate: true,
                    });
                }
                Disposition::Retryable => {
                    conflicts += 1;
                    if conflicts >= self.policy.conflict_attempts {
                        warn!(
                            key = guard.key(),
                            attempts,
                            error = %err,
                            "giving up on transient store error"
                        );
                        return Err(ShellError::Store { source: err, attempts });
                    }
                    debug!(
                        key = guard.key(),
                        attempt = attempts,
                        error = %err,
                        "retrying transient store error"
                    );
                }
                Disposition::ReviewBlocked if options.skip_review_fallback => {
                    if review_attempts >= self.policy.skip_review_attempts {
                        warn!(
                            key = guard.key(),
                            attempts,
                            error = %err,
                            "store still requires review"
                        );
                        return Err(ShellError::Store { source: err, attempts });
                    }
                    skip_review = true;
                    debug!(key = guard.key(), attempt = attempts, "retrying with skip_review");
                }
                Disposition::ReviewBlocked | Disposition::Fatal => {
                    warn!(key = guard.key(), attempts, error = %err, "store call failed");
                    return Err(ShellError::Store { source: err, attempts });
                }
            }

            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}
