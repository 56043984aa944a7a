//! rollgate-guard: serialized, classified access to store APIs.
//!
//! Every mutating store call runs inside the [`RetryShell`]:
//!
//! ```text
//! RetryShell::run(scope, options, call)
//!   ├── DistributedLock::acquire(scope)   bounded attempts, fixed delay, TTL lease
//!   ├── call(skip_review = false)
//!   │     duplicate      → success
//!   │     transient      → same call again (conflict ceiling)
//!   │     review blocked → call(skip_review = true) (skip-review ceiling)
//!   │     anything else  → fail after one attempt
//!   └── LockGuard dropped → lease released on every exit path
//! ```
//!
//! Lock leases live in a [`LockBackend`]: the redb [`StateStore`] for
//! cross-task and persisted locking, or [`MemoryLockBackend`].
//!
//! [`StateStore`]: rollgate_state::StateStore

pub mod error;
pub mod lock;
pub mod shell;

pub use error::{LockError, ShellError};
pub use lock::{DistributedLock, LockBackend, LockConfig, LockGuard, MemoryLockBackend};
pub use shell::{CallOptions, CallReport, Disposition, RetryPolicy, RetryShell};
