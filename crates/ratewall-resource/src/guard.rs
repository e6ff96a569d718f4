//! Concurrency guard for web ACL mutations.
//!
//! The orchestrator may redeliver a request it already sent. Redeliveries
//! are safe because every invocation re-fetches the web ACL and applies with
//! a fresh lock token; nothing about an earlier attempt is remembered.
//!
//! What the guard does hold is one async mutex per web ACL, so mutations of
//! the same ACL from concurrent invocations in this process run one at a
//! time. An entry exists only while some invocation holds or waits on it.
//! Races between processes are still arbitrated by the lock token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};

/// Per-target mutation locks.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("idempotency guard lock poisoned")
}

impl IdempotencyGuard {
    /// Creates a guard with no locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the resource behind `lock_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock table is poisoned.
    pub async fn acquire(&self, lock_key: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(poison_err)?;
            // Only the table holds an entry nobody is waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(lock_key.to_string()).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Number of targets currently locked or awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock table is poisoned.
    pub fn active_targets(&self) -> Result<usize> {
        let locks = self.locks.lock().map_err(poison_err)?;
        Ok(locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_target_is_serialized() -> Result<()> {
        let guard = Arc::new(IdempotencyGuard::new());
        let first = guard.acquire("REGIONAL/acl1/id1").await?;

        let contender = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.acquire("REGIONAL/acl1/id1").await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        let other = guard.acquire("REGIONAL/acl2/id2").await?;
        drop(other);

        drop(first);
        contender
            .await
            .map_err(|e| Error::internal(e.to_string()))??;
        Ok(())
    }

    #[tokio::test]
    async fn released_targets_leave_no_state() -> Result<()> {
        let guard = IdempotencyGuard::new();

        let permit = guard.acquire("REGIONAL/acl1/id1").await?;
        assert_eq!(guard.active_targets()?, 1);
        drop(permit);

        assert_eq!(guard.active_targets()?, 0);
        Ok(())
    }
}
