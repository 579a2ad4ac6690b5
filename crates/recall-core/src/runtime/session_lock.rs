//! One-slot mutex per conversation id.
//!
//! Callers hold the guard for the whole turn so at most one turn per session
//! is processed at a time. Different sessions never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created per-session locks.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Take the lock only if no turn is running for `session_id`.
    pub fn try_acquire(&self, session_id: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned().ok()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop locks nobody holds or waits on. Returns the number removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;
        assert!(locks.try_acquire("s1").is_none());
        drop(guard);
        assert!(locks.try_acquire("s1").is_some());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("s").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("s").await;
                true
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_idle() {
        let locks = SessionLocks::new();
        let held = locks.acquire("busy").await;
        drop(locks.acquire("idle").await);
        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prune_idle_while_sessions_open() {
        let locks = Arc::new(SessionLocks::new());
        let opener = {
            let locks = locks.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    let _guard = locks.acquire(&format!("s{i}")).await;
                }
            })
        };
        let mut removed = 0;
        while !opener.is_finished() {
            removed += locks.prune_idle();
            tokio::task::yield_now().await;
        }
        opener.await.unwrap();
        removed += locks.prune_idle();
        assert!(removed <= 500);
        assert!(locks.is_empty());
    }
}
