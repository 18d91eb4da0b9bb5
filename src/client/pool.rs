//! Bounded cooperative concurrency for outgoing client requests.
//!
//! `NOTCH_CONCURRENCY` (default 50) sizes a `tokio::sync::Semaphore`; each
//! in-flight request holds one permit for its lifetime. There is no pack
//! precedent for shrinking a semaphore in place, so a resize tears down the
//! old one and builds a fresh one at the new size — callers already
//! in-flight keep their original permit until it drops normally.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const DEFAULT_CONCURRENCY: usize = 50;
const ENV_VAR: &str = "NOTCH_CONCURRENCY";

pub struct Pool {
    semaphore: std::sync::RwLock<Arc<Semaphore>>,
}

impl Pool {
    pub fn new(concurrency: usize) -> Self {
        Pool {
            semaphore: std::sync::RwLock::new(Arc::new(Semaphore::new(concurrency.max(1)))),
        }
    }

    /// Builds a pool sized from `NOTCH_CONCURRENCY`, falling back to 50 if
    /// unset or unparsable.
    pub fn from_env() -> Self {
        let concurrency = std::env::var(ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);
        Self::new(concurrency)
    }

    /// Acquires a permit, blocking cooperatively until one is free. The
    /// permit is released when the returned [`PoolPermit`] drops.
    pub async fn acquire(&self) -> PoolPermit {
        let current = self.semaphore.read().expect("pool lock poisoned").clone();
        let permit = current.acquire_owned().await.expect("semaphore never closed");
        PoolPermit { _permit: permit }
    }

    /// Rebuilds the underlying semaphore at a new size. Already-acquired
    /// permits are unaffected; only subsequent `acquire` calls see the new
    /// capacity. Intended for the "too many open files" (EMFILE) signal
    /// the client surfaces when a backend connection attempt fails with
    /// `io::ErrorKind::Other` and an EMFILE-shaped message.
    pub fn resize(&self, concurrency: usize) {
        let mut guard = self.semaphore.write().expect("pool lock poisoned");
        *guard = Arc::new(Semaphore::new(concurrency.max(1)));
    }
}

/// Holds one permit for as long as a request is in flight. Built on the
/// owned-permit API so it carries its own `Arc<Semaphore>` and is
/// unaffected by a later `Pool::resize`.
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_does_not_block_under_capacity() {
        let pool = Pool::new(2);
        let _a = pool.acquire().await;
        let _b = pool.acquire().await;
    }

    #[test]
    fn from_env_falls_back_to_default_when_unset() {
        std::env::remove_var(ENV_VAR);
        let pool = Pool::from_env();
        assert_eq!(pool.semaphore.read().unwrap().available_permits(), DEFAULT_CONCURRENCY);
    }
}
