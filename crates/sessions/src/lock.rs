//! Per-user serialization.
//!
//! Every operation that reads and then rewrites a user's session holds that
//! user's permit for its whole duration, including the provider call. Two
//! turns from the same user therefore run one after the other; different
//! users never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::SessionError;

/// Map size above which unused entries are dropped on the next acquire.
const PRUNE_ABOVE: usize = 256;

/// Maps each user id to a `Semaphore(1)`.
#[derive(Default)]
pub struct UserLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl UserLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`. The permit releases on drop.
    pub async fn acquire(&self, user_id: &str) -> Result<OwnedSemaphorePermit, SessionError> {
        let sem = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_ABOVE {
                prune_unused(&mut locks);
            }
            locks
                .entry(user_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned().await.map_err(|_| SessionError::Busy)
    }

    #[cfg(test)]
    fn user_count(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Drop semaphores only the map refers to. Holders and waiters keep a clone
/// taken under the map lock, so an entry in use is never dropped.
fn prune_unused(locks: &mut HashMap<String, Arc<Semaphore>>) {
    locks.retain(|_, sem| Arc::strong_count(sem) > 1);
}
