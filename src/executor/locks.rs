//! Per-user trade serialization
//!
//! Entries live only while a trade holds or waits for them; the last guard
//! out removes its user's entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type Locks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Default)]
pub(crate) struct UserLocks {
    locks: Locks,
}

impl UserLocks {
    /// Wait for exclusive access to `user_id`'s trades
    pub(crate) async fn lock(&self, user_id: &str) -> UserGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone();

        UserGuard {
            locks: &self.locks,
            user_id: user_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub(crate) struct UserGuard<'a> {
    locks: &'a Locks,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_released_lock_is_pruned() {
        let locks = UserLocks::default();

        let alice = locks.lock("alice").await;
        let bob = locks.lock("bob").await;
        assert_eq!(locks.len(), 2);

        drop(alice);
        assert_eq!(locks.len(), 1);
        drop(bob);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(UserLocks::default());
        let first = locks.lock("alice").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("alice").await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
        };
        // Let the waiter queue up behind the held lock
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
