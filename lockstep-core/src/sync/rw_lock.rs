//! Read-write lock with a configurable admission policy.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct RwState {
    active_readers: usize,
    writer_active: bool,
    waiting_writers: usize,
}

/// Asynchronous read-write lock with an explicit writer-priority policy.
///
/// With `writer_priority` disabled, readers are admitted whenever no writer
/// holds the lock and writers compete with readers first-come-first-served.
/// With it enabled, a waiting or active writer gates admission of new
/// readers: no reader acquisition succeeds until every queued writer has
/// acquired and released the lock.
///
/// Acquisition returns RAII guards; a worker cancelled while holding a guard
/// releases it through `Drop`. A writer cancelled while waiting likewise
/// withdraws its admission gate.
#[derive(Debug)]
pub struct PolicyRwLock {
    writer_priority: bool,
    state: Mutex<RwState>,
    released: Notify,
}

impl PolicyRwLock {
    pub fn new(writer_priority: bool) -> Self {
        Self {
            writer_priority,
            state: Mutex::new(RwState::default()),
            released: Notify::new(),
        }
    }

    pub fn writer_priority(&self) -> bool {
        self.writer_priority
    }

    /// Acquires shared access, suspending until admission is allowed.
    pub async fn read(self: &Arc<Self>) -> ReadGuard {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                let gated =
                    state.writer_active || (self.writer_priority && state.waiting_writers > 0);
                if !gated {
                    state.active_readers += 1;
                    return ReadGuard {
                        lock: Arc::clone(self),
                    };
                }
            }

            notified.await;
        }
    }

    /// Acquires exclusive access, suspending until no reader or writer holds
    /// the lock.
    pub async fn write(self: &Arc<Self>) -> WriteGuard {
        let mut intent = WriterIntent::register(self);
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if !state.writer_active && state.active_readers == 0 {
                    state.writer_active = true;
                    intent.claim(&mut state);
                    return WriteGuard {
                        lock: Arc::clone(self),
                    };
                }
            }

            notified.await;
        }
    }

    /// Readers currently holding shared access.
    pub fn active_readers(&self) -> usize {
        self.state.lock().active_readers
    }

    /// Writers currently waiting for exclusive access.
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }
}

/// Registration of a writer waiting for admission.
///
/// The waiting-writers count must drop back even when the waiting task is
/// cancelled, otherwise a priority lock would gate readers forever.
struct WriterIntent<'a> {
    lock: &'a PolicyRwLock,
    claimed: bool,
}

impl<'a> WriterIntent<'a> {
    fn register(lock: &'a PolicyRwLock) -> Self {
        lock.state.lock().waiting_writers += 1;
        Self {
            lock,
            claimed: false,
        }
    }

    fn claim(&mut self, state: &mut RwState) {
        state.waiting_writers -= 1;
        self.claimed = true;
    }
}

impl Drop for WriterIntent<'_> {
    fn drop(&mut self) {
        if !self.claimed {
            self.lock.state.lock().waiting_writers -= 1;
            self.lock.released.notify_waiters();
        }
    }
}

/// Shared access to a [`PolicyRwLock`], released on drop.
#[derive(Debug)]
pub struct ReadGuard {
    lock: Arc<PolicyRwLock>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        {
            let mut state = self.lock.state.lock();
            state.active_readers -= 1;
        }
        self.lock.released.notify_waiters();
    }
}

/// Exclusive access to a [`PolicyRwLock`], released on drop.
#[derive(Debug)]
pub struct WriteGuard {
    lock: Arc<PolicyRwLock>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        {
            let mut state = self.lock.state.lock();
            state.writer_active = false;
        }
        self.lock.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_readers_share_access() {
        let lock = Arc::new(PolicyRwLock::new(false));
        let first = lock.read().await;
        let second = lock.read().await;
        assert_eq!(lock.active_readers(), 2);
        drop(first);
        drop(second);
        assert_eq!(lock.active_readers(), 0);
    }

    #[tokio::test]
    async fn test_writer_excludes_readers_and_writers() {
        let lock = Arc::new(PolicyRwLock::new(false));
        let guard = lock.write().await;

        assert!(timeout(Duration::from_millis(30), lock.read()).await.is_err());
        assert!(timeout(Duration::from_millis(30), lock.write()).await.is_err());

        drop(guard);
        let _reader = lock.read().await;
    }

    #[tokio::test]
    async fn test_writer_waits_for_active_readers() {
        let lock = Arc::new(PolicyRwLock::new(false));
        let reader = lock.read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.write().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(lock.waiting_writers(), 1);

        drop(reader);
        timeout(Duration::from_secs(1), writer)
            .await
            .expect("writer should acquire after reader releases")
            .unwrap();
        assert_eq!(lock.waiting_writers(), 0);
    }

    #[tokio::test]
    async fn test_waiting_writer_gates_new_readers_with_priority() {
        let lock = Arc::new(PolicyRwLock::new(true));
        let reader = lock.read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let guard = lock.write().await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                drop(guard);
            })
        };

        // Wait until the writer has registered its intent.
        for _ in 0..100 {
            if lock.waiting_writers() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(lock.waiting_writers(), 1);

        // A new reader must not be admitted while the writer waits, even
        // though only a reader currently holds the lock.
        assert!(timeout(Duration::from_millis(30), lock.read()).await.is_err());

        drop(reader);
        timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();

        // Once the writer has released, readers are admitted again.
        let _reader = timeout(Duration::from_secs(1), lock.read()).await.unwrap();
    }

    #[tokio::test]
    async fn test_without_priority_readers_bypass_waiting_writer() {
        let lock = Arc::new(PolicyRwLock::new(false));
        let reader = lock.read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.write().await;
            })
        };

        for _ in 0..100 {
            if lock.waiting_writers() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // No ordering preference: the new reader is admitted alongside the
        // existing one while the writer keeps waiting.
        let second = timeout(Duration::from_secs(1), lock.read()).await.unwrap();
        assert_eq!(lock.active_readers(), 2);

        drop(reader);
        drop(second);
        timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_waiting_writer_withdraws_gate() {
        let lock = Arc::new(PolicyRwLock::new(true));
        let reader = lock.read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.write().await;
            })
        };

        for _ in 0..100 {
            if lock.waiting_writers() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        writer.abort();
        let _ = writer.await;
        assert_eq!(lock.waiting_writers(), 0);

        // The gate is gone; new readers are admitted again.
        let _second = timeout(Duration::from_secs(1), lock.read()).await.unwrap();
        drop(reader);
    }
}
