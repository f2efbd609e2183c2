//! Bounded FIFO buffer with blocking put and take.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Fixed-capacity FIFO queue shared by producer and consumer workers.
///
/// `put` suspends while the buffer is at capacity and `take` suspends while
/// it is empty. Occupancy is observable at any time via [`BoundedBuffer::len`].
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    not_full: Notify,
    not_empty: Notify,
}

impl<T> BoundedBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// A requested capacity of zero is clamped to one; a zero-capacity buffer
    /// could never complete a put.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Appends an item, suspending while the buffer is at capacity.
    pub async fn put(&self, item: T) {
        let mut slot = Some(item);
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut items = self.items.lock();
                if items.len() < self.capacity {
                    if let Some(value) = slot.take() {
                        items.push_back(value);
                    }
                    drop(items);
                    self.not_empty.notify_one();
                    return;
                }
            }

            notified.await;
        }
    }

    /// Removes the oldest item, suspending while the buffer is empty.
    pub async fn take(&self) -> T {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut items = self.items.lock();
                if let Some(value) = items.pop_front() {
                    drop(items);
                    self.not_full.notify_one();
                    return value;
                }
            }

            notified.await;
        }
    }

    /// Current occupancy.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_put_take_preserves_fifo_order() {
        let buffer = BoundedBuffer::new(3);
        buffer.put(1u64).await;
        buffer.put(2).await;
        buffer.put(3).await;

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take().await, 1);
        assert_eq!(buffer.take().await, 2);
        assert_eq!(buffer.take().await, 3);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_put_blocks_at_capacity_until_take() {
        let buffer = Arc::new(BoundedBuffer::new(1));
        buffer.put(1u64).await;

        let producer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.put(2).await })
        };

        // The second put cannot complete while the buffer is full.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(buffer.len(), 1);

        assert_eq!(buffer.take().await, 1);
        timeout(Duration::from_secs(1), producer)
            .await
            .expect("put should unblock after take")
            .unwrap();
        assert_eq!(buffer.take().await, 2);
    }

    #[tokio::test]
    async fn test_take_blocks_while_empty_until_put() {
        let buffer = Arc::new(BoundedBuffer::new(2));

        let consumer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.take().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        buffer.put(7u64).await;
        let taken = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("take should unblock after put")
            .unwrap();
        assert_eq!(taken, 7);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let buffer = BoundedBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.put(1u64).await;
        assert_eq!(buffer.take().await, 1);
    }

    #[tokio::test]
    async fn test_occupancy_never_exceeds_capacity_under_contention() {
        let buffer = Arc::new(BoundedBuffer::new(2));
        let mut producers = Vec::new();
        for base in 0..4u64 {
            let buffer = Arc::clone(&buffer);
            producers.push(tokio::spawn(async move {
                for i in 0..10 {
                    buffer.put(base * 100 + i).await;
                }
            }));
        }

        let mut taken = 0;
        while taken < 40 {
            assert!(buffer.len() <= buffer.capacity());
            buffer.take().await;
            taken += 1;
        }

        for producer in producers {
            producer.await.unwrap();
        }
        assert!(buffer.is_empty());
    }
}
