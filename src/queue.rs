//! Async peekable queue, backing the message bus's pending-event
//! queue. Peek is implemented as get-then-put-back-at-head: it is
//! intentionally non-atomic, so a concurrent `get()` can interleave
//! between the two halves of a `peek()`.

use tokio::sync::{Mutex, Notify};

use std::collections::VecDeque;

pub struct PeekableQueue<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for PeekableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PeekableQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn put(&self, item: T) {
        self.inner.lock().await.push_back(item);
        self.notify.notify_one();
    }

    async fn put_front(&self, item: T) {
        self.inner.lock().await.push_front(item);
        self.notify.notify_one();
    }

    /// Waits until an item is available, then removes and returns it from
    /// the head.
    pub async fn get(&self) -> T {
        loop {
            // Registered before the check so a put() racing with an empty
            // read can't be lost between the check and the await below.
            let notified = self.notify.notified();
            {
                let mut q = self.inner.lock().await;
                if let Some(item) = q.pop_front() {
                    return item;
                }
            }
            notified.await;
        }
    }

    /// Non-atomic peek: removes the head item, then puts it back at the
    /// head. A concurrent `get()` may win the race and take the item first,
    /// in which case this call simply waits for the next one.
    pub async fn peek(&self) -> T
    where
        T: Clone,
    {
        let item = self.get().await;
        self.put_front(item.clone()).await;
        item
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_is_fifo() {
        let q: PeekableQueue<i32> = PeekableQueue::new();
        q.put(1).await;
        q.put(2).await;
        assert_eq!(q.get().await, 1);
        assert_eq!(q.get().await, 2);
    }

    #[tokio::test]
    async fn peek_does_not_remove_the_item() {
        let q: PeekableQueue<i32> = PeekableQueue::new();
        q.put(42).await;
        assert_eq!(q.peek().await, 42);
        assert_eq!(q.len().await, 1);
        assert_eq!(q.get().await, 42);
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn get_waits_for_a_put() {
        let q = std::sync::Arc::new(PeekableQueue::<i32>::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.get().await });
        tokio::task::yield_now().await;
        q.put(7).await;
        assert_eq!(handle.await.unwrap(), 7);
    }
}
