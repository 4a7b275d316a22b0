//! Synchronous double-ended queue for macro statement lists, grounded on
//! `core/dequeue.py`. Unlike [`crate::queue::PeekableQueue`], `peek` here is
//! a direct, non-destructive index read: there is no get/put-back dance
//! because nothing else can observe the queue mid-operation.

use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// First statement pushed is the first popped (the ordinary macro
    /// playback order).
    Fifo,
    /// Last statement pushed is the first popped (used when a macro pushes
    /// a sub-macro's statements for immediate execution).
    Lifo,
}

pub struct DeQueue<T> {
    mode: Mode,
    items: Mutex<VecDeque<T>>,
}

impl<T> DeQueue<T> {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            items: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
    }

    /// Removes and returns the next item per the queue's mode.
    pub fn pop(&self) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        match self.mode {
            Mode::Fifo => items.pop_front(),
            Mode::Lifo => items.pop_back(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }
}

impl<T: Clone> DeQueue<T> {
    /// Non-destructive read of whatever `pop()` would return next.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        let items = self.items.lock().unwrap();
        match self.mode {
            Mode::Fifo => items.front().cloned(),
            Mode::Lifo => items.back().cloned(),
        }
    }

    /// Snapshot of every element in pop order, left to right.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.lock().unwrap().iter().cloned().collect()
    }

    /// Element-by-element deep copy: a distinct `DeQueue` with the same mode
    /// and contents, sharing no state with `self`. Macro statement queues
    /// are value types, cloned element-by-element when a macro is
    /// dequeued from the library for execution.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            mode: self.mode,
            items: Mutex::new(self.items.lock().unwrap().clone()),
        }
    }
}

impl<T: Clone + PartialEq> PartialEq for DeQueue<T> {
    /// Value equality: same mode, same elements in the same order.
    /// Identity is deliberately not part of equality: `L == Q` by value
    /// even though `L is not Q`.
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.to_vec() == other.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_pops_in_push_order() {
        let q = DeQueue::new(Mode::Fifo);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.peek(), Some(1));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn lifo_pops_in_reverse_push_order() {
        let q = DeQueue::new(Mode::Lifo);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.peek(), Some(3));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(1));
    }

    #[test]
    fn peek_never_removes() {
        let q = DeQueue::new(Mode::Fifo);
        q.push("a".to_owned());
        for _ in 0..3 {
            assert_eq!(q.peek(), Some("a".to_owned()));
        }
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn deep_clone_is_equal_by_value_but_independent() {
        let original = DeQueue::new(Mode::Fifo);
        original.push(1);
        original.push(2);
        let copy = original.deep_clone();
        assert_eq!(original, copy);
        assert_eq!(copy.len(), 2);
        copy.pop();
        assert_eq!(copy.len(), 1);
        assert_eq!(original.len(), 2);
        assert_ne!(original, copy);
    }
}
