//! Fixed-capacity ring buffer backing the ready queue.
//!
//! No heap allocation, no dynamic growth: a full queue means `enqueue`
//! fails and the caller logs it, same failure mode as the process table
//! running out of slots.

use crate::config::READY_QUEUE_CAPACITY;
use crate::process::Pid;

pub struct ReadyQueue {
    slots: [Pid; READY_QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            slots: [0; READY_QUEUE_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    /// Appends `pid` to the tail. Returns `false` if the queue is at capacity.
    pub fn push(&mut self, pid: Pid) -> bool {
        if self.len == READY_QUEUE_CAPACITY {
            return false;
        }
        let tail = (self.head + self.len) % READY_QUEUE_CAPACITY;
        self.slots[tail] = pid;
        self.len += 1;
        true
    }

    /// Removes and returns the pid at the head, if any.
    pub fn pop(&mut self) -> Option<Pid> {
        if self.len == 0 {
            return None;
        }
        let pid = self.slots[self.head];
        self.head = (self.head + 1) % READY_QUEUE_CAPACITY;
        self.len -= 1;
        Some(pid)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == READY_QUEUE_CAPACITY
    }

    /// Removes every occurrence of `pid`, rebuilding the ring from the
    /// surviving entries rather than shifting them in place. Used when a
    /// task leaves the runnable set (exit, block) while sitting somewhere
    /// other than the head.
    pub fn remove(&mut self, pid: Pid) {
        let mut rebuilt = [0; READY_QUEUE_CAPACITY];
        let mut new_len = 0;
        for i in 0..self.len {
            let slot = self.slots[(self.head + i) % READY_QUEUE_CAPACITY];
            if slot != pid {
                rebuilt[new_len] = slot;
                new_len += 1;
            }
        }
        self.slots = rebuilt;
        self.head = 0;
        self.len = new_len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = ReadyQueue::new();
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn wraps_around_after_drain() {
        let mut q = ReadyQueue::new();
        for i in 0..READY_QUEUE_CAPACITY as u64 {
            assert!(q.push(i));
        }
        assert!(q.is_full());
        assert!(!q.push(999));

        // Drain half, push that many again: head/tail must wrap correctly.
        for i in 0..READY_QUEUE_CAPACITY as u64 / 2 {
            assert_eq!(q.pop(), Some(i));
        }
        for i in 1000..1000 + READY_QUEUE_CAPACITY as u64 / 2 {
            assert!(q.push(i));
        }
        assert!(q.is_full());

        let mut drained = alloc::vec::Vec::new();
        while let Some(pid) = q.pop() {
            drained.push(pid);
        }
        assert_eq!(drained.len(), READY_QUEUE_CAPACITY);
        assert!(q.is_empty());
    }

    #[test]
    fn empty_queue_pops_none() {
        let mut q = ReadyQueue::new();
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn remove_drops_only_matching_pid() {
        let mut q = ReadyQueue::new();
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        q.remove(2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn remove_missing_pid_is_a_no_op() {
        let mut q = ReadyQueue::new();
        assert!(q.push(1));
        q.remove(999);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(1));
    }
}
