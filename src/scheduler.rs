//! Deadline-ordered task scheduling for an event loop
//!
//! A binary heap of `(deadline, seq)` keys over an alive-map of tasks.
//! Cancellation just drops the task from the map; the heap entry is
//! discarded lazily when it surfaces. Insertion order breaks deadline ties.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// Cancellation handle for a scheduled task
#[derive(Debug)]
pub struct TaskHandle(u64);

/// Monotonic-clock task queue
pub struct Scheduler<T> {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    alive: HashMap<u64, T>,
    next_seq: u64,
}

impl<T> Scheduler<T> {
    /// Empty scheduler
    pub fn new() -> Scheduler<T> {
        Scheduler {
            heap: BinaryHeap::new(),
            alive: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Queue `task` to run at `deadline`
    pub fn schedule(&mut self, deadline: Instant, task: T) -> TaskHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((deadline, seq)));
        self.alive.insert(seq, task);
        TaskHandle(seq)
    }

    /// Withdraw a task; returns it if it had not run yet
    pub fn cancel(&mut self, handle: &TaskHandle) -> Option<T> {
        self.alive.remove(&handle.0)
    }

    /// Deadline of the earliest live task
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(&Reverse((deadline, seq))) = self.heap.peek() {
            if self.alive.contains_key(&seq) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Run every task with `deadline <= now`, in deadline order
    pub fn run_due<F: FnMut(T)>(&mut self, now: Instant, mut f: F) {
        while let Some(&Reverse((deadline, seq))) = self.heap.peek() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(task) = self.alive.remove(&seq) {
                f(task);
            }
        }
    }

    /// Number of live tasks
    pub fn pending(&self) -> usize {
        self.alive.len()
    }
}
