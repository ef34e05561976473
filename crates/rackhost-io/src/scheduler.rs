//! Control-thread task schedule.
//!
//! Periodic housekeeping (reclaiming drained instances, persisting a changed
//! device configuration, retrying parked instances) is queued explicitly
//! here and run by whoever owns the control thread, by calling
//! [`StandaloneHost::tick`](crate::StandaloneHost::tick) with the current time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Work the host performs on the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTask {
    /// Destroy instances the realtime thread handed back.
    CollectGarbage,
    /// Write the device configuration to the settings cache.
    PersistDeviceConfig,
    /// Retry `begin_playback` on parked instances.
    RetryPendingSetup,
}

#[derive(Debug)]
struct Entry {
    due: Instant,
    /// Insertion order, so equal deadlines run first-in first-out.
    seq: u64,
    task: ControlTask,
    every: Option<Duration>,
}

// Reversed so the max-heap pops the earliest deadline.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Deadline-ordered queue of [`ControlTask`]s.
///
/// A task is queued at most once; scheduling it again replaces the earlier
/// entry.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl TaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` once at `at`.
    pub fn schedule_at(&mut self, task: ControlTask, at: Instant) {
        self.push(task, at, None);
    }

    /// Runs `task` every `interval`, first at `now + interval`.
    pub fn schedule_every(&mut self, task: ControlTask, interval: Duration, now: Instant) {
        self.push(task, now + interval, Some(interval));
    }

    /// Removes `task`. Returns `true` if it was queued.
    pub fn cancel(&mut self, task: ControlTask) -> bool {
        let before = self.heap.len();
        self.heap.retain(|e| e.task != task);
        self.heap.len() != before
    }

    /// Returns `true` if `task` is queued.
    pub fn contains(&self, task: ControlTask) -> bool {
        self.heap.iter().any(|e| e.task == task)
    }

    /// Pops every task due at `now`, in deadline order. Periodic tasks are
    /// requeued one interval after `now`, so a stalled control thread does
    /// not run them in a burst.
    pub fn due(&mut self, now: Instant) -> Vec<ControlTask> {
        let mut ready = Vec::new();
        let mut repeat = Vec::new();
        while self.heap.peek().is_some_and(|e| e.due <= now) {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            ready.push(entry.task);
            if let Some(every) = entry.every {
                repeat.push((entry.task, every));
            }
        }
        for (task, every) in repeat {
            self.schedule_every(task, every, now);
        }
        ready
    }

    /// The earliest deadline, if anything is queued.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn push(&mut self, task: ControlTask, due: Instant, every: Option<Duration>) {
        self.cancel(task);
        self.seq += 1;
        self.heap.push(Entry {
            due,
            seq: self.seq,
            task,
            every,
        });
    }
}
