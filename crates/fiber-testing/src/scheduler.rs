use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fiber_core::{Deadline, RuntimeScheduler};

/// Scheduler that only counts the requests it receives.
#[derive(Debug, Default)]
pub struct TestScheduler {
    idle: AtomicUsize,
    deferred: AtomicUsize,
}

impl TestScheduler {
    pub fn idle_requests(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn deferred_requests(&self) -> usize {
        self.deferred.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.idle.store(0, Ordering::SeqCst);
        self.deferred.store(0, Ordering::SeqCst);
    }
}

impl RuntimeScheduler for TestScheduler {
    fn request_idle_callback(&self) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }

    fn request_deferred_flush(&self) {
        self.deferred.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deadline that allows a fixed number of units of work, then reports no
/// time left.
#[derive(Debug)]
pub struct StepDeadline {
    remaining: Cell<usize>,
}

impl StepDeadline {
    pub fn units(count: usize) -> Self {
        Self {
            remaining: Cell::new(count),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }
}

impl Deadline for StepDeadline {
    fn time_remaining(&self) -> Duration {
        match self.remaining.get() {
            0 => Duration::ZERO,
            n => {
                self.remaining.set(n - 1);
                Duration::from_secs(1)
            }
        }
    }
}
