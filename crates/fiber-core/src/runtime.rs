use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::RuntimeScheduler;

type Task = Box<dyn FnOnce() + 'static>;

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    render_requested: Cell<bool>,
    deferred: RefCell<VecDeque<Task>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            render_requested: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    fn request_render(&self) {
        self.render_requested.set(true);
        self.scheduler.request_idle_callback();
    }

    fn defer(&self, task: Task) {
        self.deferred.borrow_mut().push_back(task);
        self.scheduler.request_deferred_flush();
    }

    fn flush_deferred(&self) -> usize {
        // Tasks queued while flushing wait for the next flush.
        let tasks: Vec<Task> = self.deferred.borrow_mut().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

/// Shared services for one render root: render requests raised by state
/// dispatches and the FIFO queue of deferred tasks produced by commits.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn request_render(&self) {
        self.inner.request_render();
    }

    pub fn has_render_request(&self) -> bool {
        self.inner.render_requested.get()
    }

    /// Clears and returns the pending render flag.
    pub fn take_render_request(&self) -> bool {
        self.inner.render_requested.replace(false)
    }

    pub fn request_idle_callback(&self) {
        self.inner.scheduler.request_idle_callback();
    }

    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.defer(Box::new(task));
    }

    /// Runs every task queued so far, oldest first. Returns how many ran.
    pub fn flush_deferred(&self) -> usize {
        self.inner.flush_deferred()
    }

    pub fn has_deferred(&self) -> bool {
        !self.inner.deferred.borrow().is_empty()
    }
}

/// Weak reference to a [`Runtime`], held by dispatchers that may outlive it.
#[derive(Clone, Default)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn request_render(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_render();
        }
    }

    pub fn defer(&self, task: impl FnOnce() + 'static) {
        if let Some(inner) = self.0.upgrade() {
            inner.defer(Box::new(task));
        }
    }

    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Scheduler that ignores requests; callers drive the loop themselves.
#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn request_idle_callback(&self) {}

    fn request_deferred_flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingScheduler {
        idle: AtomicUsize,
        deferred: AtomicUsize,
    }

    impl RuntimeScheduler for CountingScheduler {
        fn request_idle_callback(&self) {
            self.idle.fetch_add(1, Ordering::SeqCst);
        }

        fn request_deferred_flush(&self) {
            self.deferred.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn render_request_is_taken_once() {
        let scheduler = Arc::new(CountingScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        runtime.handle().request_render();
        assert!(runtime.has_render_request());
        assert!(runtime.take_render_request());
        assert!(!runtime.take_render_request());
        assert_eq!(scheduler.idle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_tasks_run_in_fifo_order() {
        let scheduler = Arc::new(CountingScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            runtime.defer(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.deferred.load(Ordering::SeqCst), 3);
        assert_eq!(runtime.flush_deferred(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(!runtime.has_deferred());
    }

    #[test]
    fn tasks_deferred_during_flush_wait_for_next_flush() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        let ran = Rc::new(Cell::new(0));
        let inner_ran = ran.clone();
        runtime.defer(move || {
            let ran = inner_ran.clone();
            handle.defer(move || ran.set(ran.get() + 1));
        });
        assert_eq!(runtime.flush_deferred(), 1);
        assert_eq!(ran.get(), 0);
        assert_eq!(runtime.flush_deferred(), 1);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn dropped_runtime_makes_handle_inert() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        drop(runtime);
        assert!(!handle.is_alive());
        handle.request_render();
        assert!(handle.upgrade().is_none());
    }
}
