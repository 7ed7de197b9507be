//! Standard runtime services backed by Rust's `std` library.
//!
//! [`StdRuntime`] records idle-callback and deferred-flush requests raised by
//! a [`Scheduler`], and drives it in frame-sized turns measured with
//! [`std::time::Instant`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use fiber_core::{
    Clock, Deadline, FiberError, HostAdapter, Runtime, RuntimeHandle, RuntimeScheduler, Scheduler,
    SchedulerConfig, WorkStatus,
};
use thiserror::Error;

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records requests in atomics and optionally wakes the
/// thread driving the loop.
pub struct StdScheduler {
    idle_requested: AtomicBool,
    deferred_requested: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            idle_requested: AtomicBool::new(false),
            deferred_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether an idle callback has been requested since the last call.
    pub fn take_idle_request(&self) -> bool {
        self.idle_requested.swap(false, Ordering::SeqCst)
    }

    /// Returns whether a deferred flush has been requested since the last call.
    pub fn take_deferred_request(&self) -> bool {
        self.deferred_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked on every request.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("idle_requested", &self.idle_requested.load(Ordering::SeqCst))
            .field(
                "deferred_requested",
                &self.deferred_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn request_idle_callback(&self) {
        self.idle_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn request_deferred_flush(&self) {
        self.deferred_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Default, Clone)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed(&self, since: Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Budget for one turn, measured from when the frame started.
#[derive(Clone, Copy, Debug)]
pub struct FrameDeadline {
    started: Instant,
    budget: Duration,
}

impl FrameDeadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }
}

impl Deadline for FrameDeadline {
    fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StdRuntimeConfig {
    /// Time each turn may spend rendering fibers.
    pub frame_budget: Duration,
    /// Turns `run_until_idle` allows before giving up.
    pub max_turns: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for StdRuntimeConfig {
    fn default() -> Self {
        Self {
            frame_budget: Duration::from_millis(16),
            max_turns: 10_000,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl StdRuntimeConfig {
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = turns;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Fiber(#[from] FiberError),
    #[error("work did not settle after {turns} turns")]
    Unsettled { turns: usize },
}

/// Standard scheduler, clock and runtime bundled with a driver loop.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    clock: Arc<StdClock>,
    runtime: Runtime,
    config: StdRuntimeConfig,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self::with_config(StdRuntimeConfig::default())
    }

    pub fn with_config(config: StdRuntimeConfig) -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        Self {
            scheduler,
            clock: Arc::new(StdClock),
            runtime,
            config,
        }
    }

    /// A [`Scheduler`] wired to this runtime's services.
    pub fn create_scheduler<A: HostAdapter>(&self, adapter: A) -> Scheduler<A> {
        Scheduler::with_runtime(adapter, self.runtime.clone()).with_config(self.config.scheduler)
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> Arc<StdClock> {
        Arc::clone(&self.clock)
    }

    pub fn config(&self) -> StdRuntimeConfig {
        self.config
    }

    /// Starts a frame with the configured budget.
    pub fn begin_frame(&self) -> FrameDeadline {
        FrameDeadline::new(self.config.frame_budget)
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// One host turn: render within a frame budget if work was requested,
    /// then flush deferred effects if a flush was requested.
    pub fn run_turn<A: HostAdapter>(
        &self,
        scheduler: &mut Scheduler<A>,
    ) -> Result<WorkStatus, FiberError> {
        let idle = self.scheduler.take_idle_request();
        let status = if idle || scheduler.has_pending_work() {
            let deadline = self.begin_frame();
            scheduler.work_loop(&deadline)?
        } else {
            WorkStatus::Idle
        };
        if self.scheduler.take_deferred_request() || self.runtime.has_deferred() {
            let ran = self.runtime.flush_deferred();
            tracing::trace!(ran, "flushed deferred tasks");
        }
        Ok(status)
    }

    /// Runs turns until nothing is left to render or flush. Returns the
    /// number of turns taken.
    pub fn run_until_idle<A: HostAdapter>(
        &self,
        scheduler: &mut Scheduler<A>,
    ) -> Result<usize, DriveError> {
        let mut turns = 0;
        loop {
            if !scheduler.has_pending_work() && !self.runtime.has_deferred() {
                return Ok(turns);
            }
            if turns >= self.config.max_turns {
                return Err(DriveError::Unsettled { turns });
            }
            self.run_turn(scheduler)?;
            turns += 1;
        }
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use fiber_core::{use_effect, use_state, Element, Props};
    use fiber_testing::MemoryHost;

    use super::*;

    fn counter(_: &Props) -> Element {
        let (count, set_count) = use_state(|| 0);
        Element::host("button")
            .on("click", move |_| set_count.update(|c| c + 1))
            .child(count)
    }

    #[test]
    fn render_requests_idle_callback_and_settles() {
        let runtime = StdRuntime::new();
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut scheduler = runtime.create_scheduler(host);

        scheduler.render(Element::component(counter), container);
        assert!(runtime.scheduler().take_idle_request());
        assert_eq!(runtime.run_until_idle(&mut scheduler).ok(), Some(1));

        let button = scheduler.adapter().find("button").expect("button mounted");
        scheduler.adapter().dispatch_event(button, "click");
        assert!(scheduler.has_pending_work());
        runtime.run_until_idle(&mut scheduler).expect("settles");
        assert_eq!(scheduler.adapter().text_content(button), "1");
    }

    #[test]
    fn effects_flush_on_the_turn_after_commit_is_requested() {
        let runtime = StdRuntime::new();
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut scheduler = runtime.create_scheduler(host);
        let runs = Arc::new(AtomicUsize::new(0));

        let tally = runs.clone();
        scheduler.render(
            Element::component(move |_: &Props| {
                let tally = tally.clone();
                use_effect(
                    move |scope| {
                        tally.fetch_add(1, Ordering::SeqCst);
                        scope.done()
                    },
                    (),
                );
                Element::host("div")
            }),
            container,
        );

        assert_eq!(runtime.run_turn(&mut scheduler).ok(), Some(WorkStatus::Committed));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!runtime.runtime().has_deferred());
    }

    #[test]
    fn exhausted_budget_yields() {
        let runtime =
            StdRuntime::with_config(StdRuntimeConfig::default().with_frame_budget(Duration::ZERO));
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut scheduler = runtime.create_scheduler(host);
        scheduler.render(Element::host("div"), container);

        assert_eq!(runtime.run_turn(&mut scheduler).ok(), Some(WorkStatus::Yielded));
        assert!(scheduler.has_pending_work());
    }

    #[test]
    fn run_until_idle_gives_up_after_max_turns() {
        let runtime = StdRuntime::with_config(
            StdRuntimeConfig::default()
                .with_frame_budget(Duration::ZERO)
                .with_max_turns(3),
        );
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut scheduler = runtime.create_scheduler(host);
        scheduler.render(Element::host("div"), container);
        assert!(matches!(
            runtime.run_until_idle(&mut scheduler),
            Err(DriveError::Unsettled { turns: 3 })
        ));
    }

    #[test]
    fn waker_fires_on_requests() {
        let runtime = StdRuntime::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let observed = wakes.clone();
        runtime.set_waker(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        runtime.runtime().request_render();
        runtime.runtime().defer(|| {});
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        runtime.clear_waker();
        runtime.runtime().request_render();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }
}
