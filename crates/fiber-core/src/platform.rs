//! Host services the scheduler depends on.
//!
//! The engine never blocks or spawns threads. It asks the host to call back
//! when idle time is available, and to flush deferred work (effects) at the
//! next convenient opportunity, typically after paint.

use std::time::Duration;

/// Callback-scheduling service provided by the host.
///
/// Registrations are one-shot: the scheduler re-requests an idle callback on
/// every turn that leaves work behind.
pub trait RuntimeScheduler: Send + Sync {
    /// Ask the host to drive `Scheduler::work_loop` when it has idle time.
    fn request_idle_callback(&self);

    /// Ask the host to run `Runtime::flush_deferred` soon, after the current
    /// mutation pass has been painted.
    fn request_deferred_flush(&self);
}

/// Remaining time budget for one scheduler turn.
pub trait Deadline {
    fn time_remaining(&self) -> Duration;
}

/// A deadline that never runs out. Used by synchronous flushes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbounded;

impl Deadline for Unbounded {
    fn time_remaining(&self) -> Duration {
        Duration::MAX
    }
}

impl<F> Deadline for F
where
    F: Fn() -> Duration,
{
    fn time_remaining(&self) -> Duration {
        self()
    }
}

/// Provides timing information for deadline implementations.
pub trait Clock: Send + Sync {
    type Instant: Copy + Send + Sync;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: Self::Instant) -> Duration;
}
